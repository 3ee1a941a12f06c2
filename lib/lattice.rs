//! Geometry of a d-dimensional hypercubic lattice.
//!
//! Sites are stored flat in row-major order: the last axis runs fastest.

use serde::Deserialize;
use crate::error::LatticeError;

/// Boundary condition along one lattice axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Boundary {
    /// The first and last sites of the axis are nearest neighbors.
    Periodic,
    /// The missing neighbor beyond the first and last sites is dropped.
    Open,
}

impl Boundary {
    pub fn is_periodic(&self) -> bool { matches!(self, Self::Periodic) }
}

/// Per-axis site count, spacing, and boundary condition.
///
/// Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct Lattice {
    size: Vec<usize>,
    spacing: Vec<f64>,
    boundary: Vec<Boundary>,
    strides: Vec<usize>,
}

impl Lattice {
    /// Construct from per-axis specifications, which must all have the same
    /// length.
    pub fn new(size: Vec<usize>, spacing: Vec<f64>, boundary: Vec<Boundary>)
        -> Result<Self, LatticeError>
    {
        if size.len() != spacing.len() || size.len() != boundary.len() {
            return Err(LatticeError::AxisCount {
                sizes: size.len(),
                spacings: spacing.len(),
                boundaries: boundary.len(),
            });
        }
        if size.is_empty() { return Err(LatticeError::Empty); }
        if let Some(axis) = size.iter().position(|n| *n == 0) {
            return Err(LatticeError::ZeroSize(axis));
        }
        if let Some((axis, dx))
            = spacing.iter().enumerate()
            .find(|(_, dx)| !(dx.is_finite() && **dx > 0.0))
        {
            return Err(LatticeError::BadSpacing(axis, *dx));
        }
        let mut strides = vec![1; size.len()];
        for a in (0..size.len() - 1).rev() {
            strides[a] = strides[a + 1] * size[a + 1];
        }
        Ok(Self { size, spacing, boundary, strides })
    }

    /// Construct a lattice with the same spacing and boundary condition along
    /// every axis.
    pub fn uniform(size: &[usize], spacing: f64, boundary: Boundary)
        -> Result<Self, LatticeError>
    {
        Self::new(
            size.to_vec(),
            vec![spacing; size.len()],
            vec![boundary; size.len()],
        )
    }

    /// Number of axes.
    pub fn dimension(&self) -> usize { self.size.len() }

    pub fn size(&self) -> &[usize] { &self.size }

    pub fn spacing(&self) -> &[f64] { &self.spacing }

    pub fn boundary(&self) -> &[Boundary] { &self.boundary }

    /// Flat-index offset between neighbors along each axis.
    pub fn strides(&self) -> &[usize] { &self.strides }

    /// Total number of sites.
    pub fn volume(&self) -> usize { self.size.iter().product() }

    /// Volume of a single lattice cell, `Π spacing_i`.
    pub fn cell_volume(&self) -> f64 { self.spacing.iter().product() }

    /// Tunneling strength `0.5 / spacing²` along each axis.
    pub fn tunneling(&self) -> Vec<f64> {
        self.spacing.iter().map(|dx| 0.5 / dx.powi(2)).collect()
    }

    /// Sum over axes of `1 / spacing²`, the half-width of the kinetic band.
    pub fn kinetic_half_width(&self) -> f64 {
        self.spacing.iter().map(|dx| dx.powi(-2)).sum()
    }

    /// Coordinates of the sites along `axis`, centred on the lattice.
    ///
    /// *Panics if `axis` is out of range*.
    pub fn positions(&self, axis: usize) -> Vec<f64> {
        let n = self.size[axis];
        let dx = self.spacing[axis];
        (0..n).map(|j| dx * (j as f64 - 0.5 * (n as f64 - 1.0))).collect()
    }

    /// Convert a flat site index into per-axis coordinates.
    pub fn coords(&self, index: usize) -> Vec<usize> {
        self.strides.iter().zip(&self.size)
            .map(|(s, n)| (index / s) % n)
            .collect()
    }

    /// Flat indices of the nearest neighbors of `index` along `axis`, as
    /// `(lower, upper)`, with `None` where an open boundary drops the
    /// neighbor.
    pub fn neighbors(&self, index: usize, axis: usize)
        -> (Option<usize>, Option<usize>)
    {
        let n = self.size[axis];
        let s = self.strides[axis];
        let c = (index / s) % n;
        let periodic = self.boundary[axis].is_periodic();
        let lower
            = if c > 0 { Some(index - s) }
            else if periodic { Some(index + (n - 1) * s) }
            else { None };
        let upper
            = if c + 1 < n { Some(index + s) }
            else if periodic { Some(index - (n - 1) * s) }
            else { None };
        (lower, upper)
    }

    /// Return `Ok` if `shape` is the lattice shape.
    pub(crate) fn check_shape(&self, shape: &[usize])
        -> Result<(), LatticeError>
    {
        (shape == self.size.as_slice())
            .then_some(())
            .ok_or_else(|| LatticeError::Shape {
                expected: self.size.clone(),
                got: shape.to_vec(),
            })
    }

    // shape and boundary conditions must agree; spacings may differ
    pub(crate) fn check_geometry(&self, other: &Lattice)
        -> Result<(), LatticeError>
    {
        self.check_shape(other.size())?;
        let periodic = |lat: &Lattice| -> Vec<bool> {
            lat.boundary.iter().map(|bc| bc.is_periodic()).collect()
        };
        (self.boundary == other.boundary)
            .then_some(())
            .ok_or_else(|| LatticeError::Boundary {
                expected: periodic(self),
                got: periodic(other),
            })
    }
}
