//! Numeric layouts of a wavefunction inside the propagator.
//!
//! A wavefunction on `N` sites is stored either as `N` complex amplitudes
//! ([`Layout::Complex`]) or as `2N` reals with the real parts followed by the
//! imaginary parts ([`Layout::Real`]). The layout affects only the working
//! buffers of the propagation; everything handed to observers is complex.

use std::ops::{ Add, Mul, Sub };
use ndarray as nd;
use num_complex::Complex64 as C64;
use num_traits::Zero;
use serde::Deserialize;
use crate::{ Arr1, error::LengthError };

/// Storage layout of a wavefunction.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// One complex array.
    #[default]
    Complex,
    /// Two real arrays, real half then imaginary half.
    Real,
}

/// Element type a stencil kernel can operate on.
///
/// The Hamiltonian is real, so the same kernel serves a complex array and each
/// half of a split-real array.
pub trait Amplitude:
    Copy
    + Zero
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Mul<f64, Output = Self>
    + Send
    + Sync
    + 'static
{ }

impl Amplitude for f64 { }
impl Amplitude for C64 { }

/// A wavefunction in one of the two [`Layout`]s.
#[derive(Clone, Debug, PartialEq)]
pub enum WaveBuf {
    Complex(nd::Array1<C64>),
    Real(nd::Array1<f64>),
}

impl WaveBuf {
    /// Copy a complex wavefunction into the requested layout.
    pub fn from_complex<S>(psi: &Arr1<S>, layout: Layout) -> Self
    where S: nd::Data<Elem = C64>
    {
        match layout {
            Layout::Complex => Self::Complex(psi.to_owned()),
            Layout::Real => {
                let n = psi.len();
                let mut y: nd::Array1<f64> = nd::Array1::zeros(2 * n);
                {
                    let (mut re, mut im) = y.view_mut().split_at(nd::Axis(0), n);
                    nd::Zip::from(&mut re).and(&mut im).and(psi)
                        .for_each(|r, i, p| { *r = p.re; *i = p.im; });
                }
                Self::Real(y)
            },
        }
    }

    /// Return a complex copy of the wavefunction.
    pub fn to_complex(&self) -> nd::Array1<C64> {
        match self {
            Self::Complex(psi) => psi.clone(),
            Self::Real(y) => {
                let (re, im) = halves(y);
                nd::Zip::from(&re).and(&im).map_collect(|r, i| C64::new(*r, *i))
            },
        }
    }

    /// Overwrite the contents with a complex wavefunction of the same length.
    pub fn assign_complex<S>(&mut self, psi: &Arr1<S>)
        -> Result<(), LengthError>
    where S: nd::Data<Elem = C64>
    {
        LengthError::check(self.sites(), psi.len())?;
        *self = Self::from_complex(psi, self.layout());
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        match self {
            Self::Complex(_) => Layout::Complex,
            Self::Real(_) => Layout::Real,
        }
    }

    /// Number of lattice sites represented.
    pub fn sites(&self) -> usize {
        match self {
            Self::Complex(psi) => psi.len(),
            Self::Real(y) => y.len() / 2,
        }
    }

    /// Squared modulus at every site.
    pub fn density(&self) -> nd::Array1<f64> {
        match self {
            Self::Complex(psi) => psi.mapv(|p| p.norm_sqr()),
            Self::Real(y) => {
                let (re, im) = halves(y);
                nd::Zip::from(&re).and(&im).map_collect(|r, i| r * r + i * i)
            },
        }
    }
}

// real and imaginary halves of an owned real-layout buffer
fn halves(y: &nd::Array1<f64>) -> (nd::ArrayView1<'_, f64>, nd::ArrayView1<'_, f64>) {
    y.view().split_at(nd::Axis(0), y.len() / 2)
}

/// Split a real-layout buffer into its real and imaginary halves.
pub(crate) fn split(y: &[f64]) -> (&[f64], &[f64]) {
    y.split_at(y.len() / 2)
}

/// Mutable version of [`split`].
pub(crate) fn split_mut(y: &mut [f64]) -> (&mut [f64], &mut [f64]) {
    let n = y.len() / 2;
    y.split_at_mut(n)
}
