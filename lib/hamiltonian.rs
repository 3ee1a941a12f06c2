//! The tight-binding Hamiltonian
//! ```text
//! (H ψ)_j = -Σ_a t_a (ψ_{j - e_a} + ψ_{j + e_a}) + V_j ψ_j
//! ```
//! with per-axis tunneling `t_a = 0.5 / δ_a²`, a disordered on-site potential
//! `V`, and a Gross-Pitaevskii coupling `g` carried along for the propagator.

use ndarray as nd;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use tracing::{ debug, warn };
use crate::{
    Arr1,
    DEF_MAXITERS,
    error::{ BoundsError, LatticeError, LengthError },
    lattice::Lattice,
    layout::Amplitude,
};

// relative growth of the estimated radius below which the power iteration stops
const RADIUS_TOL: f64 = 1.0001;
// padding applied to the converged radius
const RADIUS_PAD: f64 = 1.01;
// squared norm above which the power iteration vector is renormalized
const NORM_BIG: f64 = 1e100;

/// What to do when estimated spectral bounds fail the containment check in
/// [`Hamiltonian::check_bounds`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundsPolicy {
    /// Log a warning and continue with the bounds.
    #[default]
    Warn,
    /// Return [`BoundsError::Insufficient`].
    Abort,
}

/// Spectral bounds and the rescaling constants derived from them.
///
/// The rescaled operator `two_over_delta_e·H − two_e0_over_delta_e` has its
/// spectrum in `[-1, 1]` as long as `[e_min, e_max]` contains the spectrum of
/// `H`. Nothing enforces this.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Bounds {
    pub e_min: f64,
    pub e_max: f64,
    /// `(e_min + e_max) / 2`
    pub medium_energy: f64,
    /// `2 / (e_max − e_min)`
    pub two_over_delta_e: f64,
    /// `(e_min + e_max) / (e_max − e_min)`
    pub two_e0_over_delta_e: f64,
}

impl Bounds {
    pub fn new(e_min: f64, e_max: f64) -> Result<Self, BoundsError> {
        if !(e_min.is_finite() && e_max.is_finite() && e_max > e_min) {
            return Err(BoundsError::Degenerate(e_min, e_max));
        }
        let medium_energy = 0.5 * (e_min + e_max);
        let two_over_delta_e = 2.0 / (e_max - e_min);
        Ok(Self {
            e_min,
            e_max,
            medium_energy,
            two_over_delta_e,
            two_e0_over_delta_e: medium_energy * two_over_delta_e,
        })
    }

    /// `e_max − e_min`
    pub fn width(&self) -> f64 { self.e_max - self.e_min }
}

/// Disordered tight-binding Hamiltonian on a [`Lattice`].
#[derive(Clone, Debug, PartialEq)]
pub struct Hamiltonian {
    lattice: Lattice,
    disorder: nd::Array1<f64>,
    tunneling: Vec<f64>,
    g: f64,
    bounds: Option<Bounds>,
}

impl Hamiltonian {
    /// Create a new Hamiltonian with zero disorder.
    pub fn new(lattice: Lattice, g: f64) -> Self {
        let disorder = nd::Array1::zeros(lattice.volume());
        let tunneling = lattice.tunneling();
        Self { lattice, disorder, tunneling, g, bounds: None }
    }

    /// Create a new Hamiltonian with the given disorder field; see
    /// [`Self::set_disorder`].
    pub fn with_disorder<S, D>(
        lattice: Lattice,
        disorder: &nd::ArrayBase<S, D>,
        g: f64,
    ) -> Result<Self, LatticeError>
    where
        S: nd::Data<Elem = f64>,
        D: nd::Dimension,
    {
        let mut h = Self::new(lattice, g);
        h.set_disorder(disorder)?;
        Ok(h)
    }

    /// Replace the disorder field.
    ///
    /// The field is either flat with one entry per site in row-major order or
    /// shaped exactly like the lattice. Previously computed bounds are
    /// invalidated.
    pub fn set_disorder<S, D>(&mut self, disorder: &nd::ArrayBase<S, D>)
        -> Result<(), LatticeError>
    where
        S: nd::Data<Elem = f64>,
        D: nd::Dimension,
    {
        if disorder.ndim() == 1 {
            LengthError::check(self.lattice.volume(), disorder.len())?;
        } else {
            self.lattice.check_shape(disorder.shape())?;
        }
        self.disorder = disorder.iter().copied().collect();
        self.bounds = None;
        Ok(())
    }

    pub fn lattice(&self) -> &Lattice { &self.lattice }

    /// Flat disorder field in row-major order.
    pub fn disorder(&self) -> &nd::Array1<f64> { &self.disorder }

    pub fn tunneling(&self) -> &[f64] { &self.tunneling }

    pub fn g(&self) -> f64 { self.g }

    /// Return the current spectral bounds, if they have been computed for the
    /// current disorder field.
    pub fn bounds(&self) -> Option<&Bounds> { self.bounds.as_ref() }

    /// Apply the Hamiltonian to `src`, writing the result to `dst`.
    ///
    /// *Panics if either slice is not one entry per lattice site*.
    pub fn apply_into<T>(&self, src: &[T], dst: &mut [T])
    where T: Amplitude
    {
        let n = self.lattice.volume();
        assert!(
            src.len() == n && dst.len() == n,
            "apply_into: slices must have one entry per lattice site",
        );
        dst.iter_mut().zip(src.iter().zip(&self.disorder))
            .enumerate()
            .for_each(|(j, (hj, (sj, vj)))| {
                let mut acc: T = *sj * *vj;
                for (a, ta) in self.tunneling.iter().enumerate() {
                    let (lo, hi) = self.lattice.neighbors(j, a);
                    let mut hop = T::zero();
                    if let Some(l) = lo { hop = hop + src[l]; }
                    if let Some(u) = hi { hop = hop + src[u]; }
                    acc = acc - hop * *ta;
                }
                *hj = acc;
            });
    }

    /// Apply the Hamiltonian to a wavefunction.
    pub fn apply<S>(&self, psi: &Arr1<S>) -> Result<nd::Array1<C64>, LengthError>
    where S: nd::Data<Elem = C64>
    {
        LengthError::check(self.lattice.volume(), psi.len())?;
        let src: Vec<C64> = psi.iter().copied().collect();
        let mut dst: Vec<C64> = vec![C64::from(0.0); src.len()];
        self.apply_into(&src, &mut dst);
        Ok(dst.into())
    }

    fn disorder_extrema(&self) -> (f64, f64) {
        self.disorder.iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            })
    }

    /// Estimate the spectral bounds `(e_min, e_max)`.
    ///
    /// The cheap estimate adds the kinetic half-width `Σ 1/δ²` to the extrema
    /// of the disorder and is always valid. The accurate estimate refines
    /// this with a shifted power iteration; it is a heuristic and not a
    /// certified bound.
    pub fn energy_range(&self, accurate: bool) -> (f64, f64) {
        let (v_min, v_max) = self.disorder_extrema();
        let kin = self.lattice.kinetic_half_width();
        let (e_min_0, e_max_0) = (v_min - kin, v_max + kin);
        if !accurate {
            debug!(e_min = e_min_0, e_max = e_max_0, "cheap energy bounds");
            return (e_min_0, e_max_0);
        }

        let batch: usize
            = (50.0 / (e_max_0 - e_min_0).log10())
            .floor()
            .clamp(2.0, 10.0) as usize;
        let batch = batch.max(2);
        let uniform: Vec<f64> = vec![1.0; self.lattice.volume()];
        let staggered: Vec<f64>
            = (0..self.lattice.volume())
            .map(|j| {
                let parity: usize = self.lattice.coords(j).iter().sum();
                if parity % 2 == 0 { 1.0 } else { -1.0 }
            })
            .collect();
        let e_min = e_max_0 - RADIUS_PAD * self.shifted_radius(uniform, e_max_0, batch);
        let e_max = e_min_0 + RADIUS_PAD * self.shifted_radius(staggered, e_min_0, batch);
        debug!(e_min, e_max, batch, "accurate energy bounds");
        (e_min, e_max)
    }

    // estimate the spectral radius of `H − shift` by power iteration from
    // `x`, in batches of `batch` applications
    fn shifted_radius(&self, mut x: Vec<f64>, shift: f64, batch: usize)
        -> f64
    {
        let mut work: Vec<f64> = vec![0.0; x.len()];
        let mut step = |x: &mut Vec<f64>| {
            self.apply_into(x.as_slice(), work.as_mut_slice());
            work.iter_mut().zip(x.iter())
                .for_each(|(w, xj)| { *w -= shift * xj; });
            std::mem::swap(x, &mut work);
        };
        let sqnorm = |x: &[f64]| x.iter().map(|xj| xj * xj).sum::<f64>();

        let mut estimate: f64 = 0.0;
        for _ in 0..DEF_MAXITERS {
            (0..batch - 1).for_each(|_| { step(&mut x); });
            let norm = sqnorm(&x);
            step(&mut x);
            let new_norm = sqnorm(&x);
            if !(norm > 0.0 && new_norm.is_finite()) { return estimate; }
            let new_estimate = (new_norm / norm).sqrt();
            if new_norm > NORM_BIG {
                let scale = new_norm.sqrt();
                x.iter_mut().for_each(|xj| { *xj /= scale; });
            }
            if new_estimate < RADIUS_TOL * estimate { return new_estimate; }
            estimate = new_estimate;
        }
        warn!(
            shift, estimate,
            "power iteration for energy bounds did not settle within {} batches",
            DEF_MAXITERS
        );
        estimate
    }

    /// Check candidate bounds against simple necessary conditions, returning a
    /// description of the first failure.
    ///
    /// Each condition compares against a Rayleigh quotient of `H`: the
    /// single-site states give the disorder extrema and the uniform state
    /// gives the mean disorder minus the uniform kinetic energy.
    pub fn check_bounds(&self, e_min: f64, e_max: f64) -> Option<String> {
        let (v_min, v_max) = self.disorder_extrema();
        let v_mean = self.disorder.mean().unwrap_or(0.0);
        let kin_uniform: f64
            = self.tunneling.iter()
            .zip(self.lattice.size().iter().zip(self.lattice.boundary()))
            .map(|(ta, (n, bc))| {
                let frac
                    = if bc.is_periodic() { 1.0 }
                    else { (*n as f64 - 1.0) / *n as f64 };
                2.0 * ta * frac
            })
            .sum();
        if e_min > v_min {
            Some(format!("e_min exceeds the minimum on-site energy {}", v_min))
        } else if e_max < v_max {
            Some(format!("e_max is below the maximum on-site energy {}", v_max))
        } else if e_min > v_mean - kin_uniform {
            Some(format!(
                "e_min exceeds the energy of the uniform state {}",
                v_mean - kin_uniform,
            ))
        } else {
            None
        }
    }

    /// Set the spectral bounds and derive the rescaling constants for the
    /// Chebyshev expansion.
    pub fn script_h(&mut self, e_min: f64, e_max: f64)
        -> Result<&Bounds, BoundsError>
    {
        let bounds = Bounds::new(e_min, e_max)?;
        Ok(&*self.bounds.insert(bounds))
    }

    /// Run [`check_bounds`][Self::check_bounds] on candidate bounds and act
    /// on a failure according to `policy`.
    pub fn apply_policy(&self, e_min: f64, e_max: f64, policy: BoundsPolicy)
        -> Result<(), BoundsError>
    {
        let Some(reason) = self.check_bounds(e_min, e_max) else { return Ok(()); };
        match policy {
            BoundsPolicy::Warn => {
                warn!(e_min, e_max, "{}; energy bounds may be too narrow", reason);
                Ok(())
            },
            BoundsPolicy::Abort => {
                Err(BoundsError::Insufficient { e_min, e_max, reason })
            },
        }
    }

    /// Like [`script_h`][Self::script_h], but first vet the bounds with
    /// [`apply_policy`][Self::apply_policy]. Nothing is stored on an error.
    pub fn set_bounds(&mut self, e_min: f64, e_max: f64, policy: BoundsPolicy)
        -> Result<&Bounds, BoundsError>
    {
        self.apply_policy(e_min, e_max, policy)?;
        self.script_h(e_min, e_max)
    }

    /// Estimate, check, and store spectral bounds for the current disorder
    /// field.
    pub fn estimate_bounds(&mut self, accurate: bool, policy: BoundsPolicy)
        -> Result<&Bounds, BoundsError>
    {
        let (e_min, e_max) = self.energy_range(accurate);
        self.set_bounds(e_min, e_max, policy)
    }

    /// Return a new Hamiltonian whose disorder field includes the mean-field
    /// shift `factor·g·|ψ|²` of the nonlinear term.
    ///
    /// The receiver is left untouched and the returned operator carries no
    /// bounds.
    pub fn with_mean_field<S>(&self, psi: &Arr1<S>, factor: f64)
        -> Result<Self, LengthError>
    where S: nd::Data<Elem = C64>
    {
        LengthError::check(self.lattice.volume(), psi.len())?;
        let scale = factor * self.g;
        let disorder: nd::Array1<f64>
            = nd::Zip::from(&self.disorder).and(psi)
            .map_collect(|v, p| v + scale * p.norm_sqr());
        Ok(Self {
            lattice: self.lattice.clone(),
            disorder,
            tunneling: self.tunneling.clone(),
            g: self.g,
            bounds: None,
        })
    }

    /// Construct the dense matrix form of the (linear) Hamiltonian.
    pub fn to_dense(&self) -> nd::Array2<f64> {
        let n = self.lattice.volume();
        let mut H: nd::Array2<f64> = nd::Array2::zeros((n, n));
        for j in 0..n {
            H[[j, j]] += self.disorder[j];
            for (a, ta) in self.tunneling.iter().enumerate() {
                let (lo, hi) = self.lattice.neighbors(j, a);
                if let Some(l) = lo { H[[j, l]] -= ta; }
                if let Some(u) = hi { H[[j, u]] -= ta; }
            }
        }
        H
    }

    /// Compute the energy per particle of a state along with its nonlinear
    /// part `½ g Σ|ψ|⁴ δV / ‖ψ‖²`.
    pub fn energy<S>(&self, psi: &Arr1<S>) -> Result<(f64, f64), LengthError>
    where S: nd::Data<Elem = C64>
    {
        let dv = self.lattice.cell_volume();
        let hpsi = self.apply(psi)?;
        let norm: f64 = psi.iter().map(|p| p.norm_sqr()).sum::<f64>() * dv;
        let nonlinear: f64
            = 0.5 * self.g * psi.iter().map(|p| p.norm_sqr().powi(2)).sum::<f64>()
            * dv;
        let linear: f64
            = psi.iter().zip(&hpsi)
            .map(|(p, hp)| (p * hp.conj()).re)
            .sum::<f64>()
            * dv;
        Ok(((linear + nonlinear) / norm, nonlinear / norm))
    }
}
