//! Initial states on a lattice, normalized so that `Σ |ψ|² δV = 1`.

use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{
    error::LengthError,
    lattice::Lattice,
    utils::wf_normalized,
};

// squared Gaussian exponents are clamped here to keep amplitudes from
// underflowing into subnormals
const GAUSS_CUTOFF: f64 = 100.0;

// per-site values of `f(axis, x_axis)` summed over axes
fn accumulate<F>(lattice: &Lattice, mut f: F) -> nd::Array1<f64>
where F: FnMut(usize, f64) -> f64
{
    let positions: Vec<Vec<f64>>
        = (0..lattice.dimension()).map(|a| lattice.positions(a)).collect();
    (0..lattice.volume())
        .map(|j| {
            lattice.coords(j).into_iter().enumerate()
                .map(|(a, c)| f(a, positions[a][c]))
                .sum()
        })
        .collect()
}

/// Plane wave `exp(i k·x) / √(N δV)`.
pub fn plane_wave(lattice: &Lattice, k: &[f64])
    -> Result<nd::Array1<C64>, LengthError>
{
    LengthError::check(lattice.dimension(), k.len())?;
    let amp = (lattice.volume() as f64 * lattice.cell_volume()).sqrt().recip();
    let phase = accumulate(lattice, |a, x| k[a] * x);
    Ok(phase.mapv(|ph| amp * C64::cis(ph)))
}

/// Gaussian packet `exp(i k0·x − ½ Σ (x_a / σ_a)²)` centred on the lattice.
pub fn gaussian(lattice: &Lattice, k0: &[f64], sigma0: &[f64])
    -> Result<nd::Array1<C64>, LengthError>
{
    LengthError::check(lattice.dimension(), k0.len())?;
    LengthError::check(lattice.dimension(), sigma0.len())?;
    let phase = accumulate(lattice, |a, x| k0[a] * x);
    let width = accumulate(lattice, |a, x| (x / sigma0[a]).powi(2));
    let psi: nd::Array1<C64>
        = nd::Zip::from(&phase).and(&width)
        .map_collect(|ph, w| (-0.5 * w.min(GAUSS_CUTOFF)).exp() * C64::cis(*ph));
    Ok(wf_normalized(&psi, lattice.cell_volume()))
}
