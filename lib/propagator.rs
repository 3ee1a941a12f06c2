//! Clenshaw evaluation of a Chebyshev time step.
//!
//! For an expansion of order `n`, recursion levels `k = n − 1, …, 0` each apply
//! one elementary step (see [`stencil`][crate::stencil]) alternating between
//! two working buffers. Odd levels write `psi → psi_old` with an imaginary
//! source term; even levels write `psi_old → psi` with a real one. The last
//! level uses half the usual constants, leaving the linear evolution in `psi`.
//!
//! The nonlinear term is then applied as the local phase rotation
//! `exp(−i Δt (e0 + g |ψ|²))`.

use num_complex::Complex64 as C64;
use crate::{
    error::{ BoundsError, ChebError, LengthError, PropError },
    chebyshev::Expansion,
    hamiltonian::{ Bounds, Hamiltonian },
    lattice::Lattice,
    layout::{ split, split_mut, Layout, WaveBuf },
    stencil::{ Kernel, KernelFn, Level, Scratch, Stencil },
};

pub type PropResult<T> = Result<T, PropError>;

// transient buffers of one layout
#[derive(Clone, Debug)]
enum Work {
    Complex { psi: Vec<C64>, psi_old: Vec<C64>, scratch: Scratch<C64> },
    Real { psi: Vec<f64>, psi_old: Vec<f64>, scratch: Scratch<f64> },
}

// (c1, c2) pairs for ordinary levels and the final level
#[derive(Copy, Clone, Debug)]
struct Consts {
    full: (f64, f64),
    half: (f64, f64),
}

impl Consts {
    fn new(bounds: &Bounds) -> Self {
        let c1 = bounds.two_over_delta_e;
        let c2 = bounds.two_e0_over_delta_e;
        Self { full: (2.0 * c1, 2.0 * c2), half: (c1, c2) }
    }

    fn at(&self, k: usize) -> (f64, f64) {
        if k == 0 { self.half } else { self.full }
    }
}

/// In-process Chebyshev stepper for one lattice and layout.
#[derive(Clone, Debug)]
pub struct Propagator {
    stencil: Stencil,
    lattice: Lattice,
    work: Work,
}

impl Propagator {
    /// Allocate working buffers for `lattice` in the layout of `stencil`.
    pub fn new(lattice: &Lattice, stencil: Stencil) -> Self {
        let n = lattice.volume();
        let work
            = match stencil.layout() {
                Layout::Complex => Work::Complex {
                    psi: vec![C64::from(0.0); n],
                    psi_old: vec![C64::from(0.0); n],
                    scratch: Scratch::new(lattice),
                },
                Layout::Real => Work::Real {
                    psi: vec![0.0; 2 * n],
                    psi_old: vec![0.0; 2 * n],
                    scratch: Scratch::new(lattice),
                },
            };
        Self { stencil, lattice: lattice.clone(), work }
    }

    pub fn stencil(&self) -> &Stencil { &self.stencil }

    pub fn layout(&self) -> Layout { self.stencil.layout() }

    pub fn lattice(&self) -> &Lattice { &self.lattice }

    /// Advance `wfc` in place by one time step `dt`, returning the maximum
    /// nonlinear phase `max |Δt g |ψ|²|` of the step.
    ///
    /// `exp` must have been computed for `dt` and the current bounds of `h`.
    pub fn step(
        &mut self,
        h: &Hamiltonian,
        exp: &Expansion,
        dt: f64,
        wfc: &mut WaveBuf,
    ) -> PropResult<f64>
    {
        self.lattice.check_geometry(h.lattice())?;
        let bounds = h.bounds().ok_or(BoundsError::Missing)?;
        LengthError::check(self.lattice.volume(), wfc.sites())?;
        let order = exp.order();
        if order % 2 != 0 || order < 2 {
            return Err(ChebError::OddOrder(order).into());
        }
        let consts = Consts::new(bounds);
        let e0_dt = dt * bounds.medium_energy;
        let g_dt = dt * h.g();
        let coef = exp.coef();

        match (&mut self.work, self.stencil.kernel(), wfc) {
            (
                Work::Complex { psi, psi_old, scratch },
                Kernel::Complex(kernel),
                WaveBuf::Complex(w),
            ) => {
                let w = w.as_slice_mut().ok_or(PropError::LayoutMismatch)?;
                clenshaw_complex(kernel, h, consts, coef, w, psi, psi_old, scratch);
                Ok(rotate_complex(w, psi, e0_dt, g_dt))
            },
            (
                Work::Real { psi, psi_old, scratch },
                Kernel::Real(kernel),
                WaveBuf::Real(w),
            ) => {
                let w = w.as_slice_mut().ok_or(PropError::LayoutMismatch)?;
                clenshaw_real(kernel, h, consts, coef, w, psi, psi_old, scratch);
                Ok(rotate_real(w, psi, e0_dt, g_dt))
            },
            _ => Err(PropError::LayoutMismatch),
        }
    }
}

// run levels n − 1, …, 0, alternating source and destination buffers
fn descend<T, F>(n: usize, psi: &mut [T], psi_old: &mut [T], mut level: F)
where F: FnMut(usize, &[T], &mut [T])
{
    for k in (0..n).rev() {
        if k % 2 == 1 {
            level(k, psi, psi_old);
        } else {
            level(k, psi_old, psi);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn clenshaw_complex(
    kernel: KernelFn<C64>,
    h: &Hamiltonian,
    consts: Consts,
    coef: &[f64],
    wfc: &[C64],
    psi: &mut [C64],
    psi_old: &mut [C64],
    scratch: &mut Scratch<C64>,
) {
    let n = coef.len() - 1;
    psi.iter_mut().zip(wfc).for_each(|(p, w)| { *p = *w * coef[n]; });
    psi_old.fill(C64::from(0.0));
    descend(n, psi, psi_old, |k, src, dst| {
        let (c1, c2) = consts.at(k);
        let drive
            = if k % 2 == 1 { C64::new(0.0, coef[k]) }
            else { C64::new(coef[k], 0.0) };
        kernel(h, &Level { c1, c2, drive, wfc }, src, dst, scratch);
    });
}

// on split buffers `i c (w_re + i w_im)` drives the real half with
// `−c w_im` and the imaginary half with `c w_re`
#[allow(clippy::too_many_arguments)]
fn clenshaw_real(
    kernel: KernelFn<f64>,
    h: &Hamiltonian,
    consts: Consts,
    coef: &[f64],
    wfc: &[f64],
    psi: &mut [f64],
    psi_old: &mut [f64],
    scratch: &mut Scratch<f64>,
) {
    let n = coef.len() - 1;
    let (w_re, w_im) = split(wfc);
    psi.iter_mut().zip(wfc).for_each(|(p, w)| { *p = *w * coef[n]; });
    psi_old.fill(0.0);
    descend(n, psi, psi_old, |k, src, dst| {
        let (c1, c2) = consts.at(k);
        let ck = coef[k];
        let (drive_re, wfc_re, drive_im, wfc_im)
            = if k % 2 == 1 { (-ck, w_im, ck, w_re) }
            else { (ck, w_re, ck, w_im) };
        let (s_re, s_im) = split(src);
        let (d_re, d_im) = split_mut(dst);
        kernel(h, &Level { c1, c2, drive: drive_re, wfc: wfc_re }, s_re, d_re, scratch);
        kernel(h, &Level { c1, c2, drive: drive_im, wfc: wfc_im }, s_im, d_im, scratch);
    });
}

// wfc ← psi exp(−i (e0 Δt + g Δt |psi|²))
fn rotate_complex(wfc: &mut [C64], psi: &[C64], e0_dt: f64, g_dt: f64) -> f64 {
    if g_dt == 0.0 {
        let global = C64::cis(-e0_dt);
        wfc.iter_mut().zip(psi).for_each(|(w, p)| { *w = p * global; });
        return 0.0;
    }
    wfc.iter_mut().zip(psi)
        .fold(0.0_f64, |max_phase, (w, p)| {
            let nonlinear = g_dt * p.norm_sqr();
            *w = p * C64::cis(-(e0_dt + nonlinear));
            max_phase.max(nonlinear.abs())
        })
}

fn rotate_real(wfc: &mut [f64], psi: &[f64], e0_dt: f64, g_dt: f64) -> f64 {
    let (p_re, p_im) = split(psi);
    let (w_re, w_im) = split_mut(wfc);
    let mut max_phase: f64 = 0.0;
    w_re.iter_mut().zip(w_im.iter_mut())
        .zip(p_re.iter().zip(p_im))
        .for_each(|((wr, wi), (pr, pi))| {
            let nonlinear
                = if g_dt == 0.0 { 0.0 }
                else { g_dt * (pr * pr + pi * pi) };
            max_phase = max_phase.max(nonlinear.abs());
            let (sin, cos) = (e0_dt + nonlinear).sin_cos();
            *wr = pr * cos + pi * sin;
            *wi = pi * cos - pr * sin;
        });
    max_phase
}
