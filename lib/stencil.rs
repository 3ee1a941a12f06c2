//! Per-level update kernels of the Clenshaw recursion.
//!
//! Every kernel computes the elementary step
//! ```text
//! dst ← c1·H(src) − c2·src + drive·wfc − dst
//! ```
//! over one array of [`Amplitude`]s. The generic kernel works on any lattice by
//! calling [`Hamiltonian::apply_into`]; the specialized kernels for 1, 2, and 3
//! dimensions stream along the slowest axis through a three-slot ring buffer of
//! haloed rows (or planes) and avoid per-site neighbor lookups.
//!
//! Kernels are chosen once per (dimension, layout) pair from a static table.

use std::fmt;
use num_complex::Complex64 as C64;
use serde::Deserialize;
use crate::{
    hamiltonian::Hamiltonian,
    lattice::Lattice,
    layout::{ Amplitude, Layout },
};

/// Constants and source term of a single recursion level.
#[derive(Copy, Clone, Debug)]
pub struct Level<'a, T> {
    /// Multiplier on `H(src)`.
    pub c1: f64,
    /// Multiplier on `src`.
    pub c2: f64,
    /// Multiplier on the driving wavefunction.
    pub drive: T,
    /// Driving wavefunction.
    pub wfc: &'a [T],
}

/// Working memory for the kernels, sized for one lattice.
#[derive(Clone, Debug)]
pub struct Scratch<T> {
    full: Vec<T>,
    ring: [Vec<T>; 3],
}

impl<T> Scratch<T>
where T: Amplitude
{
    pub fn new(lattice: &Lattice) -> Self {
        let size = lattice.size();
        let slot: usize
            = match size.len() {
                1 => size[0] + 2,
                2 => size[1] + 2,
                3 => (size[1] + 2) * (size[2] + 2),
                _ => 0,
            };
        Self {
            full: vec![T::zero(); lattice.volume()],
            ring: [vec![T::zero(); slot], vec![T::zero(); slot], vec![T::zero(); slot]],
        }
    }
}

/// Signature shared by all kernels.
pub type KernelFn<T>
    = fn(&Hamiltonian, &Level<'_, T>, &[T], &mut [T], &mut Scratch<T>);

/// A kernel for one of the two layouts.
///
/// Split-real buffers are updated one half at a time with the `f64` kernel.
#[derive(Copy, Clone)]
pub enum Kernel {
    Complex(KernelFn<C64>),
    Real(KernelFn<f64>),
}

impl Kernel {
    pub fn layout(&self) -> Layout {
        match self {
            Self::Complex(_) => Layout::Complex,
            Self::Real(_) => Layout::Real,
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Kernel({:?})", self.layout())
    }
}

/// Which kernels to allow.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StencilChoice {
    /// Use a specialized kernel when one exists for the lattice dimension and
    /// layout.
    #[default]
    Auto,
    /// Always use the generic kernel.
    Generic,
}

/// A kernel selected for a (dimension, layout) pair.
#[derive(Copy, Clone, Debug)]
pub struct Stencil {
    name: &'static str,
    kernel: Kernel,
}

static SPECIALIZED: &[(usize, Layout, &str, Kernel)] = &[
    (1, Layout::Complex, "sweep_1d", Kernel::Complex(sweep_1d::<C64>)),
    (1, Layout::Real,    "sweep_1d", Kernel::Real(sweep_1d::<f64>)),
    (2, Layout::Complex, "sweep_2d", Kernel::Complex(sweep_2d::<C64>)),
    (2, Layout::Real,    "sweep_2d", Kernel::Real(sweep_2d::<f64>)),
    (3, Layout::Complex, "sweep_3d", Kernel::Complex(sweep_3d::<C64>)),
    (3, Layout::Real,    "sweep_3d", Kernel::Real(sweep_3d::<f64>)),
];

impl Stencil {
    /// Look up the kernel for a lattice dimension and layout, falling back to
    /// the generic kernel.
    pub fn select(dimension: usize, layout: Layout, choice: StencilChoice)
        -> Self
    {
        let found
            = (choice == StencilChoice::Auto)
            .then(|| {
                SPECIALIZED.iter()
                    .find(|(d, l, ..)| *d == dimension && *l == layout)
            })
            .flatten();
        match found {
            Some(&(_, _, name, kernel)) => Self { name, kernel },
            None => Self::generic(layout),
        }
    }

    /// The generic kernel for a layout.
    pub fn generic(layout: Layout) -> Self {
        let kernel
            = match layout {
                Layout::Complex => Kernel::Complex(generic::<C64>),
                Layout::Real => Kernel::Real(generic::<f64>),
            };
        Self { name: "generic", kernel }
    }

    pub fn name(&self) -> &'static str { self.name }

    pub fn layout(&self) -> Layout { self.kernel.layout() }

    pub fn kernel(&self) -> Kernel { self.kernel }
}

/// Elementary step through [`Hamiltonian::apply_into`].
pub fn generic<T>(
    h: &Hamiltonian,
    level: &Level<'_, T>,
    src: &[T],
    dst: &mut [T],
    scratch: &mut Scratch<T>,
)
where T: Amplitude
{
    h.apply_into(src, &mut scratch.full);
    dst.iter_mut()
        .zip(scratch.full.iter().zip(src).zip(level.wfc))
        .for_each(|(d, ((hs, s), w))| {
            *d = *hs * level.c1 - *s * level.c2 + *w * level.drive - *d;
        });
}

// copy `row` into `slot[1..=n]` and fill the halo cells `slot[0]` and
// `slot[n + 1]`; a missing row zeroes the slot
fn load_row<T>(slot: &mut [T], row: Option<&[T]>, periodic: bool)
where T: Amplitude
{
    match row {
        Some(r) => {
            let n = r.len();
            slot[1..=n].copy_from_slice(r);
            slot[0] = if periodic { r[n - 1] } else { T::zero() };
            slot[n + 1] = if periodic { r[0] } else { T::zero() };
        },
        None => { slot.fill(T::zero()); },
    }
}

// copy an `n1 × n2` plane into a slot of `(n1 + 2) × (n2 + 2)` with halo rows
// and columns; a missing plane zeroes the slot
fn load_plane<T>(
    slot: &mut [T],
    plane: Option<&[T]>,
    n1: usize,
    n2: usize,
    periodic: (bool, bool),
)
where T: Amplitude
{
    let w = n2 + 2;
    let Some(p) = plane else {
        slot.fill(T::zero());
        return;
    };
    p.chunks_exact(n2).enumerate()
        .for_each(|(r, row)| {
            load_row(&mut slot[(r + 1) * w..(r + 2) * w], Some(row), periodic.1);
        });
    if periodic.0 {
        slot.copy_within(n1 * w..(n1 + 1) * w, 0);
        slot.copy_within(w..2 * w, (n1 + 1) * w);
    } else {
        slot[..w].fill(T::zero());
        slot[(n1 + 1) * w..].fill(T::zero());
    }
}

// index of the ring slot holding row `i`, where row -1 lives in slot 2
#[inline]
fn ring_slot(i: isize) -> usize { i.rem_euclid(3) as usize }

/// Elementary step for a one-dimensional lattice.
pub fn sweep_1d<T>(
    h: &Hamiltonian,
    level: &Level<'_, T>,
    src: &[T],
    dst: &mut [T],
    scratch: &mut Scratch<T>,
)
where T: Amplitude
{
    let periodic = h.lattice().boundary()[0].is_periodic();
    let c3 = level.c1 * h.tunneling()[0];
    let line = &mut scratch.ring[0];
    load_row(line, Some(src), periodic);
    let line = &scratch.ring[0];
    dst.iter_mut()
        .zip(h.disorder().iter().zip(level.wfc))
        .enumerate()
        .for_each(|(j, (d, (v, w)))| {
            let diag = level.c1 * v - level.c2;
            *d = line[j + 1] * diag - (line[j] + line[j + 2]) * c3
                + *w * level.drive - *d;
        });
}

/// Elementary step for a two-dimensional lattice, streaming over rows.
pub fn sweep_2d<T>(
    h: &Hamiltonian,
    level: &Level<'_, T>,
    src: &[T],
    dst: &mut [T],
    scratch: &mut Scratch<T>,
)
where T: Amplitude
{
    let size = h.lattice().size();
    let (n0, n1) = (size[0], size[1]);
    let bc = h.lattice().boundary();
    let (per0, per1) = (bc[0].is_periodic(), bc[1].is_periodic());
    let t = h.tunneling();
    let (c3_0, c3_1) = (level.c1 * t[0], level.c1 * t[1]);
    let disorder = h.disorder();
    let row = move |i: usize| &src[i * n1..(i + 1) * n1];

    load_row(&mut scratch.ring[2], per0.then(|| row(n0 - 1)), per1);
    load_row(&mut scratch.ring[0], Some(row(0)), per1);
    for i in 0..n0 {
        let next_row
            = if i + 1 < n0 { Some(row(i + 1)) }
            else if per0 { Some(row(0)) }
            else { None };
        load_row(&mut scratch.ring[ring_slot(i as isize + 1)], next_row, per1);

        let prev = &scratch.ring[ring_slot(i as isize - 1)];
        let cur = &scratch.ring[ring_slot(i as isize)];
        let next = &scratch.ring[ring_slot(i as isize + 1)];
        for c in 0..n1 {
            let j = i * n1 + c;
            let k = c + 1;
            let diag = level.c1 * disorder[j] - level.c2;
            let hop = (prev[k] + next[k]) * c3_0 + (cur[k - 1] + cur[k + 1]) * c3_1;
            dst[j] = cur[k] * diag - hop + level.wfc[j] * level.drive - dst[j];
        }
    }
}

/// Elementary step for a three-dimensional lattice, streaming over planes.
pub fn sweep_3d<T>(
    h: &Hamiltonian,
    level: &Level<'_, T>,
    src: &[T],
    dst: &mut [T],
    scratch: &mut Scratch<T>,
)
where T: Amplitude
{
    let size = h.lattice().size();
    let (n0, n1, n2) = (size[0], size[1], size[2]);
    let bc = h.lattice().boundary();
    let per0 = bc[0].is_periodic();
    let per12 = (bc[1].is_periodic(), bc[2].is_periodic());
    let t = h.tunneling();
    let c3 = [level.c1 * t[0], level.c1 * t[1], level.c1 * t[2]];
    let disorder = h.disorder();
    let area = n1 * n2;
    let w = n2 + 2;
    let plane = move |i: usize| &src[i * area..(i + 1) * area];

    load_plane(&mut scratch.ring[2], per0.then(|| plane(n0 - 1)), n1, n2, per12);
    load_plane(&mut scratch.ring[0], Some(plane(0)), n1, n2, per12);
    for i in 0..n0 {
        let next_plane
            = if i + 1 < n0 { Some(plane(i + 1)) }
            else if per0 { Some(plane(0)) }
            else { None };
        load_plane(
            &mut scratch.ring[ring_slot(i as isize + 1)],
            next_plane, n1, n2, per12,
        );

        let prev = &scratch.ring[ring_slot(i as isize - 1)];
        let cur = &scratch.ring[ring_slot(i as isize)];
        let next = &scratch.ring[ring_slot(i as isize + 1)];
        for r in 0..n1 {
            for c in 0..n2 {
                let j = i * area + r * n2 + c;
                let k = (r + 1) * w + c + 1;
                let diag = level.c1 * disorder[j] - level.c2;
                let hop
                    = (prev[k] + next[k]) * c3[0]
                    + (cur[k - w] + cur[k + w]) * c3[1]
                    + (cur[k - 1] + cur[k + 1]) * c3[2];
                dst[j] = cur[k] * diag - hop + level.wfc[j] * level.drive - dst[j];
            }
        }
    }
}
