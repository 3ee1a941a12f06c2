#![allow(dead_code, non_snake_case)]

//! Provides a tight-binding Hamiltonian with a disordered on-site potential on a
//! d-dimensional hypercubic lattice and a Chebyshev-polynomial time propagator
//! for the associated (optionally Gross-Pitaevskii) Schrödinger equation.
//!
//! The propagator evaluates the expansion
//! ```text
//! exp(-i τ x) = Σ_k c_k T_k(x),  c_k ∝ J_k(τ)
//! ```
//! of the evolution operator over a rescaled Hamiltonian `x ∈ [-1, 1]` with
//! Clenshaw's recursion, so that each time step costs one stencil application
//! per polynomial order. The nonlinear term is folded in afterwards as a local
//! phase rotation.
//!
//! Components, leaves first:
//! - [`lattice`]: lattice geometry
//! - [`hamiltonian`]: the stencil operator and its spectral bounds
//! - [`chebyshev`]: expansion order and coefficients for a given time step
//! - [`stencil`]: the per-level update kernels, generic and specialized
//! - [`propagator`]: the Clenshaw stepper
//! - [`native`]: an optional shared-library backend for whole time steps
//! - [`evolution`]: the driver owning the state across a run
//!
//! Individual disorder realizations are independent; run them on separate
//! [`Evolution`]s (e.g. one per thread) and reduce their observables afterwards.

pub mod error;
pub mod lattice;
pub mod layout;
pub mod utils;
pub mod hamiltonian;
pub mod chebyshev;
pub mod stencil;
pub mod propagator;
pub mod native;
pub mod evolution;
pub mod wavefunction;
pub mod config;

pub(crate) const DEF_ACCURACY: f64 = 1e-6;
pub(crate) const DEF_MAXITERS: usize = 10_000;

pub type Arr1<S> = ndarray::ArrayBase<S, ndarray::Ix1>;

pub use lattice::{ Boundary, Lattice };
pub use layout::Layout;
pub use hamiltonian::{ Bounds, BoundsPolicy, Hamiltonian };
pub use chebyshev::Expansion;
pub use stencil::StencilChoice;
pub use evolution::{ Diagnostics, Evolution, Propagation };
pub use config::Config;
