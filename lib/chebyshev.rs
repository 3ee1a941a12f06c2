//! Chebyshev expansion of the evolution operator over a rescaled Hamiltonian.
//!
//! For `x ∈ [-1, 1]`,
//! ```text
//! exp(-i τ x) = J_0(τ) + 2 Σ_{k ≥ 1} (-i)^k J_k(τ) T_k(x)
//! ```
//! The coefficients are stored as reals with the powers of `-i` implied by the
//! parity of `k`: even orders drive the real part of the recursion and odd
//! orders the imaginary part.

use tracing::debug;
use crate::{
    error::ChebError,
    utils::bessel_j_table,
};

// first order tried before the downward search
const ORDER_PAD: usize = 10;

/// Largest starting order for the downward search; rescaled time steps needing
/// more are rejected.
pub const MAX_ORDER: usize = 1 << 16;

/// Expansion order and coefficients for a single rescaled time step.
#[derive(Clone, Debug, PartialEq)]
pub struct Expansion {
    tau: f64,
    order: usize,
    coef: Vec<f64>,
}

impl Expansion {
    /// Compute the expansion for rescaled time step `tau = Δt·(e_max −
    /// e_min)/2` truncated where the Bessel coefficients fall below
    /// `accuracy`.
    ///
    /// Starting from order `⌊2|τ|⌋ + 10`, which may not exceed [`MAX_ORDER`],
    /// the order is lowered while
    /// `|J_order(τ)| < accuracy`, then rounded up to the next even number
    /// (and at least 2). The coefficients are
    /// ```text
    /// c_k = -4 J_k(-τ) (((k mod 4) > 1) − ½),  c_0 halved
    /// ```
    pub fn compute(tau: f64, accuracy: f64) -> Result<Self, ChebError> {
        if tau == 0.0 || !tau.is_finite() { return Err(ChebError::ZeroStep(tau)); }
        ChebError::check_accuracy(accuracy)?;
        let start_f = (2.0 * tau.abs()).floor() + ORDER_PAD as f64;
        if start_f > MAX_ORDER as f64 {
            return Err(ChebError::OrderLimit { tau, max_order: MAX_ORDER });
        }
        let start: usize = start_f as usize;
        let bessel = bessel_j_table(tau, start + 1);
        let mut i: usize = start;
        while i > 0 && bessel[i].abs() < accuracy { i -= 1; }
        let order: usize = (2 * ((i + 1) / 2)).max(2);
        if order % 2 != 0 { return Err(ChebError::OddOrder(order)); }

        let coef: Vec<f64>
            = (0..=order)
            .map(|k| {
                // J_k(-τ) = (-1)^k J_k(τ)
                let jk_neg = if k % 2 == 0 { bessel[k] } else { -bessel[k] };
                let pattern = if k % 4 > 1 { 0.5 } else { -0.5 };
                let ck = -4.0 * jk_neg * pattern;
                if k == 0 { 0.5 * ck } else { ck }
            })
            .collect();
        debug!(tau, order, "recomputed chebyshev coefficients");
        Ok(Self { tau, order, coef })
    }

    /// Rescaled time step.
    pub fn tau(&self) -> f64 { self.tau }

    /// Expansion order; always even.
    pub fn order(&self) -> usize { self.order }

    /// Coefficients `c_0, …, c_order`.
    pub fn coef(&self) -> &[f64] { &self.coef }
}
