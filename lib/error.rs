//! Collection of all error types.
//!
//! All errors derive [`thiserror::Error`], making them composable when allowed
//! and compatible with application code using [`anyhow`][anyhow].
//!
//! [anyhow]: https://crates.io/crates/anyhow

use thiserror::Error;

/// Returned when an array does not have the length required by the lattice it
/// is meant to live on.
#[derive(Debug, Error)]
#[error("encountered arrays with incompatible lengths; expected {0}, got {1}")]
pub struct LengthError(pub usize, pub usize);

impl LengthError {
    pub(crate) fn check(expected: usize, got: usize) -> Result<(), Self> {
        (expected == got).then_some(()).ok_or(Self(expected, got))
    }
}

/// Returned when a lattice geometry is malformed.
#[derive(Debug, Error)]
pub enum LatticeError {
    /// Returned when no axes are given.
    #[error("lattice must have at least one axis")]
    Empty,

    /// Returned when an axis has no sites.
    #[error("axis {0} has zero sites")]
    ZeroSize(usize),

    /// Returned when an axis spacing is non-positive or non-finite.
    #[error("axis {0}: spacing must be positive and finite; got {1}")]
    BadSpacing(usize, f64),

    /// Returned when per-axis specifications have differing lengths.
    #[error("per-axis specifications disagree: {sizes} sizes, {spacings} spacings, {boundaries} boundary conditions")]
    AxisCount { sizes: usize, spacings: usize, boundaries: usize },

    /// Returned when a multi-dimensional array is not shaped like the lattice.
    #[error("array shape {got:?} does not match lattice shape {expected:?}")]
    Shape { expected: Vec<usize>, got: Vec<usize> },

    /// Returned when two lattices of the same shape disagree on their
    /// boundary conditions.
    #[error("boundary conditions {got:?} do not match lattice boundary conditions {expected:?}")]
    Boundary { expected: Vec<bool>, got: Vec<bool> },

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),
}

/// Returned from the construction of a Chebyshev expansion.
#[derive(Debug, Error)]
pub enum ChebError {
    /// Returned when the rescaled time step is zero or non-finite.
    #[error("rescaled time step for Chebyshev propagation must be non-zero and finite; got {0}")]
    ZeroStep(f64),

    /// Returned when a non-positive accuracy target is encountered.
    #[error("accuracy must be greater than 0; got {0}")]
    BadAccuracy(f64),

    /// Returned when the rescaled time step would need an expansion order
    /// above the supported maximum.
    #[error("rescaled time step {tau} needs an expansion order above the maximum {max_order}")]
    OrderLimit { tau: f64, max_order: usize },

    /// Returned when the expansion order is odd.
    #[error("expansion order {0} must be an even number")]
    OddOrder(usize),
}

impl ChebError {
    pub(crate) fn check_accuracy(accuracy: f64) -> Result<(), Self> {
        (accuracy > 0.0 && accuracy.is_finite())
            .then_some(())
            .ok_or(Self::BadAccuracy(accuracy))
    }
}

/// Returned from spectral bound handling.
#[derive(Debug, Error)]
pub enum BoundsError {
    /// Returned when `e_max <= e_min` or either bound is non-finite.
    #[error("energy bounds are degenerate: e_min = {0}, e_max = {1}")]
    Degenerate(f64, f64),

    /// Returned when an operation requires spectral bounds that have not been
    /// computed for the current disorder field.
    #[error("spectral bounds have not been computed for the current disorder field")]
    Missing,

    /// Returned when the bounds fail the containment heuristic and the caller
    /// asked for this to be fatal.
    #[error("energy bounds [{e_min}, {e_max}] are probably too narrow: {reason}")]
    Insufficient { e_min: f64, e_max: f64, reason: String },
}

/// Returned when the native acceleration backend cannot be used.
///
/// These errors are never fatal to a propagation; the driver logs them and
/// falls back to the in-process stepper.
#[derive(Debug, Error)]
pub enum NativeError {
    /// Returned when the shared library cannot be opened.
    #[error("failed to load native library '{path}': {cause}")]
    Load { path: String, cause: String },

    /// Returned when a required entry point is missing.
    #[error("native library '{path}' does not export '{symbol}'")]
    Symbol { path: String, symbol: String },

    /// Returned when a lattice parameter does not fit into a C `int`.
    #[error("lattice parameter {0} is not representable as a C int")]
    Unrepresentable(usize),
}

/// Returned from time propagation.
#[derive(Debug, Error)]
pub enum PropError {
    /// Returned when a non-positive or non-finite time quantity is encountered.
    #[error("time quantities must be positive and finite; got {0}")]
    BadTime(f64),

    /// Returned when a state buffer does not have the layout the propagator
    /// was negotiated for.
    #[error("state buffer layout does not match the propagator layout")]
    LayoutMismatch,

    /// [`LengthError`]
    #[error("array length error: {0}")]
    Length(#[from] LengthError),

    /// [`LatticeError`]
    #[error("lattice error: {0}")]
    Lattice(#[from] LatticeError),

    /// [`ChebError`]
    #[error("chebyshev error: {0}")]
    Cheb(#[from] ChebError),

    /// [`BoundsError`]
    #[error("bounds error: {0}")]
    Bounds(#[from] BoundsError),
}

/// Returned from loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Returned when the configuration file cannot be read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when the configuration cannot be decoded.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Returned when a configuration value is out of range.
    #[error("invalid value for '{key}': {reason}")]
    Value { key: &'static str, reason: String },

    /// [`LatticeError`]
    #[error("lattice error: {0}")]
    Lattice(#[from] LatticeError),
}
