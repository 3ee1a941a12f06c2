//! TOML configuration of a run.
//!
//! ```toml
//! [lattice]
//! size = [256]
//! spacing = [1.0]
//! boundary = ["periodic"]
//!
//! [nonlinearity]
//! g = 0.0
//!
//! [propagation]
//! t_max = 10.0
//! delta_t = 0.1
//! accuracy = 1e-6
//! accurate_bounds = false
//! data_layout = "complex"
//! want_native = true
//! bounds_policy = "warn"
//! checkpoint_every = 1.0
//! stencil = "auto"
//! ```
//!
//! A single `spacing` or `boundary` entry applies to every axis. Everything in
//! `[propagation]` other than `t_max` and `delta_t` is optional, as is the
//! whole `[nonlinearity]` table.

use std::path::{ Path, PathBuf };
use serde::Deserialize;
use crate::{
    DEF_ACCURACY,
    error::ConfigError,
    evolution::Propagation,
    hamiltonian::{ BoundsPolicy, Hamiltonian },
    lattice::{ Boundary, Lattice },
    layout::Layout,
    stencil::StencilChoice,
};

pub type ConfigResult<T> = Result<T, ConfigError>;

fn def_accuracy() -> f64 { DEF_ACCURACY }

fn def_true() -> bool { true }

/// `[lattice]` table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LatticeConfig {
    pub size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub boundary: Vec<Boundary>,
}

/// `[nonlinearity]` table.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NonlinearityConfig {
    #[serde(default)]
    pub g: f64,
}

/// `[propagation]` table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropagationConfig {
    pub t_max: f64,
    pub delta_t: f64,
    #[serde(default = "def_accuracy")]
    pub accuracy: f64,
    #[serde(default)]
    pub accurate_bounds: bool,
    #[serde(default)]
    pub data_layout: Layout,
    #[serde(default = "def_true")]
    pub want_native: bool,
    #[serde(default)]
    pub native_library: Option<PathBuf>,
    #[serde(default)]
    pub bounds_policy: BoundsPolicy,
    #[serde(default)]
    pub checkpoint_every: Option<f64>,
    #[serde(default)]
    pub stencil: StencilChoice,
}

/// Complete configuration.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub lattice: LatticeConfig,
    #[serde(default)]
    pub nonlinearity: NonlinearityConfig,
    pub propagation: PropagationConfig,
}

// repeat a single entry over `n` axes
fn broadcast<T: Clone>(key: &'static str, values: &[T], n: usize)
    -> ConfigResult<Vec<T>>
{
    match values.len() {
        1 => Ok(vec![values[0].clone(); n]),
        m if m == n => Ok(values.to_vec()),
        m => Err(ConfigError::Value {
            key,
            reason: format!("expected 1 or {} entries, got {}", n, m),
        }),
    }
}

fn positive(key: &'static str, value: f64) -> ConfigResult<f64> {
    (value > 0.0 && value.is_finite())
        .then_some(value)
        .ok_or_else(|| ConfigError::Value {
            key,
            reason: format!("must be positive and finite; got {}", value),
        })
}

impl Config {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a TOML configuration file.
    pub fn load<P>(path: P) -> ConfigResult<Self>
    where P: AsRef<Path>
    {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Build the lattice geometry.
    pub fn lattice(&self) -> ConfigResult<Lattice> {
        let n = self.lattice.size.len();
        let spacing = broadcast("lattice.spacing", &self.lattice.spacing, n)?;
        let boundary = broadcast("lattice.boundary", &self.lattice.boundary, n)?;
        Ok(Lattice::new(self.lattice.size.clone(), spacing, boundary)?)
    }

    /// Nonlinear coupling constant.
    pub fn g(&self) -> ConfigResult<f64> {
        let g = self.nonlinearity.g;
        g.is_finite()
            .then_some(g)
            .ok_or_else(|| ConfigError::Value {
                key: "nonlinearity.g",
                reason: format!("must be finite; got {}", g),
            })
    }

    /// Build a Hamiltonian with zero disorder on the configured lattice.
    pub fn hamiltonian(&self) -> ConfigResult<Hamiltonian> {
        Ok(Hamiltonian::new(self.lattice()?, self.g()?))
    }

    /// Build the propagation parameters.
    pub fn propagation(&self) -> ConfigResult<Propagation> {
        let p = &self.propagation;
        Ok(Propagation {
            t_max: positive("propagation.t_max", p.t_max)?,
            delta_t: positive("propagation.delta_t", p.delta_t)?,
            accuracy: positive("propagation.accuracy", p.accuracy)?,
            accurate_bounds: p.accurate_bounds,
            layout: p.data_layout,
            want_native: p.want_native,
            native_library: p.native_library.clone(),
            bounds_policy: p.bounds_policy,
            checkpoint_every: p.checkpoint_every
                .map(|c| positive("propagation.checkpoint_every", c))
                .transpose()?,
            stencil: p.stencil,
        })
    }
}
