//! Time evolution of a single disorder realization.
//!
//! An [`Evolution`] owns the Hamiltonian, the authoritative wavefunction, and
//! a stepping [`Engine`] negotiated once at construction: either a
//! [`NativeBackend`] or the in-process [`Propagator`] with the best available
//! stencil kernel. Expansion coefficients are cached and recomputed only when
//! the time step or the spectral bounds change.

use std::path::PathBuf;
use ndarray as nd;
use num_complex::Complex64 as C64;
use tracing::{ debug, info, trace, warn };
use crate::{
    Arr1,
    DEF_ACCURACY,
    error::{ BoundsError, ChebError, LengthError, PropError },
    chebyshev::Expansion,
    hamiltonian::{ BoundsPolicy, Hamiltonian },
    layout::{ Layout, WaveBuf },
    native::NativeBackend,
    propagator::{ PropResult, Propagator },
    stencil::{ Stencil, StencilChoice },
};

// time steps differing by more than this trigger recomputation of the
// expansion
const DT_EPS: f64 = 1e-12;
// schedule points closer than this fraction of `delta_t` are merged
const MERGE_EPS: f64 = 1e-9;

/// Parameters of a propagation run.
#[derive(Clone, Debug, PartialEq)]
pub struct Propagation {
    /// Final time.
    pub t_max: f64,
    /// Nominal time step.
    pub delta_t: f64,
    /// Truncation threshold on the Bessel coefficients.
    pub accuracy: f64,
    /// Refine spectral bounds with power iteration.
    pub accurate_bounds: bool,
    /// Working layout.
    pub layout: Layout,
    /// Attempt to load a native backend.
    pub want_native: bool,
    /// Explicit path to a native backend library.
    pub native_library: Option<PathBuf>,
    /// Response to spectral bounds failing the containment check.
    pub bounds_policy: BoundsPolicy,
    /// Interval between intermediate snapshots.
    pub checkpoint_every: Option<f64>,
    /// Stencil kernel selection for the in-process engine.
    pub stencil: StencilChoice,
}

impl Propagation {
    /// Default parameters for the given final time and step.
    pub fn new(t_max: f64, delta_t: f64) -> Self {
        Self {
            t_max,
            delta_t,
            accuracy: DEF_ACCURACY,
            accurate_bounds: false,
            layout: Layout::Complex,
            want_native: true,
            native_library: None,
            bounds_policy: BoundsPolicy::Warn,
            checkpoint_every: None,
            stencil: StencilChoice::Auto,
        }
    }

    /// Check that all time quantities and the accuracy are positive and
    /// finite.
    pub fn validate(&self) -> PropResult<()> {
        let times
            = [self.t_max, self.delta_t].into_iter()
            .chain(self.checkpoint_every);
        for t in times {
            if !(t > 0.0 && t.is_finite()) { return Err(PropError::BadTime(t)); }
        }
        ChebError::check_accuracy(self.accuracy)?;
        Ok(())
    }
}

/// One entry of a [`Schedule`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tick {
    /// Length of the step.
    pub dt: f64,
    /// Time at the end of the step.
    pub time: f64,
    /// Whether the state at `time` is handed to the observer.
    pub observe: bool,
}

/// Sequence of time steps from a start time to a final time.
///
/// Steps end on multiples of `delta_t`, with extra stops on multiples of the
/// checkpoint interval; the final step ends exactly on the final time, which
/// is always observed.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    ticks: Vec<Tick>,
}

impl Schedule {
    pub fn new(
        t_start: f64,
        t_max: f64,
        delta_t: f64,
        checkpoint_every: Option<f64>,
    ) -> Self
    {
        let eps = MERGE_EPS * delta_t;
        // index of the first multiple of `h` strictly after `t`
        let after = |t: f64, h: f64| ((t + eps) / h).floor() + 1.0;
        let mut ticks: Vec<Tick> = Vec::new();
        let mut t = t_start;
        let mut on_grid = ((t / delta_t).round() * delta_t - t).abs() < eps;
        while t_max - t > eps {
            let next_step = after(t, delta_t) * delta_t;
            let next_check
                = checkpoint_every
                .map(|c| after(t, c) * c)
                .unwrap_or(f64::INFINITY);
            let mut next = next_step.min(next_check);
            let mut observe = (next_check - next).abs() < eps;
            let mut ends_on_grid = (next_step - next).abs() < eps;
            if t_max - next < eps {
                next = t_max;
                observe = true;
                ends_on_grid = ends_on_grid && (next_step - t_max).abs() < eps;
            }
            let dt = if on_grid && ends_on_grid { delta_t } else { next - t };
            ticks.push(Tick { dt, time: next, observe });
            t = next;
            on_grid = ends_on_grid;
        }
        Self { ticks }
    }

    pub fn ticks(&self) -> &[Tick] { &self.ticks }

    pub fn len(&self) -> usize { self.ticks.len() }

    pub fn is_empty(&self) -> bool { self.ticks.is_empty() }
}

/// Counters accumulated over steps.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Diagnostics {
    /// Largest expansion order used.
    pub max_order: usize,
    /// Largest nonlinear phase `|Δt g |ψ|²|` encountered.
    pub max_nonlinear_phase: f64,
    /// Number of time steps taken.
    pub steps: usize,
    /// Number of times the expansion was recomputed.
    pub recomputations: usize,
}

/// Strategy performing whole time steps.
#[derive(Debug)]
pub enum Engine {
    Native(NativeBackend),
    InProcess(Propagator),
}

impl Engine {
    fn step(
        &mut self,
        h: &Hamiltonian,
        exp: &Expansion,
        dt: f64,
        wfc: &mut WaveBuf,
    ) -> PropResult<f64>
    {
        match self {
            Self::Native(backend) => backend.step(h, exp, dt, wfc),
            Self::InProcess(prop) => prop.step(h, exp, dt, wfc),
        }
    }

    /// Short description for diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Self::Native(backend) => format!("native ({})", backend.path()),
            Self::InProcess(prop) => format!("in-process ({})", prop.stencil().name()),
        }
    }

    pub fn is_native(&self) -> bool { matches!(self, Self::Native(_)) }
}

/// Driver for the time evolution of one disorder realization.
#[derive(Debug)]
pub struct Evolution {
    h: Hamiltonian,
    params: Propagation,
    wfc: WaveBuf,
    engine: Engine,
    expansion: Option<(f64, Expansion)>,
    time: f64,
    diagnostics: Diagnostics,
}

impl Evolution {
    /// Set up a run from `psi0` at time 0.
    ///
    /// Spectral bounds of `h` are estimated here according to `params`, and
    /// the stepping engine is chosen: a native backend when requested and
    /// available, otherwise the in-process propagator. Failure to load a
    /// backend is logged and is not an error.
    pub fn new<S>(mut h: Hamiltonian, psi0: &Arr1<S>, params: Propagation)
        -> PropResult<Self>
    where S: nd::Data<Elem = C64>
    {
        params.validate()?;
        LengthError::check(h.lattice().volume(), psi0.len())?;
        h.estimate_bounds(params.accurate_bounds, params.bounds_policy)?;
        let engine = negotiate(&h, &params);
        let wfc = WaveBuf::from_complex(psi0, params.layout);
        Ok(Self {
            h,
            params,
            wfc,
            engine,
            expansion: None,
            time: 0.0,
            diagnostics: Diagnostics::default(),
        })
    }

    pub fn hamiltonian(&self) -> &Hamiltonian { &self.h }

    pub fn params(&self) -> &Propagation { &self.params }

    pub fn engine(&self) -> &Engine { &self.engine }

    /// Current time.
    pub fn time(&self) -> f64 { self.time }

    pub fn diagnostics(&self) -> &Diagnostics { &self.diagnostics }

    pub fn reset_diagnostics(&mut self) { self.diagnostics = Diagnostics::default(); }

    /// Return a copy of the current wavefunction.
    pub fn wavefunction(&self) -> nd::Array1<C64> { self.wfc.to_complex() }

    /// Replace the wavefunction and reset the time to 0.
    pub fn set_wavefunction<S>(&mut self, psi: &Arr1<S>) -> PropResult<()>
    where S: nd::Data<Elem = C64>
    {
        self.wfc.assign_complex(psi)?;
        self.time = 0.0;
        Ok(())
    }

    /// Install a new disorder realization and re-estimate the spectral bounds.
    ///
    /// The cached expansion is discarded.
    pub fn set_disorder<S, D>(&mut self, disorder: &nd::ArrayBase<S, D>)
        -> PropResult<()>
    where
        S: nd::Data<Elem = f64>,
        D: nd::Dimension,
    {
        self.h.set_disorder(disorder)?;
        self.expansion = None;
        self.h.estimate_bounds(self.params.accurate_bounds, self.params.bounds_policy)?;
        Ok(())
    }

    /// Advance the wavefunction by one step `dt`, returning the maximum
    /// nonlinear phase of the step.
    pub fn step(&mut self, dt: f64) -> PropResult<f64> {
        if !(dt > 0.0 && dt.is_finite()) { return Err(PropError::BadTime(dt)); }
        let bounds = *self.h.bounds().ok_or(BoundsError::Missing)?;
        let stale
            = self.expansion.as_ref()
            .map(|(prev, _)| (dt - prev).abs() > DT_EPS)
            .unwrap_or(true);
        if stale {
            let tau = 0.5 * dt * bounds.width();
            let exp = Expansion::compute(tau, self.params.accuracy)?;
            debug!(dt, tau, order = exp.order(), "new time step");
            self.diagnostics.recomputations += 1;
            self.diagnostics.max_order = self.diagnostics.max_order.max(exp.order());
            self.expansion = Some((dt, exp));
        }
        let Some((_, exp)) = &self.expansion else {
            return Err(BoundsError::Missing.into());
        };
        let phase = self.engine.step(&self.h, exp, dt, &mut self.wfc)?;
        self.diagnostics.steps += 1;
        self.diagnostics.max_nonlinear_phase
            = self.diagnostics.max_nonlinear_phase.max(phase);
        self.time += dt;
        trace!(time = self.time, phase, "step");
        Ok(phase)
    }

    /// Propagate from the current time to `t_max`.
    ///
    /// `observer` receives the time and a copy of the wavefunction at every
    /// checkpoint, including the current time when checkpoints are requested,
    /// and always at `t_max`.
    pub fn run<F>(&mut self, mut observer: F) -> PropResult<()>
    where F: FnMut(f64, nd::Array1<C64>)
    {
        let schedule = Schedule::new(
            self.time,
            self.params.t_max,
            self.params.delta_t,
            self.params.checkpoint_every,
        );
        if self.params.checkpoint_every.is_some() {
            observer(self.time, self.wavefunction());
        }
        for tick in schedule.ticks() {
            self.step(tick.dt)?;
            self.time = tick.time;
            if tick.observe { observer(self.time, self.wavefunction()); }
        }
        Ok(())
    }
}

// decide the stepping engine once per run
fn negotiate(h: &Hamiltonian, params: &Propagation) -> Engine {
    let lattice = h.lattice();
    if params.want_native {
        match NativeBackend::probe(
            params.native_library.as_deref(), lattice, params.layout)
        {
            Ok(backend) => {
                info!("using native chebyshev backend '{}'", backend.path());
                return Engine::Native(backend);
            },
            Err(err) => {
                warn!("native chebyshev backend unavailable, falling back to in-process stepping: {err}");
            },
        }
    }
    let stencil = Stencil::select(lattice.dimension(), params.layout, params.stencil);
    info!(
        kernel = stencil.name(),
        layout = ?params.layout,
        "using in-process chebyshev propagation"
    );
    Engine::InProcess(Propagator::new(lattice, stencil))
}
