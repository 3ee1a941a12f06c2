//! Optional shared-library backend performing whole Chebyshev time steps.
//!
//! A backend library exports one entry point per layout,
//! ```text
//! double chebyshev_complex(int dim, const int *size, int max_order,
//!     const int *periodic, double _Complex *wfc, double _Complex *psi,
//!     double _Complex *psi_old, const double *disorder, const double *coef,
//!     const double *tunneling, double two_over_delta_e,
//!     double two_e0_over_delta_e, double g_dt, double e0_dt);
//! double chebyshev_real(/* same, with double * over split buffers */);
//! ```
//! which update `wfc` in place and return the maximum nonlinear phase, plus a
//! marker symbol `elementary_clenshaw_step_{complex,real}_{d}d` for every
//! lattice dimension `d` it supports. Both must be present for a backend to be
//! used.
//!
//! The library is searched for at, in order, an explicitly configured path,
//! the path in `$ANDERSON_CHEBYSHEV_LIB`, and the platform name for
//! `chebyshev` on the default search path.

use std::{
    ffi::c_int,
    fmt,
    path::{ Path, PathBuf },
};
use libloading::{ Library, Symbol };
use num_complex::Complex64 as C64;
use tracing::{ debug, trace };
use crate::{
    error::{ BoundsError, ChebError, LengthError, NativeError, PropError },
    chebyshev::Expansion,
    hamiltonian::Hamiltonian,
    lattice::Lattice,
    layout::{ Layout, WaveBuf },
};

/// Environment variable naming a backend library.
pub const LIBRARY_ENV: &str = "ANDERSON_CHEBYSHEV_LIB";

type ComplexEntry = unsafe extern "C" fn(
    c_int, *const c_int, c_int, *const c_int,
    *mut C64, *mut C64, *mut C64,
    *const f64, *const f64, *const f64,
    f64, f64, f64, f64,
) -> f64;

type RealEntry = unsafe extern "C" fn(
    c_int, *const c_int, c_int, *const c_int,
    *mut f64, *mut f64, *mut f64,
    *const f64, *const f64, *const f64,
    f64, f64, f64, f64,
) -> f64;

type Marker = unsafe extern "C" fn();

// resolved entry point with its working buffers
enum Entry {
    Complex { func: ComplexEntry, psi: Vec<C64>, psi_old: Vec<C64> },
    Real { func: RealEntry, psi: Vec<f64>, psi_old: Vec<f64> },
}

/// A loaded backend for one lattice and layout.
///
/// The library handle is kept alive for as long as the resolved entry point.
pub struct NativeBackend {
    _library: Library,
    path: String,
    layout: Layout,
    lattice: Lattice,
    size: Vec<c_int>,
    periodic: Vec<c_int>,
    entry: Entry,
}

/// List the paths probed for a backend library, in order.
pub fn candidates(configured: Option<&Path>) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if let Some(p) = configured { paths.push(p.to_path_buf()); }
    if let Some(p) = std::env::var_os(LIBRARY_ENV) { paths.push(p.into()); }
    paths.push(libloading::library_filename("chebyshev").into());
    paths
}

fn to_c_int(n: usize) -> Result<c_int, NativeError> {
    c_int::try_from(n).map_err(|_| NativeError::Unrepresentable(n))
}

fn marker_symbol(layout: Layout, dimension: usize) -> String {
    let kind = match layout { Layout::Complex => "complex", Layout::Real => "real" };
    format!("elementary_clenshaw_step_{}_{}d", kind, dimension)
}

// resolve a required symbol by name
fn resolve<T: Copy>(library: &Library, name: &str, path: &str)
    -> Result<T, NativeError>
{
    trace!("resolving symbol '{name}' in '{path}'");
    // SAFETY: `T` matches the signature documented for backend libraries;
    // this is the contract a backend must satisfy.
    unsafe {
        let sym: Symbol<T>
            = library.get(name.as_bytes())
            .map_err(|_| NativeError::Symbol {
                path: path.to_string(),
                symbol: name.to_string(),
            })?;
        Ok(*sym)
    }
}

impl NativeBackend {
    /// Load the library at `path` and resolve the entry point for `lattice`
    /// in `layout`.
    pub fn load(path: &Path, lattice: &Lattice, layout: Layout)
        -> Result<Self, NativeError>
    {
        let path_str = path.display().to_string();
        let dim = lattice.dimension();
        to_c_int(dim)?;
        to_c_int(lattice.volume())?;
        let size: Vec<c_int>
            = lattice.size().iter()
            .map(|n| to_c_int(*n))
            .collect::<Result<_, _>>()?;
        let periodic: Vec<c_int>
            = lattice.boundary().iter()
            .map(|bc| c_int::from(bc.is_periodic()))
            .collect();

        // SAFETY: loading an external shared library runs its initializers;
        // the caller is responsible for pointing at a trustworthy backend.
        let library
            = unsafe { Library::new(path) }
            .map_err(|e| NativeError::Load {
                path: path_str.clone(),
                cause: e.to_string(),
            })?;
        resolve::<Marker>(&library, &marker_symbol(layout, dim), &path_str)?;
        let n = lattice.volume();
        let entry
            = match layout {
                Layout::Complex => Entry::Complex {
                    func: resolve::<ComplexEntry>(&library, "chebyshev_complex", &path_str)?,
                    psi: vec![C64::from(0.0); n],
                    psi_old: vec![C64::from(0.0); n],
                },
                Layout::Real => Entry::Real {
                    func: resolve::<RealEntry>(&library, "chebyshev_real", &path_str)?,
                    psi: vec![0.0; 2 * n],
                    psi_old: vec![0.0; 2 * n],
                },
            };
        debug!("loaded native chebyshev backend '{path_str}'");
        Ok(Self {
            _library: library,
            path: path_str,
            layout,
            lattice: lattice.clone(),
            size,
            periodic,
            entry,
        })
    }

    /// Try every path from [`candidates`] in order, returning the first
    /// backend that loads or the last failure.
    pub fn probe(configured: Option<&Path>, lattice: &Lattice, layout: Layout)
        -> Result<Self, NativeError>
    {
        let mut last: Option<NativeError> = None;
        for path in candidates(configured) {
            match Self::load(&path, lattice, layout) {
                Ok(backend) => { return Ok(backend); },
                Err(err) => {
                    debug!("native backend candidate rejected: {err}");
                    last = Some(err);
                },
            }
        }
        Err(last.unwrap_or_else(|| NativeError::Load {
            path: String::new(),
            cause: "no candidate paths".to_string(),
        }))
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &str { &self.path }

    pub fn layout(&self) -> Layout { self.layout }

    pub fn lattice(&self) -> &Lattice { &self.lattice }

    /// Advance `wfc` in place by one time step `dt`, returning the maximum
    /// nonlinear phase reported by the backend.
    pub fn step(
        &mut self,
        h: &Hamiltonian,
        exp: &Expansion,
        dt: f64,
        wfc: &mut WaveBuf,
    ) -> Result<f64, PropError>
    {
        self.lattice.check_geometry(h.lattice())?;
        let bounds = h.bounds().ok_or(BoundsError::Missing)?;
        LengthError::check(self.lattice.volume(), wfc.sites())?;
        let order = exp.order();
        if order % 2 != 0 { return Err(ChebError::OddOrder(order).into()); }
        let max_order = order as c_int;
        let dim = self.size.len() as c_int;
        let disorder = h.disorder();
        if !disorder.is_standard_layout() { return Err(PropError::LayoutMismatch); }
        let g_dt = dt * h.g();
        let e0_dt = dt * bounds.medium_energy;

        match (&mut self.entry, wfc) {
            (Entry::Complex { func, psi, psi_old }, WaveBuf::Complex(w)) => {
                if !w.is_standard_layout() { return Err(PropError::LayoutMismatch); }
                // SAFETY: every buffer holds one entry per lattice site and
                // outlives the call; the backend does not retain pointers.
                let phase = unsafe {
                    (*func)(
                        dim, self.size.as_ptr(), max_order, self.periodic.as_ptr(),
                        w.as_mut_ptr(), psi.as_mut_ptr(), psi_old.as_mut_ptr(),
                        disorder.as_ptr(), exp.coef().as_ptr(), h.tunneling().as_ptr(),
                        bounds.two_over_delta_e, bounds.two_e0_over_delta_e,
                        g_dt, e0_dt,
                    )
                };
                Ok(phase)
            },
            (Entry::Real { func, psi, psi_old }, WaveBuf::Real(w)) => {
                if !w.is_standard_layout() { return Err(PropError::LayoutMismatch); }
                // SAFETY: as above, with split buffers of two entries per site
                let phase = unsafe {
                    (*func)(
                        dim, self.size.as_ptr(), max_order, self.periodic.as_ptr(),
                        w.as_mut_ptr(), psi.as_mut_ptr(), psi_old.as_mut_ptr(),
                        disorder.as_ptr(), exp.coef().as_ptr(), h.tunneling().as_ptr(),
                        bounds.two_over_delta_e, bounds.two_e0_over_delta_e,
                        g_dt, e0_dt,
                    )
                };
                Ok(phase)
            },
            _ => Err(PropError::LayoutMismatch),
        }
    }
}

impl fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBackend")
            .field("path", &self.path)
            .field("layout", &self.layout)
            .field("size", &self.lattice.size())
            .finish_non_exhaustive()
    }
}
