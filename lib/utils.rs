//! Miscellaneous tools.

use ndarray::{ self as nd, Ix1 };
use num_complex::Complex64 as C64;

// values above this are rescaled during the backward recurrence
const BESSEL_BIG: f64 = 1e250;

/// Compute the Bessel functions of the first kind `J_k(x)` for all
/// `k = 0..=n_max`.
///
/// Uses Miller's backward recurrence from an order well above both `n_max` and
/// `|x|`, normalized with the sum rule `J_0 + 2 Σ J_2k = 1`. The recurrence is
/// stable downward for every `x`, so the whole table is accurate to a few ulps
/// relative to `max_k |J_k(x)|`.
pub fn bessel_j_table(x: f64, n_max: usize) -> nd::Array1<f64> {
    let mut table: nd::Array1<f64> = nd::Array1::zeros(n_max + 1);
    let ax = x.abs();
    if ax == 0.0 {
        table[0] = 1.0;
        return table;
    }
    let reach = (n_max as f64).max(ax);
    let mut m: usize
        = (n_max + 16 + (160.0 * reach).sqrt() as usize)
        .max(ax as usize + 30);
    m += m % 2;

    let mut j: Vec<f64> = vec![0.0; m + 1];
    let mut jkp1: f64 = 0.0;
    let mut jk: f64 = 1e-300;
    j[m] = jk;
    let mut jkm1: f64;
    for k in (1..=m).rev() {
        jkm1 = 2.0 * k as f64 / ax * jk - jkp1;
        jkp1 = jk;
        jk = jkm1;
        j[k - 1] = jk;
        if jk.abs() > BESSEL_BIG {
            j[k - 1..].iter_mut().for_each(|jj| { *jj /= BESSEL_BIG; });
            jk /= BESSEL_BIG;
            jkp1 /= BESSEL_BIG;
        }
    }
    let norm: f64
        = j[0] + 2.0 * j.iter().skip(2).step_by(2).sum::<f64>();
    table.iter_mut().zip(&j)
        .enumerate()
        .for_each(|(k, (tk, jk))| {
            let parity = if x < 0.0 && k % 2 == 1 { -1.0 } else { 1.0 };
            *tk = parity * jk / norm;
        });
    table
}

/// Calculate the squared norm `Σ |ψ|² δV` of a lattice wavefunction.
pub fn wf_norm<S>(q: &nd::ArrayBase<S, Ix1>, dv: f64) -> f64
where S: nd::Data<Elem = C64>
{
    q.iter().map(|qk| qk.norm_sqr()).sum::<f64>() * dv
}

/// Calculate the inner product `Σ conj(q) p δV` of two lattice wavefunctions.
///
/// *Panics if the arrays have unequal lengths*.
pub fn wf_dot<S, T>(
    q: &nd::ArrayBase<S, Ix1>,
    p: &nd::ArrayBase<T, Ix1>,
    dv: f64,
) -> C64
where
    S: nd::Data<Elem = C64>,
    T: nd::Data<Elem = C64>,
{
    assert_eq!(q.len(), p.len(), "wf_dot: unequal array lengths");
    q.iter().zip(p)
        .fold(C64::from(0.0), |acc, (qk, pk)| acc + qk.conj() * pk)
        * dv
}

/// Renormalize a lattice wavefunction in place.
pub fn wf_renormalize<S>(q: &mut nd::ArrayBase<S, Ix1>, dv: f64)
where S: nd::DataMut<Elem = C64>
{
    let norm = wf_norm(q, dv).sqrt();
    q.map_inplace(|qk| { *qk /= norm; });
}

/// Return a normalized copy of a lattice wavefunction.
pub fn wf_normalized<S>(q: &nd::ArrayBase<S, Ix1>, dv: f64)
    -> nd::Array1<C64>
where S: nd::Data<Elem = C64>
{
    let norm = wf_norm(q, dv).sqrt();
    q.mapv(|qk| qk / norm)
}
