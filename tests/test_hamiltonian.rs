//! Tests for the lattice Hamiltonian and its spectral bounds.

use std::f64::consts::PI;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use anderson::{
    Boundary,
    BoundsPolicy,
    Hamiltonian,
    Lattice,
    error::{ BoundsError, LatticeError },
    wavefunction::plane_wave,
};

fn mixed_lattice() -> Lattice {
    Lattice::new(
        vec![3, 4, 5],
        vec![1.0, 0.5, 2.0],
        vec![Boundary::Periodic, Boundary::Open, Boundary::Periodic],
    ).unwrap()
}

fn disorder(n: usize, width: f64, seed: u64) -> nd::Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| width * (rng.gen::<f64>() - 0.5)).collect()
}

// ---------------------------------------------------------------------------
// operator
// ---------------------------------------------------------------------------

#[test]
fn apply_matches_dense_matrix() {
    let lat = mixed_lattice();
    let n = lat.volume();
    let h = Hamiltonian::with_disorder(lat, &disorder(n, 3.0, 1), 0.0).unwrap();
    let mut rng = StdRng::seed_from_u64(2);
    let psi: nd::Array1<C64>
        = (0..n).map(|_| C64::new(rng.gen(), rng.gen())).collect();

    let dense = h.to_dense();
    let re = dense.dot(&psi.mapv(|p| p.re));
    let im = dense.dot(&psi.mapv(|p| p.im));
    let hpsi = h.apply(&psi).unwrap();
    for j in 0..n {
        assert!((hpsi[j] - C64::new(re[j], im[j])).norm() < 1e-12);
    }
}

#[test]
fn dense_matrix_is_symmetric() {
    let lat = Lattice::uniform(&[2, 3], 1.0, Boundary::Periodic).unwrap();
    let n = lat.volume();
    let h = Hamiltonian::with_disorder(lat, &disorder(n, 1.0, 4), 0.0).unwrap();
    let dense = h.to_dense();
    assert_eq!(dense, dense.t());
    // two-site periodic axis: both neighbors are the same site
    assert_eq!(dense[[0, 3]], -1.0);
}

#[test]
fn apply_checks_length() {
    let lat = Lattice::uniform(&[6], 1.0, Boundary::Open).unwrap();
    let h = Hamiltonian::new(lat, 0.0);
    let psi: nd::Array1<C64> = nd::Array1::zeros(5);
    assert!(h.apply(&psi).is_err());
}

// ---------------------------------------------------------------------------
// bounds
// ---------------------------------------------------------------------------

#[test]
fn cheap_bounds_add_kinetic_width_to_disorder_extrema() {
    let lat = Lattice::new(
        vec![4, 3], vec![1.0, 0.5], vec![Boundary::Open, Boundary::Open],
    ).unwrap();
    let mut v: nd::Array1<f64> = nd::Array1::zeros(12);
    v[3] = -1.2;
    v[7] = 0.7;
    let h = Hamiltonian::with_disorder(lat, &v, 0.0).unwrap();
    let (e_min, e_max) = h.energy_range(false);
    assert!((e_min - (-1.2 - 5.0)).abs() < 1e-14);
    assert!((e_max - (0.7 + 5.0)).abs() < 1e-14);
}

#[test]
fn accurate_bounds_bracket_the_open_chain() {
    // E_k = −cos(πk/(N+1))
    let n = 50;
    let lat = Lattice::uniform(&[n], 1.0, Boundary::Open).unwrap();
    let h = Hamiltonian::new(lat, 0.0);
    let edge = (PI / (n + 1) as f64).cos();
    let (e_min, e_max) = h.energy_range(true);
    assert!(e_min <= -edge && e_min > -1.03 * edge, "e_min = {e_min}");
    assert!(e_max >= edge && e_max < 1.03 * edge, "e_max = {e_max}");
}

#[test]
fn accurate_bounds_pass_the_containment_check() {
    let lat = Lattice::uniform(&[8, 8], 1.0, Boundary::Open).unwrap();
    let h = Hamiltonian::with_disorder(lat, &disorder(64, 4.0, 8), 0.0).unwrap();
    let (c_min, c_max) = h.energy_range(false);
    let (e_min, e_max) = h.energy_range(true);
    assert!(h.check_bounds(e_min, e_max).is_none());
    let slack = 0.011 * (c_max - c_min);
    assert!(e_min >= c_min - slack && e_max <= c_max + slack);
    assert!(e_max - e_min < c_max - c_min);
}

#[test]
fn narrow_bounds_are_flagged() {
    let lat = Lattice::uniform(&[16], 1.0, Boundary::Periodic).unwrap();
    let h = Hamiltonian::new(lat, 0.0);
    assert!(h.check_bounds(-1.0, 1.0).is_none());
    // above the smallest on-site energy
    assert!(h.check_bounds(0.1, 1.0).unwrap().contains("e_min"));
    // below the largest on-site energy
    assert!(h.check_bounds(-1.0, -0.1).unwrap().contains("e_max"));
    // above the uniform-state energy −1
    assert!(h.check_bounds(-0.5, 1.0).unwrap().contains("uniform"));
}

#[test]
fn abort_policy_rejects_narrow_bounds() {
    let lat = Lattice::uniform(&[16], 1.0, Boundary::Periodic).unwrap();
    let mut h = Hamiltonian::new(lat, 0.0);
    assert!(h.apply_policy(-2.0, 2.0, BoundsPolicy::Abort).is_ok());
    match h.apply_policy(0.1, 1.0, BoundsPolicy::Abort) {
        Err(BoundsError::Insufficient { e_min, e_max, reason }) => {
            assert_eq!((e_min, e_max), (0.1, 1.0));
            assert!(reason.contains("e_min"));
        },
        other => panic!("expected insufficient bounds, got {other:?}"),
    }
    assert!(matches!(
        h.set_bounds(0.1, 1.0, BoundsPolicy::Abort),
        Err(BoundsError::Insufficient { .. })
    ));
    assert!(h.bounds().is_none());
}

#[test]
fn warn_policy_keeps_narrow_bounds() {
    let lat = Lattice::uniform(&[16], 1.0, Boundary::Periodic).unwrap();
    let mut h = Hamiltonian::new(lat, 0.0);
    assert!(h.apply_policy(-0.5, 1.0, BoundsPolicy::Warn).is_ok());
    let b = *h.set_bounds(0.1, 1.0, BoundsPolicy::Warn).unwrap();
    assert_eq!((b.e_min, b.e_max), (0.1, 1.0));
    assert_eq!(h.bounds(), Some(&b));
}

#[test]
fn script_h_derives_rescaling_constants() {
    let lat = Lattice::uniform(&[4], 1.0, Boundary::Open).unwrap();
    let mut h = Hamiltonian::new(lat, 0.0);
    let b = *h.script_h(-2.0, 6.0).unwrap();
    assert_eq!(b.medium_energy, 2.0);
    assert_eq!(b.two_over_delta_e, 0.25);
    assert_eq!(b.two_e0_over_delta_e, 0.5);
    assert_eq!(b.width(), 8.0);
    assert_eq!(h.bounds(), Some(&b));

    assert!(matches!(h.script_h(1.0, 1.0), Err(BoundsError::Degenerate(..))));
    assert!(matches!(h.script_h(0.0, f64::NAN), Err(BoundsError::Degenerate(..))));
}

#[test]
fn estimate_bounds_stores_cheap_bounds() {
    let lat = Lattice::uniform(&[10], 1.0, Boundary::Open).unwrap();
    let mut h = Hamiltonian::with_disorder(lat, &disorder(10, 2.0, 3), 0.0).unwrap();
    assert!(h.bounds().is_none());
    let (e_min, e_max) = h.energy_range(false);
    let b = *h.estimate_bounds(false, BoundsPolicy::Abort).unwrap();
    assert_eq!((b.e_min, b.e_max), (e_min, e_max));
}

// ---------------------------------------------------------------------------
// disorder
// ---------------------------------------------------------------------------

#[test]
fn shaped_disorder_is_flattened_row_major() {
    let lat = Lattice::uniform(&[3, 4], 1.0, Boundary::Open).unwrap();
    let mut v: nd::Array2<f64> = nd::Array2::zeros((3, 4));
    v[[1, 2]] = 2.5;
    let mut h = Hamiltonian::new(lat, 0.0);
    h.script_h(-3.0, 3.0).unwrap();
    h.set_disorder(&v).unwrap();
    assert_eq!(h.disorder()[6], 2.5);
    assert_eq!(h.disorder().sum(), 2.5);
    assert!(h.bounds().is_none());
}

#[test]
fn malformed_disorder_is_rejected() {
    let lat = Lattice::uniform(&[3, 4], 1.0, Boundary::Open).unwrap();
    let mut h = Hamiltonian::new(lat, 0.0);
    let wrong_shape: nd::Array2<f64> = nd::Array2::zeros((4, 3));
    assert!(matches!(h.set_disorder(&wrong_shape), Err(LatticeError::Shape { .. })));
    let wrong_len: nd::Array1<f64> = nd::Array1::zeros(11);
    assert!(matches!(h.set_disorder(&wrong_len), Err(LatticeError::Length(_))));
}

#[test]
fn mean_field_leaves_the_receiver_untouched() {
    let lat = Lattice::uniform(&[5], 1.0, Boundary::Periodic).unwrap();
    let v = disorder(5, 1.0, 6);
    let mut h = Hamiltonian::with_disorder(lat, &v, 2.0).unwrap();
    h.estimate_bounds(false, BoundsPolicy::Warn).unwrap();
    let psi: nd::Array1<C64>
        = (0..5).map(|j| C64::new(0.1 * j as f64, -0.2)).collect();
    let shifted = h.with_mean_field(&psi, 0.5).unwrap();
    assert_eq!(h.disorder(), &v);
    assert!(h.bounds().is_some());
    assert!(shifted.bounds().is_none());
    for j in 0..5 {
        let expected = v[j] + psi[j].norm_sqr();
        assert!((shifted.disorder()[j] - expected).abs() < 1e-15);
    }
}

#[test]
fn plane_wave_energy() {
    let n = 16;
    let g = 0.8;
    let lat = Lattice::uniform(&[n], 1.0, Boundary::Periodic).unwrap();
    let h = Hamiltonian::new(lat.clone(), g);
    let psi = plane_wave(&lat, &[0.0]).unwrap();
    let (energy, nonlinear) = h.energy(&psi).unwrap();
    let expected_nl = 0.5 * g / n as f64;
    assert!((nonlinear - expected_nl).abs() < 1e-14);
    assert!((energy - (-1.0 + expected_nl)).abs() < 1e-14);

    // k = π/2 sits at the band centre
    let psi = plane_wave(&lat, &[0.5 * PI]).unwrap();
    let (energy, _) = h.energy(&psi).unwrap();
    assert!((energy - expected_nl).abs() < 1e-13);
}
