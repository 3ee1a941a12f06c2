//! Tests for Chebyshev time propagation.

use std::f64::consts::PI;
use std::path::PathBuf;
use ndarray as nd;
use num_complex::Complex64 as C64;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use anderson::{
    Boundary,
    Evolution,
    Hamiltonian,
    Lattice,
    Layout,
    Propagation,
    StencilChoice,
    error::PropError,
    utils::{ wf_dot, wf_norm, wf_normalized },
    wavefunction::{ gaussian, plane_wave },
};

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn lattice(size: &[usize], bc: Boundary) -> Lattice {
    Lattice::uniform(size, 1.0, bc).unwrap()
}

fn disorder(n: usize, width: f64, seed: u64) -> nd::Array1<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| width * (rng.gen::<f64>() - 0.5)).collect()
}

fn random_state(lat: &Lattice, seed: u64) -> nd::Array1<C64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let psi: nd::Array1<C64>
        = (0..lat.volume())
        .map(|_| C64::new(rng.gen::<f64>() - 0.5, rng.gen::<f64>() - 0.5))
        .collect();
    wf_normalized(&psi, lat.cell_volume())
}

fn params(t_max: f64, delta_t: f64, layout: Layout, stencil: StencilChoice)
    -> Propagation
{
    let mut p = Propagation::new(t_max, delta_t);
    p.accuracy = 1e-10;
    p.layout = layout;
    p.stencil = stencil;
    p.want_native = false;
    p
}

fn hamiltonian(lat: &Lattice, width: f64, g: f64, seed: u64) -> Hamiltonian {
    Hamiltonian::with_disorder(lat.clone(), &disorder(lat.volume(), width, seed), g)
        .unwrap()
}

fn final_state(h: Hamiltonian, psi0: &nd::Array1<C64>, p: Propagation)
    -> nd::Array1<C64>
{
    let mut evol = Evolution::new(h, psi0, p).unwrap();
    evol.run(|_, _| { }).unwrap();
    evol.wavefunction()
}

fn max_diff(a: &nd::Array1<C64>, b: &nd::Array1<C64>) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).norm()).fold(0.0, f64::max)
}

fn geometries() -> Vec<Vec<usize>> {
    vec![vec![48], vec![2, 5], vec![7, 6], vec![1, 4, 3], vec![4, 5, 3]]
}

// ---------------------------------------------------------------------------
// conservation
// ---------------------------------------------------------------------------

#[test]
fn norm_is_conserved_for_every_dimension_and_boundary() {
    for size in [vec![64], vec![8, 6], vec![4, 5, 3], vec![3, 3, 2, 2]] {
        for bc in [Boundary::Periodic, Boundary::Open] {
            let lat = lattice(&size, bc);
            let h = hamiltonian(&lat, 2.0, 0.0, 7);
            let psi0 = random_state(&lat, 11);
            let mut p = params(2.0, 0.1, Layout::Complex, StencilChoice::Auto);
            p.checkpoint_every = Some(0.5);
            let mut evol = Evolution::new(h, &psi0, p).unwrap();
            let mut norms: Vec<f64> = Vec::new();
            evol.run(|_, psi| norms.push(wf_norm(&psi, lat.cell_volume()))).unwrap();
            assert_eq!(norms.len(), 5);
            for n in norms {
                assert!((n - 1.0).abs() < 1e-8, "{size:?} {bc:?}: norm {n}");
            }
        }
    }
}

#[test]
fn norm_is_conserved_with_accurate_bounds() {
    let lat = lattice(&[40], Boundary::Open);
    let h = hamiltonian(&lat, 6.0, 0.0, 3);
    let psi0 = random_state(&lat, 5);
    let mut p = params(3.0, 0.25, Layout::Real, StencilChoice::Auto);
    p.accurate_bounds = true;
    let psi = final_state(h, &psi0, p);
    assert!((wf_norm(&psi, 1.0) - 1.0).abs() < 1e-8);
}

// ---------------------------------------------------------------------------
// equivalences
// ---------------------------------------------------------------------------

#[test]
fn layouts_agree() {
    for size in geometries() {
        for bc in [Boundary::Periodic, Boundary::Open] {
            let lat = lattice(&size, bc);
            let psi0 = random_state(&lat, 21);
            let complex = final_state(
                hamiltonian(&lat, 1.5, 0.3, 1), &psi0,
                params(1.0, 0.2, Layout::Complex, StencilChoice::Auto),
            );
            let real = final_state(
                hamiltonian(&lat, 1.5, 0.3, 1), &psi0,
                params(1.0, 0.2, Layout::Real, StencilChoice::Auto),
            );
            assert!(max_diff(&complex, &real) < 1e-11, "{size:?} {bc:?}");
        }
    }
}

#[test]
fn specialized_and_generic_stencils_agree() {
    for size in geometries() {
        for bc in [Boundary::Periodic, Boundary::Open] {
            for layout in [Layout::Complex, Layout::Real] {
                let lat = lattice(&size, bc);
                let psi0 = random_state(&lat, 4);
                let auto = final_state(
                    hamiltonian(&lat, 3.0, 0.0, 9), &psi0,
                    params(0.6, 0.1, layout, StencilChoice::Auto),
                );
                let generic = final_state(
                    hamiltonian(&lat, 3.0, 0.0, 9), &psi0,
                    params(0.6, 0.1, layout, StencilChoice::Generic),
                );
                assert!(
                    max_diff(&auto, &generic) < 1e-12,
                    "{size:?} {bc:?} {layout:?}",
                );
            }
        }
    }
}

#[test]
fn mixed_boundaries_agree_across_stencils() {
    let lat = Lattice::new(
        vec![5, 4, 6],
        vec![1.0, 0.7, 1.3],
        vec![Boundary::Open, Boundary::Periodic, Boundary::Open],
    ).unwrap();
    let psi0 = random_state(&lat, 33);
    let auto = final_state(
        hamiltonian(&lat, 1.0, 0.0, 2), &psi0,
        params(0.5, 0.05, Layout::Real, StencilChoice::Auto),
    );
    let generic = final_state(
        hamiltonian(&lat, 1.0, 0.0, 2), &psi0,
        params(0.5, 0.05, Layout::Complex, StencilChoice::Generic),
    );
    assert!(max_diff(&auto, &generic) < 1e-11);
}

// ---------------------------------------------------------------------------
// exactness
// ---------------------------------------------------------------------------

// ψ(t) in the closed-form eigenbasis of the open chain with unit spacing:
// E_k = −cos(πk/(N+1)), v_k(j) = √(2/(N+1)) sin(πk(j+1)/(N+1))
fn exact_open_chain(psi0: &nd::Array1<C64>, t: f64) -> nd::Array1<C64> {
    let n = psi0.len();
    let m = (n + 1) as f64;
    let v = |k: usize, j: usize| {
        (2.0 / m).sqrt() * (PI * k as f64 * (j + 1) as f64 / m).sin()
    };
    let mut psi: nd::Array1<C64> = nd::Array1::zeros(n);
    for k in 1..=n {
        let ek = -(PI * k as f64 / m).cos();
        let amp: C64
            = psi0.iter().enumerate()
            .map(|(j, p)| v(k, j) * *p)
            .sum();
        let rot = amp * C64::cis(-ek * t);
        psi.iter_mut().enumerate().for_each(|(j, pj)| { *pj += rot * v(k, j); });
    }
    psi
}

#[test]
fn single_step_matches_exact_evolution() {
    let lat = lattice(&[8], Boundary::Open);
    let psi0 = random_state(&lat, 17);
    for dt in [0.1, 0.5, 2.0] {
        let mut evol = Evolution::new(
            Hamiltonian::new(lat.clone(), 0.0),
            &psi0,
            params(dt, dt, Layout::Complex, StencilChoice::Auto),
        ).unwrap();
        evol.step(dt).unwrap();
        let exact = exact_open_chain(&psi0, dt);
        assert!(max_diff(&evol.wavefunction(), &exact) < 1e-9, "dt = {dt}");
    }
}

#[test]
fn many_steps_match_exact_evolution() {
    let lat = lattice(&[8], Boundary::Open);
    let psi0 = random_state(&lat, 18);
    for layout in [Layout::Complex, Layout::Real] {
        let psi = final_state(
            Hamiltonian::new(lat.clone(), 0.0),
            &psi0,
            params(5.0, 0.3, layout, StencilChoice::Auto),
        );
        assert!(max_diff(&psi, &exact_open_chain(&psi0, 5.0)) < 1e-8);
    }
}

#[test]
fn plane_wave_stays_an_eigenstate() {
    let lat = lattice(&[256], Boundary::Periodic);
    let psi0 = plane_wave(&lat, &[0.0]).unwrap();
    let mut p = params(10.0, 0.1, Layout::Complex, StencilChoice::Auto);
    p.accuracy = 1e-8;
    p.checkpoint_every = Some(1.0);
    let mut evol = Evolution::new(Hamiltonian::new(lat.clone(), 0.0), &psi0, p).unwrap();
    let mut snapshots: Vec<(f64, nd::Array1<C64>)> = Vec::new();
    evol.run(|t, psi| snapshots.push((t, psi))).unwrap();
    assert_eq!(snapshots.len(), 11);
    for (t, psi) in snapshots {
        // E = −2t cos(0) = −1; truncation errors add up coherently over the
        // 100 steps
        let overlap = wf_dot(&psi0, &psi, 1.0);
        assert!((overlap - C64::cis(t)).norm() < 2e-6, "t = {t}");
        let density = psi.mapv(|pj| pj.norm_sqr());
        let mean = density.mean().unwrap();
        let spread = density.iter().map(|d| (d - mean).abs()).fold(0.0, f64::max);
        assert!(spread < 1e-15);
    }
    assert_eq!(evol.time(), 10.0);
}

#[test]
fn interior_is_insensitive_to_boundaries() {
    let n = 201;
    let psi0 = gaussian(&lattice(&[n], Boundary::Open), &[0.5], &[5.0]).unwrap();
    let run = |bc| {
        let lat = lattice(&[n], bc);
        final_state(
            Hamiltonian::new(lat, 0.0),
            &psi0,
            params(5.0, 0.25, Layout::Complex, StencilChoice::Auto),
        )
    };
    let periodic = run(Boundary::Periodic);
    let open = run(Boundary::Open);
    let mid = n / 2;
    assert!((periodic[mid].norm_sqr() - open[mid].norm_sqr()).abs() < 1e-12);
    assert!(max_diff(&periodic, &open) < 1e-10);
}

// ---------------------------------------------------------------------------
// nonlinear term
// ---------------------------------------------------------------------------

#[test]
fn nonlinear_step_reports_phase_and_conserves_norm() {
    let lat = lattice(&[6, 6], Boundary::Periodic);
    let g = 4.0;
    let dt = 0.05;
    let psi0 = random_state(&lat, 8);
    let mut evol = Evolution::new(
        hamiltonian(&lat, 1.0, g, 12),
        &psi0,
        params(1.0, dt, Layout::Real, StencilChoice::Auto),
    ).unwrap();
    let phase = evol.step(dt).unwrap();
    let psi = evol.wavefunction();
    let expected
        = psi.iter()
        .map(|p| dt * g * p.norm_sqr())
        .fold(0.0, f64::max);
    assert!((phase - expected).abs() < 1e-12);
    assert!(phase > 0.0);
    evol.run(|_, _| { }).unwrap();
    assert!((wf_norm(&evol.wavefunction(), 1.0) - 1.0).abs() < 1e-8);
    assert!(evol.diagnostics().max_nonlinear_phase >= phase);
}

#[test]
fn uniform_state_picks_up_the_nonlinear_phase() {
    let n = 32;
    let g = 8.0;
    let lat = lattice(&[n], Boundary::Periodic);
    let psi0 = plane_wave(&lat, &[0.0]).unwrap();
    let psi = final_state(
        Hamiltonian::new(lat, g),
        &psi0,
        params(2.0, 0.1, Layout::Complex, StencilChoice::Auto),
    );
    // E = −1 + g |ψ|² for the uniform state
    let energy = -1.0 + g / n as f64;
    let overlap = wf_dot(&psi0, &psi, 1.0);
    assert!((overlap - C64::cis(-energy * 2.0)).norm() < 1e-8);
}

// ---------------------------------------------------------------------------
// driver
// ---------------------------------------------------------------------------

#[test]
fn missing_native_backend_falls_back() {
    let lat = lattice(&[16], Boundary::Periodic);
    let mut p = params(0.5, 0.1, Layout::Complex, StencilChoice::Auto);
    p.want_native = true;
    p.native_library = Some(PathBuf::from("/nonexistent/libchebyshev_backend.so"));
    let psi0 = random_state(&lat, 1);
    let mut evol = Evolution::new(Hamiltonian::new(lat.clone(), 0.0), &psi0, p).unwrap();
    if std::env::var_os(anderson::native::LIBRARY_ENV).is_none() {
        assert!(!evol.engine().is_native());
        assert_eq!(evol.engine().describe(), "in-process (sweep_1d)");
    }
    evol.run(|_, _| { }).unwrap();
    assert!((wf_norm(&evol.wavefunction(), 1.0) - 1.0).abs() < 1e-8);
}

#[test]
fn changing_the_step_recomputes_the_expansion() {
    let lat = lattice(&[16], Boundary::Open);
    let psi0 = random_state(&lat, 2);
    let mut evol = Evolution::new(
        Hamiltonian::new(lat.clone(), 0.0),
        &psi0,
        params(1.0, 0.1, Layout::Complex, StencilChoice::Auto),
    ).unwrap();
    evol.step(0.1).unwrap();
    evol.step(0.1).unwrap();
    assert_eq!(evol.diagnostics().recomputations, 1);
    evol.step(0.4).unwrap();
    assert_eq!(evol.diagnostics().recomputations, 2);
    assert_eq!(evol.diagnostics().steps, 3);
    let order_long = evol.diagnostics().max_order;
    assert!(order_long >= 2);
    assert!((evol.time() - 0.6).abs() < 1e-15);

    evol.reset_diagnostics();
    evol.set_disorder(&disorder(16, 1.0, 4)).unwrap();
    evol.step(0.4).unwrap();
    assert_eq!(evol.diagnostics().recomputations, 1);
}

#[test]
fn run_snaps_to_the_final_time() {
    let lat = lattice(&[16], Boundary::Periodic);
    let psi0 = random_state(&lat, 3);
    let mut evol = Evolution::new(
        Hamiltonian::new(lat, 0.0),
        &psi0,
        params(1.05, 0.1, Layout::Complex, StencilChoice::Auto),
    ).unwrap();
    let mut times: Vec<f64> = Vec::new();
    evol.run(|t, _| times.push(t)).unwrap();
    assert_eq!(times, vec![1.05]);
    assert_eq!(evol.time(), 1.05);
    assert_eq!(evol.diagnostics().steps, 11);
    assert_eq!(evol.diagnostics().recomputations, 2);
}

#[test]
fn bad_inputs_are_rejected() {
    let lat = lattice(&[8], Boundary::Open);
    let psi0 = random_state(&lat, 3);
    let short: nd::Array1<C64> = nd::Array1::zeros(7);
    assert!(matches!(
        Evolution::new(
            Hamiltonian::new(lat.clone(), 0.0),
            &short,
            params(1.0, 0.1, Layout::Complex, StencilChoice::Auto),
        ),
        Err(PropError::Length(_))
    ));
    let mut evol = Evolution::new(
        Hamiltonian::new(lat, 0.0),
        &psi0,
        params(1.0, 0.1, Layout::Complex, StencilChoice::Auto),
    ).unwrap();
    assert!(matches!(evol.step(0.0), Err(PropError::BadTime(_))));
    assert!(matches!(evol.set_wavefunction(&short), Err(PropError::Length(_))));
    assert!(matches!(
        evol.set_disorder(&nd::Array1::<f64>::zeros(9)),
        Err(PropError::Lattice(_))
    ));
}
