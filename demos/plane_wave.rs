use ndarray as nd;
use rand::{ Rng, SeedableRng, rngs::StdRng };
use tracing_subscriber::EnvFilter;
use anderson::{
    Config,
    Evolution,
    utils::wf_norm,
    wavefunction::gaussian,
};

// spread a Gaussian packet over a disordered chain and print its norm, energy,
// and width at every checkpoint
//
// an alternative TOML configuration may be given as the first argument; set
// RUST_LOG=debug to see coefficient recomputations

const DEFAULT: &str = r#"
[lattice]
size = [256]
spacing = [1.0]
boundary = ["periodic"]

[nonlinearity]
g = 0.0

[propagation]
t_max = 20.0
delta_t = 0.1
accuracy = 1e-8
checkpoint_every = 2.0
"#;

const DISORDER: f64 = 1.0; // width of the uniform on-site distribution
const SEED: u64 = 10546;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config
        = match std::env::args().nth(1) {
            Some(path) => Config::load(path)?,
            None => Config::from_toml_str(DEFAULT)?,
        };
    let lattice = config.lattice()?;
    let dv = lattice.cell_volume();
    let x2: nd::Array1<f64>
        = (0..lattice.volume())
        .map(|j| {
            lattice.coords(j).into_iter().enumerate()
                .map(|(a, c)| lattice.positions(a)[c].powi(2))
                .sum()
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(SEED);
    let disorder: nd::Array1<f64>
        = (0..lattice.volume())
        .map(|_| DISORDER * (rng.gen::<f64>() - 0.5))
        .collect();
    let mut h = config.hamiltonian()?;
    h.set_disorder(&disorder)?;

    let k0 = vec![1.0; lattice.dimension()];
    let sigma0 = vec![4.0; lattice.dimension()];
    let psi0 = gaussian(&lattice, &k0, &sigma0)?;
    let mut evol = Evolution::new(h, &psi0, config.propagation()?)?;
    println!("engine: {}", evol.engine().describe());

    let mut rows: Vec<(f64, nd::Array1<num_complex::Complex64>)> = Vec::new();
    evol.run(|t, psi| rows.push((t, psi)))?;
    println!("{:>8} {:>14} {:>14} {:>14}", "t", "norm", "energy", "<x^2>");
    for (t, psi) in rows.iter() {
        let norm = wf_norm(psi, dv);
        let (energy, _) = evol.hamiltonian().energy(psi)?;
        let width: f64
            = psi.iter().zip(&x2)
            .map(|(p, x)| p.norm_sqr() * x)
            .sum::<f64>() * dv / norm;
        println!("{:8.3} {:14.10} {:14.8} {:14.6}", t, norm, energy, width);
    }
    let diag = evol.diagnostics();
    println!(
        "steps: {}, max order: {}, recomputations: {}, max nonlinear phase: {:.3e}",
        diag.steps, diag.max_order, diag.recomputations, diag.max_nonlinear_phase,
    );
    Ok(())
}
