use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use galaxy_sim::{
    force::SolverKind, galaxy::GalaxyStructure, make_galaxy, ComponentCounts, DynamicsRunner,
    GalacticModel, IntegratorSettings, OutputConfig, RunConfig, SnapshotWriter, SubsetKind,
    TreeIntegrator, UnitConverter,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Build a galaxy and follow its evolution, plotting snapshots every 100 Myr.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Galaxy mass in MSun
    #[arg(short = 'M', default_value_t = 1e12)]
    mass: f64,

    /// Galaxy radius in kpc
    #[arg(short = 'R', default_value_t = 10.)]
    radius: f64,

    #[arg(long = "n_bulge", default_value_t = 10_000)]
    n_bulge: usize,

    #[arg(long = "n_disk", default_value_t = 10_000)]
    n_disk: usize,

    #[arg(long = "n_halo", default_value_t = 20_000)]
    n_halo: usize,

    /// End time in Myr
    #[arg(long = "t_end", default_value_t = 2000.)]
    t_end: f64,

    /// Mass unit of the integrator in MSun
    #[arg(long, default_value_t = 1e12)]
    reference_mass: f64,

    /// Length unit of the integrator in kpc
    #[arg(long, default_value_t = 100.)]
    reference_radius: f64,

    #[arg(long, default_value_t = 8)]
    workers: usize,

    /// Leapfrog step in Myr
    #[arg(long, default_value_t = 1.)]
    timestep: f64,

    /// Barnes-Hut opening angle
    #[arg(long, default_value_t = 0.7)]
    theta: f64,

    #[arg(long, value_enum, default_value_t)]
    solver: SolverKind,

    /// Softening length in kpc
    #[arg(long, default_value_t = 0.1)]
    softening: f64,

    /// Seed of the galaxy model, random if not given
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long, default_value = "plots")]
    plots_dir: PathBuf,

    #[arg(long, default_value = "positions")]
    positions_dir: PathBuf,

    /// Only write plots
    #[arg(long)]
    no_positions: bool,

    /// Subsets to snapshot, all of them if not given
    #[arg(long = "subset", value_enum)]
    subsets: Vec<SubsetKind>,
}

impl Args {
    fn integrator_settings(&self) -> IntegratorSettings {
        IntegratorSettings::default()
            .workers(self.workers)
            .timestep(self.timestep)
            .theta(self.theta)
            .solver(self.solver)
    }

    fn run_config(&self) -> RunConfig {
        let subsets = if self.subsets.is_empty() {
            SubsetKind::ALL.to_vec()
        } else {
            self.subsets.clone()
        };

        RunConfig::default()
            .reference(self.reference_mass, self.reference_radius)
            .softening(self.softening)
            .t_end(self.t_end)
            .boundaries(self.n_bulge, self.n_halo)
            .integrator(self.integrator_settings())
            .subsets(subsets)
    }

    fn output_config(&self) -> OutputConfig {
        let output = OutputConfig::default()
            .plots_dir(&self.plots_dir)
            .positions_dir(&self.positions_dir);
        if self.no_positions {
            output.without_positions()
        } else {
            output
        }
    }
}

/// Warn when the integrator runs in other units than the galaxy was built
/// in. Returns whether they differ.
fn check_units(galaxy: &UnitConverter, integrator: &UnitConverter) -> bool {
    let differ = galaxy != integrator;
    if differ {
        warn!(
            galaxy_mass = galaxy.mass_unit(),
            galaxy_radius = galaxy.length_unit(),
            integrator_mass = integrator.mass_unit(),
            integrator_radius = integrator.length_unit(),
            "integrator runs in different units than the galaxy was built in"
        );
    }
    differ
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let structure = GalaxyStructure::default();
    let mut generator = match args.seed {
        Some(seed) => GalacticModel::seeded(structure, seed),
        None => GalacticModel::new(structure),
    };
    let counts = ComponentCounts::new(args.n_halo, args.n_bulge, args.n_disk);
    let galaxy = make_galaxy(args.mass, args.radius, counts, &mut generator)?;

    let config = args.run_config();
    let converter = config.converter()?;
    check_units(&galaxy.converter, &converter);

    let mut writer = SnapshotWriter::new(args.output_config())?;

    let integrator = TreeIntegrator::new(converter, config.integrator)?;
    let runner = DynamicsRunner::new(config, &galaxy.particles, integrator)?;
    let summary = runner.run(&mut writer)?;

    info!(
        increments = summary.increments,
        snapshots = summary.snapshots,
        "all snapshots written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("simulate_galaxy").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);

        assert_eq!(args.mass, 1e12);
        assert_eq!(args.radius, 10.);
        assert_eq!(args.n_bulge, 10_000);
        assert_eq!(args.n_disk, 10_000);
        assert_eq!(args.n_halo, 20_000);
        assert_eq!(args.t_end, 2000.);
        assert_eq!(args.reference_mass, 1e12);
        assert_eq!(args.reference_radius, 100.);
        assert_eq!(args.workers, 8);
        assert_eq!(args.timestep, 1.);
        assert_eq!(args.theta, 0.7);
        assert_eq!(args.solver, SolverKind::BarnesHut);
        assert_eq!(args.softening, 0.1);
        assert_eq!(args.seed, None);
        assert!(!args.no_positions);

        let config = args.run_config();
        assert_eq!(config.subsets, SubsetKind::ALL.to_vec());
        assert_eq!(config.n_bulge, 10_000);
        assert_eq!(config.n_halo, 20_000);
        assert_eq!(config.increment, 100);
        assert_eq!(args.output_config(), OutputConfig::default());
    }

    #[test]
    fn test_flag_spelling() {
        let args = parse(&[
            "-M", "5e11", "-R", "8", "--n_bulge", "100", "--n_disk", "200", "--n_halo", "300",
            "--t_end", "400",
        ]);

        assert_eq!(args.mass, 5e11);
        assert_eq!(args.radius, 8.);
        assert_eq!(args.n_bulge, 100);
        assert_eq!(args.n_disk, 200);
        assert_eq!(args.n_halo, 300);
        assert_eq!(args.t_end, 400.);

        assert!(Args::try_parse_from(["simulate_galaxy", "--n-bulge", "100"]).is_err());
        assert!(Args::try_parse_from(["simulate_galaxy", "--t-end", "100"]).is_err());
    }

    #[test]
    fn test_repeated_subsets() {
        let args = parse(&["--subset", "bulge", "--subset", "disk"]);
        assert_eq!(
            args.run_config().subsets,
            vec![SubsetKind::Bulge, SubsetKind::Disk]
        );

        assert!(Args::try_parse_from(["simulate_galaxy", "--subset", "halo"]).is_err());
    }

    #[test]
    fn test_run_and_output_config() {
        let args = parse(&[
            "--reference-mass",
            "2e12",
            "--reference-radius",
            "50",
            "--workers",
            "2",
            "--solver",
            "direct-summation",
            "--no-positions",
            "--plots-dir",
            "out/plots",
        ]);

        let config = args.run_config();
        assert_eq!((config.reference_mass, config.reference_radius), (2e12, 50.));
        assert_eq!(config.integrator.workers, 2);
        assert_eq!(config.integrator.solver, SolverKind::DirectSummation);

        let output = args.output_config();
        assert_eq!(output.plots_dir, PathBuf::from("out/plots"));
        assert_eq!(output.positions_dir, None);
    }

    #[test]
    fn test_unit_mismatch() {
        let args = parse(&[]);
        let runner_units = args.run_config().converter().unwrap();
        let galaxy_units = UnitConverter::new(args.mass, args.radius).unwrap();

        // the default galaxy is 10 kpc, the integrator runs in 100 kpc units
        assert!(check_units(&galaxy_units, &runner_units));
        assert!(!check_units(&runner_units, &runner_units));
    }
}
