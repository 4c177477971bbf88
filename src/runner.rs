use std::io::{self, Write};

use color_eyre::eyre::{ensure, Result, WrapErr};
use tracing::info;

use crate::{
    integrator::{Integrator, IntegratorSettings, Session},
    particles::{Subset, SubsetKind, SubsetLayout},
    snapshot::{Snapshot, SnapshotSink},
    Particles, UnitConverter,
};

/// Parameters of one simulation run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Mass defining the integrator's unit system, MSun.
    pub reference_mass: f64,
    /// Length defining the integrator's unit system, kpc.
    pub reference_radius: f64,
    /// Softening length in kpc.
    pub softening: f64,
    /// Simulated time between snapshots, Myr.
    pub increment: u64,
    /// End of the simulation, Myr.
    pub t_end: f64,
    /// End of the disk subset.
    pub n_bulge: usize,
    /// End of the bulge subset; everything beyond is halo.
    pub n_halo: usize,
    pub integrator: IntegratorSettings,
    /// Subsets to snapshot, in this order.
    pub subsets: Vec<SubsetKind>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            reference_mass: 1e12,
            reference_radius: 100.,
            softening: 0.1,
            increment: 100,
            t_end: 2000.,
            n_bulge: 10_000,
            n_halo: 20_000,
            integrator: IntegratorSettings::default(),
            subsets: SubsetKind::ALL.to_vec(),
        }
    }
}

impl RunConfig {
    #[must_use]
    pub fn reference(mut self, mass: f64, radius: f64) -> Self {
        self.reference_mass = mass;
        self.reference_radius = radius;
        self
    }

    #[must_use]
    pub fn softening(mut self, softening: f64) -> Self {
        self.softening = softening;
        self
    }

    #[must_use]
    pub fn increment(mut self, increment: u64) -> Self {
        self.increment = increment;
        self
    }

    #[must_use]
    pub fn t_end(mut self, t_end: f64) -> Self {
        self.t_end = t_end;
        self
    }

    #[must_use]
    pub fn boundaries(mut self, n_bulge: usize, n_halo: usize) -> Self {
        self.n_bulge = n_bulge;
        self.n_halo = n_halo;
        self
    }

    #[must_use]
    pub fn integrator(mut self, integrator: IntegratorSettings) -> Self {
        self.integrator = integrator;
        self
    }

    #[must_use]
    pub fn subsets(mut self, subsets: Vec<SubsetKind>) -> Self {
        self.subsets = subsets;
        self
    }

    /// The unit system the integrator runs in.
    pub fn converter(&self) -> Result<UnitConverter> {
        UnitConverter::new(self.reference_mass, self.reference_radius)
            .wrap_err("invalid reference units for the integrator")
    }
}

/// Absolute times visited by the stepping loop: `increment`, `2 * increment`,
/// ... up to and including `t_end`. Produced lazily.
pub fn increment_times(t_end: f64, increment: u64) -> impl Iterator<Item = u64> {
    (1..=u64::MAX)
        .take_while(move |_| increment > 0)
        .map_while(move |counter| counter.checked_mul(increment))
        .take_while(move |&time| time as f64 <= t_end)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    /// Number of loop iterations.
    pub increments: usize,
    /// Model time at the end, Myr.
    pub final_time: f64,
    /// Number of snapshots handed to the sink, including t = 0.
    pub snapshots: usize,
}

/// Owns the integrator for one simulation and drives it in fixed increments.
#[derive(Debug)]
pub struct DynamicsRunner<I: Integrator> {
    config: RunConfig,
    subsets: Vec<Subset>,
    session: Session<I>,
}

impl<I: Integrator> DynamicsRunner<I> {
    /// Validate the configuration and load `ensemble` into `integrator`.
    ///
    /// The integrator is stopped again if anything fails.
    pub fn new(config: RunConfig, ensemble: &Particles, integrator: I) -> Result<Self> {
        let mut session = Session::new(integrator);

        ensure!(config.increment > 0, "snapshot increment must be positive");
        ensure!(
            config.t_end.is_finite(),
            "end time must be finite, got {} Myr",
            config.t_end
        );
        ensure!(
            config.softening.is_finite() && config.softening >= 0.,
            "softening length must not be negative, got {} kpc",
            config.softening
        );
        let layout = SubsetLayout::new(config.n_bulge, config.n_halo, ensemble.len())
            .wrap_err("subset boundaries don't fit the galaxy")?;

        session.set_epsilon_squared(config.softening.powi(2));
        let added = session.add_particles(ensemble)?;
        ensure!(
            added.len() == ensemble.len(),
            "integrator stored {} of {} particles",
            added.len(),
            ensemble.len()
        );
        session.move_to_center();

        // subsets index the particles just added, wherever the integrator put them
        let subsets = config
            .subsets
            .iter()
            .map(|&kind| layout.subset(kind).shifted(added.start))
            .collect();

        Ok(Self {
            config,
            subsets,
            session,
        })
    }

    #[must_use]
    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run to the end time, writing progress lines to stdout.
    pub fn run<S: SnapshotSink + ?Sized>(self, sink: &mut S) -> Result<RunSummary> {
        let stdout = io::stdout();
        self.run_with_progress(sink, &mut stdout.lock())
    }

    pub fn run_with_progress<S, W>(mut self, sink: &mut S, progress: &mut W) -> Result<RunSummary>
    where
        S: SnapshotSink + ?Sized,
        W: Write,
    {
        info!(
            t_end = self.config.t_end,
            increment = self.config.increment,
            subsets = self.subsets.len(),
            "simulation started"
        );

        let mut snapshots = self.snapshot(sink, 0)?;
        let mut increments = 0;

        for time in increment_times(self.config.t_end, self.config.increment) {
            self.session
                .evolve_model(time as f64)
                .wrap_err_with(|| format!("failed to evolve the model to {time} Myr"))?;
            snapshots += self.snapshot(sink, time)?;
            increments += 1;

            writeln!(progress, "Done with t = {time} Myr")
                .and_then(|()| writeln!(progress))
                .wrap_err("failed to write progress")?;
        }

        let final_time = self.session.model_time();
        let Self { session, .. } = self;
        session.stop()?;

        info!(final_time, snapshots, "simulation finished");
        Ok(RunSummary {
            increments,
            final_time,
            snapshots,
        })
    }

    /// Hand every subset at the current model state to `sink`.
    fn snapshot<S: SnapshotSink + ?Sized>(&self, sink: &mut S, time: u64) -> Result<usize> {
        let positions = self.session.positions();

        for subset in &self.subsets {
            sink.write(&Snapshot {
                subset: subset.kind,
                time,
                positions: subset.select(&positions),
            })?;
        }

        Ok(self.subsets.len())
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, ops::Range, rc::Rc};

    use color_eyre::eyre::bail;
    use nalgebra::Vector3;

    use super::*;
    use crate::{
        csv, galaxy::GalaxyStructure, make_galaxy, ComponentCounts, GalacticModel, OutputConfig,
        SnapshotWriter, TreeIntegrator,
    };

    #[derive(Debug, Default)]
    struct Calls {
        epsilon_squared: Option<f64>,
        added: usize,
        centered: bool,
        evolved: Vec<f64>,
        stops: usize,
    }

    /// Records what the runner asks of it; particle i sits at x = i.
    #[derive(Debug)]
    struct RecordingIntegrator {
        calls: Rc<RefCell<Calls>>,
        time: f64,
        fail_at: Option<f64>,
        /// Report one particle less than was added.
        lossy: bool,
    }

    impl RecordingIntegrator {
        fn new() -> (Self, Rc<RefCell<Calls>>) {
            let calls = Rc::new(RefCell::new(Calls::default()));
            let integrator = Self {
                calls: calls.clone(),
                time: 0.,
                fail_at: None,
                lossy: false,
            };
            (integrator, calls)
        }
    }

    impl Integrator for RecordingIntegrator {
        fn set_epsilon_squared(&mut self, epsilon_squared: f64) {
            self.calls.borrow_mut().epsilon_squared = Some(epsilon_squared);
        }

        fn add_particles(&mut self, particles: &Particles) -> Result<Range<usize>> {
            let mut calls = self.calls.borrow_mut();
            let start = calls.added;
            calls.added += particles.len();
            let end = if self.lossy { calls.added - 1 } else { calls.added };
            Ok(start..end)
        }

        fn move_to_center(&mut self) {
            self.calls.borrow_mut().centered = true;
        }

        fn evolve_model(&mut self, time: f64) -> Result<()> {
            if self.fail_at == Some(time) {
                bail!("integrator crashed");
            }
            self.time = time;
            self.calls.borrow_mut().evolved.push(time);
            Ok(())
        }

        fn model_time(&self) -> f64 {
            self.time
        }

        fn positions(&self) -> Vec<Vector3<f64>> {
            (0..self.calls.borrow().added)
                .map(|i| Vector3::new(i as f64, 0., 0.))
                .collect()
        }

        fn particles(&self) -> Particles {
            Particles::default()
        }

        fn stop(&mut self) -> Result<()> {
            self.calls.borrow_mut().stops += 1;
            Ok(())
        }
    }

    /// Keeps label, size and first x coordinate of every snapshot.
    #[derive(Default)]
    struct RecordingSink {
        written: Vec<(String, usize, Option<f64>)>,
    }

    impl SnapshotSink for RecordingSink {
        fn write(&mut self, snapshot: &Snapshot<'_>) -> Result<()> {
            self.written.push((
                snapshot.label(),
                snapshot.positions.len(),
                snapshot.positions.first().map(|p| p.x),
            ));
            Ok(())
        }
    }

    fn ensemble(n: usize) -> Particles {
        (0..n).map(|_| (1., Vector3::zeros(), Vector3::zeros())).collect()
    }

    #[test]
    fn test_increment_times() {
        let times = |t_end, increment| increment_times(t_end, increment).collect::<Vec<_>>();

        assert_eq!(times(200., 100), vec![100, 200]);
        assert_eq!(times(250., 100), vec![100, 200]);
        assert_eq!(times(2000., 100).len(), 20);
        assert!(times(50., 100).is_empty());
        assert!(times(-1., 100).is_empty());
        assert!(times(f64::NAN, 100).is_empty());
        assert!(times(100., 0).is_empty());
        assert!(times(f64::INFINITY, 0).is_empty());

        // far end times are produced one at a time
        let first: Vec<u64> = increment_times(1e15, 100).take(3).collect();
        assert_eq!(first, vec![100, 200, 300]);
        assert_eq!(increment_times(f64::MAX, u64::MAX).count(), 1);

        for t_end in [0., 99., 100., 101., 999., 1000., 1234.5] {
            let times = times(t_end, 100);
            assert_eq!(times.len(), (t_end / 100.).floor() as usize);
            assert!(times.iter().enumerate().all(|(i, &t)| t == 100 * (i as u64 + 1)));
        }
    }

    #[test]
    fn test_scenario_two_increments() {
        let (integrator, calls) = RecordingIntegrator::new();
        let config = RunConfig::default().boundaries(10_000, 20_000).t_end(200.);
        let runner = DynamicsRunner::new(config, &ensemble(40_000), integrator).unwrap();

        let mut sink = RecordingSink::default();
        let mut progress = Vec::new();
        let summary = runner.run_with_progress(&mut sink, &mut progress).unwrap();

        let labels: Vec<&str> = sink.written.iter().map(|(l, _, _)| l.as_str()).collect();
        assert_eq!(
            labels,
            [
                "disk_0myr",
                "bulge_0myr",
                "galaxy_0myr",
                "disk_100myr",
                "bulge_100myr",
                "galaxy_100myr",
                "disk_200myr",
                "bulge_200myr",
                "galaxy_200myr",
            ]
        );
        for (label, len, first_x) in &sink.written {
            let expected = match &label[..label.find('_').unwrap()] {
                "disk" => (10_000, Some(0.)),
                "bulge" => (10_000, Some(10_000.)),
                _ => (20_000, Some(0.)),
            };
            assert_eq!((*len, *first_x), expected, "{label}");
        }

        assert_eq!(
            String::from_utf8(progress).unwrap(),
            "Done with t = 100 Myr\n\nDone with t = 200 Myr\n\n"
        );
        assert_eq!(
            summary,
            RunSummary {
                increments: 2,
                final_time: 200.,
                snapshots: 9
            }
        );

        let calls = calls.borrow();
        assert_eq!(calls.evolved, vec![100., 200.]);
        assert_eq!(calls.added, 40_000);
        assert!(calls.centered);
        assert_eq!(calls.epsilon_squared, Some(0.1f64.powi(2)));
        assert_eq!(calls.stops, 1);
    }

    #[test]
    fn test_scenario_shorter_than_increment() {
        let (integrator, calls) = RecordingIntegrator::new();
        let config = RunConfig::default().boundaries(10_000, 20_000).t_end(50.);
        let runner = DynamicsRunner::new(config, &ensemble(40_000), integrator).unwrap();

        let mut sink = RecordingSink::default();
        let mut progress = Vec::new();
        let summary = runner.run_with_progress(&mut sink, &mut progress).unwrap();

        assert_eq!(summary.increments, 0);
        assert_eq!(sink.written.len(), 3);
        assert!(sink.written.iter().all(|(l, _, _)| l.ends_with("_0myr")));
        assert!(progress.is_empty());
        assert!(calls.borrow().evolved.is_empty());
        assert_eq!(calls.borrow().stops, 1);
    }

    #[test]
    fn test_single_subset() {
        let (integrator, _) = RecordingIntegrator::new();
        let config = RunConfig::default()
            .boundaries(2, 4)
            .t_end(100.)
            .subsets(vec![SubsetKind::Disk]);
        let runner = DynamicsRunner::new(config, &ensemble(6), integrator).unwrap();

        let mut sink = RecordingSink::default();
        runner.run_with_progress(&mut sink, &mut io::sink()).unwrap();

        let labels: Vec<&str> = sink.written.iter().map(|(l, _, _)| l.as_str()).collect();
        assert_eq!(labels, ["disk_0myr", "disk_100myr"]);
    }

    #[test]
    fn test_mismatched_boundaries_fail_fast() {
        let (integrator, calls) = RecordingIntegrator::new();
        let config = RunConfig::default().boundaries(10_000, 20_000);

        let err = DynamicsRunner::new(config, &ensemble(15_000), integrator).unwrap_err();

        assert!(format!("{err:#}").contains("beyond the ensemble"));
        assert_eq!(calls.borrow().added, 0);
        assert_eq!(calls.borrow().stops, 1);
    }

    #[test]
    fn test_subsets_follow_added_particles() {
        let (mut integrator, _) = RecordingIntegrator::new();
        // two particles already live in the integrator at x = 0 and x = 1
        integrator.add_particles(&ensemble(2)).unwrap();

        let config = RunConfig::default().boundaries(1, 2).t_end(0.);
        let runner = DynamicsRunner::new(config, &ensemble(3), integrator).unwrap();
        assert_eq!(runner.subsets()[0].range, 2..3);

        let mut sink = RecordingSink::default();
        runner.run_with_progress(&mut sink, &mut io::sink()).unwrap();

        assert_eq!(
            sink.written,
            vec![
                ("disk_0myr".to_string(), 1, Some(2.)),
                ("bulge_0myr".to_string(), 1, Some(3.)),
                ("galaxy_0myr".to_string(), 2, Some(2.)),
            ]
        );
    }

    #[test]
    fn test_preloaded_tree_integrator() {
        let settings = IntegratorSettings::default().workers(1);
        let converter = RunConfig::default().converter().unwrap();
        let mut integrator = TreeIntegrator::new(converter, settings).unwrap();
        let far: Particles = [-1000., -1001.]
            .into_iter()
            .map(|x| (1e9, Vector3::new(x, 0., 0.), Vector3::zeros()))
            .collect();
        integrator.add_particles(&far).unwrap();

        let galaxy: Particles = [0., 10., 20.]
            .into_iter()
            .map(|x| (1e9, Vector3::new(x, 0., 0.), Vector3::zeros()))
            .collect();
        let config = RunConfig::default().boundaries(1, 2).t_end(0.);
        let runner = DynamicsRunner::new(config, &galaxy, integrator).unwrap();

        let mut sink = RecordingSink::default();
        runner.run_with_progress(&mut sink, &mut io::sink()).unwrap();

        // recentering moves everything by the same amount
        let disk_x = sink.written[0].2.unwrap();
        let bulge_x = sink.written[1].2.unwrap();
        assert!((bulge_x - disk_x - 10.).abs() < 1e-9);
        assert!(disk_x > -1000. + 500.);
    }

    #[test]
    fn test_lost_particles_are_rejected() {
        let (mut integrator, calls) = RecordingIntegrator::new();
        integrator.lossy = true;
        let config = RunConfig::default().boundaries(1, 2);

        let err = DynamicsRunner::new(config, &ensemble(3), integrator).unwrap_err();

        assert!(err.to_string().contains("stored 2 of 3"));
        assert_eq!(calls.borrow().stops, 1);
    }

    #[test]
    fn test_far_end_time_runs_lazily() {
        let (mut integrator, calls) = RecordingIntegrator::new();
        integrator.fail_at = Some(300.);
        let config = RunConfig::default().boundaries(1, 2).t_end(1e15);
        let runner = DynamicsRunner::new(config, &ensemble(3), integrator).unwrap();

        let mut sink = RecordingSink::default();
        assert!(runner.run_with_progress(&mut sink, &mut io::sink()).is_err());

        assert_eq!(calls.borrow().evolved, vec![100., 200.]);
        assert_eq!(sink.written.len(), 9);
    }

    #[test]
    fn test_failure_still_stops_integrator() {
        let (mut integrator, calls) = RecordingIntegrator::new();
        integrator.fail_at = Some(200.);
        let config = RunConfig::default().boundaries(1, 2).t_end(500.);
        let runner = DynamicsRunner::new(config, &ensemble(3), integrator).unwrap();

        let mut sink = RecordingSink::default();
        let mut progress = Vec::new();
        let err = runner.run_with_progress(&mut sink, &mut progress).unwrap_err();

        assert!(format!("{err:#}").contains("200 Myr"));
        assert_eq!(sink.written.len(), 6);
        assert_eq!(String::from_utf8(progress).unwrap(), "Done with t = 100 Myr\n\n");
        assert_eq!(calls.borrow().stops, 1);
    }

    #[test]
    fn test_simulation_writes_files() {
        let dir = std::env::temp_dir().join(format!("galaxy_sim_run_{}", std::process::id()));
        let output = OutputConfig::default()
            .plots_dir(dir.join("plots"))
            .positions_dir(dir.join("positions"))
            .dpi(10.);
        let mut writer = SnapshotWriter::new(output).unwrap();

        let counts = ComponentCounts::new(40, 20, 20);
        let mut generator = GalacticModel::seeded(GalaxyStructure::default(), 11);
        let galaxy = make_galaxy(1e12, 10., counts, &mut generator).unwrap();

        let settings = IntegratorSettings::default().workers(2).timestep(10.);
        let config = RunConfig::default()
            .boundaries(20, 40)
            .t_end(200.)
            .integrator(settings);
        let integrator = TreeIntegrator::new(config.converter().unwrap(), settings).unwrap();
        let runner = DynamicsRunner::new(config, &galaxy.particles, integrator).unwrap();
        let summary = runner.run_with_progress(&mut writer, &mut io::sink()).unwrap();

        assert_eq!(summary.snapshots, 9);
        assert!((summary.final_time - 200.).abs() < 1e-9);
        let count = |sub: &str| std::fs::read_dir(dir.join(sub)).unwrap().count();
        assert_eq!(count("plots"), 9);
        assert_eq!(count("positions"), 9);

        let bulge = csv::read_positions(dir.join("positions/bulge_200myr.csv")).unwrap();
        assert_eq!(bulge.len(), 20);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
