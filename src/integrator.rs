use std::ops::{Deref, DerefMut, Range};

use color_eyre::eyre::{ensure, eyre, Result};
use nalgebra::Vector3;
use tracing::{debug, info, warn};

use crate::{
    force::{ForceSolver, SolverKind},
    Execution, Particles, UnitConverter,
};

/// A gravitational N-body integrator.
///
/// All quantities cross this interface in physical units (MSun, kpc, Myr).
pub trait Integrator {
    /// Set the squared softening length in kpc^2.
    fn set_epsilon_squared(&mut self, epsilon_squared: f64);

    /// Add particles, returning the indices they occupy.
    fn add_particles(&mut self, particles: &Particles) -> Result<Range<usize>>;

    /// Put the center of mass at rest in the origin.
    fn move_to_center(&mut self);

    /// Advance the model in place to the absolute time `time` in Myr.
    fn evolve_model(&mut self, time: f64) -> Result<()>;

    /// Current model time in Myr.
    fn model_time(&self) -> f64;

    /// Current positions in kpc, in the order the particles were added.
    fn positions(&self) -> Vec<Vector3<f64>>;

    /// A physical copy of all particles.
    fn particles(&self) -> Particles;

    /// Release the workers. The integrator can't evolve afterwards.
    fn stop(&mut self) -> Result<()>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntegratorSettings {
    pub workers: usize,
    /// Leapfrog step in Myr.
    pub timestep: f64,
    /// Barnes-Hut opening angle.
    pub theta: f64,
    pub solver: SolverKind,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            workers: 8,
            timestep: 1.,
            theta: 0.7,
            solver: SolverKind::BarnesHut,
        }
    }
}

impl IntegratorSettings {
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub fn timestep(mut self, timestep: f64) -> Self {
        self.timestep = timestep;
        self
    }

    #[must_use]
    pub fn theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    #[must_use]
    pub fn solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        self
    }
}

/// Kick-drift-kick leapfrog integrator with a fixed step.
///
/// Particles are stored in N-body units of `converter`.
#[derive(Debug)]
pub struct TreeIntegrator {
    converter: UnitConverter,
    particles: Particles,
    accelerations: Vec<Vector3<f64>>,
    /// True when `accelerations` belong to the current positions.
    accelerations_valid: bool,
    solver: Box<dyn ForceSolver>,
    execution: Option<Execution>,
    epsilon_squared: f64,
    timestep: f64,
    time: f64,
}

impl TreeIntegrator {
    pub fn new(converter: UnitConverter, settings: IntegratorSettings) -> Result<Self> {
        ensure!(
            settings.timestep.is_finite() && settings.timestep > 0.,
            "integrator time step must be positive, got {} Myr",
            settings.timestep
        );
        ensure!(
            settings.theta >= 0.,
            "opening angle must not be negative, got {}",
            settings.theta
        );

        let execution = Execution::with_workers(settings.workers)?;
        info!(
            workers = execution.workers(),
            solver = ?settings.solver,
            time_unit_myr = converter.time_unit(),
            "integrator started"
        );

        Ok(Self {
            converter,
            particles: Particles::default(),
            accelerations: Vec::new(),
            accelerations_valid: false,
            solver: settings.solver.build(settings.theta),
            execution: Some(execution),
            epsilon_squared: 0.,
            timestep: converter.time_to_nbody(settings.timestep),
            time: 0.,
        })
    }

    #[must_use]
    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.execution.is_none()
    }

    fn execution(&self) -> Result<&Execution> {
        self.execution
            .as_ref()
            .ok_or_else(|| eyre!("integrator has been stopped"))
    }

    fn update_accelerations(&mut self) -> Result<()> {
        let execution = self
            .execution
            .as_ref()
            .ok_or_else(|| eyre!("integrator has been stopped"))?;
        self.accelerations.resize(self.particles.len(), Vector3::zeros());
        self.solver.calculate_accelerations(
            &self.particles,
            &mut self.accelerations,
            self.epsilon_squared,
            execution,
        );
        self.accelerations_valid = true;
        Ok(())
    }

    /*
     * Leapfrog integration:
     * v_(i + 1/2) = v_i + a_i dt / 2
     * x_(i + 1) = x_i + v_(i + 1/2) dt
     * v_(i + 1) = v_(i + 1/2) + a_(i + 1) dt / 2
     */
    fn step(&mut self, dt: f64) -> Result<()> {
        if !self.accelerations_valid {
            self.update_accelerations()?;
        }

        for (vel, acc) in self.particles.velocities.iter_mut().zip(&self.accelerations) {
            *vel += acc * (dt / 2.);
        }
        for (pos, vel) in self.particles.positions.iter_mut().zip(&self.particles.velocities) {
            *pos += vel * dt;
        }

        self.update_accelerations()?;

        for (vel, acc) in self.particles.velocities.iter_mut().zip(&self.accelerations) {
            *vel += acc * (dt / 2.);
        }

        self.time += dt;
        Ok(())
    }
}

impl Integrator for TreeIntegrator {
    fn set_epsilon_squared(&mut self, epsilon_squared: f64) {
        let epsilon = self.converter.length_to_nbody(epsilon_squared.sqrt());
        self.epsilon_squared = epsilon * epsilon;
        self.accelerations_valid = false;
    }

    fn add_particles(&mut self, particles: &Particles) -> Result<Range<usize>> {
        self.execution()?;
        let range = self.particles.append(&self.converter.to_nbody(particles));
        self.accelerations_valid = false;
        debug!(added = range.len(), total = self.particles.len(), "particles added");
        Ok(range)
    }

    fn move_to_center(&mut self) {
        self.particles.move_to_center();
        self.accelerations_valid = false;
    }

    fn evolve_model(&mut self, time: f64) -> Result<()> {
        self.execution()?;
        let target = self.converter.time_to_nbody(time);
        ensure!(
            target >= self.time - self.timestep * 1e-9,
            "cannot evolve back in time from {} Myr to {time} Myr",
            self.model_time()
        );

        let mut steps = 0usize;
        while target - self.time > self.timestep * 1e-9 {
            let dt = self.timestep.min(target - self.time);
            self.step(dt)?;
            steps += 1;
        }
        self.time = self.time.max(target);

        debug!(time, steps, "model evolved");
        Ok(())
    }

    fn model_time(&self) -> f64 {
        self.converter.time_to_physical(self.time)
    }

    fn positions(&self) -> Vec<Vector3<f64>> {
        self.particles
            .positions
            .iter()
            .map(|pos| self.converter.position_to_physical(pos))
            .collect()
    }

    fn particles(&self) -> Particles {
        self.converter.to_physical(&self.particles)
    }

    fn stop(&mut self) -> Result<()> {
        if self.execution.take().is_some() {
            info!(time = self.model_time(), "integrator stopped");
        }
        Ok(())
    }
}

/// Owns an integrator and stops it on every exit path.
///
/// Call [`Session::stop`] to observe the result of stopping; a session that
/// is merely dropped stops the integrator and logs failures.
#[derive(Debug)]
pub struct Session<I: Integrator> {
    integrator: I,
    stopped: bool,
}

impl<I: Integrator> Session<I> {
    pub fn new(integrator: I) -> Self {
        Self {
            integrator,
            stopped: false,
        }
    }

    pub fn stop(mut self) -> Result<()> {
        self.stopped = true;
        self.integrator.stop()
    }
}

impl<I: Integrator> Deref for Session<I> {
    type Target = I;

    fn deref(&self) -> &Self::Target {
        &self.integrator
    }
}

impl<I: Integrator> DerefMut for Session<I> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.integrator
    }
}

impl<I: Integrator> Drop for Session<I> {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(err) = self.integrator.stop() {
                warn!("failed to stop integrator: {err:#}");
            }
        }
    }
}
