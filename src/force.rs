use std::fmt::Debug;

use nalgebra::Vector3;

use crate::{gravity, octree::Octree, Execution, Particles};

/// Calculates the gravitational acceleration of every particle.
pub trait ForceSolver: Debug + Send + Sync {
    /// Overwrite `accelerations[i]` with the acceleration of particle `i`.
    fn calculate_accelerations(
        &self,
        particles: &Particles,
        accelerations: &mut [Vector3<f64>],
        epsilon_squared: f64,
        execution: &Execution,
    );
}

/// Tree code, rebuilding the octree for every evaluation.
#[derive(Clone, Copy, Debug)]
pub struct BarnesHut {
    theta: f64,
}

impl BarnesHut {
    #[must_use]
    pub fn new(theta: f64) -> Self {
        Self { theta }
    }
}

impl ForceSolver for BarnesHut {
    fn calculate_accelerations(
        &self,
        particles: &Particles,
        accelerations: &mut [Vector3<f64>],
        epsilon_squared: f64,
        execution: &Execution,
    ) {
        let octree = Octree::new(particles, self.theta);
        execution.fill(accelerations, |i| {
            octree.calculate_acceleration(particles, i, epsilon_squared)
        });
    }
}

/// Exact pairwise summation, O(N^2).
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectSummation;

impl ForceSolver for DirectSummation {
    fn calculate_accelerations(
        &self,
        particles: &Particles,
        accelerations: &mut [Vector3<f64>],
        epsilon_squared: f64,
        execution: &Execution,
    ) {
        execution.fill(accelerations, |i| {
            let p1 = particles.positions[i];
            particles
                .masses
                .iter()
                .zip(&particles.positions)
                .enumerate()
                .filter(|&(j, _)| j != i)
                .fold(Vector3::zeros(), |acc, (_, (&m2, &p2))| {
                    acc + gravity::acceleration(p1, m2, p2, epsilon_squared)
                })
        });
    }
}

/// Which [`ForceSolver`] an integrator uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SolverKind {
    #[default]
    BarnesHut,
    DirectSummation,
}

impl SolverKind {
    #[must_use]
    pub fn build(self, theta: f64) -> Box<dyn ForceSolver> {
        match self {
            SolverKind::BarnesHut => Box::new(BarnesHut::new(theta)),
            SolverKind::DirectSummation => Box::new(DirectSummation),
        }
    }
}
