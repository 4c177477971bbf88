//! Plummer-softened Newtonian gravity in N-body units (G = 1).

use nalgebra::Vector3;

use crate::Particles;

/// Acceleration of a particle at `position1` caused by `mass2` at `position2`.
#[inline]
#[must_use]
pub fn acceleration(
    position1: Vector3<f64>,
    mass2: f64,
    position2: Vector3<f64>,
    epsilon_squared: f64,
) -> Vector3<f64> {
    let r = position2 - position1;
    let r_square = r.norm_squared();
    r * mass2 / (r_square + epsilon_squared).sqrt().powi(3)
}

#[must_use]
pub fn kinetic_energy(particles: &Particles) -> f64 {
    particles
        .masses
        .iter()
        .zip(&particles.velocities)
        .map(|(m, v)| 0.5 * m * v.norm_squared())
        .sum()
}

/// Softened potential energy, summed over all pairs.
#[must_use]
pub fn potential_energy(particles: &Particles, epsilon_squared: f64) -> f64 {
    let mut energy = 0.;
    for (i, (m1, p1)) in particles.masses.iter().zip(&particles.positions).enumerate() {
        for (m2, p2) in particles.masses[i + 1..]
            .iter()
            .zip(&particles.positions[i + 1..])
        {
            energy -= m1 * m2 / ((p2 - p1).norm_squared() + epsilon_squared).sqrt();
        }
    }
    energy
}
