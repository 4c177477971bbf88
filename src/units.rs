use color_eyre::eyre::{ensure, Result};
use nalgebra::Vector3;

use crate::Particles;

/// Gravitational constant in kpc^3 / (MSun Myr^2).
pub const G: f64 = 4.498502151469554e-12;

/// Conversion between dimensionless N-body units (G = 1) and physical units.
///
/// Physical units are solar masses, kiloparsec and megayears; velocities are
/// in kpc/Myr. One N-body mass unit is `mass` MSun, one N-body length unit is
/// `length` kpc and the time unit follows from G = 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitConverter {
    mass: f64,
    length: f64,
    time: f64,
}

impl UnitConverter {
    /// Create a converter from a reference mass in MSun and a reference length in kpc.
    pub fn new(mass: f64, length: f64) -> Result<Self> {
        ensure!(
            mass.is_finite() && mass > 0.,
            "reference mass must be positive and finite, got {mass} MSun"
        );
        ensure!(
            length.is_finite() && length > 0.,
            "reference length must be positive and finite, got {length} kpc"
        );

        let time = (length.powi(3) / (G * mass)).sqrt();
        Ok(Self { mass, length, time })
    }

    /// One N-body mass unit in MSun.
    #[must_use]
    pub fn mass_unit(&self) -> f64 {
        self.mass
    }

    /// One N-body length unit in kpc.
    #[must_use]
    pub fn length_unit(&self) -> f64 {
        self.length
    }

    /// One N-body time unit in Myr.
    #[must_use]
    pub fn time_unit(&self) -> f64 {
        self.time
    }

    /// One N-body velocity unit in kpc/Myr.
    #[must_use]
    pub fn velocity_unit(&self) -> f64 {
        self.length / self.time
    }

    #[must_use]
    pub fn mass_to_nbody(&self, mass: f64) -> f64 {
        mass / self.mass
    }

    #[must_use]
    pub fn mass_to_physical(&self, mass: f64) -> f64 {
        mass * self.mass
    }

    #[must_use]
    pub fn length_to_nbody(&self, length: f64) -> f64 {
        length / self.length
    }

    #[must_use]
    pub fn length_to_physical(&self, length: f64) -> f64 {
        length * self.length
    }

    #[must_use]
    pub fn time_to_nbody(&self, time: f64) -> f64 {
        time / self.time
    }

    #[must_use]
    pub fn time_to_physical(&self, time: f64) -> f64 {
        time * self.time
    }

    #[must_use]
    pub fn velocity_to_nbody(&self, velocity: f64) -> f64 {
        velocity / self.velocity_unit()
    }

    #[must_use]
    pub fn velocity_to_physical(&self, velocity: f64) -> f64 {
        velocity * self.velocity_unit()
    }

    /// Convert a whole ensemble from physical to N-body units.
    #[must_use]
    pub fn to_nbody(&self, particles: &Particles) -> Particles {
        self.scale(particles, 1. / self.mass, 1. / self.length, 1. / self.velocity_unit())
    }

    /// Convert a whole ensemble from N-body to physical units.
    #[must_use]
    pub fn to_physical(&self, particles: &Particles) -> Particles {
        self.scale(particles, self.mass, self.length, self.velocity_unit())
    }

    fn scale(&self, particles: &Particles, mass: f64, length: f64, velocity: f64) -> Particles {
        particles
            .iter()
            .map(|(m, pos, vel)| (m * mass, pos * length, vel * velocity))
            .collect()
    }

    /// Convert a position from N-body units to kpc.
    #[must_use]
    pub fn position_to_physical(&self, position: &Vector3<f64>) -> Vector3<f64> {
        position * self.length
    }
}
