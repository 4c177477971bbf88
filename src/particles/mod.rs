mod subset;

pub use subset::*;

use std::ops::Range;

use nalgebra::Vector3;

/// A collection of particles.
///
/// This struct is used to utilize the Struct-of-Arrays (SOA) architecture.
/// The index of a particle is its identity: no method reorders the arrays.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Particles {
    pub(crate) masses: Vec<f64>,
    pub(crate) positions: Vec<Vector3<f64>>,
    pub(crate) velocities: Vec<Vector3<f64>>,
}

impl Particles {
    #[must_use]
    pub fn new(
        masses: Vec<f64>,
        positions: Vec<Vector3<f64>>,
        velocities: Vec<Vector3<f64>>,
    ) -> Self {
        let len = masses.len();
        assert_eq!(len, positions.len());
        assert_eq!(len, velocities.len());

        Self {
            masses,
            positions,
            velocities,
        }
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            masses: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    #[must_use]
    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    #[must_use]
    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.velocities
    }

    pub fn push(&mut self, mass: f64, position: Vector3<f64>, velocity: Vector3<f64>) {
        self.masses.push(mass);
        self.positions.push(position);
        self.velocities.push(velocity);
    }

    /// Append all particles of `other`, returning the index range they now occupy.
    pub fn append(&mut self, other: &Particles) -> Range<usize> {
        let start = self.len();
        self.masses.extend_from_slice(&other.masses);
        self.positions.extend_from_slice(&other.positions);
        self.velocities.extend_from_slice(&other.velocities);
        start..self.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, Vector3<f64>, Vector3<f64>)> + '_ {
        self.masses
            .iter()
            .zip(&self.positions)
            .zip(&self.velocities)
            .map(|((&m, &p), &v)| (m, p, v))
    }

    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// Mass-weighted mean of `values`. Zero for an ensemble without mass.
    fn mass_weighted_mean(&self, values: &[Vector3<f64>]) -> Vector3<f64> {
        let total = self.total_mass();
        if total == 0. {
            return Vector3::zeros();
        }

        self.masses
            .iter()
            .zip(values)
            .fold(Vector3::zeros(), |acc, (&m, v)| acc + v * m)
            / total
    }

    #[must_use]
    pub fn center_of_mass(&self) -> Vector3<f64> {
        self.mass_weighted_mean(&self.positions)
    }

    #[must_use]
    pub fn center_of_mass_velocity(&self) -> Vector3<f64> {
        self.mass_weighted_mean(&self.velocities)
    }

    /// Shift the ensemble so its center of mass is at rest in the origin.
    pub fn move_to_center(&mut self) {
        let com = self.center_of_mass();
        let com_vel = self.center_of_mass_velocity();

        for pos in &mut self.positions {
            *pos -= com;
        }
        for vel in &mut self.velocities {
            *vel -= com_vel;
        }
    }
}

impl FromIterator<(f64, Vector3<f64>, Vector3<f64>)> for Particles {
    fn from_iter<T: IntoIterator<Item = (f64, Vector3<f64>, Vector3<f64>)>>(iter: T) -> Self {
        let iter = iter.into_iter();
        let mut particles = Self::with_capacity(iter.size_hint().0);

        for (m, p, v) in iter {
            particles.push(m, p, v);
        }

        particles
    }
}
