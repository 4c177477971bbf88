use std::f64::consts::PI;

use color_eyre::eyre::{bail, Result};
use nalgebra::Vector3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Open01, StandardNormal};

use super::{ComponentCounts, ModelGenerator};
use crate::Particles;

/// Exponential disk with a sech^2 vertical profile.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiskProfile {
    /// Relative mass of the disk.
    pub mass_weight: f64,
    /// Radial scale length, in units of the galaxy radius.
    pub scale_length: f64,
    /// Vertical scale height, in units of the scale length.
    pub scale_height: f64,
    /// Outer edge, in scale lengths.
    pub truncation: f64,
    /// Velocity dispersion per axis, as a fraction of the circular speed.
    pub dispersion: f64,
}

/// Hernquist sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpheroidProfile {
    pub mass_weight: f64,
    /// Scale radius, in units of the galaxy radius.
    pub scale_radius: f64,
    /// Outer edge, in scale radii.
    pub truncation: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GalaxyStructure {
    pub disk: DiskProfile,
    pub bulge: SpheroidProfile,
    pub halo: SpheroidProfile,
}

impl Default for GalaxyStructure {
    fn default() -> Self {
        Self {
            disk: DiskProfile {
                mass_weight: 0.1,
                scale_length: 0.3,
                scale_height: 0.1,
                truncation: 10.,
                dispersion: 0.1,
            },
            bulge: SpheroidProfile {
                mass_weight: 0.05,
                scale_radius: 0.1,
                truncation: 20.,
            },
            halo: SpheroidProfile {
                mass_weight: 0.85,
                scale_radius: 2.,
                truncation: 15.,
            },
        }
    }
}

impl SpheroidProfile {
    /// Largest value of the cumulative mass fraction r^2 / (r + a)^2.
    fn max_fraction(&self) -> f64 {
        (self.truncation / (self.truncation + 1.)).powi(2)
    }

    /// Fraction of the (truncated) mass inside radius `r`.
    fn enclosed_fraction(&self, r: f64) -> f64 {
        let u = (r / (r + self.scale_radius)).powi(2);
        u.min(self.max_fraction()) / self.max_fraction()
    }

    /// Invert the cumulative mass for a uniform sample `u` in [0, 1).
    fn radius(&self, u: f64) -> f64 {
        let s = (u * self.max_fraction()).sqrt();
        self.scale_radius * s / (1. - s)
    }
}

impl DiskProfile {
    /// Cumulative mass of an untruncated exponential disk, x in scale lengths.
    fn cumulative(x: f64) -> f64 {
        1. - (1. + x) * (-x).exp()
    }

    fn enclosed_fraction(&self, r: f64) -> f64 {
        let x = (r / self.scale_length).min(self.truncation);
        Self::cumulative(x) / Self::cumulative(self.truncation)
    }

    /// Cylindrical radius for a uniform sample `u` in [0, 1), by bisection.
    fn radius(&self, u: f64) -> f64 {
        let target = u * Self::cumulative(self.truncation);
        let (mut lo, mut hi) = (0., self.truncation);
        for _ in 0..64 {
            let mid = (lo + hi) / 2.;
            if Self::cumulative(mid) < target {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        self.scale_length * (lo + hi) / 2.
    }
}

/// Component masses of a model with total mass 1.
#[derive(Clone, Copy, Debug)]
struct MassModel {
    structure: GalaxyStructure,
    disk: f64,
    bulge: f64,
    halo: f64,
}

impl MassModel {
    fn new(structure: GalaxyStructure, counts: &ComponentCounts) -> Result<Self> {
        let weight = |n: usize, w: f64| if n > 0 { w } else { 0. };
        let disk = weight(counts.disk, structure.disk.mass_weight);
        let bulge = weight(counts.bulge, structure.bulge.mass_weight);
        let halo = weight(counts.halo, structure.halo.mass_weight);

        let total = disk + bulge + halo;
        if !(total > 0.) {
            bail!("components with particles need a positive mass weight");
        }

        Ok(Self {
            structure,
            disk: disk / total,
            bulge: bulge / total,
            halo: halo / total,
        })
    }

    /// Enclosed mass within radius `r`, treating the disk as spherical.
    fn enclosed_mass(&self, r: f64) -> f64 {
        self.disk * self.structure.disk.enclosed_fraction(r)
            + self.bulge * self.structure.bulge.enclosed_fraction(r)
            + self.halo * self.structure.halo.enclosed_fraction(r)
    }

    fn circular_velocity(&self, r: f64) -> f64 {
        let r = r.max(1e-6);
        (self.enclosed_mass(r) / r).sqrt()
    }
}

/// Three-component galaxy model: exponential disk, Hernquist bulge and
/// Hernquist halo.
///
/// Particles are ordered disk first, then bulge, then halo.
#[derive(Clone, Debug)]
pub struct GalacticModel<R: Rng = StdRng> {
    rng: R,
    structure: GalaxyStructure,
}

impl GalacticModel<StdRng> {
    #[must_use]
    pub fn new(structure: GalaxyStructure) -> Self {
        Self::with_rng(structure, StdRng::from_entropy())
    }

    /// Reproducible model for a given seed.
    #[must_use]
    pub fn seeded(structure: GalaxyStructure, seed: u64) -> Self {
        Self::with_rng(structure, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> GalacticModel<R> {
    pub fn with_rng(structure: GalaxyStructure, rng: R) -> Self {
        Self { rng, structure }
    }

    #[must_use]
    pub fn structure(&self) -> &GalaxyStructure {
        &self.structure
    }

    fn random_direction(&mut self) -> Vector3<f64> {
        let cos_theta: f64 = self.rng.gen_range(-1.0..=1.0);
        let sin_theta = (1. - cos_theta * cos_theta).sqrt();
        let phi = self.rng.gen_range(0.0..2. * PI);
        Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
    }

    fn gaussian_vector(&mut self, sigma: f64) -> Vector3<f64> {
        Vector3::new(
            self.rng.sample(StandardNormal),
            self.rng.sample(StandardNormal),
            self.rng.sample::<f64, _>(StandardNormal),
        ) * sigma
    }

    fn create_disk_particle(&mut self, model: &MassModel) -> (Vector3<f64>, Vector3<f64>) {
        let disk = self.structure.disk;

        let r = disk.radius(self.rng.gen());
        let phi = self.rng.gen_range(0.0..2. * PI);
        // sech^2 profile, inverse of its cumulative distribution
        let u: f64 = self.rng.sample(Open01);
        let z = disk.scale_height * disk.scale_length * (2. * u - 1.).atanh();
        let pos = Vector3::new(r * phi.cos(), r * phi.sin(), z);

        let v_c = model.circular_velocity(r);
        let vel = Vector3::new(-phi.sin(), phi.cos(), 0.) * v_c
            + self.gaussian_vector(disk.dispersion * v_c);

        (pos, vel)
    }

    fn create_spheroid_particle(
        &mut self,
        profile: SpheroidProfile,
        model: &MassModel,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let r = profile.radius(self.rng.gen());
        let pos = self.random_direction() * r;

        let sigma = model.circular_velocity(r) / 3f64.sqrt();
        (pos, self.gaussian_vector(sigma))
    }
}

impl<R: Rng> ModelGenerator for GalacticModel<R> {
    fn generate(&mut self, counts: &ComponentCounts) -> Result<Particles> {
        if counts.total() == 0 {
            bail!("galaxy model needs at least one particle");
        }
        let model = MassModel::new(self.structure, counts)?;
        let mut particles = Particles::with_capacity(counts.total());

        let mass = model.disk / counts.disk.max(1) as f64;
        for _ in 0..counts.disk {
            let (pos, vel) = self.create_disk_particle(&model);
            particles.push(mass, pos, vel);
        }

        let mass = model.bulge / counts.bulge.max(1) as f64;
        for _ in 0..counts.bulge {
            let (pos, vel) = self.create_spheroid_particle(self.structure.bulge, &model);
            particles.push(mass, pos, vel);
        }

        let mass = model.halo / counts.halo.max(1) as f64;
        for _ in 0..counts.halo {
            let (pos, vel) = self.create_spheroid_particle(self.structure.halo, &model);
            particles.push(mass, pos, vel);
        }

        particles.move_to_center();
        Ok(particles)
    }
}
