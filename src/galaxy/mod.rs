mod model;

pub use model::*;

use color_eyre::eyre::{ensure, Result, WrapErr};
use tracing::info;

use crate::{Particles, UnitConverter};

/// Number of particles in each galaxy component.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ComponentCounts {
    pub halo: usize,
    pub bulge: usize,
    pub disk: usize,
}

impl ComponentCounts {
    #[must_use]
    pub fn new(halo: usize, bulge: usize, disk: usize) -> Self {
        Self { halo, bulge, disk }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.halo + self.bulge + self.disk
    }
}

/// Creates the initial particles of a galaxy.
pub trait ModelGenerator {
    /// Generate a model of total mass 1 and length scale 1 (N-body units).
    ///
    /// The order of the returned particles is up to the generator.
    fn generate(&mut self, counts: &ComponentCounts) -> Result<Particles>;
}

/// A generated galaxy in physical units, with the converter that scaled it.
#[derive(Clone, Debug)]
pub struct Galaxy {
    pub particles: Particles,
    pub converter: UnitConverter,
    pub counts: ComponentCounts,
}

/// Build a galaxy of total `mass` (MSun) and characteristic `radius` (kpc).
pub fn make_galaxy<G: ModelGenerator + ?Sized>(
    mass: f64,
    radius: f64,
    counts: ComponentCounts,
    generator: &mut G,
) -> Result<Galaxy> {
    let converter = UnitConverter::new(mass, radius).wrap_err("invalid galaxy scale")?;

    let nbody = generator.generate(&counts)?;
    ensure!(
        nbody.len() == counts.total(),
        "model generator returned {} particles, expected {}",
        nbody.len(),
        counts.total()
    );

    info!(
        halo = counts.halo,
        bulge = counts.bulge,
        disk = counts.disk,
        mass,
        radius,
        "galaxy model generated"
    );

    Ok(Galaxy {
        particles: converter.to_physical(&nbody),
        converter,
        counts,
    })
}
