pub mod csv;
pub mod force;
pub mod galaxy;
pub mod gravity;
pub mod integrator;
pub mod octree;
pub mod particles;
pub mod runner;
pub mod snapshot;
pub mod units;

pub use galaxy::{make_galaxy, ComponentCounts, Galaxy, GalacticModel, ModelGenerator};
pub use integrator::{Integrator, IntegratorSettings, Session, TreeIntegrator};
pub use particles::{Particles, Subset, SubsetKind, SubsetLayout};
pub use runner::{DynamicsRunner, RunConfig, RunSummary};
pub use snapshot::{OutputConfig, Snapshot, SnapshotSink, SnapshotWriter};
pub use units::UnitConverter;

use color_eyre::eyre::Result;
use nalgebra::Vector3;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// How per-particle work is distributed.
#[derive(Debug, Default)]
pub enum Execution {
    #[default]
    SingleThreaded,
    /// A dedicated rayon pool with a fixed number of workers.
    #[cfg(feature = "rayon")]
    Pool(rayon::ThreadPool),
}

impl Execution {
    /// One worker runs on the calling thread, more get their own pool.
    pub fn with_workers(workers: usize) -> Result<Self> {
        if workers <= 1 {
            return Ok(Execution::SingleThreaded);
        }

        #[cfg(feature = "rayon")]
        {
            use color_eyre::eyre::WrapErr;

            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .thread_name(|i| format!("gravity-{i}"))
                .build()
                .wrap_err_with(|| format!("failed to start {workers} gravity workers"))?;
            Ok(Execution::Pool(pool))
        }
        #[cfg(not(feature = "rayon"))]
        {
            tracing::warn!(workers, "built without rayon, running single threaded");
            Ok(Execution::SingleThreaded)
        }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        match self {
            Execution::SingleThreaded => 1,
            #[cfg(feature = "rayon")]
            Execution::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Set `out[i] = f(i)` for every index.
    pub fn fill<F>(&self, out: &mut [Vector3<f64>], f: F)
    where
        F: Fn(usize) -> Vector3<f64> + Send + Sync,
    {
        match self {
            Execution::SingleThreaded => {
                out.iter_mut().enumerate().for_each(|(i, a)| *a = f(i));
            }
            #[cfg(feature = "rayon")]
            Execution::Pool(pool) => pool.install(|| {
                out.par_iter_mut().enumerate().for_each(|(i, a)| *a = f(i));
            }),
        }
    }
}
