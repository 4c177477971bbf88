mod plot;

pub use plot::*;

use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::eyre::{Result, WrapErr};
use nalgebra::Vector3;
use tracing::debug;

use crate::{csv, SubsetKind};

/// Positions of one subset at one point in time.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    pub subset: SubsetKind,
    /// Model time in Myr.
    pub time: u64,
    /// Positions in kpc, in subset order.
    pub positions: &'a [Vector3<f64>],
}

impl Snapshot<'_> {
    #[must_use]
    pub fn label(&self) -> String {
        snapshot_label(self.subset.name(), self.time)
    }
}

/// File name stem of a snapshot, e.g. `disk_100myr`.
#[must_use]
pub fn snapshot_label(subset: &str, time: u64) -> String {
    format!("{subset}_{time}myr")
}

/// Receives the snapshots of a run.
pub trait SnapshotSink {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> Result<()>;
}

/// Where and how snapshots are written.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputConfig {
    pub plots_dir: PathBuf,
    /// `None` disables the CSV export.
    pub positions_dir: Option<PathBuf>,
    pub style: PlotStyle,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            plots_dir: PathBuf::from("plots"),
            positions_dir: Some(PathBuf::from("positions")),
            style: PlotStyle::default(),
        }
    }
}

impl OutputConfig {
    #[must_use]
    pub fn plots_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plots_dir = dir.into();
        self
    }

    #[must_use]
    pub fn positions_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.positions_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn without_positions(mut self) -> Self {
        self.positions_dir = None;
        self
    }

    #[must_use]
    pub fn dpi(mut self, dpi: f64) -> Self {
        self.style.dpi = dpi;
        self
    }
}

/// Writes a PNG scatter plot and optionally a positions CSV per snapshot.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    config: OutputConfig,
}

impl SnapshotWriter {
    /// Create the output directories.
    pub fn new(config: OutputConfig) -> Result<Self> {
        create_dir(&config.plots_dir)?;
        if let Some(dir) = &config.positions_dir {
            create_dir(dir)?;
        }

        Ok(Self { config })
    }

    #[must_use]
    pub fn plot_path(&self, label: &str) -> PathBuf {
        self.config.plots_dir.join(format!("{label}.png"))
    }

    #[must_use]
    pub fn positions_path(&self, label: &str) -> Option<PathBuf> {
        self.config
            .positions_dir
            .as_ref()
            .map(|dir| dir.join(format!("{label}.csv")))
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .wrap_err_with(|| format!("failed to create output directory {}", dir.display()))
}

impl SnapshotSink for SnapshotWriter {
    fn write(&mut self, snapshot: &Snapshot<'_>) -> Result<()> {
        let label = snapshot.label();

        let mut figure = Figure::new(self.config.style);
        let visible = figure.scatter(snapshot.positions);
        figure.save(self.plot_path(&label))?;

        if let Some(path) = self.positions_path(&label) {
            csv::write_positions(snapshot.positions, path)?;
        }

        debug!(
            label = %label,
            particles = snapshot.positions.len(),
            visible,
            "snapshot written"
        );
        Ok(())
    }
}
