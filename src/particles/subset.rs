use std::{fmt, ops::Range};

use color_eyre::eyre::{ensure, Result};

/// The named parts of a galaxy that get their own snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SubsetKind {
    /// Thin and thick disk, indices `[0, n_bulge)`.
    Disk,
    /// Bulge, indices `[n_bulge, n_halo)`.
    Bulge,
    /// Disk and bulge together, indices `[0, n_halo)`.
    Galaxy,
}

impl SubsetKind {
    pub const ALL: [SubsetKind; 3] = [SubsetKind::Disk, SubsetKind::Bulge, SubsetKind::Galaxy];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SubsetKind::Disk => "disk",
            SubsetKind::Bulge => "bulge",
            SubsetKind::Galaxy => "galaxy",
        }
    }
}

impl fmt::Display for SubsetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fixed, contiguous index range of the ensemble.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subset {
    pub kind: SubsetKind,
    pub range: Range<usize>,
}

impl Subset {
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.range.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.range.contains(&index)
    }

    /// The same subset of an ensemble stored from index `offset` onwards.
    #[must_use]
    pub fn shifted(&self, offset: usize) -> Subset {
        Subset {
            kind: self.kind,
            range: self.range.start + offset..self.range.end + offset,
        }
    }

    /// The part of `values` belonging to this subset.
    ///
    /// # Panics
    /// If `values` is shorter than the end of the range; the layout is
    /// validated against the ensemble size when it is created.
    #[must_use]
    pub fn select<'a, T>(&self, values: &'a [T]) -> &'a [T] {
        &values[self.range.clone()]
    }
}

/// Subset boundaries of one run, derived from the bulge and halo counts.
///
/// Particles from index `n_halo` onwards belong to no subset and are never
/// plotted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsetLayout {
    n_bulge: usize,
    n_halo: usize,
}

impl SubsetLayout {
    /// Validate `n_bulge <= n_halo <= num_particles`.
    pub fn new(n_bulge: usize, n_halo: usize, num_particles: usize) -> Result<Self> {
        ensure!(
            n_bulge <= n_halo,
            "bulge boundary {n_bulge} lies beyond halo boundary {n_halo}"
        );
        ensure!(
            n_halo <= num_particles,
            "halo boundary {n_halo} lies beyond the ensemble of {num_particles} particles"
        );

        Ok(Self { n_bulge, n_halo })
    }

    #[must_use]
    pub fn subset(&self, kind: SubsetKind) -> Subset {
        let range = match kind {
            SubsetKind::Disk => 0..self.n_bulge,
            SubsetKind::Bulge => self.n_bulge..self.n_halo,
            SubsetKind::Galaxy => 0..self.n_halo,
        };
        Subset { kind, range }
    }

    pub fn subsets(&self) -> impl Iterator<Item = Subset> + '_ {
        SubsetKind::ALL.into_iter().map(|kind| self.subset(kind))
    }
}
