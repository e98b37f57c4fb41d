//! Driver settings.

use crate::hier::HierOptions;
use crate::scheduler::SchedulerConfig;

/// How the factorization and solve graphs are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CholAlgo {
    /// One task per phase over the scalar fill pattern
    Unblocked,
    /// One task per block operation
    #[default]
    ByBlocks,
}

#[derive(Debug, Clone)]
pub struct SolverSettings {
    /// Graph construction strategy
    pub algo: CholAlgo,

    /// Tiling of the stored blocks
    pub hier: HierOptions,

    /// Columns per right-hand-side block (0 = a single chunk)
    pub rhs_block_cols: usize,

    /// Team layout
    pub scheduler: SchedulerConfig,

    /// Agreement tolerance for path comparisons (None = sqrt(eps) of the
    /// real type)
    pub tolerance: Option<f64>,

    /// Log driver phases at info level
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        // BLOCKCHOL_VERBOSE=1 turns on phase logging
        let verbose = env_bool("BLOCKCHOL_VERBOSE").unwrap_or(false);
        Self {
            algo: CholAlgo::ByBlocks,
            hier: HierOptions::default(),
            rhs_block_cols: 0,
            scheduler: SchedulerConfig::default(),
            tolerance: None,
            verbose,
        }
    }
}

impl SolverSettings {
    /// Tolerance in the real type of `T`.
    pub fn tolerance_for<T: crate::scalar::Scalar>(&self) -> T::Magnitude {
        match self.tolerance {
            Some(t) => T::real_from_f64(t),
            None => num_traits::Float::sqrt(T::epsilon()),
        }
    }
}

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<usize>().ok())
}

pub(crate) fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
}
