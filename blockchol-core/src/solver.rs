//! Driver: permute, factor and solve `A X = B` in one call.

use faer::Mat;
use log::info;
use parking_lot::RwLock;
use sprs::{CsMatI, SpIndex};

use crate::chol::factor_by_blocks;
use crate::dense::max_abs_diff;
use crate::error::{CholError, Result};
use crate::hier::{BlockedUpper, DenseBlocks};
use crate::kernels::{Diag, Side, Trans};
use crate::ordering::BlockOrdering;
use crate::scalar::Scalar;
use crate::scheduler::{GraphStats, Scheduler};
use crate::settings::{CholAlgo, SolverSettings};
use crate::trisolve::tri_solve_by_blocks;
use crate::unblocked::{factor_unblocked, tri_solve_unblocked, SparseUpper};
use crate::util::perf::{PerfSection, PerfTimers};

/// What a solve did.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    pub algo: CholAlgo,
    /// Block rows of the partition
    pub num_blocks: usize,
    /// Stored blocks of the factor, fill included (scalar entries for the
    /// unblocked path)
    pub stored: usize,
    pub tasks: GraphStats,
    pub timers: PerfTimers,
}

#[derive(Debug, Clone)]
pub struct Solution<T> {
    /// Solution in the original row order
    pub x: Mat<T>,
    pub info: SolveInfo,
}

/// Maximum differences between the by-blocks and unblocked paths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathComparison {
    pub factor_diff: f64,
    pub solution_diff: f64,
    pub tolerance: f64,
}

impl PathComparison {
    pub fn agrees(&self) -> bool {
        self.factor_diff <= self.tolerance && self.solution_diff <= self.tolerance
    }
}

struct Run<T, F> {
    factor: F,
    x: Mat<T>,
    stats: GraphStats,
}

/// Solve `A X = B` for Hermitian positive definite `a`.
///
/// `a` may hold the full matrix or its upper triangle. The factorization
/// follows `ordering` and the strategy in `settings.algo`.
pub fn solve<T, I, Iptr>(
    a: &CsMatI<T, I, Iptr>,
    ordering: &BlockOrdering,
    b: &Mat<T>,
    settings: &SolverSettings,
) -> Result<Solution<T>>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut timers = PerfTimers::default();
    let (upper, pb) = prepare(a, ordering, b, &mut timers)?;
    let sched = Scheduler::new(settings.scheduler)?;
    if settings.verbose {
        info!(
            "solve: n = {}, nrhs = {}, {} blocks, {:?}, {} team(s) x {}",
            a.rows(),
            b.ncols(),
            ordering.ranges().num_blocks(),
            settings.algo,
            settings.scheduler.num_teams,
            settings.scheduler.team_size
        );
    }

    let (x, stats, stored) = match settings.algo {
        CholAlgo::ByBlocks => {
            let run = run_by_blocks(&upper, ordering, pb, settings, &sched, &mut timers)?;
            let stored = run.factor.structure().num_stored();
            (run.x, run.stats, stored)
        }
        CholAlgo::Unblocked => {
            let run = run_unblocked(&upper, pb, &sched, &mut timers)?;
            let stored = run.factor.nnz();
            (run.x, run.stats, stored)
        }
    };
    let x = {
        let _t = timers.scoped(PerfSection::Permutation);
        ordering.perm().unapply_rows(&x)?
    };

    if settings.verbose {
        info!(
            "solve done: {} tasks, factor {:.3?}, solve {:.3?}, total {:.3?}",
            stats.completed,
            timers.factorization,
            timers.solve,
            timers.total()
        );
    }
    Ok(Solution {
        x,
        info: SolveInfo {
            algo: settings.algo,
            num_blocks: ordering.ranges().num_blocks(),
            stored,
            tasks: stats,
            timers,
        },
    })
}

/// Run both strategies on the same problem and report how far apart the
/// factors and the solutions are.
pub fn compare_paths<T, I, Iptr>(
    a: &CsMatI<T, I, Iptr>,
    ordering: &BlockOrdering,
    b: &Mat<T>,
    settings: &SolverSettings,
) -> Result<PathComparison>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut timers = PerfTimers::default();
    let (upper, pb) = prepare(a, ordering, b, &mut timers)?;
    let sched = Scheduler::new(settings.scheduler)?;

    let blocked = run_by_blocks(&upper, ordering, pb.clone(), settings, &sched, &mut timers)?;
    let scalar = run_unblocked(&upper, pb, &sched, &mut timers)?;

    let factor_diff = max_abs_diff(
        blocked.factor.to_dense().as_ref(),
        scalar.factor.to_dense().as_ref(),
    )?;
    let solution_diff = max_abs_diff(blocked.x.as_ref(), scalar.x.as_ref())?;
    let cmp = PathComparison {
        factor_diff: T::real_to_f64(factor_diff),
        solution_diff: T::real_to_f64(solution_diff),
        tolerance: T::real_to_f64(settings.tolerance_for::<T>()),
    };
    if settings.verbose {
        info!(
            "paths: factor diff {:.3e}, solution diff {:.3e} (tolerance {:.1e})",
            cmp.factor_diff, cmp.solution_diff, cmp.tolerance
        );
    }
    Ok(cmp)
}

fn prepare<T, I, Iptr>(
    a: &CsMatI<T, I, Iptr>,
    ordering: &BlockOrdering,
    b: &Mat<T>,
    timers: &mut PerfTimers,
) -> Result<(CsMatI<T, I, Iptr>, Mat<T>)>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let n = ordering.ranges().dim();
    if a.rows() != n || a.cols() != n {
        return Err(CholError::DimensionMismatch {
            what: "matrix dimension",
            expected: n,
            actual: if a.rows() != n { a.rows() } else { a.cols() },
        });
    }
    let _t = timers.scoped(PerfSection::Permutation);
    let upper = ordering.perm().permute_upper(a)?;
    let pb = ordering.perm().apply_rows(b)?;
    Ok((upper, pb))
}

fn run_by_blocks<T, I, Iptr>(
    upper: &CsMatI<T, I, Iptr>,
    ordering: &BlockOrdering,
    pb: Mat<T>,
    settings: &SolverSettings,
    sched: &Scheduler,
    timers: &mut PerfTimers,
) -> Result<Run<T, BlockedUpper<T>>>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let ranges = ordering.ranges();
    let (mut blocked, mut rhs) = {
        let _t = timers.scoped(PerfSection::Assembly);
        let blocked = BlockedUpper::from_sparse(upper, ranges, ordering.tree(), settings.hier)?;
        let rhs = DenseBlocks::from_flat(&pb, ranges, settings.rhs_block_cols)?;
        (blocked, rhs)
    };

    let stats = {
        let hier = blocked.hier_view();
        let x = rhs.hier_view();
        sched.scope(|g| -> Result<GraphStats> {
            {
                let _t = timers.scoped(PerfSection::Factorization);
                let f = factor_by_blocks(g, &hier, &[])?;
                g.wait(f)?;
            }
            let _t = timers.scoped(PerfSection::Solve);
            let y = tri_solve_by_blocks(g, &hier, &x, Side::Left, Trans::ConjTranspose, Diag::NonUnit, &[])?;
            let z = tri_solve_by_blocks(g, &hier, &x, Side::Left, Trans::NoTranspose, Diag::NonUnit, &[y])?;
            g.wait(z)?;
            Ok(g.stats())
        })?
    };

    let x = {
        let _t = timers.scoped(PerfSection::Other);
        rhs.to_flat()
    };
    Ok(Run {
        factor: blocked,
        x,
        stats,
    })
}

fn run_unblocked<T, I, Iptr>(
    upper: &CsMatI<T, I, Iptr>,
    mut x: Mat<T>,
    sched: &Scheduler,
    timers: &mut PerfTimers,
) -> Result<Run<T, SparseUpper<T>>>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut factor = {
        let _t = timers.scoped(PerfSection::Assembly);
        SparseUpper::from_upper(upper)?
    };

    let stats = {
        let fl = RwLock::new(&mut factor);
        let xl = RwLock::new(&mut x);
        sched.scope(|g| -> Result<GraphStats> {
            {
                let _t = timers.scoped(PerfSection::Factorization);
                let f = factor_unblocked(g, &fl, &[])?;
                g.wait(f)?;
            }
            let _t = timers.scoped(PerfSection::Solve);
            let y = tri_solve_unblocked(g, &fl, &xl, Trans::ConjTranspose, Diag::NonUnit, &[])?;
            let z = tri_solve_unblocked(g, &fl, &xl, Trans::NoTranspose, Diag::NonUnit, &[y])?;
            g.wait(z)?;
            Ok(g.stats())
        })?
    };

    Ok(Run { factor, x, stats })
}
