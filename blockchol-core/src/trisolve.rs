//! Blocked triangular solves with the factor of [`factor_by_blocks`].
//!
//! `op(U) X = B` is solved in place on a by-blocks right-hand side. Every
//! column chunk of the right-hand side is an independent chain of tasks.
//!
//! [`factor_by_blocks`]: crate::chol::factor_by_blocks

use faer::prelude::Reborrow;
use log::debug;

use crate::error::{CholError, Result};
use crate::hier::{HierDense, HierMatrix};
use crate::kernels::{block_gemv, block_trsv, Diag, Side, Trans};
use crate::scalar::Scalar;
use crate::scheduler::{TaskGraph, TaskHandle, TaskKind, TaskLabel};

/// Build and spawn the solve graph for `op(U) X = B`.
///
/// `ConjTranspose` / `Transpose` sweep forward (top to bottom); `NoTranspose`
/// sweeps backward. Only `Side::Left` is supported. Shape checks run before
/// any task is created.
pub fn tri_solve_by_blocks<'env, 'a: 'env, 'b: 'env, T: Scalar>(
    graph: &TaskGraph<'env>,
    factor: &'env HierMatrix<'a, T>,
    rhs: &'env HierDense<'b, T>,
    side: Side,
    trans: Trans,
    diag: Diag,
    after: &[TaskHandle],
) -> Result<TaskHandle> {
    if side == Side::Right {
        return Err(CholError::DimensionMismatch {
            what: "right-side solve (right-hand side blocks are partitioned by rows)",
            expected: factor.ranges().dim(),
            actual: 0,
        });
    }
    let ranges = factor.ranges();
    if rhs.ranges() != ranges {
        let (expected, actual) = if rhs.ranges().num_blocks() != ranges.num_blocks() {
            (ranges.num_blocks(), rhs.ranges().num_blocks())
        } else {
            (ranges.dim(), rhs.ranges().dim())
        };
        return Err(CholError::DimensionMismatch {
            what: "right-hand side block rows",
            expected,
            actual,
        });
    }

    let structure = factor.structure();
    let nb = ranges.num_blocks();
    let nc = rhs.num_col_chunks();
    let mut last: Vec<Option<TaskHandle>> = vec![None; nb * nc];
    let writer_deps = |last: &[Option<TaskHandle>], slot: usize, deps: &mut Vec<TaskHandle>| match last[slot] {
        Some(h) => deps.push(h),
        None => deps.extend_from_slice(after),
    };

    for c in 0..nc {
        let order: Box<dyn Iterator<Item = usize>> = match trans {
            Trans::NoTranspose => Box::new((0..nb).rev()),
            _ => Box::new(0..nb),
        };
        for i in order {
            let mut deps = Vec::new();
            writer_deps(&last, i * nc + c, &mut deps);
            let ii = structure.diag_entry(i);
            let solve = graph.submit(TaskLabel::new(TaskKind::Solve, i), &deps, move |team| {
                let u = factor.entry(ii).read();
                let mut x = rhs.block(i, c).write();
                block_trsv(&u, &mut x, trans, diag, team.parallelism());
                Ok(())
            })?;
            last[i * nc + c] = Some(solve);

            // Blocks of the solution that still wait for X_i: later rows on
            // the forward sweep, earlier rows on the backward sweep
            let targets: Vec<(usize, usize)> = match trans {
                Trans::NoTranspose => structure.col_above_diagonal(i).to_vec(),
                _ => structure
                    .row_off_diagonal(i)
                    .iter()
                    .enumerate()
                    .map(|(p, &j)| (j, ii + p + 1))
                    .collect(),
            };
            for (j, e) in targets {
                let mut deps = vec![solve];
                writer_deps(&last, j * nc + c, &mut deps);
                let upd = graph.submit(TaskLabel::new(TaskKind::Propagate, i), &deps, move |team| {
                    let u = factor.entry(e).read();
                    let x = rhs.block(i, c).read();
                    let mut y = rhs.block(j, c).write();
                    block_gemv(&u, trans, x.rb(), &mut y, team.parallelism());
                    Ok(())
                })?;
                last[j * nc + c] = Some(upd);
            }
        }
    }

    let finals: Vec<TaskHandle> = last.iter().flatten().copied().collect();
    debug!(
        "solve graph ({:?}): {} block rows, {} column chunk(s)",
        trans, nb, nc
    );
    graph.submit(TaskLabel::new(TaskKind::Join, nb), &finals, |_| Ok(()))
}
