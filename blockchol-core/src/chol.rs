//! Blocked right-looking upper Cholesky as a task graph.
//!
//! For block column `k`:
//! - `factor[k]` factors the diagonal block `(k, k)`;
//! - `panel[k]` solves every stored `(k, j)`, `j > k`, against `U_kkᴴ`;
//! - `update[k]` applies `(i, j) -= (k, i)ᴴ (k, j)` for stored pairs `i ≤ j`.
//!
//! Each task depends on the tasks producing its inputs and on the last task
//! that wrote its output block, nothing else.

use log::debug;

use crate::error::{CholError, Result};
use crate::hier::HierMatrix;
use crate::kernels::{block_potrf, block_trsm, block_update};
use crate::scalar::Scalar;
use crate::scheduler::{TaskGraph, TaskHandle, TaskKind, TaskLabel};

/// Build and spawn the factorization graph of `hier`.
///
/// Returns a join task that completes once every block holds its factor.
/// Tasks writing a block for the first time also wait for `after`.
pub fn factor_by_blocks<'env, 'a: 'env, T: Scalar>(
    graph: &TaskGraph<'env>,
    hier: &'env HierMatrix<'a, T>,
    after: &[TaskHandle],
) -> Result<TaskHandle> {
    let structure = hier.structure();
    let ranges = hier.ranges();
    let nb = hier.num_blocks();
    let mut last: Vec<Option<TaskHandle>> = vec![None; structure.num_stored()];
    let writer_deps = |last: &[Option<TaskHandle>], e: usize, deps: &mut Vec<TaskHandle>| match last[e] {
        Some(h) => deps.push(h),
        None => deps.extend_from_slice(after),
    };

    for k in 0..nb {
        let kk = structure.diag_entry(k);
        let mut deps = Vec::new();
        writer_deps(&last, kk, &mut deps);
        let start = ranges.start_of(k);
        let diag = graph.submit(TaskLabel::new(TaskKind::Factor, k), &deps, move |team| {
            let mut a = hier.entry(kk).write();
            block_potrf(&mut a, team.parallelism()).map_err(|e| CholError::NotPositiveDefinite {
                block: k,
                row: start + e.index,
                pivot: e.pivot,
            })
        })?;
        last[kk] = Some(diag);

        let cols = structure.row_off_diagonal(k);
        let mut panels = Vec::with_capacity(cols.len());
        for &j in cols {
            let e = kk + panels.len() + 1;
            debug_assert_eq!(structure.entry(e), (k, j));
            let mut deps = vec![diag];
            writer_deps(&last, e, &mut deps);
            let panel = graph.submit(TaskLabel::new(TaskKind::Panel, k), &deps, move |team| {
                let u = hier.entry(kk).read();
                let mut b = hier.entry(e).write();
                block_trsm(&u, &mut b, team.parallelism());
                Ok(())
            })?;
            last[e] = Some(panel);
            panels.push((e, panel));
        }

        for (a_pos, &(ei, pi)) in panels.iter().enumerate() {
            let i = cols[a_pos];
            for (b_pos, &(ej, pj)) in panels.iter().enumerate().skip(a_pos) {
                let j = cols[b_pos];
                let target = structure.find(i, j).ok_or_else(|| {
                    CholError::InvalidPartition(format!(
                        "block ({}, {}) receives fill from block row {} but is not stored",
                        i, j, k
                    ))
                })?;
                let mut deps = vec![pi];
                if pj != pi {
                    deps.push(pj);
                }
                writer_deps(&last, target, &mut deps);
                let upd = graph.submit(TaskLabel::new(TaskKind::Update, k), &deps, move |team| {
                    let mut c = hier.entry(target).write();
                    if ei == ej {
                        let a = hier.entry(ei).read();
                        block_update(&a, &a, &mut c, true, team.parallelism());
                    } else {
                        let a = hier.entry(ei).read();
                        let b = hier.entry(ej).read();
                        block_update(&a, &b, &mut c, false, team.parallelism());
                    }
                    Ok(())
                })?;
                last[target] = Some(upd);
            }
        }
    }

    let finals: Vec<TaskHandle> = last.iter().flatten().copied().collect();
    debug!(
        "factor graph: {} blocks, {} stored, {} tasks",
        nb,
        structure.num_stored(),
        graph.stats().created
    );
    graph.submit(TaskLabel::new(TaskKind::Join, nb), &finals, |_| Ok(()))
}
