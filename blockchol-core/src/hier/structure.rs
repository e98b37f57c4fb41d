//! Block-level sparsity structure.
//!
//! Stored blocks are kept CSR-style by block row (ascending block columns,
//! diagonal first) together with a column index used by the backward sweep.

use std::collections::BTreeSet;

use log::debug;
use sprs::{CsMatI, SpIndex};

use crate::error::{CholError, Result};
use crate::ranges::BlockRanges;

/// Stored upper blocks of a blocked matrix, closed under block fill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStructure {
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    /// For block column `j`, stored rows `i < j` with their entry ids
    col_rows: Vec<Vec<(usize, usize)>>,
    parent: Vec<Option<usize>>,
}

impl BlockStructure {
    /// Build the structure of `upper` under `ranges`, checked against the
    /// block elimination tree `parent`.
    ///
    /// Lower entries of `upper` are ignored. Every stored block, fill
    /// included, must lie in a column that is the row block itself or one of
    /// its tree ancestors.
    pub fn build<T, I, Iptr>(
        upper: &CsMatI<T, I, Iptr>,
        ranges: &BlockRanges,
        parent: &[Option<usize>],
    ) -> Result<Self>
    where
        I: SpIndex,
        Iptr: SpIndex,
    {
        let nb = ranges.num_blocks();
        validate_tree(parent, nb)?;
        let rows = closed_pattern(upper, ranges)?;

        for (bi, row) in rows.iter().enumerate() {
            for &bj in row {
                if !is_ancestor_or_self(parent, bi, bj) {
                    return Err(CholError::InvalidPartition(format!(
                        "block ({}, {}) is stored but block {} is not an ancestor of block {} in the elimination tree",
                        bi, bj, bj, bi
                    )));
                }
            }
        }

        let structure = Self::from_rows(rows, parent.to_vec());
        debug!(
            "block structure: {} blocks, {} stored, {} off-diagonal",
            nb,
            structure.num_stored(),
            structure.num_stored() - nb
        );
        Ok(structure)
    }

    /// Block elimination tree implied by the block fill of `upper`: the
    /// parent of `k` is the first stored column after `k` in block row `k`.
    pub fn elimination_tree<T, I, Iptr>(
        upper: &CsMatI<T, I, Iptr>,
        ranges: &BlockRanges,
    ) -> Result<Vec<Option<usize>>>
    where
        I: SpIndex,
        Iptr: SpIndex,
    {
        let rows = closed_pattern(upper, ranges)?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(k, row)| row.range(k + 1..).next().copied())
            .collect())
    }

    fn from_rows(rows: Vec<BTreeSet<usize>>, parent: Vec<Option<usize>>) -> Self {
        let nb = rows.len();
        let mut row_ptr = Vec::with_capacity(nb + 1);
        let mut col_idx = Vec::new();
        let mut col_rows = vec![Vec::new(); nb];
        row_ptr.push(0);
        for (i, row) in rows.into_iter().enumerate() {
            for j in row {
                if j > i {
                    col_rows[j].push((i, col_idx.len()));
                }
                col_idx.push(j);
            }
            row_ptr.push(col_idx.len());
        }
        Self {
            row_ptr,
            col_idx,
            col_rows,
            parent,
        }
    }

    /// Number of block rows.
    pub fn num_blocks(&self) -> usize {
        self.row_ptr.len() - 1
    }

    /// Number of stored blocks, diagonal included.
    pub fn num_stored(&self) -> usize {
        self.col_idx.len()
    }

    /// Stored block columns of block row `i`, ascending, diagonal first.
    pub fn row(&self, i: usize) -> &[usize] {
        &self.col_idx[self.row_ptr[i]..self.row_ptr[i + 1]]
    }

    /// Stored off-diagonal block columns of block row `i`.
    pub fn row_off_diagonal(&self, i: usize) -> &[usize] {
        &self.row(i)[1..]
    }

    /// Entry id of block `(i, i)`.
    pub fn diag_entry(&self, i: usize) -> usize {
        self.row_ptr[i]
    }

    /// Entry id of block `(i, j)`, if stored.
    pub fn find(&self, i: usize, j: usize) -> Option<usize> {
        self.row(i)
            .binary_search(&j)
            .ok()
            .map(|p| self.row_ptr[i] + p)
    }

    /// Block coordinates of entry `e`.
    pub fn entry(&self, e: usize) -> (usize, usize) {
        let i = self.row_ptr.partition_point(|&p| p <= e) - 1;
        (i, self.col_idx[e])
    }

    /// Stored blocks `(k, j)` with `k < j`, as `(k, entry id)`.
    pub fn col_above_diagonal(&self, j: usize) -> &[(usize, usize)] {
        &self.col_rows[j]
    }

    /// Block elimination tree.
    pub fn parent(&self) -> &[Option<usize>] {
        &self.parent
    }
}

pub(crate) fn validate_tree(parent: &[Option<usize>], nb: usize) -> Result<()> {
    if parent.len() != nb {
        return Err(CholError::InvalidPartition(format!(
            "elimination tree has {} nodes for {} blocks",
            parent.len(),
            nb
        )));
    }
    for (k, p) in parent.iter().enumerate() {
        if let Some(p) = *p {
            if p <= k || p >= nb {
                return Err(CholError::InvalidPartition(format!(
                    "block {} has parent {}, expected a later block below {}",
                    k, p, nb
                )));
            }
        }
    }
    Ok(())
}

fn is_ancestor_or_self(parent: &[Option<usize>], block: usize, target: usize) -> bool {
    let mut cur = Some(block);
    while let Some(k) = cur {
        if k == target {
            return true;
        }
        if k > target {
            return false;
        }
        cur = parent[k];
    }
    false
}

/// Block pattern of the upper entries of `upper`, closed under block fill.
fn closed_pattern<T, I, Iptr>(
    upper: &CsMatI<T, I, Iptr>,
    ranges: &BlockRanges,
) -> Result<Vec<BTreeSet<usize>>>
where
    I: SpIndex,
    Iptr: SpIndex,
{
    let n = ranges.dim();
    if upper.rows() != n || upper.cols() != n {
        return Err(CholError::DimensionMismatch {
            what: "blocked matrix",
            expected: n,
            actual: upper.rows().max(upper.cols()),
        });
    }
    let nb = ranges.num_blocks();
    let mut rows: Vec<BTreeSet<usize>> = (0..nb).map(|k| BTreeSet::from([k])).collect();
    for (_, (r, c)) in upper.iter() {
        let (r, c) = (r.index(), c.index());
        if r > c {
            continue;
        }
        rows[ranges.block_containing(r)].insert(ranges.block_containing(c));
    }
    // Rows are closed in order, so fill from earlier rows is seen by later ones
    for k in 0..nb {
        let off: Vec<usize> = rows[k].range(k + 1..).copied().collect();
        for (a, &i) in off.iter().enumerate() {
            rows[i].extend(off[a..].iter().copied());
        }
    }
    Ok(rows)
}
