//! Block range table.
//!
//! Maps a block index to a contiguous row/column extent of the permuted
//! matrix. The table is produced once from the ordering and never mutated.

use std::ops::Range;

use crate::error::{CholError, Result};

/// Contiguous, gap-free partition of `[0, n)` into blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRanges {
    /// Block boundaries: block `k` covers `offsets[k]..offsets[k + 1]`
    offsets: Vec<usize>,
}

impl BlockRanges {
    /// Build from boundary offsets `[0, b1, b2, ..., n]`.
    ///
    /// Offsets must start at zero, end at `n`, and strictly increase.
    pub fn from_offsets(offsets: Vec<usize>, n: usize) -> Result<Self> {
        if offsets.len() < 2 {
            return Err(CholError::InvalidPartition(format!(
                "need at least one block to cover {} rows",
                n
            )));
        }
        if offsets[0] != 0 {
            return Err(CholError::InvalidPartition(format!(
                "first block starts at {}, expected 0",
                offsets[0]
            )));
        }
        let last = offsets[offsets.len() - 1];
        if last != n {
            return Err(CholError::InvalidPartition(format!(
                "last block ends at {}, expected {}",
                last, n
            )));
        }
        for (k, w) in offsets.windows(2).enumerate() {
            if w[1] <= w[0] {
                return Err(CholError::InvalidPartition(format!(
                    "block {} has non-increasing extent [{}, {})",
                    k, w[0], w[1]
                )));
            }
        }
        Ok(Self { offsets })
    }

    /// Build from explicit `[lo, hi)` extents in block order.
    ///
    /// Each extent must start where the previous one ended; a gap or an
    /// overlap is rejected.
    pub fn from_extents(extents: &[(usize, usize)], n: usize) -> Result<Self> {
        let mut offsets = Vec::with_capacity(extents.len() + 1);
        let mut expected = 0;
        offsets.push(0);
        for (k, &(lo, hi)) in extents.iter().enumerate() {
            if lo < expected {
                return Err(CholError::InvalidPartition(format!(
                    "block {} starts at {} and overlaps previous block ending at {}",
                    k, lo, expected
                )));
            }
            if lo > expected {
                return Err(CholError::InvalidPartition(format!(
                    "gap [{}, {}) before block {}",
                    expected, lo, k
                )));
            }
            if hi <= lo {
                return Err(CholError::InvalidPartition(format!(
                    "block {} has empty or inverted extent [{}, {})",
                    k, lo, hi
                )));
            }
            offsets.push(hi);
            expected = hi;
        }
        Self::from_offsets(offsets, n)
    }

    /// Split `[0, n)` into `num_blocks` nearly equal blocks.
    pub fn uniform(n: usize, num_blocks: usize) -> Result<Self> {
        if num_blocks == 0 || num_blocks > n {
            return Err(CholError::InvalidPartition(format!(
                "cannot split {} rows into {} blocks",
                n, num_blocks
            )));
        }
        let base = n / num_blocks;
        let rem = n % num_blocks;
        let mut offsets = Vec::with_capacity(num_blocks + 1);
        offsets.push(0);
        let mut acc = 0;
        for k in 0..num_blocks {
            acc += base + usize::from(k < rem);
            offsets.push(acc);
        }
        Self::from_offsets(offsets, n)
    }

    /// Number of blocks.
    pub fn num_blocks(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Total number of rows covered.
    pub fn dim(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    /// Row extent of block `k`.
    #[inline]
    pub fn range_of(&self, k: usize) -> Range<usize> {
        self.offsets[k]..self.offsets[k + 1]
    }

    /// Number of rows in block `k`.
    #[inline]
    pub fn len_of(&self, k: usize) -> usize {
        self.offsets[k + 1] - self.offsets[k]
    }

    /// First row of block `k`.
    #[inline]
    pub fn start_of(&self, k: usize) -> usize {
        self.offsets[k]
    }

    /// Block whose extent contains `row`.
    ///
    /// # Panics
    ///
    /// Panics if `row >= self.dim()`.
    #[inline]
    pub fn block_containing(&self, row: usize) -> usize {
        assert!(row < self.dim(), "row {} outside [0, {})", row, self.dim());
        // partition_point returns the first boundary strictly greater than row
        self.offsets.partition_point(|&o| o <= row) - 1
    }

    /// Boundary offsets, `num_blocks() + 1` entries.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}
