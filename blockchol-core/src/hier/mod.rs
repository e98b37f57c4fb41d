//! Hierarchical matrix views.
//!
//! The permuted upper matrix is scattered once into [`BlockedUpper`], one
//! contiguous buffer holding every stored block. [`HierMatrix`] then splits
//! that buffer into per-block views without copying, and [`DenseBlocks`]
//! does the same for a right-hand side.

mod block;
mod dense;
mod sparse;
mod structure;

pub use block::{BlockView, TileGrid};
pub use dense::{DenseBlocks, HierDense};
pub use sparse::{BlockedUpper, HierMatrix};
pub use structure::BlockStructure;
pub(crate) use structure::validate_tree;

use crate::ranges::BlockRanges;

/// How far large blocks are split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierOptions {
    /// Zero keeps every block a dense leaf; any positive depth tiles blocks
    /// larger than `leaf_size` (tiles are not split again).
    pub max_depth: usize,
    /// Target tile extent
    pub leaf_size: usize,
}

impl Default for HierOptions {
    fn default() -> Self {
        Self {
            max_depth: 0,
            leaf_size: 256,
        }
    }
}

impl HierOptions {
    /// Dense leaves only.
    pub fn flat() -> Self {
        Self {
            max_depth: 0,
            ..Self::default()
        }
    }

    /// One level of tiles of at most `leaf_size` rows/columns.
    pub fn tiled(leaf_size: usize) -> Self {
        Self {
            max_depth: 1,
            leaf_size,
        }
    }
}

/// Tile boundaries of every block range, relative to the block start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileLayout {
    offsets: Vec<Vec<usize>>,
}

impl TileLayout {
    pub fn new(ranges: &BlockRanges, options: HierOptions) -> Self {
        let split = options.max_depth > 0 && options.leaf_size > 0;
        let offsets = (0..ranges.num_blocks())
            .map(|k| {
                let len = ranges.len_of(k);
                if split && len > options.leaf_size {
                    let mut o: Vec<usize> = (0..len).step_by(options.leaf_size).collect();
                    o.push(len);
                    o
                } else {
                    vec![0, len]
                }
            })
            .collect();
        Self { offsets }
    }

    /// Tile boundaries of block range `k`, `[0, .., len]`.
    pub fn offsets(&self, k: usize) -> &[usize] {
        &self.offsets[k]
    }

    /// Number of tiles along block range `k`.
    pub fn num_tiles(&self, k: usize) -> usize {
        self.offsets[k].len() - 1
    }

    /// Whether block `(i, j)` is stored as a tile grid.
    pub fn is_nested(&self, i: usize, j: usize) -> bool {
        self.num_tiles(i) > 1 || self.num_tiles(j) > 1
    }

    /// Position of block-local `(r, c)` inside the buffer of block `(i, j)`.
    pub fn position(&self, i: usize, j: usize, r: usize, c: usize) -> usize {
        let ro = &self.offsets[i];
        let co = &self.offsets[j];
        let nrows = ro[ro.len() - 1];
        let tr = ro.partition_point(|&o| o <= r) - 1;
        let tc = co.partition_point(|&o| o <= c) - 1;
        let (rs, cs) = (ro[tr], co[tc]);
        let h = ro[tr + 1] - rs;
        let w = co[tc + 1] - cs;
        nrows * cs + rs * w + (r - rs) + (c - cs) * h
    }
}
