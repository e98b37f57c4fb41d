//! Per-block views: a dense leaf or a grid of dense tiles.

use std::ops::Range;

use faer::MatMut;

use crate::scalar::Scalar;

/// One stored block of the hierarchical matrix.
///
/// A block whose row or column extent was split into several tiles is
/// `Nested`; tiles are leaves and are never split again.
#[derive(Debug)]
pub enum BlockView<'a, T> {
    Dense(MatMut<'a, T>),
    Nested(TileGrid<'a, T>),
}

/// Column-major grid of tiles; tile `(r, c)` sits at index `c * tile_rows + r`.
#[derive(Debug)]
pub struct TileGrid<'a, T> {
    row_offsets: Vec<usize>,
    col_offsets: Vec<usize>,
    tiles: Vec<MatMut<'a, T>>,
}

impl<'a, T: Scalar> BlockView<'a, T> {
    /// Split a block buffer along the given tile boundaries.
    ///
    /// `data` holds the block tile column by tile column; inside a tile column
    /// the tiles are stacked by tile row, each one column-major.
    pub fn split(data: &'a mut [T], row_offsets: &[usize], col_offsets: &[usize]) -> Self {
        let nrows = row_offsets[row_offsets.len() - 1];
        let ncols = col_offsets[col_offsets.len() - 1];
        debug_assert_eq!(data.len(), nrows * ncols);
        if row_offsets.len() == 2 && col_offsets.len() == 2 {
            return BlockView::Dense(MatMut::from_column_major_slice_mut(data, nrows, ncols));
        }
        let mut tiles = Vec::with_capacity((row_offsets.len() - 1) * (col_offsets.len() - 1));
        let mut rest = data;
        for cw in col_offsets.windows(2) {
            let w = cw[1] - cw[0];
            for rw in row_offsets.windows(2) {
                let h = rw[1] - rw[0];
                let (tile, tail) = std::mem::take(&mut rest).split_at_mut(h * w);
                rest = tail;
                tiles.push(MatMut::from_column_major_slice_mut(tile, h, w));
            }
        }
        BlockView::Nested(TileGrid {
            row_offsets: row_offsets.to_vec(),
            col_offsets: col_offsets.to_vec(),
            tiles,
        })
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, BlockView::Nested(_))
    }

    pub fn nrows(&self) -> usize {
        match self {
            BlockView::Dense(d) => d.nrows(),
            BlockView::Nested(g) => g.row_offsets[g.row_offsets.len() - 1],
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            BlockView::Dense(d) => d.ncols(),
            BlockView::Nested(g) => g.col_offsets[g.col_offsets.len() - 1],
        }
    }

    /// Number of tile rows.
    pub fn tile_rows(&self) -> usize {
        match self {
            BlockView::Dense(_) => 1,
            BlockView::Nested(g) => g.row_offsets.len() - 1,
        }
    }

    /// Number of tile columns.
    pub fn tile_cols(&self) -> usize {
        match self {
            BlockView::Dense(_) => 1,
            BlockView::Nested(g) => g.col_offsets.len() - 1,
        }
    }

    /// Rows of the block covered by tile row `t`.
    pub fn row_range(&self, t: usize) -> Range<usize> {
        match self {
            BlockView::Dense(d) => {
                debug_assert_eq!(t, 0);
                0..d.nrows()
            }
            BlockView::Nested(g) => g.row_offsets[t]..g.row_offsets[t + 1],
        }
    }

    /// Columns of the block covered by tile column `t`.
    pub fn col_range(&self, t: usize) -> Range<usize> {
        match self {
            BlockView::Dense(d) => {
                debug_assert_eq!(t, 0);
                0..d.ncols()
            }
            BlockView::Nested(g) => g.col_offsets[t]..g.col_offsets[t + 1],
        }
    }

    /// Tile `(r, c)`.
    pub fn tile(&self, r: usize, c: usize) -> &MatMut<'a, T> {
        let nr = self.tile_rows();
        &self.tiles()[c * nr + r]
    }

    /// All tiles in column-major grid order.
    pub fn tiles(&self) -> &[MatMut<'a, T>] {
        match self {
            BlockView::Dense(d) => std::slice::from_ref(d),
            BlockView::Nested(g) => &g.tiles,
        }
    }

    /// All tiles in column-major grid order, mutably.
    pub fn tiles_mut(&mut self) -> &mut [MatMut<'a, T>] {
        match self {
            BlockView::Dense(d) => std::slice::from_mut(d),
            BlockView::Nested(g) => &mut g.tiles,
        }
    }

    /// Entry `(i, j)` in block coordinates.
    pub fn get(&self, i: usize, j: usize) -> T {
        match self {
            BlockView::Dense(d) => d[(i, j)],
            BlockView::Nested(g) => {
                let r = g.row_offsets.partition_point(|&o| o <= i) - 1;
                let c = g.col_offsets.partition_point(|&o| o <= j) - 1;
                let nr = g.row_offsets.len() - 1;
                g.tiles[c * nr + r][(i - g.row_offsets[r], j - g.col_offsets[c])]
            }
        }
    }
}
