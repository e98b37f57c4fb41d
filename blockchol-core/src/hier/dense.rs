//! By-blocks copy of a dense right-hand side.

use faer::{Mat, MatMut};
use parking_lot::RwLock;

use crate::error::{CholError, Result};
use crate::ranges::BlockRanges;
use crate::scalar::Scalar;

/// Right-hand side stored per `(row block, column chunk)`.
///
/// Row blocks follow the factor's ranges. Columns are chunked by `nb`
/// (zero keeps one chunk). Block `(i, c)` is contiguous and column-major.
#[derive(Debug, Clone)]
pub struct DenseBlocks<T> {
    values: Vec<T>,
    ranges: BlockRanges,
    col_offsets: Vec<usize>,
}

impl<T: Scalar> DenseBlocks<T> {
    /// Copy `b` into per-block storage.
    pub fn from_flat(b: &Mat<T>, ranges: &BlockRanges, nb: usize) -> Result<Self> {
        if b.nrows() != ranges.dim() {
            return Err(CholError::DimensionMismatch {
                what: "right-hand side rows",
                expected: ranges.dim(),
                actual: b.nrows(),
            });
        }
        let ncols = b.ncols();
        let step = if nb == 0 { ncols.max(1) } else { nb };
        let mut col_offsets: Vec<usize> = (0..ncols).step_by(step).collect();
        col_offsets.push(ncols);

        let mut values = Vec::with_capacity(b.nrows() * ncols);
        for i in 0..ranges.num_blocks() {
            let rows = ranges.range_of(i);
            for cw in col_offsets.windows(2) {
                for j in cw[0]..cw[1] {
                    values.extend(rows.clone().map(|r| b[(r, j)]));
                }
            }
        }
        Ok(Self {
            values,
            ranges: ranges.clone(),
            col_offsets,
        })
    }

    pub fn ranges(&self) -> &BlockRanges {
        &self.ranges
    }

    pub fn ncols(&self) -> usize {
        self.col_offsets[self.col_offsets.len() - 1]
    }

    /// Number of column chunks.
    pub fn num_col_chunks(&self) -> usize {
        self.col_offsets.len() - 1
    }

    /// Copy the blocks back into `out`.
    pub fn copy_to_flat(&self, out: &mut Mat<T>) -> Result<()> {
        if out.nrows() != self.ranges.dim() || out.ncols() != self.ncols() {
            return Err(CholError::DimensionMismatch {
                what: "flat right-hand side",
                expected: self.ranges.dim() * self.ncols(),
                actual: out.nrows() * out.ncols(),
            });
        }
        let mut pos = 0;
        for i in 0..self.ranges.num_blocks() {
            let rows = self.ranges.range_of(i);
            let h = rows.len();
            for j in 0..self.ncols() {
                for (off, r) in rows.clone().enumerate() {
                    out[(r, j)] = self.values[pos + off];
                }
                pos += h;
            }
        }
        Ok(())
    }

    /// New flat matrix holding the blocks.
    pub fn to_flat(&self) -> Mat<T> {
        let mut out = Mat::zeros(self.ranges.dim(), self.ncols());
        // Shapes agree by construction
        let _ = self.copy_to_flat(&mut out);
        out
    }

    /// Split the storage into per-block views. No values are copied.
    pub fn hier_view(&mut self) -> HierDense<'_, T> {
        let DenseBlocks {
            values,
            ranges,
            col_offsets,
        } = self;
        let mut rest: &mut [T] = values;
        let mut blocks = Vec::with_capacity(ranges.num_blocks() * (col_offsets.len() - 1));
        for i in 0..ranges.num_blocks() {
            let h = ranges.len_of(i);
            for cw in col_offsets.windows(2) {
                let w = cw[1] - cw[0];
                let (block, tail) = std::mem::take(&mut rest).split_at_mut(h * w);
                rest = tail;
                blocks.push(RwLock::new(MatMut::from_column_major_slice_mut(block, h, w)));
            }
        }
        HierDense {
            ranges,
            col_offsets,
            blocks,
        }
    }
}

/// Per-block views over a [`DenseBlocks`] buffer.
#[derive(Debug)]
pub struct HierDense<'a, T> {
    ranges: &'a BlockRanges,
    col_offsets: &'a [usize],
    blocks: Vec<RwLock<MatMut<'a, T>>>,
}

impl<'a, T> HierDense<'a, T> {
    pub fn ranges(&self) -> &'a BlockRanges {
        self.ranges
    }

    pub fn num_col_chunks(&self) -> usize {
        self.col_offsets.len() - 1
    }

    /// Block of row block `i` and column chunk `c`.
    pub fn block(&self, i: usize, c: usize) -> &RwLock<MatMut<'a, T>> {
        &self.blocks[i * self.num_col_chunks() + c]
    }
}
