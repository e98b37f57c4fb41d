//! Blocked upper storage and its hierarchical view.

use faer::Mat;
use log::debug;
use parking_lot::RwLock;
use sprs::{CsMatI, SpIndex};

use super::{BlockStructure, BlockView, HierOptions, TileLayout};
use crate::error::Result;
use crate::ranges::BlockRanges;
use crate::scalar::Scalar;

/// Every stored upper block of a permuted matrix in one buffer.
///
/// Blocks follow the order of [`BlockStructure`] entries; each block is laid
/// out tile column by tile column as described by its [`TileLayout`].
#[derive(Debug, Clone)]
pub struct BlockedUpper<T> {
    values: Vec<T>,
    block_offsets: Vec<usize>,
    ranges: BlockRanges,
    structure: BlockStructure,
    tiles: TileLayout,
}

impl<T: Scalar> BlockedUpper<T> {
    /// Scatter the upper triangle of `upper` into blocked storage.
    ///
    /// The lower part of every diagonal block starts at zero.
    pub fn from_sparse<I, Iptr>(
        upper: &CsMatI<T, I, Iptr>,
        ranges: &BlockRanges,
        parent: &[Option<usize>],
        options: HierOptions,
    ) -> Result<Self>
    where
        I: SpIndex,
        Iptr: SpIndex,
    {
        let structure = BlockStructure::build(upper, ranges, parent)?;
        let tiles = TileLayout::new(ranges, options);

        let mut block_offsets = Vec::with_capacity(structure.num_stored() + 1);
        block_offsets.push(0);
        for e in 0..structure.num_stored() {
            let (i, j) = structure.entry(e);
            let len = ranges.len_of(i) * ranges.len_of(j);
            block_offsets.push(block_offsets[e] + len);
        }
        let mut values = vec![T::zero(); block_offsets[structure.num_stored()]];

        for (val, (r, c)) in upper.iter() {
            let (r, c) = (r.index(), c.index());
            if r > c {
                continue;
            }
            let (bi, bj) = (ranges.block_containing(r), ranges.block_containing(c));
            // build() already stored every block touched by an entry
            if let Some(e) = structure.find(bi, bj) {
                let p = tiles.position(bi, bj, r - ranges.start_of(bi), c - ranges.start_of(bj));
                values[block_offsets[e] + p] = *val;
            }
        }

        debug!(
            "blocked storage: n = {}, {} blocks, {} stored, {} values",
            ranges.dim(),
            ranges.num_blocks(),
            structure.num_stored(),
            values.len()
        );
        Ok(Self {
            values,
            block_offsets,
            ranges: ranges.clone(),
            structure,
            tiles,
        })
    }

    pub fn ranges(&self) -> &BlockRanges {
        &self.ranges
    }

    pub fn structure(&self) -> &BlockStructure {
        &self.structure
    }

    pub fn tiles(&self) -> &TileLayout {
        &self.tiles
    }

    /// Matrix dimension.
    pub fn dim(&self) -> usize {
        self.ranges.dim()
    }

    /// Entry `(r, c)` of the upper triangle; zero outside stored blocks.
    pub fn get(&self, r: usize, c: usize) -> T {
        if r > c {
            return T::zero();
        }
        let (bi, bj) = (
            self.ranges.block_containing(r),
            self.ranges.block_containing(c),
        );
        match self.structure.find(bi, bj) {
            Some(e) => {
                let p = self.tiles.position(
                    bi,
                    bj,
                    r - self.ranges.start_of(bi),
                    c - self.ranges.start_of(bj),
                );
                self.values[self.block_offsets[e] + p]
            }
            None => T::zero(),
        }
    }

    /// Reassemble the upper triangle as a dense matrix.
    pub fn to_dense(&self) -> Mat<T> {
        let n = self.dim();
        let mut out = Mat::zeros(n, n);
        for e in 0..self.structure.num_stored() {
            let (bi, bj) = self.structure.entry(e);
            let base = self.block_offsets[e];
            for r in self.ranges.range_of(bi) {
                for c in self.ranges.range_of(bj) {
                    if r > c {
                        continue;
                    }
                    let p = self.tiles.position(
                        bi,
                        bj,
                        r - self.ranges.start_of(bi),
                        c - self.ranges.start_of(bj),
                    );
                    out[(r, c)] = self.values[base + p];
                }
            }
        }
        out
    }

    /// Split the buffer into per-block views. No values are copied.
    pub fn hier_view(&mut self) -> HierMatrix<'_, T> {
        let BlockedUpper {
            values,
            ranges,
            structure,
            tiles,
            ..
        } = self;
        let mut rest: &mut [T] = values;
        let mut blocks = Vec::with_capacity(structure.num_stored());
        let mut nested = 0;
        for e in 0..structure.num_stored() {
            let (i, j) = structure.entry(e);
            let len = ranges.len_of(i) * ranges.len_of(j);
            let (block, tail) = std::mem::take(&mut rest).split_at_mut(len);
            rest = tail;
            let view = BlockView::split(block, tiles.offsets(i), tiles.offsets(j));
            nested += usize::from(view.is_nested());
            blocks.push(RwLock::new(view));
        }
        debug!(
            "hierarchical view: {} blocks ({} nested)",
            blocks.len(),
            nested
        );
        HierMatrix {
            ranges,
            structure,
            blocks,
        }
    }
}

/// Per-block views over a [`BlockedUpper`] buffer.
///
/// Each block sits behind its own lock so tasks on different threads can
/// share the view; task dependencies keep the locks uncontended.
#[derive(Debug)]
pub struct HierMatrix<'a, T> {
    ranges: &'a BlockRanges,
    structure: &'a BlockStructure,
    blocks: Vec<RwLock<BlockView<'a, T>>>,
}

impl<'a, T: Scalar> HierMatrix<'a, T> {
    pub fn ranges(&self) -> &'a BlockRanges {
        self.ranges
    }

    pub fn structure(&self) -> &'a BlockStructure {
        self.structure
    }

    pub fn num_blocks(&self) -> usize {
        self.ranges.num_blocks()
    }

    /// Block for structure entry `e`.
    pub fn entry(&self, e: usize) -> &RwLock<BlockView<'a, T>> {
        &self.blocks[e]
    }

    /// Block `(i, j)`, if stored.
    pub fn block(&self, i: usize, j: usize) -> Option<&RwLock<BlockView<'a, T>>> {
        self.structure.find(i, j).map(|e| &self.blocks[e])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::{from_triplets, to_dense};

    fn tridiag(n: usize) -> sprs::CsMat<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, 4.0 + i as f64));
            if i + 1 < n {
                t.push((i, i + 1, -1.0 - i as f64 * 0.5));
            }
        }
        from_triplets(n, n, t)
    }

    fn chain(nb: usize) -> Vec<Option<usize>> {
        (0..nb).map(|k| if k + 1 < nb { Some(k + 1) } else { None }).collect()
    }

    #[test]
    fn test_roundtrip_dense_and_tiled() {
        let a = tridiag(9);
        let ranges = BlockRanges::from_offsets(vec![0, 4, 9], 9).unwrap();
        for options in [HierOptions::flat(), HierOptions::tiled(2)] {
            let blocked = BlockedUpper::from_sparse(&a, &ranges, &chain(2), options).unwrap();
            assert_eq!(blocked.to_dense(), to_dense(&a));
            assert_eq!(blocked.get(3, 4), -2.5);
            assert_eq!(blocked.get(4, 3), 0.0);
            assert_eq!(blocked.get(0, 8), 0.0);
        }
    }

    #[test]
    fn test_hier_view_aliases_storage() {
        let a = tridiag(6);
        let ranges = BlockRanges::uniform(6, 2).unwrap();
        let mut blocked =
            BlockedUpper::from_sparse(&a, &ranges, &chain(2), HierOptions::tiled(2)).unwrap();
        {
            let hier = blocked.hier_view();
            assert_eq!(hier.num_blocks(), 2);
            assert!(hier.block(1, 0).is_none());
            let (r, c) = (2, 3);
            let lock = hier.block(0, 1).unwrap();
            assert_eq!(lock.read().get(r, c - 3), -2.0);
            let mut guard = lock.write();
            for t in guard.tiles_mut() {
                for j in 0..t.ncols() {
                    for i in 0..t.nrows() {
                        t[(i, j)] = 7.0;
                    }
                }
            }
        }
        assert_eq!(blocked.get(0, 3), 7.0);
        assert_eq!(blocked.get(2, 5), 7.0);
        assert_eq!(blocked.get(0, 0), 4.0);
    }

    #[test]
    fn test_nested_flag_follows_layout() {
        let a = tridiag(5);
        let ranges = BlockRanges::from_offsets(vec![0, 1, 5], 5).unwrap();
        let mut blocked =
            BlockedUpper::from_sparse(&a, &ranges, &chain(2), HierOptions::tiled(2)).unwrap();
        let hier = blocked.hier_view();
        assert!(!hier.block(0, 0).unwrap().read().is_nested());
        assert!(hier.block(0, 1).unwrap().read().is_nested());
        assert!(hier.block(1, 1).unwrap().read().is_nested());
    }
}
