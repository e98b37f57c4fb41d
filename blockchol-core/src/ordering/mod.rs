//! Fill-reducing permutations with their block partition.
//!
//! A [`BlockOrdering`] is what the factorization consumes: the symmetric
//! permutation, the block range table over the permuted indices, and the
//! block elimination tree.

mod graph;

pub use graph::SparsityGraph;

use log::debug;
use sprs::{CsMatI, SpIndex};

use crate::error::{CholError, Result};
use crate::hier::{validate_tree, BlockStructure};
use crate::perm::Permutation;
use crate::ranges::BlockRanges;
use crate::scalar::Scalar;

#[derive(Debug, Clone, PartialEq)]
pub struct BlockOrdering {
    perm: Permutation,
    ranges: BlockRanges,
    tree: Vec<Option<usize>>,
}

impl BlockOrdering {
    /// Bundle an externally computed ordering, checking that the pieces
    /// agree with each other.
    pub fn new(perm: Permutation, ranges: BlockRanges, tree: Vec<Option<usize>>) -> Result<Self> {
        if perm.len() != ranges.dim() {
            return Err(CholError::DimensionMismatch {
                what: "permutation length",
                expected: ranges.dim(),
                actual: perm.len(),
            });
        }
        validate_tree(&tree, ranges.num_blocks())?;
        Ok(Self { perm, ranges, tree })
    }

    /// Identity permutation with `num_blocks` uniform blocks.
    pub fn natural<T, I, Iptr>(a: &CsMatI<T, I, Iptr>, num_blocks: usize) -> Result<Self>
    where
        T: Scalar,
        I: SpIndex,
        Iptr: SpIndex,
    {
        Self::with_permutation(a, Permutation::identity(a.rows()), num_blocks)
    }

    /// Minimum degree permutation with `num_blocks` uniform blocks.
    pub fn minimum_degree<T, I, Iptr>(a: &CsMatI<T, I, Iptr>, num_blocks: usize) -> Result<Self>
    where
        T: Scalar,
        I: SpIndex,
        Iptr: SpIndex,
    {
        let order = SparsityGraph::from_matrix(a).minimum_degree_ordering();
        Self::with_permutation(a, Permutation::new(order)?, num_blocks)
    }

    /// Uniform blocks over `perm`; the tree comes from the block fill of the
    /// permuted matrix.
    pub fn with_permutation<T, I, Iptr>(
        a: &CsMatI<T, I, Iptr>,
        perm: Permutation,
        num_blocks: usize,
    ) -> Result<Self>
    where
        T: Scalar,
        I: SpIndex,
        Iptr: SpIndex,
    {
        let ranges = BlockRanges::uniform(a.rows(), num_blocks)?;
        let upper = perm.permute_upper(a)?;
        let tree = BlockStructure::elimination_tree(&upper, &ranges)?;
        debug!(
            "ordering: n = {}, {} blocks, {} tree roots",
            a.rows(),
            ranges.num_blocks(),
            tree.iter().filter(|p| p.is_none()).count()
        );
        Self::new(perm, ranges, tree)
    }

    pub fn perm(&self) -> &Permutation {
        &self.perm
    }

    pub fn ranges(&self) -> &BlockRanges {
        &self.ranges
    }

    /// Parent of each block in the block elimination tree.
    pub fn tree(&self) -> &[Option<usize>] {
        &self.tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::from_triplets;

    fn arrow(n: usize) -> sprs::CsMat<f64> {
        let mut t = Vec::new();
        for i in 0..n {
            t.push((i, i, n as f64));
            if i > 0 {
                t.push((0, i, 1.0));
            }
        }
        from_triplets(n, n, t)
    }

    #[test]
    fn test_natural_ordering_of_arrow_is_a_chain() {
        let o = BlockOrdering::natural(&arrow(6), 3).unwrap();
        assert_eq!(o.ranges().offsets(), &[0, 2, 4, 6]);
        assert_eq!(o.tree(), &[Some(1), Some(2), None]);
    }

    #[test]
    fn test_minimum_degree_moves_hub_back() {
        let o = BlockOrdering::minimum_degree(&arrow(6), 3).unwrap();
        assert_eq!(o.perm().forward(), &[1, 2, 3, 4, 0, 5]);
        // Leaves only couple to the last block
        assert_eq!(o.tree(), &[Some(2), Some(2), None]);
    }

    #[test]
    fn test_new_checks_consistency() {
        let ranges = BlockRanges::uniform(4, 2).unwrap();
        assert!(matches!(
            BlockOrdering::new(Permutation::identity(5), ranges.clone(), vec![Some(1), None]),
            Err(CholError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            BlockOrdering::new(Permutation::identity(4), ranges.clone(), vec![None, Some(0)]),
            Err(CholError::InvalidPartition(_))
        ));
        assert!(BlockOrdering::new(Permutation::identity(4), ranges, vec![None, None]).is_ok());
    }
}
