//! Symmetric permutations.

use faer::Mat;
use sprs::{CsMatI, SpIndex, TriMatI};

use crate::error::{CholError, Result};
use crate::scalar::Scalar;

/// Bijection over `[0, n)` stored in both directions.
///
/// `forward[new] = old` and `inverse[old] = new`, so the permuted matrix is
/// `PA[new_i, new_j] = A[forward[new_i], forward[new_j]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permutation {
    forward: Vec<usize>,
    inverse: Vec<usize>,
}

impl Permutation {
    /// Identity permutation of size `n`.
    pub fn identity(n: usize) -> Self {
        let forward: Vec<usize> = (0..n).collect();
        Self {
            inverse: forward.clone(),
            forward,
        }
    }

    /// Build from the forward array, checking it is a bijection.
    pub fn new(forward: Vec<usize>) -> Result<Self> {
        let n = forward.len();
        let mut inverse = vec![usize::MAX; n];
        for (new, &old) in forward.iter().enumerate() {
            if old >= n {
                return Err(CholError::InvalidPermutation(format!(
                    "entry {} maps to {} outside [0, {})",
                    new, old, n
                )));
            }
            if inverse[old] != usize::MAX {
                return Err(CholError::InvalidPermutation(format!(
                    "index {} appears twice",
                    old
                )));
            }
            inverse[old] = new;
        }
        Ok(Self { forward, inverse })
    }

    /// Build from both arrays, checking `inverse[forward[i]] == i`.
    pub fn from_parts(forward: Vec<usize>, inverse: Vec<usize>) -> Result<Self> {
        let perm = Self::new(forward)?;
        if perm.inverse != inverse {
            return Err(CholError::InvalidPermutation(
                "inverse array does not invert the forward array".to_string(),
            ));
        }
        Ok(perm)
    }

    /// Dimension.
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the permutation is empty.
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// `forward[new] = old`.
    pub fn forward(&self) -> &[usize] {
        &self.forward
    }

    /// `inverse[old] = new`.
    pub fn inverse(&self) -> &[usize] {
        &self.inverse
    }

    /// Upper triangle of `P A Pᵀ` as a CSR matrix.
    ///
    /// `a` is read through its upper triangle only, so both full and
    /// upper-only storage are accepted. An entry that lands below the
    /// diagonal after permutation is stored at its mirror position,
    /// conjugated.
    pub fn permute_upper<T, I, Iptr>(&self, a: &CsMatI<T, I, Iptr>) -> Result<CsMatI<T, I, Iptr>>
    where
        T: Scalar,
        I: SpIndex,
        Iptr: SpIndex,
    {
        let n = self.len();
        if a.rows() != n || a.cols() != n {
            return Err(CholError::DimensionMismatch {
                what: "permuted matrix",
                expected: n,
                actual: a.rows().max(a.cols()),
            });
        }
        let mut tri = TriMatI::<T, I>::with_capacity((n, n), a.nnz() / 2 + n);
        for (val, (row, col)) in a.iter() {
            let (row, col) = (row.index(), col.index());
            if row > col {
                continue;
            }
            let pi = self.inverse[row];
            let pj = self.inverse[col];
            if pi <= pj {
                tri.add_triplet(pi, pj, *val);
            } else {
                tri.add_triplet(pj, pi, Scalar::conj(*val));
            }
        }
        Ok(tri.to_csr())
    }

    /// Rows of `b` in permuted order: `out[new, :] = b[forward[new], :]`.
    pub fn apply_rows<T: Scalar>(&self, b: &Mat<T>) -> Result<Mat<T>> {
        self.check_rows(b)?;
        Ok(Mat::from_fn(b.nrows(), b.ncols(), |i, j| {
            b[(self.forward[i], j)]
        }))
    }

    /// Undo [`Permutation::apply_rows`]: `out[old, :] = b[inverse[old], :]`.
    pub fn unapply_rows<T: Scalar>(&self, b: &Mat<T>) -> Result<Mat<T>> {
        self.check_rows(b)?;
        Ok(Mat::from_fn(b.nrows(), b.ncols(), |i, j| {
            b[(self.inverse[i], j)]
        }))
    }

    fn check_rows<T: Scalar>(&self, b: &Mat<T>) -> Result<()> {
        if b.nrows() != self.len() {
            return Err(CholError::DimensionMismatch {
                what: "permuted rows",
                expected: self.len(),
                actual: b.nrows(),
            });
        }
        Ok(())
    }
}
