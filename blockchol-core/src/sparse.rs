//! Flat sparse matrix helpers.
//!
//! The engine consumes `sprs` compressed matrices. Hermitian matrices are
//! read through their upper triangle; any stored lower entries are ignored,
//! so full and upper-only storage behave the same.

use faer::Mat;
use sprs::{CsMat, CsMatI, SpIndex, TriMat};

use crate::dense::max_abs_diff;
use crate::error::{CholError, Result};
use crate::scalar::Scalar;

/// Build a CSR matrix from `(row, col, value)` triplets. Duplicates are summed.
pub fn from_triplets<T, It>(nrows: usize, ncols: usize, triplets: It) -> CsMat<T>
where
    T: Scalar,
    It: IntoIterator<Item = (usize, usize, T)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csr()
}

/// Build a full Hermitian CSR matrix from upper-triangle triplets.
///
/// Each off-diagonal `(i, j, v)` also stores `(j, i, conj(v))`. A triplet
/// below the diagonal or outside `n x n` is a `DimensionMismatch`.
pub fn hermitian_from_upper<T, It>(n: usize, triplets: It) -> Result<CsMat<T>>
where
    T: Scalar,
    It: IntoIterator<Item = (usize, usize, T)>,
{
    let mut tri = TriMat::new((n, n));
    for (i, j, v) in triplets {
        if i >= n || j >= n {
            return Err(CholError::DimensionMismatch {
                what: "Hermitian triplet index",
                expected: n,
                actual: i.max(j),
            });
        }
        if j < i {
            return Err(CholError::DimensionMismatch {
                what: "Hermitian triplet column (upper triangle only)",
                expected: i,
                actual: j,
            });
        }
        tri.add_triplet(i, j, v);
        if i != j {
            tri.add_triplet(j, i, v.conj());
        }
    }
    Ok(tri.to_csr())
}

/// Dense copy of every stored entry.
pub fn to_dense<T, I, Iptr>(a: &CsMatI<T, I, Iptr>) -> Mat<T>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut out = Mat::zeros(a.rows(), a.cols());
    for (val, (row, col)) in a.iter() {
        out[(row.index(), col.index())] += *val;
    }
    out
}

/// Dense copy of the Hermitian matrix defined by the upper triangle of `a`.
pub fn hermitian_to_dense<T, I, Iptr>(a: &CsMatI<T, I, Iptr>) -> Mat<T>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut out = Mat::zeros(a.rows(), a.cols());
    for (val, (row, col)) in a.iter() {
        let (r, c) = (row.index(), col.index());
        if r > c {
            continue;
        }
        out[(r, c)] = *val;
        if r != c {
            out[(c, r)] = val.conj();
        }
    }
    out
}

/// `Y = A X` with `A` the Hermitian matrix defined by the upper triangle of `a`.
pub fn hermitian_mul<T, I, Iptr>(a: &CsMatI<T, I, Iptr>, x: &Mat<T>) -> Result<Mat<T>>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    if a.rows() != a.cols() || a.cols() != x.nrows() {
        return Err(CholError::DimensionMismatch {
            what: "Hermitian product",
            expected: a.cols(),
            actual: x.nrows(),
        });
    }
    let mut y = Mat::zeros(a.rows(), x.ncols());
    for (val, (row, col)) in a.iter() {
        let (r, c) = (row.index(), col.index());
        if r > c {
            continue;
        }
        let v = *val;
        for j in 0..x.ncols() {
            y[(r, j)] += v * x[(c, j)];
            if r != c {
                y[(c, j)] += v.conj() * x[(r, j)];
            }
        }
    }
    Ok(y)
}

/// Largest entry of `|A X - B|`, `A` read through its upper triangle.
pub fn residual_max<T, I, Iptr>(
    a: &CsMatI<T, I, Iptr>,
    x: &Mat<T>,
    b: &Mat<T>,
) -> Result<T::Magnitude>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    max_abs_diff(hermitian_mul(a, x)?.as_ref(), b.as_ref())
}

/// Upper triangle of `a` (lower entries dropped), preserving index types.
pub fn upper_triangle<T, I, Iptr>(a: &CsMatI<T, I, Iptr>) -> CsMatI<T, I, Iptr>
where
    T: Scalar,
    I: SpIndex,
    Iptr: SpIndex,
{
    let mut tri = sprs::TriMatI::<T, I>::new((a.rows(), a.cols()));
    for (val, (row, col)) in a.iter() {
        if row.index() <= col.index() {
            tri.add_triplet(row.index(), col.index(), *val);
        }
    }
    tri.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_from_triplets() {
        let mat = from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 2.0), (0, 1, 3.0)]);
        assert_eq!(mat.rows(), 2);
        assert_eq!(mat.cols(), 2);
        assert_eq!(mat.nnz(), 3);
        assert!(mat.is_csr());
    }

    #[test]
    fn test_hermitian_from_upper_mirrors() {
        let z = Complex64::new(1.0, -1.0);
        let one = Complex64::new(1.0, 0.0);
        let a = hermitian_from_upper(2, vec![(0, 0, one), (0, 1, z), (1, 1, one)]).unwrap();
        assert_eq!(a.nnz(), 4);
        assert_eq!(a.get(1, 0).copied(), Some(z.conj()));
        let d = to_dense(&a);
        assert_eq!(d, hermitian_to_dense(&upper_triangle(&a)));
    }

    #[test]
    fn test_hermitian_mul_matches_dense() {
        // [[4, 1], [1, 3]] * [1, 2] = [6, 7]
        let upper = from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 1, 3.0)]);
        let x = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let y: Mat<f64> = hermitian_mul(&upper, &x).unwrap();
        assert!((y[(0, 0)] - 6.0).abs() < 1e-14);
        assert!((y[(1, 0)] - 7.0).abs() < 1e-14);
        assert!(residual_max(&upper, &x, &y).unwrap() < 1e-14);
    }

    #[test]
    fn test_lower_entries_are_ignored() {
        let full = hermitian_from_upper(2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 2.0)]).unwrap();
        let upper = upper_triangle(&full);
        assert_eq!(upper.nnz(), 3);
        let x = Mat::from_fn(2, 3, |i, j| (i + j) as f64);
        assert_eq!(
            hermitian_mul(&full, &x).unwrap(),
            hermitian_mul(&upper, &x).unwrap()
        );
    }

    #[test]
    fn test_shape_mismatch() {
        let a = from_triplets(2, 2, vec![(0, 0, 1.0)]);
        let x = Mat::<f64>::zeros(3, 1);
        assert!(matches!(
            hermitian_mul(&a, &x),
            Err(CholError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_hermitian_builder_rejects_lower_and_out_of_range() {
        assert!(matches!(
            hermitian_from_upper(3, vec![(0, 0, 1.0), (2, 1, 0.5)]),
            Err(CholError::DimensionMismatch { expected: 2, actual: 1, .. })
        ));
        assert!(matches!(
            hermitian_from_upper(3, vec![(0, 3, 1.0)]),
            Err(CholError::DimensionMismatch { expected: 3, actual: 3, .. })
        ));
    }
}
