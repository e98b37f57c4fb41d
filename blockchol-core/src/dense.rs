//! Dense helpers on faer matrices.
//!
//! Right-hand sides, solutions and dense copies of factors are plain
//! `faer::Mat`s; block storage is viewed through `MatRef`/`MatMut`.

use faer::linalg::matmul::matmul;
use faer::{Accum, Mat, MatRef, Par};

use crate::error::{CholError, Result};
use crate::scalar::Scalar;

/// Largest entrywise modulus of `a - b`.
pub fn max_abs_diff<T: Scalar>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> Result<T::Magnitude> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(CholError::DimensionMismatch {
            what: "compared matrices",
            expected: a.nrows() * a.ncols(),
            actual: b.nrows() * b.ncols(),
        });
    }
    let mut max = <T::Magnitude as num_traits::Zero>::zero();
    for j in 0..a.ncols() {
        for i in 0..a.nrows() {
            max = num_traits::Float::max(max, (a[(i, j)] - b[(i, j)]).modulus());
        }
    }
    Ok(max)
}

/// `aᴴ b`.
pub fn adjoint_mul<T: Scalar>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> Result<Mat<T>> {
    if a.nrows() != b.nrows() {
        return Err(CholError::DimensionMismatch {
            what: "adjoint product",
            expected: a.nrows(),
            actual: b.nrows(),
        });
    }
    let mut out = Mat::zeros(a.ncols(), b.ncols());
    matmul(out.as_mut(), Accum::Replace, a.adjoint(), b, T::one(), Par::Seq);
    Ok(out)
}

/// `a b`.
pub fn mul<T: Scalar>(a: MatRef<'_, T>, b: MatRef<'_, T>) -> Result<Mat<T>> {
    if a.ncols() != b.nrows() {
        return Err(CholError::DimensionMismatch {
            what: "matrix product",
            expected: a.ncols(),
            actual: b.nrows(),
        });
    }
    let mut out = Mat::zeros(a.nrows(), b.ncols());
    matmul(out.as_mut(), Accum::Replace, a, b, T::one(), Par::Seq);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_products() {
        // a = [[1, 2], [3, 4]]
        let a = Mat::from_fn(2, 2, |i, j| (1 + 2 * i + j) as f64);
        let p = mul(a.as_ref(), a.as_ref()).unwrap();
        assert_eq!(p[(0, 0)], 7.0);
        assert_eq!(p[(1, 1)], 22.0);
        // aᵀ a = [[10, 14], [14, 20]]
        let g = adjoint_mul(a.as_ref(), a.as_ref()).unwrap();
        assert_eq!(g[(0, 1)], 14.0);
        assert_eq!(g[(1, 1)], 20.0);
    }

    #[test]
    fn test_adjoint_conjugates() {
        let z = Complex64::new(0.0, 1.0);
        let a = Mat::from_fn(1, 1, |_, _| z);
        let g = adjoint_mul(a.as_ref(), a.as_ref()).unwrap();
        assert_eq!(g[(0, 0)], Complex64::new(1.0, 0.0));
    }

    #[test]
    fn test_shape_checks() {
        let a = Mat::<f64>::zeros(2, 2);
        let b = Mat::<f64>::zeros(2, 3);
        assert!(max_abs_diff(a.as_ref(), b.as_ref()).is_err());
        assert!(mul(b.as_ref(), a.as_ref()).is_err());
        assert_eq!(max_abs_diff(a.as_ref(), a.as_ref()).unwrap(), 0.0);
    }
}
