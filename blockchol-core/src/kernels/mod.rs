//! Dense leaf kernels.
//!
//! Thin wrappers over faer's Cholesky, triangular solve and matrix product.
//! Leaves hold the upper triangle of `U` column-major; the kernels pick the
//! faer routine matching the requested operator. `Par` comes from the team
//! running the task, so faer splits its loops over the team's pool.

pub mod tiled;

use faer::dyn_stack::{MemBuffer, MemStack};
use faer::linalg::cholesky::llt::factor::{
    cholesky_in_place, cholesky_in_place_scratch, LltError, LltRegularization,
};
use faer::linalg::matmul::triangular::{self, BlockStructure as Shape};
use faer::linalg::matmul::matmul;
use faer::linalg::triangular_solve as tri;
use faer::prelude::ReborrowMut;
use faer::{Accum, MatMut, MatRef, Par, Spec};
use rayon::prelude::*;

use crate::scalar::Scalar;

pub use tiled::{block_gemv, block_potrf, block_trsm, block_trsv, block_update};

/// Operator applied to the triangular factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    /// `U`
    NoTranspose,
    /// `Uᵀ`
    Transpose,
    /// `Uᴴ`
    ConjTranspose,
}

impl Trans {
    #[inline]
    pub(crate) fn apply<T: Scalar>(self, v: T) -> T {
        match self {
            Trans::ConjTranspose => v.conj(),
            _ => v,
        }
    }
}

/// Whether the factor's diagonal is taken as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diag {
    Unit,
    NonUnit,
}

/// Side the triangular factor is applied from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Non-positive pivot found by [`potrf_upper`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotFailure {
    /// Row of the pivot inside the factored matrix
    pub index: usize,
    /// Real part of the pivot
    pub pivot: f64,
}

/// Apply `f(i, item)` to every item, in parallel when allowed.
pub(crate) fn for_each_item<I, F>(items: Vec<I>, par: Par, f: F)
where
    I: Send,
    F: Fn(usize, I) + Send + Sync,
{
    match par {
        Par::Seq => items.into_iter().enumerate().for_each(|(i, x)| f(i, x)),
        _ => items
            .into_par_iter()
            .enumerate()
            .for_each(|(i, x)| f(i, x)),
    }
}

/// In-place upper Cholesky `A = Uᴴ U` of a square leaf.
///
/// Only the upper triangle is read and written. faer factors the lower
/// triangle of `Aᵀ = conj(A)` as `L Lᴴ`, and `Lᵀ` is exactly `U`, so the
/// transposed view lets faer write `U` in place.
pub fn potrf_upper<T: Scalar>(mut a: MatMut<'_, T>, par: Par) -> Result<(), PivotFailure> {
    let n = a.nrows();
    debug_assert_eq!(n, a.ncols());
    let diag: Vec<T::Magnitude> = (0..n).map(|j| a[(j, j)].re()).collect();

    let mut buf = MemBuffer::new(cholesky_in_place_scratch::<T>(n, par, Spec::default()));
    let result = cholesky_in_place(
        a.rb_mut().transpose_mut(),
        LltRegularization::default(),
        par,
        MemStack::new(&mut buf),
        Spec::default(),
    );
    match result {
        Ok(_) => Ok(()),
        Err(LltError::NonPositivePivot { index }) => {
            // Entries above the failing pivot are final, its diagonal is not
            let mut pivot = diag[index];
            for k in 0..index {
                let u = a[(k, index)].modulus();
                pivot = pivot - u * u;
            }
            Err(PivotFailure {
                index,
                pivot: T::real_to_f64(pivot),
            })
        }
    }
}

/// Solve `op(U) X = B` in place.
pub fn trsm_upper_left<T: Scalar>(u: MatRef<'_, T>, b: MatMut<'_, T>, trans: Trans, diag: Diag, par: Par) {
    debug_assert_eq!(u.ncols(), b.nrows());
    match (trans, diag) {
        (Trans::NoTranspose, Diag::NonUnit) => tri::solve_upper_triangular_in_place(u, b, par),
        (Trans::NoTranspose, Diag::Unit) => tri::solve_unit_upper_triangular_in_place(u, b, par),
        (Trans::Transpose, Diag::NonUnit) => tri::solve_lower_triangular_in_place(u.transpose(), b, par),
        (Trans::Transpose, Diag::Unit) => tri::solve_unit_lower_triangular_in_place(u.transpose(), b, par),
        (Trans::ConjTranspose, Diag::NonUnit) => tri::solve_lower_triangular_in_place(u.adjoint(), b, par),
        (Trans::ConjTranspose, Diag::Unit) => tri::solve_unit_lower_triangular_in_place(u.adjoint(), b, par),
    }
}

/// `Y -= op(U) X`.
///
/// With `NoTranspose`, `x` has `U.ncols()` rows and `y` has `U.nrows()`;
/// otherwise the other way round.
pub fn gemm_sub<T: Scalar>(u: MatRef<'_, T>, trans: Trans, x: MatRef<'_, T>, y: MatMut<'_, T>, par: Par) {
    let alpha = -T::one();
    match trans {
        Trans::NoTranspose => matmul(y, Accum::Add, u, x, alpha, par),
        Trans::Transpose => matmul(y, Accum::Add, u.transpose(), x, alpha, par),
        Trans::ConjTranspose => matmul(y, Accum::Add, u.adjoint(), x, alpha, par),
    }
}

/// `C -= Aᴴ B` with `A: p×m`, `B: p×n`, `C: m×n`.
///
/// With `upper_only`, `C` is square and entries below its diagonal are left
/// untouched.
pub fn gemm_conj_trans_sub<T: Scalar>(
    a: MatRef<'_, T>,
    b: MatRef<'_, T>,
    c: MatMut<'_, T>,
    upper_only: bool,
    par: Par,
) {
    debug_assert_eq!(a.nrows(), b.nrows());
    debug_assert_eq!(a.ncols(), c.nrows());
    debug_assert_eq!(b.ncols(), c.ncols());
    let alpha = -T::one();
    if upper_only {
        triangular::matmul(
            c,
            Shape::TriangularUpper,
            Accum::Add,
            a.adjoint(),
            Shape::Rectangular,
            b,
            Shape::Rectangular,
            alpha,
            par,
        );
    } else {
        matmul(c, Accum::Add, a.adjoint(), b, alpha, par);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::{adjoint_mul, max_abs_diff, mul};
    use faer::Mat;
    use num_complex::Complex64;

    fn spd(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                n as f64 + 1.0
            } else {
                1.0 / (1.0 + (i as f64 - j as f64).abs())
            }
        })
    }

    fn upper_of(a: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(a.nrows(), a.ncols(), |i, j| if i <= j { a[(i, j)] } else { 0.0 })
    }

    #[test]
    fn test_potrf_reconstructs() {
        for par in [Par::Seq, Par::rayon(2)] {
            let a = spd(6);
            let mut u = upper_of(&a);
            potrf_upper(u.as_mut(), par).unwrap();
            let back = adjoint_mul(u.as_ref(), u.as_ref()).unwrap();
            assert!(max_abs_diff(back.as_ref(), a.as_ref()).unwrap() < 1e-12);
            // Lower triangle untouched
            assert_eq!(u[(3, 1)], 0.0);
        }
    }

    #[test]
    fn test_potrf_complex_reconstructs() {
        let n = 4;
        let a = Mat::from_fn(n, n, |i, j| {
            if i == j {
                Complex64::new(5.0, 0.0)
            } else if i < j {
                Complex64::new(0.5, 0.25 * (j - i) as f64)
            } else {
                Complex64::new(0.5, -0.25 * (i - j) as f64)
            }
        });
        let mut u = Mat::from_fn(n, n, |i, j| if i <= j { a[(i, j)] } else { Complex64::new(0.0, 0.0) });
        potrf_upper(u.as_mut(), Par::Seq).unwrap();
        let back = adjoint_mul(u.as_ref(), u.as_ref()).unwrap();
        assert!(max_abs_diff(back.as_ref(), a.as_ref()).unwrap() < 1e-12);
    }

    #[test]
    fn test_potrf_reports_pivot() {
        // [[1, 2], [2, 1]] is indefinite: second pivot is 1 - 4 = -3
        let mut a = Mat::from_fn(2, 2, |i, j| if i > j { 0.0 } else if i == j { 1.0 } else { 2.0 });
        let err = potrf_upper(a.as_mut(), Par::Seq).unwrap_err();
        assert_eq!(err.index, 1);
        assert!((err.pivot + 3.0).abs() < 1e-14);
    }

    #[test]
    fn test_trsm_all_operators() {
        let a = spd(5);
        let mut u = upper_of(&a);
        potrf_upper(u.as_mut(), Par::Seq).unwrap();
        let x = Mat::from_fn(5, 2, |i, j| i as f64 - 1.5 + j as f64);

        let mut y = mul(u.as_ref(), x.as_ref()).unwrap();
        trsm_upper_left(u.as_ref(), y.as_mut(), Trans::NoTranspose, Diag::NonUnit, Par::Seq);
        assert!(max_abs_diff(y.as_ref(), x.as_ref()).unwrap() < 1e-12);

        let b = adjoint_mul(u.as_ref(), x.as_ref()).unwrap();
        for trans in [Trans::Transpose, Trans::ConjTranspose] {
            let mut y = b.clone();
            trsm_upper_left(u.as_ref(), y.as_mut(), trans, Diag::NonUnit, Par::rayon(2));
            assert!(max_abs_diff(y.as_ref(), x.as_ref()).unwrap() < 1e-12);
        }
    }

    #[test]
    fn test_trsm_unit_diagonal_ignores_stored_diagonal() {
        // U = [[7, 1], [0, 9]] treated as [[1, 1], [0, 1]]
        let u = Mat::from_fn(2, 2, |i, j| [[7.0, 1.0], [0.0, 9.0]][i][j]);
        let mut x = Mat::from_fn(2, 1, |i, _| [3.0, 2.0][i]);
        trsm_upper_left(u.as_ref(), x.as_mut(), Trans::NoTranspose, Diag::Unit, Par::Seq);
        assert_eq!((x[(0, 0)], x[(1, 0)]), (1.0, 2.0));

        // Uᵀ with unit diagonal: [[1, 0], [1, 1]] y = [3, 2]
        let mut y = Mat::from_fn(2, 1, |i, _| [3.0, 2.0][i]);
        trsm_upper_left(u.as_ref(), y.as_mut(), Trans::Transpose, Diag::Unit, Par::Seq);
        assert_eq!((y[(0, 0)], y[(1, 0)]), (3.0, -1.0));
    }

    #[test]
    fn test_gemm_upper_only_leaves_lower() {
        let a = Mat::from_fn(2, 3, |i, j| (i + j) as f64);
        let mut c = Mat::<f64>::zeros(3, 3);
        gemm_conj_trans_sub(a.as_ref(), a.as_ref(), c.as_mut(), true, Par::Seq);
        let full = adjoint_mul(a.as_ref(), a.as_ref()).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i <= j { -full[(i, j)] } else { 0.0 };
                assert_eq!(c[(i, j)], expected);
            }
        }
    }

    #[test]
    fn test_gemm_sub_both_directions() {
        let u = Mat::from_fn(2, 3, |i, j| (1 + i * 3 + j) as f64);
        let x = Mat::from_fn(3, 1, |_, _| 1.0);
        let mut y = Mat::<f64>::zeros(2, 1);
        gemm_sub(u.as_ref(), Trans::NoTranspose, x.as_ref(), y.as_mut(), Par::Seq);
        assert_eq!((y[(0, 0)], y[(1, 0)]), (-6.0, -15.0));

        let x = Mat::from_fn(2, 1, |i, _| (i + 1) as f64);
        let mut y = Mat::<f64>::zeros(3, 1);
        gemm_sub(u.as_ref(), Trans::Transpose, x.as_ref(), y.as_mut(), Par::Seq);
        assert_eq!((y[(0, 0)], y[(1, 0)], y[(2, 0)]), (-9.0, -12.0, -15.0));
    }
}
