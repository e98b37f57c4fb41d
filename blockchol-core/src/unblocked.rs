//! Unblocked reference path: scalar sparse Cholesky and triangular solves,
//! each run as a single task.
//!
//! The factor keeps the full scalar fill pattern in CSR form (row `i` holds
//! the columns `j >= i` of `U`, diagonal first). In this path every row is
//! its own block, so a failing pivot reports `block == row`.

use faer::{ColMut, Mat, MatMut, Par};
use log::debug;
use parking_lot::RwLock;
use sprs::{CsMatI, SpIndex};

use crate::error::{CholError, Result};
use crate::kernels::{for_each_item, Diag, Trans};
use crate::scalar::Scalar;
use crate::scheduler::{TaskGraph, TaskHandle, TaskKind, TaskLabel};

/// Lock used to hand exclusive data to a single task.
pub type Shared<'a, X> = RwLock<&'a mut X>;

/// Upper triangular sparse matrix with its Cholesky fill pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseUpper<T> {
    n: usize,
    row_ptr: Vec<usize>,
    col_idx: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> SparseUpper<T> {
    /// Symbolic factorization of the upper triangle of `upper`, with the
    /// values scattered into the fill pattern.
    pub fn from_upper<I, Iptr>(upper: &CsMatI<T, I, Iptr>) -> Result<Self>
    where
        I: SpIndex,
        Iptr: SpIndex,
    {
        let n = upper.rows();
        if upper.cols() != n {
            return Err(CholError::DimensionMismatch {
                what: "square matrix",
                expected: n,
                actual: upper.cols(),
            });
        }
        let mut entries: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (_, (r, c)) in upper.iter() {
            let (r, c) = (r.index(), c.index());
            if r < c {
                entries[r].push(c);
            }
        }

        // Row i of U: its own entries plus the pattern of every child in the
        // elimination tree, where the parent of k is the first column after k
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut row_ptr = Vec::with_capacity(n + 1);
        let mut col_idx = Vec::new();
        let mut mark = vec![usize::MAX; n];
        row_ptr.push(0);
        for i in 0..n {
            let mut pattern = Vec::new();
            mark[i] = i;
            for &c in &entries[i] {
                if mark[c] != i {
                    mark[c] = i;
                    pattern.push(c);
                }
            }
            for &ch in &children[i] {
                for &c in &col_idx[row_ptr[ch] + 1..row_ptr[ch + 1]] {
                    if mark[c] != i {
                        mark[c] = i;
                        pattern.push(c);
                    }
                }
            }
            pattern.sort_unstable();
            if let Some(&p) = pattern.first() {
                children[p].push(i);
            }
            col_idx.push(i);
            col_idx.extend(pattern);
            row_ptr.push(col_idx.len());
        }

        let mut factor = Self {
            n,
            values: vec![T::zero(); col_idx.len()],
            row_ptr,
            col_idx,
        };
        for (val, (r, c)) in upper.iter() {
            let (r, c) = (r.index(), c.index());
            if r > c {
                continue;
            }
            if let Some(p) = factor.position(r, c) {
                factor.values[p] = *val;
            }
        }
        debug!(
            "scalar fill: n = {}, nnz(U) = {}",
            n,
            factor.values.len()
        );
        Ok(factor)
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Stored entries of `U`, fill included.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    fn position(&self, i: usize, j: usize) -> Option<usize> {
        let lo = self.row_ptr[i];
        self.col_idx[lo..self.row_ptr[i + 1]]
            .binary_search(&j)
            .ok()
            .map(|p| lo + p)
    }

    /// Entry `(i, j)`; zero outside the pattern.
    pub fn get(&self, i: usize, j: usize) -> T {
        if i > j {
            return T::zero();
        }
        self.position(i, j).map_or_else(T::zero, |p| self.values[p])
    }

    /// Dense copy of the upper triangle.
    pub fn to_dense(&self) -> Mat<T> {
        let mut out = Mat::zeros(self.n, self.n);
        for i in 0..self.n {
            for p in self.row_ptr[i]..self.row_ptr[i + 1] {
                out[(i, self.col_idx[p])] = self.values[p];
            }
        }
        out
    }

    /// Right-looking scalar Cholesky in place.
    pub fn factor_in_place(&mut self) -> Result<()> {
        let mut row = Vec::new();
        for k in 0..self.n {
            let (start, end) = (self.row_ptr[k], self.row_ptr[k + 1]);
            let d = self.values[start].re();
            if !(d > <T::Magnitude as num_traits::Zero>::zero()) {
                return Err(CholError::NotPositiveDefinite {
                    block: k,
                    row: k,
                    pivot: T::real_to_f64(d),
                });
            }
            let s = T::from_real(num_traits::Float::sqrt(d));
            self.values[start] = s;
            for p in start + 1..end {
                self.values[p] /= s;
            }

            row.clear();
            row.extend(
                (start + 1..end).map(|p| (self.col_idx[p], self.values[p])),
            );
            for (a, &(i, uki)) in row.iter().enumerate() {
                let uki = uki.conj();
                for &(j, ukj) in &row[a..] {
                    let pos = self.position(i, j).ok_or_else(|| {
                        CholError::InvalidPartition(format!(
                            "fill entry ({}, {}) from row {} missing",
                            i, j, k
                        ))
                    })?;
                    self.values[pos] -= uki * ukj;
                }
            }
        }
        Ok(())
    }

    /// Solve `op(U) X = B` in place; columns of `x` are independent and
    /// split across `par`.
    pub fn solve_in_place(&self, x: MatMut<'_, T>, trans: Trans, diag: Diag, par: Par) -> Result<()> {
        if x.nrows() != self.n {
            return Err(CholError::DimensionMismatch {
                what: "right-hand side rows",
                expected: self.n,
                actual: x.nrows(),
            });
        }
        let n = self.n;
        let cols: Vec<ColMut<'_, T>> = x.col_iter_mut().collect();
        for_each_item(cols, par, |_, mut col| match trans {
            Trans::NoTranspose => {
                for i in (0..n).rev() {
                    let (start, end) = (self.row_ptr[i], self.row_ptr[i + 1]);
                    let mut s = col[i];
                    for p in start + 1..end {
                        s -= self.values[p] * col[self.col_idx[p]];
                    }
                    if diag == Diag::NonUnit {
                        s /= self.values[start];
                    }
                    col[i] = s;
                }
            }
            _ => {
                for k in 0..n {
                    let (start, end) = (self.row_ptr[k], self.row_ptr[k + 1]);
                    if diag == Diag::NonUnit {
                        col[k] /= trans.apply(self.values[start]);
                    }
                    let xk = col[k];
                    for p in start + 1..end {
                        col[self.col_idx[p]] -= trans.apply(self.values[p]) * xk;
                    }
                }
            }
        });
        Ok(())
    }
}

/// Spawn one task factoring `factor` in place.
pub fn factor_unblocked<'env, 'a: 'env, T: Scalar>(
    graph: &TaskGraph<'env>,
    factor: &'env Shared<'a, SparseUpper<T>>,
    after: &[TaskHandle],
) -> Result<TaskHandle> {
    graph.submit(TaskLabel::new(TaskKind::Factor, 0), after, move |_| {
        factor.write().factor_in_place()
    })
}

/// Spawn one task solving `op(U) X = B` in place; columns of `rhs` are
/// split across the team.
pub fn tri_solve_unblocked<'env, 'a: 'env, 'b: 'env, T: Scalar>(
    graph: &TaskGraph<'env>,
    factor: &'env Shared<'a, SparseUpper<T>>,
    rhs: &'env Shared<'b, Mat<T>>,
    trans: Trans,
    diag: Diag,
    after: &[TaskHandle],
) -> Result<TaskHandle> {
    graph.submit(TaskLabel::new(TaskKind::Solve, 0), after, move |team| {
        let u = factor.read();
        let mut x = rhs.write();
        u.solve_in_place(x.as_mut(), trans, diag, team.parallelism())
    })
}
