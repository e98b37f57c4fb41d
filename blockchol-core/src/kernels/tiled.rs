//! Block drivers that run the leaf kernels tile by tile.
//!
//! A dense block is a one-tile grid, so the same loops serve both kinds of
//! [`BlockView`]. Independent tiles are handed to the team's rayon pool;
//! a single tile gets the team's parallelism inside faer instead.

use faer::prelude::{Reborrow, ReborrowMut};
use faer::{MatMut, MatRef, Par};

use super::{
    for_each_item, gemm_conj_trans_sub, gemm_sub, potrf_upper, trsm_upper_left, Diag,
    PivotFailure, Trans,
};
use crate::hier::BlockView;
use crate::scalar::Scalar;

/// Cholesky of a diagonal block in place; pivot index is block-relative.
pub fn block_potrf<T: Scalar>(a: &mut BlockView<'_, T>, par: Par) -> Result<(), PivotFailure> {
    let nt = a.tile_rows();
    debug_assert_eq!(nt, a.tile_cols());
    let offsets: Vec<usize> = (0..nt).map(|t| a.row_range(t).start).collect();
    let inner = if nt == 1 { par } else { Par::Seq };
    let tiles = a.tiles_mut();
    for t in 0..nt {
        potrf_upper(tiles[t * nt + t].rb_mut(), inner).map_err(|e| PivotFailure {
            index: e.index + offsets[t],
            pivot: e.pivot,
        })?;
        if t + 1 == nt {
            break;
        }
        let (head, tail) = tiles.split_at_mut((t + 1) * nt);
        let diag = head[t * nt + t].rb();

        // Row t of the trailing tile columns
        let panels: Vec<&mut MatMut<'_, T>> = tail.chunks_mut(nt).map(|col| &mut col[t]).collect();
        for_each_item(panels, par, |_, p| {
            trsm_upper_left(diag, p.rb_mut(), Trans::ConjTranspose, Diag::NonUnit, Par::Seq)
        });

        // Trailing update: tile (r, s) -= tile(t, r)ᴴ tile(t, s) for t < r <= s
        let mut tops = Vec::with_capacity(nt - t - 1);
        let mut bottoms = Vec::with_capacity(nt - t - 1);
        for col in tail.chunks_mut(nt) {
            let (top, bottom) = col.split_at_mut(t + 1);
            tops.push(top[t].rb());
            bottoms.push(bottom);
        }
        let tops = &tops;
        for_each_item(bottoms, par, |idx, bottom| {
            let b = tops[idx];
            for (off, target) in bottom.iter_mut().enumerate().take(idx + 1) {
                gemm_conj_trans_sub(tops[off], b, target.rb_mut(), off == idx, Par::Seq);
            }
        });
    }
    Ok(())
}

/// `B ← U⁻ᴴ B` for a panel block `B` sharing its tile rows with the
/// factored diagonal block `U`.
pub fn block_trsm<T: Scalar>(u: &BlockView<'_, T>, b: &mut BlockView<'_, T>, par: Par) {
    let nt = u.tile_rows();
    debug_assert_eq!(nt, b.tile_rows());
    if b.tile_cols() == 1 && nt == 1 {
        let target = &mut b.tiles_mut()[0];
        trsm_upper_left(u.tile(0, 0).rb(), target.rb_mut(), Trans::ConjTranspose, Diag::NonUnit, par);
        return;
    }
    let columns: Vec<&mut [MatMut<'_, T>]> = b.tiles_mut().chunks_mut(nt).collect();
    for_each_item(columns, par, |_, col| {
        for t in 0..nt {
            let (done, rest) = col.split_at_mut(t);
            let target = &mut rest[0];
            for (r, x) in done.iter().enumerate() {
                gemm_conj_trans_sub(u.tile(r, t).rb(), x.rb(), target.rb_mut(), false, Par::Seq);
            }
            trsm_upper_left(u.tile(t, t).rb(), target.rb_mut(), Trans::ConjTranspose, Diag::NonUnit, Par::Seq);
        }
    });
}

/// `C -= Aᴴ B`; with `upper_only` only the upper triangle of `C` changes.
pub fn block_update<T: Scalar>(
    a: &BlockView<'_, T>,
    b: &BlockView<'_, T>,
    c: &mut BlockView<'_, T>,
    upper_only: bool,
    par: Par,
) {
    let nq = a.tile_rows();
    debug_assert_eq!(nq, b.tile_rows());
    let nr = c.tile_rows();
    if c.tiles().len() == 1 {
        let target = &mut c.tiles_mut()[0];
        for q in 0..nq {
            gemm_conj_trans_sub(a.tile(q, 0).rb(), b.tile(q, 0).rb(), target.rb_mut(), upper_only, par);
        }
        return;
    }
    let targets: Vec<&mut MatMut<'_, T>> = c.tiles_mut().iter_mut().collect();
    for_each_item(targets, par, |idx, target| {
        let (r, s) = (idx % nr, idx / nr);
        if upper_only && r > s {
            return;
        }
        for q in 0..nq {
            gemm_conj_trans_sub(
                a.tile(q, r).rb(),
                b.tile(q, s).rb(),
                target.rb_mut(),
                upper_only && r == s,
                Par::Seq,
            );
        }
    });
}

/// Solve `op(U) X = X` in place for a right-hand-side block `x`.
pub fn block_trsv<T: Scalar>(u: &BlockView<'_, T>, x: &mut MatMut<'_, T>, trans: Trans, diag: Diag, par: Par) {
    let nt = u.tile_rows();
    debug_assert_eq!(x.nrows(), u.nrows());
    match trans {
        Trans::NoTranspose => {
            for t in (0..nt).rev() {
                let rt = u.row_range(t);
                let (mut head, tail) = x.rb_mut().split_at_row_mut(rt.start);
                let mut xt = tail.subrows_mut(0, rt.len());
                trsm_upper_left(u.tile(t, t).rb(), xt.rb_mut(), trans, diag, par);
                for r in 0..t {
                    let rr = u.row_range(r);
                    let y = head.rb_mut().subrows_mut(rr.start, rr.len());
                    gemm_sub(u.tile(r, t).rb(), trans, xt.rb(), y, par);
                }
            }
        }
        _ => {
            for t in 0..nt {
                let rt = u.row_range(t);
                let (head, tail) = x.rb_mut().split_at_row_mut(rt.start);
                let mut xt = tail.subrows_mut(0, rt.len());
                for r in 0..t {
                    let rr = u.row_range(r);
                    gemm_sub(u.tile(r, t).rb(), trans, head.rb().subrows(rr.start, rr.len()), xt.rb_mut(), par);
                }
                trsm_upper_left(u.tile(t, t).rb(), xt.rb_mut(), trans, diag, par);
            }
        }
    }
}

/// `Y -= op(U) X` for an off-diagonal block `U`.
///
/// With `NoTranspose`, `x` is partitioned like the columns of `U` and `y`
/// like its rows; otherwise the other way round.
pub fn block_gemv<T: Scalar>(u: &BlockView<'_, T>, trans: Trans, x: MatRef<'_, T>, y: &mut MatMut<'_, T>, par: Par) {
    debug_assert_eq!(x.ncols(), y.ncols());
    if x.nrows() == 0 || y.nrows() == 0 {
        return;
    }
    for s in 0..u.tile_cols() {
        let cs = u.col_range(s);
        for r in 0..u.tile_rows() {
            let rr = u.row_range(r);
            let tile = u.tile(r, s).rb();
            let (from, to) = match trans {
                Trans::NoTranspose => (cs.clone(), rr),
                _ => (rr, cs.clone()),
            };
            let xs = x.subrows(from.start, from.len());
            let ys = y.rb_mut().subrows_mut(to.start, to.len());
            gemm_sub(tile, trans, xs, ys, par);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::{adjoint_mul, max_abs_diff, mul};
    use faer::Mat;

    /// Pack a dense matrix into the tile layout used by `BlockView::split`.
    fn pack(m: &Mat<f64>, ro: &[usize], co: &[usize]) -> Vec<f64> {
        let mut out = Vec::with_capacity(m.nrows() * m.ncols());
        for cw in co.windows(2) {
            for rw in ro.windows(2) {
                for j in cw[0]..cw[1] {
                    for i in rw[0]..rw[1] {
                        out.push(m[(i, j)]);
                    }
                }
            }
        }
        out
    }

    fn unpack(v: &BlockView<'_, f64>) -> Mat<f64> {
        Mat::from_fn(v.nrows(), v.ncols(), |i, j| v.get(i, j))
    }

    fn diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
        max_abs_diff(a.as_ref(), b.as_ref()).unwrap()
    }

    fn spd(n: usize) -> Mat<f64> {
        Mat::from_fn(n, n, |i, j| {
            if i == j {
                2.0 * n as f64
            } else if i < j {
                0.3 + 0.1 * ((i * 7 + j * 3) % 5) as f64
            } else {
                0.3 + 0.1 * ((j * 7 + i * 3) % 5) as f64
            }
        })
    }

    fn upper(a: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(a.nrows(), a.ncols(), |i, j| if i <= j { a[(i, j)] } else { 0.0 })
    }

    #[test]
    fn test_block_potrf_tiled_matches_dense() {
        let a = spd(7);
        let mut dense = upper(&a);
        potrf_upper(dense.as_mut(), Par::Seq).unwrap();

        let offsets = [0, 3, 6, 7];
        for par in [Par::Seq, Par::rayon(2)] {
            let mut data = pack(&upper(&a), &offsets, &offsets);
            let mut view = BlockView::split(&mut data, &offsets, &offsets);
            block_potrf(&mut view, par).unwrap();
            assert!(diff(&unpack(&view), &dense) < 1e-12);
        }
    }

    #[test]
    fn test_block_potrf_pivot_is_block_relative() {
        let mut a = upper(&spd(5));
        a[(4, 4)] = -1.0;
        let offsets = [0, 2, 4, 5];
        let mut data = pack(&a, &offsets, &offsets);
        let mut view = BlockView::split(&mut data, &offsets, &offsets);
        let err = block_potrf(&mut view, Par::Seq).unwrap_err();
        assert_eq!(err.index, 4);
    }

    #[test]
    fn test_block_trsm_and_update_match_dense() {
        let a = spd(5);
        let mut u = upper(&a);
        potrf_upper(u.as_mut(), Par::Seq).unwrap();
        let b = Mat::from_fn(5, 4, |i, j| (i as f64) - 0.5 * j as f64);

        // Dense reference: X = U⁻ᴴ B, C = -Xᴴ X
        let mut x_ref = b.clone();
        trsm_upper_left(u.as_ref(), x_ref.as_mut(), Trans::ConjTranspose, Diag::NonUnit, Par::Seq);
        let p = adjoint_mul(x_ref.as_ref(), x_ref.as_ref()).unwrap();
        let c_ref = Mat::from_fn(4, 4, |i, j| if i <= j { -p[(i, j)] } else { 0.0 });

        let ro = [0, 2, 5];
        let co = [0, 3, 4];
        let mut ud = pack(&u, &ro, &ro);
        let uv = BlockView::split(&mut ud, &ro, &ro);
        let mut bd = pack(&b, &ro, &co);
        let mut bv = BlockView::split(&mut bd, &ro, &co);
        block_trsm(&uv, &mut bv, Par::rayon(2));
        assert!(diff(&unpack(&bv), &x_ref) < 1e-12);

        let mut cd = vec![0.0; 16];
        let mut cv = BlockView::split(&mut cd, &co, &co);
        block_update(&bv, &bv, &mut cv, true, Par::rayon(2));
        assert!(diff(&unpack(&cv), &c_ref) < 1e-12);
    }

    #[test]
    fn test_block_trsv_and_gemv_match_dense() {
        let a = spd(6);
        let mut u = upper(&a);
        potrf_upper(u.as_mut(), Par::Seq).unwrap();
        let ro = [0, 4, 6];
        let mut ud = pack(&u, &ro, &ro);
        let uv = BlockView::split(&mut ud, &ro, &ro);
        let rhs = Mat::from_fn(6, 2, |i, j| 1.0 + i as f64 * (j + 1) as f64);

        for trans in [Trans::NoTranspose, Trans::Transpose, Trans::ConjTranspose] {
            for diag in [Diag::NonUnit, Diag::Unit] {
                let mut expect = rhs.clone();
                trsm_upper_left(u.as_ref(), expect.as_mut(), trans, diag, Par::Seq);
                let mut got = rhs.clone();
                block_trsv(&uv, &mut got.as_mut(), trans, diag, Par::rayon(2));
                assert!(diff(&got, &expect) < 1e-12, "{:?} {:?}", trans, diag);
            }
        }

        // y -= U x and y -= Uᵀ x against the dense product
        let x = Mat::from_fn(6, 2, |i, j| (i + j) as f64);
        let mut y = Mat::<f64>::zeros(6, 2);
        block_gemv(&uv, Trans::NoTranspose, x.as_ref(), &mut y.as_mut(), Par::Seq);
        let ux = mul(u.as_ref(), x.as_ref()).unwrap();
        assert!(diff(&y, &Mat::from_fn(6, 2, |i, j| -ux[(i, j)])) < 1e-12);

        let mut y = Mat::<f64>::zeros(6, 2);
        block_gemv(&uv, Trans::Transpose, x.as_ref(), &mut y.as_mut(), Par::rayon(2));
        let utx = adjoint_mul(u.as_ref(), x.as_ref()).unwrap();
        assert!(diff(&y, &Mat::from_fn(6, 2, |i, j| -utx[(i, j)])) < 1e-12);
    }
}
