//! End-to-end tests of the by-blocks and unblocked factorizations.
//!
//! Random Hermitian positive definite matrices are made diagonally dominant
//! so every factorization succeeds; each test seeds its own generator.

use blockchol_core::dense::{adjoint_mul, max_abs_diff};
use blockchol_core::hier::BlockStructure;
use blockchol_core::sparse::{from_triplets, hermitian_to_dense, residual_max};
use blockchol_core::{
    compare_paths, factor_by_blocks, factor_unblocked, solve, tri_solve_by_blocks,
    tri_solve_unblocked, BlockOrdering, BlockRanges, BlockedUpper, CholAlgo, CholError,
    DenseBlocks, Diag, HierOptions, Mat, Scalar, Scheduler, SchedulerConfig, Side,
    SolverSettings, SparseUpper, Trans,
};
use num_complex::Complex64;
use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Random sparse HPD matrix stored as its upper triangle.
fn random_hpd<T: Scalar>(n: usize, density: f64, seed: u64) -> sprs::CsMat<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut row_sum = vec![0.0f64; n];
    let mut t = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            if rng.gen::<f64>() < density {
                let re = rng.gen_range(-1.0..1.0);
                let im = if T::is_complex() { rng.gen_range(-1.0..1.0) } else { 0.0 };
                let v = T::from_parts(T::real_from_f64(re), T::real_from_f64(im));
                let m = T::real_to_f64(v.modulus());
                row_sum[i] += m;
                row_sum[j] += m;
                t.push((i, j, v));
            }
        }
    }
    for (i, s) in row_sum.iter().enumerate() {
        t.push((i, i, T::from_real(T::real_from_f64(s + 1.0))));
    }
    from_triplets(n, n, t)
}

fn settings(algo: CholAlgo, teams: usize, team_size: usize) -> SolverSettings {
    SolverSettings {
        algo,
        hier: HierOptions::flat(),
        rhs_block_cols: 0,
        scheduler: SchedulerConfig {
            num_teams: teams,
            team_size,
        },
        tolerance: None,
        verbose: false,
    }
}

fn rhs<T: Scalar>(n: usize, nrhs: usize, seed: u64) -> Mat<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Mat::from_fn(n, nrhs, |_, _| {
        T::from_parts(
            T::real_from_f64(rng.gen_range(-1.0..1.0)),
            T::real_from_f64(if T::is_complex() { rng.gen_range(-1.0..1.0) } else { 0.0 }),
        )
    })
}

#[test]
fn test_blocked_matches_unblocked_real() {
    let a = random_hpd::<f64>(40, 0.1, 11);
    let b = rhs::<f64>(40, 3, 12);
    for nb in [1, 2, 4, 8] {
        let ordering = BlockOrdering::minimum_degree(&a, nb).unwrap();
        let cmp = compare_paths(&a, &ordering, &b, &settings(CholAlgo::ByBlocks, 3, 1)).unwrap();
        assert!(cmp.agrees(), "B = {}: {:?}", nb, cmp);
    }
}

#[test]
fn test_blocked_matches_unblocked_complex() {
    let a = random_hpd::<Complex64>(32, 0.15, 21);
    let b = rhs::<Complex64>(32, 2, 22);
    for nb in [1, 2, 4, 8] {
        let ordering = BlockOrdering::natural(&a, nb).unwrap();
        let mut s = settings(CholAlgo::ByBlocks, 2, 2);
        s.hier = HierOptions::tiled(3);
        s.rhs_block_cols = 1;
        let cmp = compare_paths(&a, &ordering, &b, &s).unwrap();
        assert!(cmp.agrees(), "B = {}: {:?}", nb, cmp);
    }
}

#[test]
fn test_residual_is_small_for_every_configuration() {
    let a = random_hpd::<f64>(50, 0.08, 31);
    let b = rhs::<f64>(50, 4, 32);
    let ordering = BlockOrdering::minimum_degree(&a, 5).unwrap();
    let mut reference: Option<Mat<f64>> = None;
    for (teams, size) in [(1, 1), (2, 1), (4, 1), (2, 2)] {
        for algo in [CholAlgo::ByBlocks, CholAlgo::Unblocked] {
            let sol = solve(&a, &ordering, &b, &settings(algo, teams, size)).unwrap();
            let res = residual_max(&a, &sol.x, &b).unwrap();
            assert!(res < 1e-10, "{:?} with {}x{}: residual {}", algo, teams, size, res);
            match &reference {
                Some(x) => assert!(max_abs_diff(x.as_ref(), sol.x.as_ref()).unwrap() < 1e-10),
                None => reference = Some(sol.x),
            }
        }
    }
}

#[test]
fn test_small_banded_scenario() {
    // A = I + 0.1 * band, two blocks of two rows
    let mut t = Vec::new();
    for i in 0..4 {
        t.push((i, i, 1.0));
        if i + 1 < 4 {
            t.push((i, i + 1, 0.1));
        }
    }
    let a = from_triplets(4, 4, t);
    let ranges = BlockRanges::from_offsets(vec![0, 2, 4], 4).unwrap();
    let tree = BlockStructure::elimination_tree(&a, &ranges).unwrap();
    assert_eq!(tree, vec![Some(1), None]);

    let b = Mat::from_fn(4, 2, |_, _| 1.0);
    let mut blocked = BlockedUpper::from_sparse(&a, &ranges, &tree, HierOptions::flat()).unwrap();
    let mut x = DenseBlocks::from_flat(&b, &ranges, 0).unwrap();
    {
        let hier = blocked.hier_view();
        let rhs = x.hier_view();
        let sched = Scheduler::new(SchedulerConfig {
            num_teams: 2,
            team_size: 1,
        })
        .unwrap();
        sched
            .scope(|g| {
                let f = factor_by_blocks(g, &hier, &[])?;
                let y = tri_solve_by_blocks(g, &hier, &rhs, Side::Left, Trans::ConjTranspose, Diag::NonUnit, &[f])?;
                let z = tri_solve_by_blocks(g, &hier, &rhs, Side::Left, Trans::NoTranspose, Diag::NonUnit, &[y])?;
                g.wait_all()?;
                g.wait(z)
            })
            .unwrap();
    }

    let u = blocked.to_dense();
    let uhu = adjoint_mul(u.as_ref(), u.as_ref()).unwrap();
    assert!(max_abs_diff(uhu.as_ref(), hermitian_to_dense(&a).as_ref()).unwrap() < 1e-12);
    assert!(residual_max(&a, &x.to_flat(), &b).unwrap() < 1e-12);
}

#[test]
fn test_indefinite_block_is_named() {
    // Block 2 (rows 4 and 5) has a negative pivot; the rest is decoupled
    let mut t = Vec::new();
    for i in 0..8 {
        t.push((i, i, if i == 5 { -1.0 } else { 2.0 }));
    }
    for i in [0, 2, 6] {
        t.push((i, i + 1, 0.5));
    }
    let a = from_triplets(8, 8, t);
    let b = Mat::zeros(8, 1);
    let ordering = BlockOrdering::natural(&a, 4).unwrap();
    for (teams, size) in [(1, 1), (3, 1), (2, 2)] {
        let err = solve(&a, &ordering, &b, &settings(CholAlgo::ByBlocks, teams, size)).unwrap_err();
        assert_eq!(
            err,
            CholError::NotPositiveDefinite {
                block: 2,
                row: 5,
                pivot: -1.0
            }
        );
    }

    let err = solve(&a, &ordering, &b, &settings(CholAlgo::Unblocked, 2, 1)).unwrap_err();
    assert!(matches!(err, CholError::NotPositiveDefinite { block: 5, row: 5, .. }));
}

#[test]
fn test_first_failing_block_wins() {
    // Two independent indefinite blocks; the lower index is reported
    let mut t = Vec::new();
    for i in 0..6 {
        t.push((i, i, if i == 1 || i == 4 { -2.0 } else { 1.0 }));
    }
    let a = from_triplets(6, 6, t);
    let b = Mat::zeros(6, 1);
    let ordering = BlockOrdering::natural(&a, 3).unwrap();
    let err = solve(&a, &ordering, &b, &settings(CholAlgo::ByBlocks, 4, 1)).unwrap_err();
    assert!(matches!(err, CholError::NotPositiveDefinite { block: 0, row: 1, .. }));
}

#[test]
fn test_malformed_partition_fails_before_any_task() {
    assert!(matches!(
        BlockRanges::from_offsets(vec![0, 3, 2, 6], 6),
        Err(CholError::InvalidPartition(_))
    ));
    assert!(matches!(
        BlockRanges::from_extents(&[(0, 2), (3, 6)], 6),
        Err(CholError::InvalidPartition(_))
    ));

    // Block (0, 1) is stored but block 1 is not an ancestor of block 0
    let a = from_triplets(4, 4, vec![(0, 0, 2.0), (0, 2, 0.5), (1, 1, 2.0), (2, 2, 2.0), (3, 3, 2.0)]);
    let ranges = BlockRanges::uniform(4, 2).unwrap();
    assert!(matches!(
        BlockedUpper::from_sparse(&a, &ranges, &[None, None], HierOptions::flat()),
        Err(CholError::InvalidPartition(_))
    ));
}

#[test]
fn test_tiled_blocks_match_dense_leaves() {
    let a = random_hpd::<f64>(30, 0.2, 41);
    let ordering = BlockOrdering::natural(&a, 3).unwrap();
    let ranges = ordering.ranges();
    let sched = Scheduler::new(SchedulerConfig {
        num_teams: 2,
        team_size: 2,
    })
    .unwrap();

    let factor = |options: HierOptions| {
        let mut blocked = BlockedUpper::from_sparse(&a, ranges, ordering.tree(), options).unwrap();
        {
            let hier = blocked.hier_view();
            sched
                .scope(|g| {
                    let f = factor_by_blocks(g, &hier, &[])?;
                    g.wait(f)
                })
                .unwrap();
        }
        blocked.to_dense()
    };
    let dense = factor(HierOptions::flat());
    for leaf in [1, 3, 4, 7] {
        let tiled = factor(HierOptions::tiled(leaf));
        assert!(max_abs_diff(dense.as_ref(), tiled.as_ref()).unwrap() < 1e-12, "leaf {}", leaf);
    }

    let mut scalar = SparseUpper::from_upper(&a).unwrap();
    {
        let lock = RwLock::new(&mut scalar);
        sched
            .scope(|g| {
                let f = factor_unblocked(g, &lock, &[])?;
                g.wait(f)
            })
            .unwrap();
    }
    assert!(max_abs_diff(dense.as_ref(), scalar.to_dense().as_ref()).unwrap() < 1e-12);
}

/// Factor `a` with both strategies, then apply one `op(U) X = B` solve with
/// the given operator and diagonal to the same right-hand side.
fn single_solve_both_paths(
    a: &sprs::CsMat<Complex64>,
    b: &Mat<Complex64>,
    nb: usize,
    trans: Trans,
    diag: Diag,
    sched: &Scheduler,
) -> (Mat<Complex64>, Mat<Complex64>) {
    let ordering = BlockOrdering::natural(a, nb).unwrap();
    let ranges = ordering.ranges();

    let mut blocked = BlockedUpper::from_sparse(a, ranges, ordering.tree(), HierOptions::tiled(2)).unwrap();
    let mut x = DenseBlocks::from_flat(b, ranges, 2).unwrap();
    {
        let hier = blocked.hier_view();
        let rhs = x.hier_view();
        sched
            .scope(|g| {
                let f = factor_by_blocks(g, &hier, &[])?;
                let s = tri_solve_by_blocks(g, &hier, &rhs, Side::Left, trans, diag, &[f])?;
                g.wait(s)
            })
            .unwrap();
    }

    let mut scalar = SparseUpper::from_upper(a).unwrap();
    let mut y = b.clone();
    {
        let fl = RwLock::new(&mut scalar);
        let yl = RwLock::new(&mut y);
        sched
            .scope(|g| {
                let f = factor_unblocked(g, &fl, &[])?;
                let s = tri_solve_unblocked(g, &fl, &yl, trans, diag, &[f])?;
                g.wait(s)
            })
            .unwrap();
    }
    (x.to_flat(), y)
}

#[test]
fn test_every_operator_and_diagonal_agree_across_paths() {
    let sched = Scheduler::new(SchedulerConfig {
        num_teams: 4,
        team_size: 2,
    })
    .unwrap();
    let ops = [Trans::NoTranspose, Trans::Transpose, Trans::ConjTranspose];
    for seed in 0..30u64 {
        let a = random_hpd::<Complex64>(18, 0.2, 100 + seed);
        let b = rhs::<Complex64>(18, 5, 200 + seed);
        let nb = [1, 2, 4, 8][seed as usize % 4];
        for trans in ops {
            for diag in [Diag::NonUnit, Diag::Unit] {
                let (blocked, scalar) = single_solve_both_paths(&a, &b, nb, trans, diag, &sched);
                let d = max_abs_diff(blocked.as_ref(), scalar.as_ref()).unwrap();
                assert!(d < 1e-10, "seed {} {:?} {:?}: diff {}", seed, trans, diag, d);
            }
        }
    }
}

#[test]
fn test_unit_diagonal_solve_differs_from_non_unit() {
    // Diagonal of U is not one, so the two solves must disagree
    let a = random_hpd::<Complex64>(10, 0.3, 7);
    let b = rhs::<Complex64>(10, 2, 8);
    let sched = Scheduler::new(SchedulerConfig {
        num_teams: 2,
        team_size: 1,
    })
    .unwrap();
    let (unit, _) = single_solve_both_paths(&a, &b, 3, Trans::Transpose, Diag::Unit, &sched);
    let (non_unit, _) = single_solve_both_paths(&a, &b, 3, Trans::Transpose, Diag::NonUnit, &sched);
    assert!(max_abs_diff(unit.as_ref(), non_unit.as_ref()).unwrap() > 1e-6);
}
