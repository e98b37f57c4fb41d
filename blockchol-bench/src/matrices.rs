//! Test matrices for the harness: Matrix Market files or generated grids.

use std::path::Path;

use anyhow::{bail, Context, Result};
use blockchol_core::sparse::from_triplets;
use blockchol_core::{Mat, Scalar};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sprs::CsMat;

/// Load a real symmetric matrix in Matrix Market format.
pub fn load_matrix_market(path: &Path) -> Result<CsMat<f64>> {
    let tri = sprs::io::read_matrix_market::<f64, usize, _>(path)
        .with_context(|| format!("Failed to read Matrix Market file {}", path.display()))?;
    let a: CsMat<f64> = tri.to_csr();
    if a.rows() != a.cols() {
        bail!("matrix {} is {}x{}, expected square", path.display(), a.rows(), a.cols());
    }
    Ok(a)
}

/// Lift a real matrix to any scalar type (imaginary parts zero).
pub fn lift<T: Scalar>(a: &CsMat<f64>) -> CsMat<T> {
    from_triplets(
        a.rows(),
        a.cols(),
        a.iter()
            .map(|(&v, (i, j))| (i, j, T::from_real(T::real_from_f64(v)))),
    )
}

/// 5-point Laplacian of a `k x k` grid, shifted to be strictly diagonally
/// dominant. Complex scalars get a Hermitian imaginary coupling.
pub fn grid_laplacian<T: Scalar>(k: usize) -> CsMat<T> {
    let n = k * k;
    let im = if T::is_complex() { 0.25 } else { 0.0 };
    let coupling = T::from_parts(T::real_from_f64(-1.0), T::real_from_f64(im));
    let mut t = Vec::with_capacity(3 * n);
    for i in 0..n {
        t.push((i, i, T::from_real(T::real_from_f64(4.5))));
        if i % k + 1 < k {
            t.push((i, i + 1, coupling));
        }
        if i + k < n {
            t.push((i, i + k, coupling));
        }
    }
    from_triplets(n, n, t)
}

/// Seeded random right-hand side.
pub fn random_rhs<T: Scalar>(n: usize, nrhs: usize, seed: u64) -> Mat<T> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    Mat::from_fn(n, nrhs, |_, _| {
        let re = rng.gen_range(-1.0..1.0);
        let im = if T::is_complex() { rng.gen_range(-1.0..1.0) } else { 0.0 };
        T::from_parts(T::real_from_f64(re), T::real_from_f64(im))
    })
}
