//! Blockchol: task-parallel blocked sparse Cholesky factorization
//!
//! This library factors sparse Hermitian positive definite matrices as
//! `A = Uᴴ U` and solves `A X = B`, with the work expressed as a graph of
//! block tasks run by a pool of thread teams. It supports:
//!
//! - **Real and complex scalars**: `f32`, `f64`, `Complex<f32>`, `Complex<f64>`
//! - **By-blocks factorization**: one task per block operation, dependencies
//!   derived from the blocks each task reads and writes
//! - **Tiled blocks**: large blocks split into dense tiles; the faer leaf
//!   kernels use the team's threads
//! - **Unblocked reference path**: scalar sparse Cholesky run as one task
//!
//! # Example
//!
//! ```ignore
//! use blockchol_core::{solve, BlockOrdering, Mat, SolverSettings};
//! use blockchol_core::sparse::from_triplets;
//!
//! let a = from_triplets(2, 2, vec![(0, 0, 4.0), (0, 1, 1.0), (1, 1, 3.0)]);
//! let ordering = BlockOrdering::natural(&a, 1)?;
//! let b = Mat::from_fn(2, 1, |i, _| i as f64 + 1.0);
//! let sol = solve(&a, &ordering, &b, &SolverSettings::default())?;
//! println!("x = {:?}", sol.x);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)] // graph builders take the whole solve context

pub mod chol;
pub mod dense;
pub mod error;
pub mod hier;
pub mod kernels;
pub mod ordering;
pub mod perm;
pub mod ranges;
pub mod scalar;
pub mod scheduler;
pub mod settings;
pub mod solver;
pub mod sparse;
pub mod trisolve;
pub mod unblocked;
pub mod util;

// Re-export main types
pub use chol::factor_by_blocks;
pub use faer::{Mat, MatMut, MatRef, Par};
pub use error::{CholError, Result};
pub use hier::{BlockedUpper, DenseBlocks, HierOptions};
pub use kernels::{Diag, Side, Trans};
pub use ordering::BlockOrdering;
pub use perm::Permutation;
pub use ranges::BlockRanges;
pub use scalar::Scalar;
pub use scheduler::{Scheduler, SchedulerConfig, TaskGraph, TaskHandle};
pub use settings::{CholAlgo, SolverSettings};
pub use solver::{compare_paths, solve, PathComparison, Solution, SolveInfo};
pub use trisolve::tri_solve_by_blocks;
pub use unblocked::{factor_unblocked, tri_solve_unblocked, Shared, SparseUpper};
