//! Error types for the factorization engine.

use thiserror::Error;

/// Errors raised while building block structures, scheduling task graphs, or
/// running numeric kernels.
///
/// Errors are `Clone` so that one task failure can be reported to every
/// waiter whose task was skipped because of it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CholError {
    /// Block range table or elimination tree from the ordering is malformed
    #[error("Invalid block partition: {0}")]
    InvalidPartition(String),

    /// Permutation arrays are not a bijection over `[0, n)`
    #[error("Invalid permutation: {0}")]
    InvalidPermutation(String),

    /// Adding the dependence would close a cycle in the task graph
    #[error("Dependence {predecessor} -> {successor} would close a cycle")]
    GraphCycle {
        /// Task that would wait
        successor: usize,
        /// Task that would be waited on
        predecessor: usize,
    },

    /// Dependence declared out of order or against an unknown task
    #[error("Invalid dependence: {0}")]
    InvalidDependence(String),

    /// Spawned tasks can never become ready
    #[error("Task graph stalled with {pending} spawned task(s) waiting on unspawned predecessors")]
    Stalled {
        /// Number of spawned tasks that did not complete
        pending: usize,
    },

    /// Non-positive pivot encountered while factoring a diagonal block
    #[error("Matrix not positive definite: diagonal block {block}, row {row}, pivot {pivot:e}")]
    NotPositiveDefinite {
        /// Index of the diagonal block whose factorization failed
        block: usize,
        /// Global (permuted) row of the failing pivot
        row: usize,
        /// Offending pivot value (real part)
        pivot: f64,
    },

    /// Operand shapes are incompatible
    #[error("Dimension mismatch in {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Which operand was checked
        what: &'static str,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// A task body panicked
    #[error("Task {task} panicked: {message}")]
    TaskPanicked {
        /// Label of the panicking task
        task: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// Worker pool construction failed
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, CholError>;
