//! Error types for the conjugate-gradient solver.
//!
//! Numerical breakdown is not an error: it is reported through
//! [`crate::iterative::CgStatus`] together with the best iterate. The
//! variants below abort the call.

use thiserror::Error;

/// Errors that can occur while preparing operators or running a solve.
#[derive(Debug, Error)]
pub enum SolverError {
    /// The operator still carries global column indices.
    #[error(
        "operator has no local indices; make_local_matrix must be called before cg_solve"
    )]
    NotLocallyIndexed,

    /// A vector is shorter than the operation requires.
    #[error("dimension mismatch: expected at least {expected} entries, got {got}")]
    DimensionMismatch {
        /// Required length
        expected: usize,
        /// Actual length provided
        got: usize,
    },

    /// A row partition does not fit the global problem.
    #[error("invalid partition: rank {rank} of {size} for {rows} rows")]
    InvalidPartition {
        /// Partition rank
        rank: usize,
        /// Number of partitions
        size: usize,
        /// Global number of rows
        rows: usize,
    },

    /// A stored column index lies outside the global column range.
    #[error("column index {col} in row {row} is out of range ({num_cols} columns)")]
    ColumnOutOfRange {
        /// Local row holding the entry
        row: usize,
        /// Offending global column
        col: usize,
        /// Global number of columns
        num_cols: usize,
    },

    /// A column is outside the row range of every partition.
    #[error("column {col} is not owned by any partition")]
    UnownedColumn {
        /// Global column index
        col: usize,
    },

    /// A dedicated worker pool could not be created.
    #[cfg(feature = "rayon")]
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Writing a vector or report failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// A specialized `Result` type for solver operations.
pub type Result<T> = std::result::Result<T, SolverError>;

impl SolverError {
    /// Returns `true` if the operator was not prepared for solving.
    pub fn is_precondition_error(&self) -> bool {
        matches!(self, SolverError::NotLocallyIndexed)
    }

    /// Returns `true` if this is a size or index related error.
    pub fn is_dimension_error(&self) -> bool {
        matches!(
            self,
            SolverError::DimensionMismatch { .. }
                | SolverError::InvalidPartition { .. }
                | SolverError::ColumnOutOfRange { .. }
                | SolverError::UnownedColumn { .. }
        )
    }

    /// Returns `true` if this error came from reading or writing files.
    pub fn is_io_error(&self) -> bool {
        matches!(self, SolverError::Io(_) | SolverError::Config(_))
    }
}
