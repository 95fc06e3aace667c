//! Covariance matrix handling
//!
//! Provides the dense factorizations used to evaluate the chi², two
//! regularization prescriptions for ill-conditioned covariance matrices and
//! a covariance matrix indexed by (experiment, dataset, point).

pub mod keyed;
pub mod linalg;
pub mod regularize;

pub use keyed::{CovMatrix, PointKey};
pub use linalg::{
    EigenDecomposition, Svd, check_square, cholesky_lower, condition_number, is_positive_definite,
    reconstruct_from_eigen, solve_lower_triangular, solve_lower_triangular_vec, svd,
    symmetric_eigen,
};
pub use regularize::{
    DEFAULT_COND_NUM_THRESHOLD, RegularizationConfig, correlation_from_covariance, fro_l2_cond,
    regularize_covmat, regularize_fro_l2, regularize_singular_values, standard_deviations,
};

use thiserror::Error;

/// Errors that can occur while manipulating covariance matrices
#[derive(Debug, Error)]
pub enum CovarianceError {
    /// Insufficient data for the requested statistic
    #[error("Insufficient data: need at least {required} entries, got {actual}")]
    InsufficientData {
        /// Required number of entries
        required: usize,
        /// Actual number of entries
        actual: usize,
    },

    /// Matrix is not positive definite
    #[error("Covariance matrix is not positive definite")]
    NotPositiveDefinite,

    /// Triangular factor has a zero on its diagonal
    #[error("Triangular factor is singular: zero pivot at row {index}")]
    Singular {
        /// Row of the zero pivot
        index: usize,
    },

    /// A variance (or row norm of a square root factor) is zero or negative
    #[error("Non-positive variance at index {index}, cannot normalise")]
    ZeroVariance {
        /// Offending row
        index: usize,
    },

    /// Matrix is not square
    #[error("Expected a square matrix, got {rows}x{cols}")]
    NotSquare {
        /// Number of rows
        rows: usize,
        /// Number of columns
        cols: usize,
    },

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// The index of two keyed matrices differ
    #[error("Covariance matrices are indexed differently")]
    IndexMismatch,

    /// Requested block is not part of the index
    #[error("No points found for {0}")]
    UnknownBlock(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
