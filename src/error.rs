//! Error types for robust-frontier.

use thiserror::Error;

/// Error type for frontier operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrontierError {
    /// Malformed input data (bad covariance, too few samples, bad grid).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A matrix operation is undefined for the given data.
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// No portfolio satisfies the constraints.
    #[error("Problem is infeasible")]
    Infeasible,

    /// The objective is unbounded over the feasible set.
    #[error("Problem is unbounded")]
    Unbounded,

    /// The solver stopped without reaching the required tolerance.
    #[error("Solver failed: {0}")]
    SolverNumericalFailure(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FrontierError {
    /// True for failures reported by the solver for a single program.
    ///
    /// These are recoverable at the level of one grid point.
    pub fn is_solver_failure(&self) -> bool {
        matches!(
            self,
            FrontierError::Infeasible
                | FrontierError::Unbounded
                | FrontierError::SolverNumericalFailure(_)
        )
    }

    pub(crate) fn shape(expected: impl std::fmt::Display, got: impl std::fmt::Display) -> Self {
        FrontierError::ShapeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

/// Result type for robust-frontier operations.
pub type Result<T> = std::result::Result<T, FrontierError>;
