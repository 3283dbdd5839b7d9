//! Error types for constraint evaluation.

use thiserror::Error;

/// Errors that can occur while constructing or evaluating a constraint.
#[derive(Error, Debug)]
pub enum ConstraintError {
    /// Invalid solver configuration, rejected at construction time.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Brute-force enumeration over an assignment space that exceeds the
    /// solver's practical bound. The caller must pick a different strategy.
    #[error(
        "Assignment space {labels}^{positions} exceeds the enumeration limit {limit}; \
         use a sampling or t-norm solver instead"
    )]
    Scalability {
        /// Number of free output positions.
        positions: usize,
        /// Number of labels per position.
        labels: usize,
        /// Configured assignment-count limit.
        limit: usize,
    },

    /// The predicate does not support the calling convention the solver expects.
    #[error("Predicate does not support the {solver} calling convention")]
    UnsupportedPredicate {
        /// Name of the rejecting solver.
        solver: &'static str,
    },

    /// Tensor shape or predicate output mismatched against what the solver expects.
    #[error("Shape mismatch: {0}")]
    Shape(String),
}

/// Result type for constraint operations.
pub type ConstraintResult<T> = Result<T, ConstraintError>;
