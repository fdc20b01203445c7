//! Errors raised by batch-level operations.
//!
//! Per-reflection failures during assignment are never errors: a reflection
//! that no crystal explains is simply left unindexed. Only malformed global
//! inputs (singular transforms, too little data to discover a reindexing
//! operator, an operator that fails its exact check) abort an operation.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexingError {
    /// A basis or change-of-basis matrix is singular.
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// Reindexing discovery needs at least `required` pairs with both sides indexed.
    #[error("insufficient data: {found} usable equations, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    /// A discovered operator does not reproduce the target indices exactly.
    #[error("verification failed: {mismatches} of {total} indices not reproduced")]
    Verification { mismatches: usize, total: usize },

    /// Change-of-basis text that could not be parsed.
    #[error("invalid change-of-basis operator '{0}'")]
    InvalidOperator(String),

    /// A rational operator mapped an index to a non-integral triple.
    #[error("operator {operator} maps {index:?} to a non-integral index")]
    NonIntegralIndex { operator: String, index: [i32; 3] },
}

pub type Result<T> = std::result::Result<T, IndexingError>;
