use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("path {0:?} contains an empty segment")]
    EmptySegment(String),

    #[error("invalid path segment {0:?}")]
    InvalidSegment(String),
}
