use std::io;

/// Errors from bucket operations.
#[derive(Debug, thiserror::Error)]
pub enum BucketError {
    /// The index file is truncated or its payload is garbled.
    #[error("corrupt bucket index: {0}")]
    Corrupt(String),

    /// The index was written by a different format version.
    #[error("bucket index version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u8, found: u8 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BucketError {
    /// Errors that mean "the index is unusable" rather than "the disk
    /// failed". `Bucket::load` recovers from these by starting empty.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Corrupt(_) | Self::VersionMismatch { .. })
    }
}

/// Result alias for bucket operations.
pub type BucketResult<T> = Result<T, BucketError>;
