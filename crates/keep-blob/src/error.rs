use std::path::PathBuf;

use keep_fs::FsError;
use keep_types::BlobId;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The shard count is not a power of two in the supported range.
    #[error("invalid shard limit {0}: must be a power of two between 1 and 256")]
    InvalidLimit(usize),

    /// The store root does not exist or is not a directory.
    #[error("blob store root {0} does not exist or is not a directory")]
    InvalidRoot(PathBuf),

    /// No blob with this id is stored.
    #[error("blob not found: {0}")]
    NotFound(BlobId),

    /// Error from the underlying file store.
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;
