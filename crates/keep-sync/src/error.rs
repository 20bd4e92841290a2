use keep_fs::FsError;
use keep_types::{ResourcePath, TypeError};

/// Errors from the resource model and synchronization.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("resource not found: {0}")]
    NotFound(ResourcePath),

    #[error("resource already exists: {0}")]
    AlreadyExists(ResourcePath),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The traversal was cancelled through its cancel flag.
    #[error("synchronization cancelled")]
    Cancelled,

    #[error("invalid path: {0}")]
    Path(#[from] TypeError),

    #[error("file store error: {0}")]
    Fs(#[from] FsError),
}

/// Result alias for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
