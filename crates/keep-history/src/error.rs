use keep_blob::BlobError;
use keep_bucket::BucketError;
use keep_chunklog::ChunkLogError;
use keep_fs::FsError;
use keep_types::BlobId;

/// Errors from history store operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The store configuration is unusable.
    #[error("invalid history configuration: {0}")]
    Config(String),

    /// A path argument is missing or the operation would refer to itself.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The state's content is no longer (or was never) stored.
    #[error("history state not found: {0}")]
    StateNotFound(BlobId),

    #[error("blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error("index error: {0}")]
    Bucket(#[from] BucketError),

    #[error("journal error: {0}")]
    Journal(#[from] ChunkLogError),

    #[error("file store error: {0}")]
    Fs(#[from] FsError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
