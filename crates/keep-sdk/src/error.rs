use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("history error: {0}")]
    History(#[from] keep_history::HistoryError),

    #[error("sync error: {0}")]
    Sync(#[from] keep_sync::SyncError),

    #[error("metadata store error: {0}")]
    Metadata(#[from] keep_bucket::BucketError),

    #[error("file store error: {0}")]
    Fs(#[from] keep_fs::FsError),

    #[error("invalid path: {0}")]
    Path(#[from] keep_types::TypeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
