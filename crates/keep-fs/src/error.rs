use std::path::PathBuf;

/// Errors from file-store operations.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// The path does not exist.
    #[error("no such file or directory: {}", .0.display())]
    NotFound(PathBuf),

    /// A directory was required but the path is something else.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FsError {
    /// Classify an I/O error raised while operating on `path`.
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io(err)
        }
    }
}

/// Result alias for file-store operations.
pub type FsResult<T> = Result<T, FsError>;
