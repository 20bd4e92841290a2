use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FsResult;

/// What a path refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
}

/// Metadata for an existing path (links are followed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub kind: FileKind,
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// Last modification time, milliseconds since the UNIX epoch.
    pub last_modified_ms: i64,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// Storage backend for file content and directory structure.
///
/// Implementations must be thread-safe. Paths are host paths; mapping
/// workspace paths onto them is the caller's job.
pub trait FileStore: Send + Sync {
    /// Stat a path, following links. Returns `Ok(None)` if it does not
    /// exist (including dangling links).
    fn stat(&self, path: &Path) -> FsResult<Option<FileInfo>>;

    /// Names of the children of a directory, sorted.
    fn list(&self, path: &Path) -> FsResult<Vec<String>>;

    /// Open a file for reading.
    fn open_read(&self, path: &Path) -> FsResult<Box<dyn Read + Send>>;

    /// Create (or truncate) a file for writing. The parent must exist.
    fn create(&self, path: &Path) -> FsResult<Box<dyn Write + Send>>;

    /// Create a directory and any missing parents.
    fn create_dir(&self, path: &Path) -> FsResult<()>;

    /// Delete a file or a whole directory tree. Returns `true` if
    /// something was removed.
    fn delete(&self, path: &Path) -> FsResult<bool>;

    /// Move a file. The destination's parent must exist.
    fn rename(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// Copy a file, returning the number of bytes copied.
    fn copy(&self, from: &Path, to: &Path) -> FsResult<u64>;

    /// Canonical physical location of a path, with every link resolved.
    fn resolve(&self, path: &Path) -> FsResult<PathBuf>;

    /// Read a whole file into memory.
    fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.open_read(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Replace a file's content with `data`.
    fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        let mut out = self.create(path)?;
        out.write_all(data)?;
        out.flush()?;
        Ok(())
    }
}
