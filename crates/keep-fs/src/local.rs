use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::traits::{FileInfo, FileKind, FileStore};

/// [`FileStore`] over the local file system (`std::fs`).
#[derive(Clone, Debug, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }
}

fn info_from_metadata(meta: &fs::Metadata) -> FileInfo {
    let last_modified_ms = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    if meta.is_dir() {
        FileInfo {
            kind: FileKind::Directory,
            size: 0,
            last_modified_ms,
        }
    } else {
        FileInfo {
            kind: FileKind::File,
            size: meta.len(),
            last_modified_ms,
        }
    }
}

/// Whether a failed rename was refused only because source and
/// destination live on different file systems.
fn crosses_devices(err: &io::Error) -> bool {
    // EXDEV on unix, ERROR_NOT_SAME_DEVICE on Windows.
    let code = if cfg!(windows) { 17 } else { 18 };
    err.raw_os_error() == Some(code)
}

impl FileStore for LocalFileStore {
    fn stat(&self, path: &Path) -> FsResult<Option<FileInfo>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(info_from_metadata(&meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, path: &Path) -> FsResult<Vec<String>> {
        let entries = fs::read_dir(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            _ if path.is_file() => FsError::NotADirectory(path.to_path_buf()),
            _ => FsError::Io(e),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!(?raw, dir = %path.display(), "skipping non UTF-8 file name"),
            }
        }
        names.sort();
        Ok(names)
    }

    fn open_read(&self, path: &Path) -> FsResult<Box<dyn Read + Send>> {
        let file = File::open(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, path: &Path) -> FsResult<Box<dyn Write + Send>> {
        let file = File::create(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn create_dir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> FsResult<bool> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        Ok(true)
    }

    fn rename(&self, from: &Path, to: &Path) -> FsResult<()> {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FsError::NotFound(from.to_path_buf()))
            }
            Err(e) if crosses_devices(&e) && from.is_file() => {
                debug!(
                    from = %from.display(),
                    to = %to.display(),
                    "cross-device rename; copying instead"
                );
                fs::copy(from, to).map_err(|e| FsError::from_io(e, from))?;
                fs::remove_file(from)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn copy(&self, from: &Path, to: &Path) -> FsResult<u64> {
        fs::copy(from, to).map_err(|e| FsError::from_io(e, from))
    }

    fn resolve(&self, path: &Path) -> FsResult<PathBuf> {
        fs::canonicalize(path).map_err(|e| FsError::from_io(e, path))
    }
}
