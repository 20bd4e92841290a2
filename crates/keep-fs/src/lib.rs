//! File-store abstraction for Keep.
//!
//! The history engine never touches user content through `std::fs`
//! directly; it goes through a [`FileStore`] so the host file system can be
//! swapped out.
//!
//! - [`FileStore`] -- the storage interface
//! - [`LocalFileStore`] -- implementation over the local file system
//! - [`FileInfo`] / [`FileKind`] -- stat results

pub mod error;
pub mod local;
pub mod traits;

pub use error::{FsError, FsResult};
pub use local::LocalFileStore;
pub use traits::{FileInfo, FileKind, FileStore};
