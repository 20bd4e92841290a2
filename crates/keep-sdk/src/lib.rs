//! High-level API for Keep.
//!
//! [`Workspace`] ties the pieces together: a directory on disk, the
//! resource tree mirroring it (persisted between sessions), the local
//! history of its files and per-resource properties. It is the entry
//! point for applications embedding Keep and for the `keep` command line
//! tool.

pub mod config;
pub mod error;
pub mod index;
pub mod workspace;

pub use config::WorkspaceConfig;
pub use error::{SdkError, SdkResult};
pub use index::{ResourceIndex, ResourceRecord};
pub use workspace::Workspace;

// Re-export key types
pub use keep_history::{CleanReport, FileState, GcReport, HistoryConfig, HistoryPolicy};
pub use keep_sync::{Change, ResourceKind, SyncReport};
pub use keep_types::{BlobId, Depth, ResourcePath};
