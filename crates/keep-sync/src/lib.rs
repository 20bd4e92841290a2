//! Resource model and synchronization for Keep.
//!
//! [`ResourceTree`] is the in-memory picture of the workspace: a root,
//! projects directly below it, and folders and files below those.
//! [`UnifiedTree`] walks that picture and the file system side by side,
//! handing a visitor one merged node per name. [`Synchronizer`] uses it to
//! find what was added, removed or changed on disk and brings the resource
//! tree up to date.

pub mod error;
pub mod refresh;
pub mod resource;
pub mod unified;

pub use error::{SyncError, SyncResult};
pub use refresh::{refresh, Change, RefreshVisitor, SyncReport, Synchronizer};
pub use resource::{NodeId, ResourceKind, ResourceTree, SyncStamp};
pub use unified::{UnifiedChild, UnifiedNode, UnifiedTree, UnifiedVisitor};
