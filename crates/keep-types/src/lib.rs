//! Foundation types for Keep, the local history engine.
//!
//! Every other `keep-*` crate depends on this one.
//!
//! # Key Types
//!
//! - [`ResourcePath`] -- Slash-separated, segment-based workspace path
//! - [`BlobId`] -- Time-ordered 128-bit identifier of a stored blob
//! - [`Depth`] -- Traversal depth (zero, one, infinite)

pub mod blob_id;
pub mod depth;
pub mod error;
pub mod path;

pub use blob_id::BlobId;
pub use depth::Depth;
pub use error::TypeError;
pub use path::ResourcePath;
