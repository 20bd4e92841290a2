//! Blob storage for Keep.
//!
//! Historical file content is stored as immutable blobs, one file per
//! blob, named by a freshly generated [`BlobId`](keep_types::BlobId) and
//! spread over a fixed number of shard directories:
//!
//! ```text
//! <root>/<shard>/<blob id hex>
//! ```
//!
//! The shard count is fixed when the store is created. Changing it later
//! would strand every blob written before, so an invalid count is rejected
//! up front.

pub mod error;
pub mod shard;
pub mod store;

pub use error::{BlobError, BlobResult};
pub use shard::{shard, validate_limit, MAX_SHARDS};
pub use store::BlobStore;
