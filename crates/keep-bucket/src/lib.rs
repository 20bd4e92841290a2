//! Path-indexed persistent metadata for Keep.
//!
//! A [`Bucket`] is an in-memory table of `(ResourcePath, value)` entries
//! backed by one binary index file. A [`BucketTree`] spreads a whole
//! workspace namespace over many buckets (one for the workspace root, one
//! per top-level container) and keeps exactly one of them in memory,
//! swapping it as traversals cross container boundaries.
//!
//! What a value looks like is decided by an [`EntryCodec`]. This crate
//! ships [`PropertyCodec`] for string properties; the history store
//! provides its own codec for lists of states.
//!
//! # Index file format
//!
//! ```text
//! version: u8
//! repeated until EOF:
//!     path_len: u32 LE, path: UTF-8 ("/a/b")
//!     payload: codec specific
//! ```
//!
//! Indices are caches of derivable data. A file with an unknown version
//! byte or a garbled payload loads as an empty bucket, with a warning.

pub mod bucket;
pub mod codec;
pub mod error;
pub mod properties;
pub mod tree;
pub mod visitor;

pub use bucket::Bucket;
pub use codec::{ByteReader, ByteWriter, EntryCodec};
pub use error::{BucketError, BucketResult};
pub use properties::{Properties, PropertyCodec, PropertyStore};
pub use tree::BucketTree;
pub use visitor::{BucketVisitor, EntryMut, Visit};
