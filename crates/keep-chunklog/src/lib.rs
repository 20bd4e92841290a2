//! Durable chunk log for Keep.
//!
//! A chunk log is a single file holding a sequence of independently
//! committed byte records ("chunks"). A crash between writes never leaves a
//! reader-visible partial chunk: a chunk only becomes part of the log once
//! its end sentinel is on disk, and readers stop at the first record that
//! lacks one.

pub mod error;
pub mod log;
pub mod reader;

pub use error::{ChunkLogError, ChunkLogResult};
pub use log::{ChunkLog, ChunkLogConfig, PendingChunk, SyncMode};
pub use reader::ChunkReader;
