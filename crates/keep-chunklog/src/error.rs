use std::io;

/// Errors produced by the chunk log.
#[derive(Debug, thiserror::Error)]
pub enum ChunkLogError {
    /// I/O error while reading or writing the log file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A chunk was appended while another one is still uncommitted.
    #[error("chunk at offset {offset} is still pending; commit or abort it first")]
    ChunkInProgress { offset: u64 },

    /// `commit`/`abort` was called with a handle that is not the pending chunk.
    #[error("no pending chunk at offset {offset}")]
    NoPendingChunk { offset: u64 },

    /// The payload does not fit the length field.
    #[error("chunk of {len} bytes exceeds the maximum of {max} bytes")]
    ChunkTooLarge { len: usize, max: u32 },
}

/// Convenience alias used throughout the chunk log crate.
pub type ChunkLogResult<T> = std::result::Result<T, ChunkLogError>;
