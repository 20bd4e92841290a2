use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::ChunkLogResult;
use crate::log::{BEGIN_SENTINEL, END_SENTINEL, HEADER_SIZE, MAX_CHUNK_LEN, TRAILER_SIZE};

/// Sequential reader over the committed chunks of a log.
///
/// Yields payloads in write order. Iteration ends at end of file or at the
/// first record that is not fully committed (missing begin sentinel, short
/// payload, missing or mismatched end sentinel). Structurally complete
/// records whose CRC does not match are skipped with a warning.
pub struct ChunkReader<R> {
    inner: R,
    /// Byte offset just past the last structurally complete record.
    committed_len: u64,
    done: bool,
}

impl ChunkReader<BufReader<File>> {
    /// Open a log file for reading. A missing file reads as empty.
    pub fn open(path: &Path) -> ChunkLogResult<Option<Self>> {
        match File::open(path) {
            Ok(file) => Ok(Some(Self::new(BufReader::new(file)))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read every committed chunk of the log at `path`.
    pub fn read_all(path: &Path) -> ChunkLogResult<Vec<Vec<u8>>> {
        match Self::open(path)? {
            Some(reader) => reader.collect(),
            None => Ok(Vec::new()),
        }
    }
}

impl<R: Read> ChunkReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            committed_len: 0,
            done: false,
        }
    }

    /// Offset just past the last fully committed record seen so far.
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    /// Consume the rest of the log and return the committed length.
    pub fn scan_committed_len(mut self) -> ChunkLogResult<u64> {
        while self.next_chunk()?.is_some() {}
        Ok(self.committed_len)
    }

    fn next_chunk(&mut self) -> ChunkLogResult<Option<Vec<u8>>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let offset = self.committed_len;

            let mut header = [0u8; HEADER_SIZE];
            if !read_full(&mut self.inner, &mut header)? {
                return self.stop(offset, "truncated chunk header");
            }
            if header[..8] != BEGIN_SENTINEL {
                return self.stop(offset, "missing begin sentinel");
            }
            let length = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
            let expected_crc = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
            if length > MAX_CHUNK_LEN {
                return self.stop(offset, "chunk length out of range");
            }

            let mut payload = vec![0u8; length as usize];
            if !read_full(&mut self.inner, &mut payload)? {
                return self.stop(offset, "truncated chunk payload");
            }
            let mut trailer = [0u8; TRAILER_SIZE];
            if !read_full(&mut self.inner, &mut trailer)? {
                return self.stop(offset, "missing end sentinel");
            }
            if trailer != END_SENTINEL {
                return self.stop(offset, "corrupt end sentinel");
            }

            self.committed_len = offset + (HEADER_SIZE + payload.len() + TRAILER_SIZE) as u64;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(
                    offset,
                    expected = expected_crc,
                    actual = actual_crc,
                    "CRC mismatch; skipping chunk"
                );
                continue;
            }
            return Ok(Some(payload));
        }
    }

    fn stop(&mut self, offset: u64, reason: &str) -> ChunkLogResult<Option<Vec<u8>>> {
        self.done = true;
        debug!(offset, reason, "end of committed chunks");
        Ok(None)
    }
}

impl<R: Read> Iterator for ChunkReader<R> {
    type Item = ChunkLogResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` completely. Returns `false` if the input ends first.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => return Ok(false),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
