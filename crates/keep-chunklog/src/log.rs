use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ChunkLogError, ChunkLogResult};
use crate::reader::ChunkReader;

/// Marks the start of every record.
pub(crate) const BEGIN_SENTINEL: [u8; 8] = [0x8b, b'K', b'C', b'B', b'E', b'G', 0x0d, 0x0a];
/// Marks a committed record. Written only on commit.
pub(crate) const END_SENTINEL: [u8; 8] = [0x8b, b'K', b'C', b'E', b'N', b'D', 0x0d, 0x0a];

/// Begin sentinel + length (u32 LE) + CRC32 (u32 LE).
pub(crate) const HEADER_SIZE: usize = 8 + 4 + 4;
pub(crate) const TRAILER_SIZE: usize = 8;

/// Largest accepted payload. Anything bigger in a length field is treated
/// as corruption.
pub const MAX_CHUNK_LEN: u32 = 256 * 1024 * 1024;

/// When committed chunks are forced to stable storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every commit.
    #[default]
    EveryCommit,
    /// Flush to the OS and let it decide when to write back.
    OsDefault,
}

/// Chunk log settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkLogConfig {
    pub sync_mode: SyncMode,
}

/// Handle for a chunk that has been appended but not yet committed.
///
/// Pass it to [`ChunkLog::commit`] to make the chunk durable or to
/// [`ChunkLog::abort`] to drop it.
#[must_use = "an appended chunk is invisible to readers until committed"]
#[derive(Debug, PartialEq, Eq)]
pub struct PendingChunk {
    offset: u64,
    len: u32,
}

impl PendingChunk {
    /// File offset of the record's begin sentinel.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload length in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Append-only log of independently committed chunks.
///
/// Record layout: `BEGIN(8) | len u32 LE | crc32 u32 LE | payload | END(8)`.
/// The end sentinel is the commit marker; a record without it is never
/// returned by a reader and is cut off the next time the log is opened.
///
/// At most one chunk may be pending at a time.
pub struct ChunkLog {
    path: PathBuf,
    writer: BufWriter<File>,
    /// Offset at which the next record starts.
    offset: u64,
    /// Start of the uncommitted record, if any.
    pending: Option<u64>,
    config: ChunkLogConfig,
}

impl ChunkLog {
    /// Open or create a log file, discarding any uncommitted tail left by
    /// an earlier crash.
    pub fn open(path: &Path, config: ChunkLogConfig) -> ChunkLogResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let committed = ChunkReader::new(BufReader::new(&file)).scan_committed_len()?;
        if committed < file_len {
            warn!(
                path = %path.display(),
                committed,
                discarded = file_len - committed,
                "discarding uncommitted chunk log tail"
            );
            file.set_len(committed)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::Start(committed))?;

        debug!(path = %path.display(), len = committed, "opened chunk log");
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset: committed,
            pending: None,
            config,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current length of the log in bytes, including any pending chunk.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a new chunk. It stays invisible to readers until committed.
    pub fn append(&mut self, payload: &[u8]) -> ChunkLogResult<PendingChunk> {
        if let Some(offset) = self.pending {
            return Err(ChunkLogError::ChunkInProgress { offset });
        }
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_CHUNK_LEN)
            .ok_or(ChunkLogError::ChunkTooLarge {
                len: payload.len(),
                max: MAX_CHUNK_LEN,
            })?;

        let start = self.offset;
        self.writer.write_all(&BEGIN_SENTINEL)?;
        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&crc32fast::hash(payload).to_le_bytes())?;
        self.writer.write_all(payload)?;

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        self.pending = Some(start);
        Ok(PendingChunk { offset: start, len })
    }

    /// Commit a pending chunk. Returns its offset.
    pub fn commit(&mut self, chunk: PendingChunk) -> ChunkLogResult<u64> {
        if self.pending != Some(chunk.offset) {
            return Err(ChunkLogError::NoPendingChunk {
                offset: chunk.offset,
            });
        }
        self.writer.write_all(&END_SENTINEL)?;
        self.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryCommit {
            self.writer.get_ref().sync_data()?;
        }
        self.offset += TRAILER_SIZE as u64;
        self.pending = None;
        debug!(offset = chunk.offset, len = chunk.len, "committed chunk");
        Ok(chunk.offset)
    }

    /// Drop a pending chunk, removing its bytes from the file.
    pub fn abort(&mut self, chunk: PendingChunk) -> ChunkLogResult<()> {
        if self.pending != Some(chunk.offset) {
            return Err(ChunkLogError::NoPendingChunk {
                offset: chunk.offset,
            });
        }
        self.cut_to(chunk.offset)?;
        debug!(offset = chunk.offset, "aborted chunk");
        Ok(())
    }

    /// Append and commit in one step.
    pub fn write_chunk(&mut self, payload: &[u8]) -> ChunkLogResult<u64> {
        let chunk = self.append(payload)?;
        self.commit(chunk)
    }

    /// Committed chunks in write order.
    pub fn read_chunks(&mut self) -> ChunkLogResult<Vec<Vec<u8>>> {
        self.writer.flush()?;
        ChunkReader::read_all(&self.path)
    }

    /// Empty the log. Any pending chunk is discarded.
    pub fn truncate(&mut self) -> ChunkLogResult<()> {
        self.cut_to(0)?;
        info!(path = %self.path.display(), "truncated chunk log");
        Ok(())
    }

    fn cut_to(&mut self, len: u64) -> ChunkLogResult<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(len)?;
        file.seek(SeekFrom::Start(len))?;
        if self.config.sync_mode == SyncMode::EveryCommit {
            file.sync_data()?;
        }
        self.offset = len;
        self.pending = None;
        Ok(())
    }
}

/// Encode one committed record.
#[cfg(test)]
pub(crate) fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    buf.extend_from_slice(&BEGIN_SENTINEL);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&END_SENTINEL);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn open(path: &Path) -> ChunkLog {
        ChunkLog::open(path, ChunkLogConfig::default()).unwrap()
    }

    #[test]
    fn write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut log = open(&path);
        log.write_chunk(b"first").unwrap();
        log.write_chunk(b"").unwrap();
        log.write_chunk(b"third").unwrap();

        let chunks = log.read_chunks().unwrap();
        assert_eq!(chunks, vec![b"first".to_vec(), Vec::new(), b"third".to_vec()]);
    }

    #[test]
    fn reopen_appends_after_existing_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let mut log = open(&path);
            log.write_chunk(b"a").unwrap();
        }
        let mut log = open(&path);
        log.write_chunk(b"b").unwrap();
        assert_eq!(log.read_chunks().unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn payload_may_contain_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut tricky = END_SENTINEL.to_vec();
        tricky.extend_from_slice(&BEGIN_SENTINEL);
        tricky.extend_from_slice(&END_SENTINEL);

        let mut log = open(&path);
        log.write_chunk(&tricky).unwrap();
        log.write_chunk(b"after").unwrap();
        drop(log);

        let chunks = ChunkReader::read_all(&path).unwrap();
        assert_eq!(chunks, vec![tricky, b"after".to_vec()]);
    }

    #[test]
    fn uncommitted_chunk_is_discarded_after_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        {
            let mut log = open(&path);
            log.write_chunk(b"kept").unwrap();
            let _pending = log.append(b"lost in the crash").unwrap();
            // Dropped without commit: header and payload reach the file,
            // the end sentinel never does.
        }
        assert_eq!(ChunkReader::read_all(&path).unwrap(), vec![b"kept".to_vec()]);

        let mut log = open(&path);
        assert_eq!(log.offset(), encode_record(b"kept").len() as u64);
        log.write_chunk(b"next").unwrap();
        assert_eq!(log.read_chunks().unwrap(), vec![b"kept".to_vec(), b"next".to_vec()]);
    }

    #[test]
    fn abort_removes_pending_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut log = open(&path);
        log.write_chunk(b"one").unwrap();
        let before = log.offset();
        let pending = log.append(b"never mind").unwrap();
        log.abort(pending).unwrap();
        assert_eq!(log.offset(), before);
        assert_eq!(fs::metadata(&path).unwrap().len(), before);

        log.write_chunk(b"two").unwrap();
        assert_eq!(log.read_chunks().unwrap(), vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn one_pending_chunk_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&dir.path().join("test.log"));

        let pending = log.append(b"a").unwrap();
        assert!(log.has_pending());
        let err = log.append(b"b").unwrap_err();
        assert!(matches!(err, ChunkLogError::ChunkInProgress { offset: 0 }));

        assert_eq!(log.commit(pending).unwrap(), 0);
        assert!(!log.has_pending());
    }

    #[test]
    fn commit_requires_matching_pending_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = open(&dir.path().join("test.log"));

        let stale = PendingChunk { offset: 99, len: 1 };
        assert!(matches!(
            log.commit(stale),
            Err(ChunkLogError::NoPendingChunk { offset: 99 })
        ));
    }

    #[test]
    fn corrupted_payload_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut log = open(&path);
        log.write_chunk(b"good").unwrap();
        let bad_offset = log.write_chunk(b"flipped").unwrap();
        log.write_chunk(b"also good").unwrap();
        drop(log);

        let mut data = fs::read(&path).unwrap();
        data[bad_offset as usize + HEADER_SIZE] ^= 0xff;
        fs::write(&path, &data).unwrap();

        let chunks = ChunkReader::read_all(&path).unwrap();
        assert_eq!(chunks, vec![b"good".to_vec(), b"also good".to_vec()]);
    }

    #[test]
    fn truncate_empties_the_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");

        let mut log = open(&path);
        log.write_chunk(b"x").unwrap();
        let _pending = log.append(b"y").unwrap();
        log.truncate().unwrap();
        assert_eq!(log.offset(), 0);
        assert!(!log.has_pending());
        assert!(log.read_chunks().unwrap().is_empty());

        log.write_chunk(b"z").unwrap();
        assert_eq!(log.read_chunks().unwrap(), vec![b"z".to_vec()]);
    }

    #[test]
    fn os_default_sync_mode_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.log");
        let config = ChunkLogConfig {
            sync_mode: SyncMode::OsDefault,
        };
        let mut log = ChunkLog::open(&path, config).unwrap();
        log.write_chunk(b"lazy").unwrap();
        drop(log);
        assert_eq!(ChunkReader::read_all(&path).unwrap(), vec![b"lazy".to_vec()]);
    }

    proptest! {
        #[test]
        fn torn_write_yields_committed_prefix(
            payloads in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..64),
                1..8,
            ),
            cut_seed in any::<u64>(),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("torn.log");

            let mut ends = Vec::new();
            {
                let mut log = open(&path);
                for payload in &payloads {
                    log.write_chunk(payload).unwrap();
                    ends.push(log.offset());
                }
            }

            let full = fs::read(&path).unwrap();
            let cut = (cut_seed % (full.len() as u64 + 1)) as usize;
            fs::write(&path, &full[..cut]).unwrap();

            let survivors = ends.iter().filter(|end| **end <= cut as u64).count();
            let chunks = ChunkReader::read_all(&path).unwrap();
            prop_assert_eq!(&chunks[..], &payloads[..survivors]);

            let log = open(&path);
            let expected_len = if survivors == 0 { 0 } else { ends[survivors - 1] };
            prop_assert_eq!(log.offset(), expected_len);
        }
    }
}
