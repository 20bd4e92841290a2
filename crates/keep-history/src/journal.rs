use std::path::Path;

use keep_chunklog::{ChunkLog, ChunkLogConfig, SyncMode};
use keep_types::ResourcePath;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{HistoryError, HistoryResult};
use crate::state::FileState;

/// One index mutation, as written to the journal.
///
/// Applying a record twice has the same effect as applying it once. A
/// history copy is journaled as the additions it made, never as the request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalRecord {
    AddState {
        path: ResourcePath,
        state: FileState,
    },
    Remove {
        path: ResourcePath,
    },
}

/// Write-ahead journal of history index mutations.
///
/// One bincode-encoded [`JournalRecord`] per chunk.
pub struct Journal {
    log: ChunkLog,
}

impl Journal {
    pub fn open(path: &Path, sync_mode: SyncMode) -> HistoryResult<Self> {
        let log = ChunkLog::open(path, ChunkLogConfig { sync_mode })?;
        Ok(Self { log })
    }

    pub fn record(&mut self, record: &JournalRecord) -> HistoryResult<()> {
        let payload =
            bincode::serialize(record).map_err(|e| HistoryError::Serialization(e.to_string()))?;
        let offset = self.log.write_chunk(&payload)?;
        debug!(offset, ?record, "journaled");
        Ok(())
    }

    /// Records written since the last checkpoint. Undecodable records are
    /// skipped.
    pub fn replay(&mut self) -> HistoryResult<Vec<JournalRecord>> {
        let mut records = Vec::new();
        for chunk in self.log.read_chunks()? {
            match bincode::deserialize::<JournalRecord>(&chunk) {
                Ok(record) => records.push(record),
                Err(e) => warn!(error = %e, "failed to decode journal record; skipping"),
            }
        }
        Ok(records)
    }

    /// Forget every record; the index now reflects them all.
    pub fn checkpoint(&mut self) -> HistoryResult<()> {
        if self.log.offset() > 0 {
            self.log.truncate()?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.log.offset() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keep_types::BlobId;

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.journal");
        let records = vec![
            JournalRecord::AddState {
                path: p("/proj/a.txt"),
                state: FileState::new(BlobId::generate(), 1234),
            },
            JournalRecord::AddState {
                path: p("/proj/b.txt"),
                state: FileState::new(BlobId::generate(), 5678),
            },
            JournalRecord::Remove { path: p("/proj") },
        ];

        {
            let mut journal = Journal::open(&path, SyncMode::EveryCommit).unwrap();
            for record in &records {
                journal.record(record).unwrap();
            }
        }

        let mut journal = Journal::open(&path, SyncMode::EveryCommit).unwrap();
        assert!(!journal.is_empty());
        assert_eq!(journal.replay().unwrap(), records);

        journal.checkpoint().unwrap();
        assert!(journal.is_empty());
        assert!(journal.replay().unwrap().is_empty());
    }
}
