use std::path::PathBuf;

use keep_chunklog::SyncMode;
use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Retention limits applied to every path's history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryPolicy {
    /// Most states kept per path.
    pub max_states: usize,
    /// Largest content, in bytes, accepted as a state.
    pub max_state_size: u64,
    /// States older than this (milliseconds) are dropped by `clean`.
    pub max_age_ms: i64,
}

impl Default for HistoryPolicy {
    fn default() -> Self {
        Self {
            max_states: 50,
            max_state_size: 1024 * 1024,
            max_age_ms: 7 * DAY_MS,
        }
    }
}

/// History store settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Directory holding the index, blobs and journal. A relative path is
    /// resolved by the caller (the workspace resolves it against its
    /// metadata directory).
    pub location: PathBuf,
    /// Blob shard fan-out.
    pub blob_shards: usize,
    pub policy: HistoryPolicy,
    /// Durability of journal writes.
    pub journal_sync: SyncMode,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            location: PathBuf::from("history"),
            blob_shards: 256,
            policy: HistoryPolicy::default(),
            journal_sync: SyncMode::default(),
        }
    }
}

impl HistoryConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    pub fn with_policy(mut self, policy: HistoryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> HistoryResult<()> {
        keep_blob::validate_limit(self.blob_shards)
            .map_err(|e| HistoryError::Config(e.to_string()))?;
        if self.policy.max_states == 0 {
            return Err(HistoryError::Config("max_states must be at least 1".into()));
        }
        if self.policy.max_age_ms <= 0 {
            return Err(HistoryError::Config("max_age_ms must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = HistoryConfig::default();
        assert_eq!(config.blob_shards, 256);
        assert_eq!(config.policy.max_states, 50);
        assert_eq!(config.policy.max_state_size, 1_048_576);
        assert_eq!(config.policy.max_age_ms, 604_800_000);
        assert_eq!(config.journal_sync, SyncMode::EveryCommit);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = HistoryConfig::new("/tmp/h");
        config.blob_shards = 35;
        assert!(matches!(config.validate(), Err(HistoryError::Config(_))));

        let mut config = HistoryConfig::new("/tmp/h");
        config.policy.max_states = 0;
        assert!(matches!(config.validate(), Err(HistoryError::Config(_))));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: HistoryConfig =
            serde_json::from_str(r#"{"policy": {"max_states": 3}, "journal_sync": "os_default"}"#)
                .unwrap();
        assert_eq!(config.policy.max_states, 3);
        assert_eq!(config.policy.max_age_ms, 7 * DAY_MS);
        assert_eq!(config.journal_sync, SyncMode::OsDefault);
        assert_eq!(config.blob_shards, 256);
    }
}
