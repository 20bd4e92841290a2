use std::cmp::Ordering;

use keep_types::BlobId;
use serde::{Deserialize, Serialize};

/// One stored version of a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileState {
    pub blob_id: BlobId,
    /// Modification time of the content, milliseconds since the epoch.
    pub timestamp_ms: i64,
}

impl FileState {
    pub fn new(blob_id: BlobId, timestamp_ms: i64) -> Self {
        Self {
            blob_id,
            timestamp_ms,
        }
    }

    /// Orders newer states first: later timestamp, then later blob id.
    pub fn newest_first(a: &Self, b: &Self) -> Ordering {
        b.timestamp_ms
            .cmp(&a.timestamp_ms)
            .then_with(|| b.blob_id.cmp(&a.blob_id))
    }
}

/// The states of one path, newest first, at most one per blob id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    states: Vec<FileState>,
}

impl HistoryEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from states in any order; duplicates by blob id collapse.
    pub fn from_states(states: impl IntoIterator<Item = FileState>) -> Self {
        let mut entry = Self::new();
        for state in states {
            entry.add(state);
        }
        entry
    }

    pub fn states(&self) -> &[FileState] {
        &self.states
    }

    pub fn into_states(self) -> Vec<FileState> {
        self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, blob_id: &BlobId) -> bool {
        self.states.iter().any(|s| s.blob_id == *blob_id)
    }

    pub fn blob_ids(&self) -> impl Iterator<Item = &BlobId> {
        self.states.iter().map(|s| &s.blob_id)
    }

    /// Insert a state in order. Returns `false` if its blob id is already
    /// present.
    pub fn add(&mut self, state: FileState) -> bool {
        if self.contains(&state.blob_id) {
            return false;
        }
        let at = self
            .states
            .partition_point(|s| FileState::newest_first(s, &state) == Ordering::Less);
        self.states.insert(at, state);
        true
    }

    /// Add every state of `other`. Returns how many were new.
    pub fn merge(&mut self, other: &HistoryEntry) -> usize {
        other.states.iter().filter(|s| self.add(**s)).count()
    }

    /// Drop states with a timestamp before `cutoff_ms`. Returns how many
    /// were dropped.
    pub fn remove_older_than(&mut self, cutoff_ms: i64) -> usize {
        let before = self.states.len();
        self.states.retain(|s| s.timestamp_ms >= cutoff_ms);
        before - self.states.len()
    }

    /// Keep only the `max` newest states. Returns how many were dropped.
    pub fn truncate(&mut self, max: usize) -> usize {
        let dropped = self.states.len().saturating_sub(max);
        self.states.truncate(max);
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn duplicate_blob_is_ignored() {
        let id = BlobId::generate();
        let mut entry = HistoryEntry::new();
        assert!(entry.add(FileState::new(id, 10)));
        assert!(!entry.add(FileState::new(id, 10)));
        assert!(!entry.add(FileState::new(id, 99)));
        assert_eq!(entry.len(), 1);
    }

    #[test]
    fn equal_timestamps_order_by_newer_blob() {
        let older = BlobId::generate();
        let newer = BlobId::generate();
        let mut entry = HistoryEntry::new();
        entry.add(FileState::new(newer, 5));
        entry.add(FileState::new(older, 5));
        entry.add(FileState::new(BlobId::generate(), 1));

        let ids: Vec<_> = entry.states().iter().map(|s| s.blob_id).collect();
        assert_eq!(ids[0], newer);
        assert_eq!(ids[1], older);
        assert_eq!(entry.states()[2].timestamp_ms, 1);
    }

    #[test]
    fn merge_is_a_union() {
        let shared = FileState::new(BlobId::generate(), 3);
        let mut a = HistoryEntry::from_states([shared, FileState::new(BlobId::generate(), 1)]);
        let b = HistoryEntry::from_states([shared, FileState::new(BlobId::generate(), 2)]);

        assert_eq!(a.merge(&b), 1);
        assert_eq!(a.len(), 3);
        let times: Vec<_> = a.states().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(times, vec![3, 2, 1]);
    }

    #[test]
    fn retention_helpers() {
        let states = (0..10).map(|t| FileState::new(BlobId::generate(), t));
        let mut entry = HistoryEntry::from_states(states);
        assert_eq!(entry.remove_older_than(3), 3);
        assert_eq!(entry.truncate(4), 3);
        let times: Vec<_> = entry.states().iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(times, vec![9, 8, 7, 6]);
        assert_eq!(entry.truncate(10), 0);
    }

    proptest! {
        #[test]
        fn states_stay_sorted(
            timestamps in proptest::collection::vec(0i64..20, 0..40),
            seed in any::<u64>(),
        ) {
            let states: Vec<FileState> = timestamps
                .iter()
                .map(|t| FileState::new(BlobId::generate(), *t))
                .collect();
            // Insert in a scrambled order.
            let mut order: Vec<usize> = (0..states.len()).collect();
            let n = order.len().max(1);
            order.sort_by_key(|i| (seed as usize).wrapping_mul(i + 1) % n);

            let entry = HistoryEntry::from_states(order.iter().map(|i| states[*i]));
            prop_assert_eq!(entry.len(), states.len());
            for pair in entry.states().windows(2) {
                prop_assert!(pair[0].timestamp_ms >= pair[1].timestamp_ms);
                if pair[0].timestamp_ms == pair[1].timestamp_ms {
                    prop_assert!(pair[0].blob_id > pair[1].blob_id);
                }
            }
        }
    }
}
