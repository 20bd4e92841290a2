use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keep_blob::{BlobError, BlobStore};
use keep_bucket::{BucketTree, EntryMut, Visit};
use keep_fs::{FileInfo, FileStore};
use keep_types::{BlobId, Depth, ResourcePath};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::codec::HistoryCodec;
use crate::config::{HistoryConfig, HistoryPolicy};
use crate::error::{HistoryError, HistoryResult};
use crate::journal::{Journal, JournalRecord};
use crate::state::{FileState, HistoryEntry};

const BLOBS_DIR: &str = "blobs";
const INDEX_DIR: &str = "index";
const JOURNAL_FILE: &str = "history.journal";

/// Outcome of [`HistoryStore::clean`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanReport {
    pub entries_visited: usize,
    pub states_removed: usize,
}

/// Outcome of [`HistoryStore::remove_garbage`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcReport {
    pub blobs_scanned: usize,
    pub blobs_removed: usize,
}

/// Version history of workspace files.
///
/// Layout under the configured location:
///
/// ```text
/// blobs/            state content, see keep_blob
/// index/            bucket tree of history entries
/// history.journal   mutations not yet saved to the index
/// ```
///
/// All mutating calls take `&mut self`; callers share a store behind a
/// lock.
pub struct HistoryStore {
    location: PathBuf,
    policy: HistoryPolicy,
    blobs: BlobStore,
    tree: BucketTree<HistoryCodec>,
    journal: Journal,
}

impl HistoryStore {
    /// Open (or create) the store at `config.location`, replaying any
    /// journal left by an unclean shutdown.
    pub fn open(config: &HistoryConfig, fs: Arc<dyn FileStore>) -> HistoryResult<Self> {
        config.validate()?;
        let location = config.location.clone();
        let blob_root = location.join(BLOBS_DIR);
        fs.create_dir(&blob_root)?;

        let blobs = BlobStore::new(blob_root, config.blob_shards, fs)?;
        let tree = BucketTree::new(location.join(INDEX_DIR));
        let journal = Journal::open(&location.join(JOURNAL_FILE), config.journal_sync)?;

        let mut store = Self {
            location,
            policy: config.policy,
            blobs,
            tree,
            journal,
        };
        store.recover()?;
        debug!(location = %store.location.display(), "opened history store");
        Ok(store)
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn policy(&self) -> &HistoryPolicy {
        &self.policy
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    /// Record the content of `source` as a state of `path`.
    ///
    /// The state's timestamp is `info.last_modified_ms`. Content larger
    /// than the policy's `max_state_size` is not recorded and yields
    /// `Ok(None)`. With `move_content` the source file is moved into the
    /// store instead of copied.
    pub fn add_state(
        &mut self,
        path: &ResourcePath,
        source: &Path,
        info: &FileInfo,
        move_content: bool,
    ) -> HistoryResult<Option<FileState>> {
        require_path(path, "path")?;
        if info.size > self.policy.max_state_size {
            debug!(
                %path,
                size = info.size,
                max = self.policy.max_state_size,
                "state too large; not recorded"
            );
            return Ok(None);
        }
        let blob_id = self.blobs.add_blob(source, move_content)?;
        let state = FileState::new(blob_id, info.last_modified_ms);
        self.register_state(path, state)?;
        Ok(Some(state))
    }

    /// Record a state whose content is already in the blob store.
    /// Returns `false` if `path` already had that blob.
    pub fn register_state(
        &mut self,
        path: &ResourcePath,
        state: FileState,
    ) -> HistoryResult<bool> {
        require_path(path, "path")?;
        self.journal.record(&JournalRecord::AddState {
            path: path.clone(),
            state,
        })?;
        self.apply_add(path, state)
    }

    /// States of `path`, newest first.
    pub fn states(&mut self, path: &ResourcePath) -> HistoryResult<Vec<FileState>> {
        Ok(self
            .tree
            .get(path)?
            .map(HistoryEntry::into_states)
            .unwrap_or_default())
    }

    /// Open a state's content for reading.
    pub fn open_contents(&self, state: &FileState) -> HistoryResult<Box<dyn Read + Send>> {
        self.blobs
            .get_blob(&state.blob_id)
            .map_err(|e| state_error(e, state))
    }

    pub fn contents(&self, state: &FileState) -> HistoryResult<Vec<u8>> {
        self.blobs
            .read_blob(&state.blob_id)
            .map_err(|e| state_error(e, state))
    }

    /// Whether a state's content is still stored.
    pub fn exists(&self, state: &FileState) -> HistoryResult<bool> {
        Ok(self.blobs.contains(&state.blob_id)?)
    }

    /// Forget the history of `path` and everything below it. Blobs are
    /// reclaimed by [`HistoryStore::remove_garbage`]. Returns how many
    /// entries were removed.
    pub fn remove(&mut self, path: &ResourcePath) -> HistoryResult<usize> {
        self.journal
            .record(&JournalRecord::Remove { path: path.clone() })?;
        self.apply_remove(path)
    }

    /// Paths at or below `root` (within `depth`) that have history.
    pub fn all_files(
        &mut self,
        root: &ResourcePath,
        depth: Depth,
    ) -> HistoryResult<Vec<ResourcePath>> {
        let mut paths = Vec::new();
        let mut collect = |entry: &mut EntryMut<'_, HistoryEntry>| {
            paths.push(entry.path().clone());
            Visit::Continue
        };
        self.tree.accept(&mut collect, root, depth)?;
        Ok(paths)
    }

    /// Copy (or move) the history of `source` and all its descendants onto
    /// the matching paths under `destination`.
    ///
    /// Existing destination history is kept; the result is the union of
    /// both, newest first. Either path being the root, the two paths being
    /// equal, or one containing the other is an invalid argument. Returns
    /// the number of entries copied.
    pub fn copy_history(
        &mut self,
        source: &ResourcePath,
        destination: &ResourcePath,
        move_history: bool,
    ) -> HistoryResult<usize> {
        require_path(source, "source")?;
        require_path(destination, "destination")?;
        if source == destination {
            return Err(HistoryError::InvalidArgument(format!(
                "cannot copy history of {source} onto itself"
            )));
        }
        if source.is_prefix_of(destination) || destination.is_prefix_of(source) {
            return Err(HistoryError::InvalidArgument(format!(
                "cannot copy history between nested paths {source} and {destination}"
            )));
        }

        // Journal what was copied, not the request: replaying a copy after
        // a crash must not pick up states the source gained later.
        let found = self.collect_entries(source)?;
        for (relative, entry) in &found {
            let target = destination.join(relative);
            for state in entry.states() {
                self.register_state(&target, *state)?;
            }
        }
        if move_history {
            self.remove(source)?;
        }
        debug!(
            %source,
            %destination,
            move_history,
            copied = found.len(),
            "copied history"
        );
        Ok(found.len())
    }

    /// Apply the retention policy using the current time.
    pub fn clean(&mut self) -> HistoryResult<CleanReport> {
        self.clean_at(chrono::Utc::now().timestamp_millis())
    }

    /// Apply the retention policy as of `now_ms`: drop states older than
    /// `max_age_ms`, then keep at most `max_states` per path.
    pub fn clean_at(&mut self, now_ms: i64) -> HistoryResult<CleanReport> {
        // Pruning is not journaled; replaying older additions over it
        // would bring pruned states back.
        self.save()?;
        let cutoff = now_ms.saturating_sub(self.policy.max_age_ms);
        let max_states = self.policy.max_states;
        let mut report = CleanReport::default();

        let mut prune = |entry: &mut EntryMut<'_, HistoryEntry>| {
            report.entries_visited += 1;
            let mut kept = entry.value().clone();
            let removed = kept.remove_older_than(cutoff) + kept.truncate(max_states);
            if removed > 0 {
                report.states_removed += removed;
                entry.set_value(kept);
            }
            Visit::Continue
        };
        self.tree
            .accept(&mut prune, &ResourcePath::root(), Depth::Infinite)?;
        self.save()?;

        info!(
            entries = report.entries_visited,
            removed = report.states_removed,
            "cleaned history"
        );
        Ok(report)
    }

    /// Delete every blob no history entry refers to.
    ///
    /// Saves the index first.
    pub fn remove_garbage(&mut self) -> HistoryResult<GcReport> {
        self.save()?;

        let mut referenced = HashSet::new();
        let mut mark = |entry: &mut EntryMut<'_, HistoryEntry>| {
            referenced.extend(entry.value().blob_ids().copied());
            Visit::Continue
        };
        self.tree
            .accept(&mut mark, &ResourcePath::root(), Depth::Infinite)?;

        let all = self.blobs.all_ids()?;
        let garbage: Vec<BlobId> = all
            .iter()
            .filter(|id| !referenced.contains(*id))
            .copied()
            .collect();
        let removed = self.blobs.delete_blobs(&garbage)?;

        let report = GcReport {
            blobs_scanned: all.len(),
            blobs_removed: removed,
        };
        info!(
            scanned = report.blobs_scanned,
            removed = report.blobs_removed,
            "removed unreferenced blobs"
        );
        Ok(report)
    }

    /// Write the index to disk and empty the journal.
    pub fn save(&mut self) -> HistoryResult<()> {
        self.tree.save()?;
        self.journal.checkpoint()?;
        Ok(())
    }

    pub fn close(mut self) -> HistoryResult<()> {
        self.save()
    }

    fn recover(&mut self) -> HistoryResult<()> {
        let records = self.journal.replay()?;
        if records.is_empty() {
            return Ok(());
        }
        info!(records = records.len(), "replaying history journal");
        for record in records {
            match record {
                JournalRecord::AddState { path, state } => {
                    self.apply_add(&path, state)?;
                }
                JournalRecord::Remove { path } => {
                    self.apply_remove(&path)?;
                }
            }
        }
        self.save()
    }

    fn apply_add(&mut self, path: &ResourcePath, state: FileState) -> HistoryResult<bool> {
        let mut entry = self.tree.get(path)?.unwrap_or_default();
        if !entry.add(state) {
            debug!(%path, blob = %state.blob_id, "state already recorded");
            return Ok(false);
        }
        self.tree.set(path.clone(), entry)?;
        debug!(%path, blob = %state.blob_id, "recorded state");
        Ok(true)
    }

    fn apply_remove(&mut self, path: &ResourcePath) -> HistoryResult<usize> {
        let mut removed = 0;
        let mut drop_entry = |entry: &mut EntryMut<'_, HistoryEntry>| {
            entry.delete();
            removed += 1;
            Visit::Continue
        };
        self.tree.accept(&mut drop_entry, path, Depth::Infinite)?;
        debug!(%path, removed, "removed history");
        Ok(removed)
    }

    /// History entries at or below `root`, keyed by their path relative
    /// to it.
    fn collect_entries(
        &mut self,
        root: &ResourcePath,
    ) -> HistoryResult<Vec<(ResourcePath, HistoryEntry)>> {
        let mut found = Vec::new();
        let mut take = |entry: &mut EntryMut<'_, HistoryEntry>| {
            if let Some(relative) = entry.path().strip_prefix(root) {
                found.push((relative, entry.value().clone()));
            }
            Visit::Continue
        };
        self.tree.accept(&mut take, root, Depth::Infinite)?;
        Ok(found)
    }
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("location", &self.location)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn require_path(path: &ResourcePath, what: &str) -> HistoryResult<()> {
    if path.is_root() {
        return Err(HistoryError::InvalidArgument(format!("{what} path is missing")));
    }
    Ok(())
}

fn state_error(err: BlobError, state: &FileState) -> HistoryError {
    match err {
        BlobError::NotFound(_) => HistoryError::StateNotFound(state.blob_id),
        other => other.into(),
    }
}
