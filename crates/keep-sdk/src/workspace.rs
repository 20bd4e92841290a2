use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keep_bucket::{Properties, PropertyStore};
use keep_fs::{FileInfo, FileStore, FsError, LocalFileStore};
use keep_history::{CleanReport, FileState, GcReport, HistoryError, HistoryStore};
use keep_sync::{ResourceKind, ResourceTree, SyncError, SyncReport, SyncStamp, Synchronizer};
use keep_types::{Depth, ResourcePath};
use tracing::{debug, info};

use crate::config::WorkspaceConfig;
use crate::error::{SdkError, SdkResult};
use crate::index::ResourceIndex;

/// A synchronized directory with local history.
///
/// The resource tree is kept on disk between sessions, together with the
/// sync stamps it last saw; changes made while the workspace was closed
/// show up on the next [`Workspace::refresh`].
///
/// Mutating calls take `&mut self`; share a workspace between threads
/// behind a lock. A refresh running on one thread can be cancelled from
/// another through [`Workspace::cancel_handle`].
pub struct Workspace {
    config: WorkspaceConfig,
    fs: Arc<dyn FileStore>,
    resources: ResourceTree,
    index: ResourceIndex,
    history: HistoryStore,
    properties: PropertyStore,
    cancel: Arc<AtomicBool>,
}

impl Workspace {
    /// Open a workspace on the local file system.
    pub fn open(config: WorkspaceConfig) -> SdkResult<Self> {
        Self::open_with(config, Arc::new(LocalFileStore::new()))
    }

    /// Open a workspace over any file store.
    ///
    /// The resource tree is restored as last saved; nothing is read from
    /// the workspace directory itself until the first refresh.
    pub fn open_with(config: WorkspaceConfig, fs: Arc<dyn FileStore>) -> SdkResult<Self> {
        config.validate()?;
        fs.create_dir(&config.metadata_path())?;

        let mut history_config = config.history.clone();
        history_config.location = config.history_location();
        let history = HistoryStore::open(&history_config, fs.clone())?;
        let properties = PropertyStore::new(config.properties_location());
        let mut index = ResourceIndex::new(config.resources_location());
        let resources = index.load()?;

        info!(
            root = %config.root.display(),
            resources = resources.len(),
            "opened workspace"
        );
        Ok(Self {
            config,
            fs,
            resources,
            index,
            history,
            properties,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn resources(&self) -> &ResourceTree {
        &self.resources
    }

    /// Host path of a workspace path.
    pub fn location_of(&self, path: &ResourcePath) -> PathBuf {
        path.to_fs_path(&self.config.root)
    }

    /// Flag that cancels a running refresh when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    // ---- Synchronization ----

    /// Bring the resource tree under `path` in line with the disk.
    pub fn refresh(&mut self, path: &ResourcePath, depth: Depth) -> SdkResult<SyncReport> {
        let outcome = Synchronizer::new(self.fs.as_ref(), &self.config.root)
            .excluding(self.config.metadata_dir.clone())
            .with_cancel(self.cancel.clone())
            .refresh(&mut self.resources, path, depth);
        self.cancel.store(false, Ordering::Relaxed);
        let report = outcome?;
        self.index.apply(&report)?;
        Ok(report)
    }

    // ---- History ----

    /// States of `path`, newest first.
    pub fn history(&mut self, path: &ResourcePath) -> SdkResult<Vec<FileState>> {
        Ok(self.history.states(path)?)
    }

    /// Content of a state.
    pub fn contents(&self, state: &FileState) -> SdkResult<Vec<u8>> {
        self.history.contents(state).map_err(|e| match e {
            HistoryError::StateNotFound(id) => SdkError::NotFound(format!("state {id}")),
            other => other.into(),
        })
    }

    /// Record the current content of the file at `path` as a state.
    pub fn add_state(&mut self, path: &ResourcePath) -> SdkResult<Option<FileState>> {
        let location = self.location_of(path);
        let info = self.file_info(path, &location)?;
        self.record_state(path, &location, &info)
    }

    pub fn clean(&mut self) -> SdkResult<CleanReport> {
        Ok(self.history.clean()?)
    }

    pub fn copy_history(
        &mut self,
        source: &ResourcePath,
        destination: &ResourcePath,
        move_history: bool,
    ) -> SdkResult<usize> {
        Ok(self.history.copy_history(source, destination, move_history)?)
    }

    pub fn remove_garbage(&mut self) -> SdkResult<GcReport> {
        Ok(self.history.remove_garbage()?)
    }

    /// Paths under `path` that have history but no longer exist.
    pub fn deleted_with_history(
        &mut self,
        path: &ResourcePath,
        depth: Depth,
    ) -> SdkResult<Vec<ResourcePath>> {
        let mut deleted = self.history.all_files(path, depth)?;
        deleted.retain(|p| self.resources.find(p).is_none());
        Ok(deleted)
    }

    // ---- Resources ----

    pub fn create_project(&mut self, path: &ResourcePath) -> SdkResult<()> {
        self.create_container(path, ResourceKind::Project)
    }

    pub fn create_folder(&mut self, path: &ResourcePath) -> SdkResult<()> {
        self.create_container(path, ResourceKind::Folder)
    }

    /// Create a new file with `contents`. Its parent must already exist.
    pub fn create_file(&mut self, path: &ResourcePath, contents: &[u8]) -> SdkResult<()> {
        self.check_creatable(path, ResourceKind::File)?;
        let location = self.location_of(path);
        self.fs.write(&location, contents)?;
        let info = self.file_info(path, &location)?;
        let stamp = Some(SyncStamp::from(&info));
        self.resources.create(path, ResourceKind::File, stamp)?;
        self.index.record(path, ResourceKind::File, stamp)?;
        debug!(%path, len = contents.len(), "created file");
        Ok(())
    }

    /// Replace a file's content. With `keep_history` the old content is
    /// first copied into the history store.
    pub fn set_contents(
        &mut self,
        path: &ResourcePath,
        contents: &[u8],
        keep_history: bool,
    ) -> SdkResult<()> {
        let id = self.require_file(path)?;
        let location = self.location_of(path);
        if keep_history {
            let info = self.file_info(path, &location)?;
            self.record_state(path, &location, &info)?;
        }
        self.fs.write(&location, contents)?;
        let info = self.file_info(path, &location)?;
        let stamp = SyncStamp::from(&info);
        self.resources.set_stamp(id, stamp);
        self.index.record(path, ResourceKind::File, Some(stamp))?;
        debug!(%path, len = contents.len(), keep_history, "set contents");
        Ok(())
    }

    /// Delete a resource and its subtree from disk and from the tree.
    /// With `keep_history` every file in the subtree is recorded first.
    /// Returns the number of resources removed.
    pub fn delete(&mut self, path: &ResourcePath, keep_history: bool) -> SdkResult<usize> {
        if path.is_root() {
            return Err(SdkError::InvalidOperation(
                "the workspace root cannot be deleted".into(),
            ));
        }
        let id = self
            .resources
            .find(path)
            .ok_or_else(|| SdkError::NotFound(path.to_string()))?;

        if keep_history {
            let files: Vec<ResourcePath> = self
                .resources
                .descendants(id)
                .into_iter()
                .filter(|d| self.resources.kind(*d) == Some(ResourceKind::File))
                .filter_map(|d| self.resources.path_of(d))
                .collect();
            for file in files {
                let location = self.location_of(&file);
                if let Some(info) = self.fs.stat(&location)?.filter(FileInfo::is_file) {
                    self.record_state(&file, &location, &info)?;
                }
            }
        }

        self.fs.delete(&self.location_of(path))?;
        let removed = self.resources.remove(path)?;
        self.index.forget(path)?;
        self.properties.remove_all(path)?;
        debug!(%path, removed, keep_history, "deleted");
        Ok(removed)
    }

    /// Move a resource and its subtree to `destination`, which must not
    /// exist yet. History and properties go along; the history of the
    /// old paths is kept, so it can still be restored from there.
    pub fn move_resource(
        &mut self,
        source: &ResourcePath,
        destination: &ResourcePath,
    ) -> SdkResult<()> {
        self.check_transfer(source, destination)?;
        self.fs.rename(&self.location_of(source), &self.location_of(destination))?;
        self.history.copy_history(source, destination, false)?;
        self.properties.copy(source, destination)?;
        self.properties.remove_all(source)?;
        self.resources.remove(source)?;
        self.index.forget(source)?;
        self.refresh(destination, Depth::Infinite)?;
        debug!(%source, %destination, "moved");
        Ok(())
    }

    /// Copy a resource and its subtree to `destination`, which must not
    /// exist yet. The copy starts with the history and properties of the
    /// original.
    pub fn copy_resource(
        &mut self,
        source: &ResourcePath,
        destination: &ResourcePath,
    ) -> SdkResult<()> {
        self.check_transfer(source, destination)?;
        copy_tree(
            self.fs.as_ref(),
            &self.location_of(source),
            &self.location_of(destination),
        )?;
        self.history.copy_history(source, destination, false)?;
        self.properties.copy(source, destination)?;
        self.refresh(destination, Depth::Infinite)?;
        debug!(%source, %destination, "copied");
        Ok(())
    }

    // ---- Properties ----

    pub fn property(&mut self, path: &ResourcePath, key: &str) -> SdkResult<Option<String>> {
        self.require(path)?;
        Ok(self.properties.get(path, key)?)
    }

    pub fn properties(&mut self, path: &ResourcePath) -> SdkResult<Properties> {
        self.require(path)?;
        Ok(self.properties.properties(path)?)
    }

    pub fn set_property(
        &mut self,
        path: &ResourcePath,
        key: &str,
        value: impl Into<String>,
    ) -> SdkResult<Option<String>> {
        self.require(path)?;
        Ok(self.properties.set(path, key, value)?)
    }

    // ---- Lifecycle ----

    pub fn save(&mut self) -> SdkResult<()> {
        self.history.save()?;
        self.properties.save()?;
        self.index.save()?;
        Ok(())
    }

    pub fn close(self) -> SdkResult<()> {
        self.history.close()?;
        self.properties.close()?;
        self.index.close()?;
        Ok(())
    }

    fn create_container(&mut self, path: &ResourcePath, kind: ResourceKind) -> SdkResult<()> {
        self.check_creatable(path, kind)?;
        let location = self.location_of(path);
        self.fs.create_dir(&location)?;
        let stamp = self.fs.stat(&location)?.as_ref().map(SyncStamp::from);
        self.resources.create(path, kind, stamp)?;
        self.index.record(path, kind, stamp)?;
        debug!(%path, %kind, "created");
        Ok(())
    }

    fn check_creatable(&self, path: &ResourcePath, kind: ResourceKind) -> SdkResult<()> {
        if self.resources.find(path).is_some() {
            return Err(SyncError::AlreadyExists(path.clone()).into());
        }
        if path.segment_count() == 1 && path.name() == Some(self.config.metadata_dir.as_str()) {
            return Err(SdkError::InvalidOperation(format!(
                "{path} is reserved for workspace metadata"
            )));
        }
        let parent = path.parent().unwrap_or_else(ResourcePath::root);
        let parent_kind = self.resources.find(&parent).and_then(|id| self.resources.kind(id));
        match parent_kind {
            None => Err(SdkError::NotFound(parent.to_string())),
            Some(_) if kind != ResourceKind::for_path(path, kind.is_container()) => {
                Err(SdkError::InvalidOperation(format!("a {kind} cannot be created at {path}")))
            }
            Some(k) if !k.is_container() => {
                Err(SdkError::InvalidOperation(format!("{parent} is not a container")))
            }
            Some(_) => Ok(()),
        }
    }

    /// Common checks of move and copy. Returns the kind being moved.
    fn check_transfer(
        &self,
        source: &ResourcePath,
        destination: &ResourcePath,
    ) -> SdkResult<ResourceKind> {
        if source.is_root() {
            return Err(SdkError::InvalidOperation(
                "the workspace root cannot be moved or copied".into(),
            ));
        }
        let kind = self
            .resources
            .find(source)
            .and_then(|id| self.resources.kind(id))
            .ok_or_else(|| SdkError::NotFound(source.to_string()))?;
        if source.is_prefix_of(destination) && source != destination {
            return Err(SdkError::InvalidOperation(format!(
                "cannot put {source} inside itself at {destination}"
            )));
        }
        self.check_creatable(destination, kind)?;
        // Not yet refreshed, but taken on disk.
        if self.fs.stat(&self.location_of(destination))?.is_some() {
            return Err(SyncError::AlreadyExists(destination.clone()).into());
        }
        Ok(kind)
    }

    fn require(&self, path: &ResourcePath) -> SdkResult<()> {
        match self.resources.find(path) {
            Some(_) => Ok(()),
            None => Err(SdkError::NotFound(path.to_string())),
        }
    }

    fn require_file(&self, path: &ResourcePath) -> SdkResult<keep_sync::NodeId> {
        let id = self
            .resources
            .find(path)
            .ok_or_else(|| SdkError::NotFound(path.to_string()))?;
        if self.resources.kind(id) != Some(ResourceKind::File) {
            return Err(SdkError::InvalidOperation(format!("{path} is not a file")));
        }
        Ok(id)
    }

    fn file_info(&self, path: &ResourcePath, location: &Path) -> SdkResult<FileInfo> {
        match self.fs.stat(location)? {
            Some(info) if info.is_file() => Ok(info),
            Some(_) => Err(SdkError::InvalidOperation(format!("{path} is not a file"))),
            None => Err(SdkError::NotFound(path.to_string())),
        }
    }

    /// Copy (never move) the file's content into history, so the file is
    /// intact if the write that follows fails.
    fn record_state(
        &mut self,
        path: &ResourcePath,
        location: &Path,
        info: &FileInfo,
    ) -> SdkResult<Option<FileState>> {
        Ok(self.history.add_state(path, location, info, false)?)
    }
}

/// Copy a file, or a directory and everything in it.
fn copy_tree(fs: &dyn FileStore, from: &Path, to: &Path) -> SdkResult<()> {
    match fs.stat(from)? {
        Some(info) if info.is_dir() => {
            fs.create_dir(to)?;
            for name in fs.list(from)? {
                copy_tree(fs, &from.join(&name), &to.join(&name))?;
            }
        }
        Some(_) => {
            fs.copy(from, to)?;
        }
        None => return Err(FsError::NotFound(from.to_path_buf()).into()),
    }
    Ok(())
}
