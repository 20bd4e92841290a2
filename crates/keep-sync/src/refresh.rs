use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use keep_fs::FileStore;
use keep_types::{Depth, ResourcePath};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::resource::{ResourceKind, ResourceTree, SyncStamp};
use crate::unified::{UnifiedNode, UnifiedTree, UnifiedVisitor};

/// A resource that appeared or changed on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub path: ResourcePath,
    pub kind: ResourceKind,
    pub stamp: Option<SyncStamp>,
}

/// Differences found between the resource tree and the file system.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// New resources, parents before children.
    pub added: Vec<Change>,
    /// Resources gone from disk. Only the top of a removed subtree is
    /// listed.
    pub removed: Vec<ResourcePath>,
    /// Files whose size or modification time differ.
    pub changed: Vec<Change>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Visitor collecting a [`SyncReport`] for the subtree of `target`.
///
/// Nodes above `target` are only passed through; nodes outside its
/// subtree are skipped.
pub struct RefreshVisitor<'c> {
    target: ResourcePath,
    depth: Depth,
    cancel: Option<&'c AtomicBool>,
    report: SyncReport,
}

impl<'c> RefreshVisitor<'c> {
    pub fn new(target: ResourcePath, depth: Depth, cancel: Option<&'c AtomicBool>) -> Self {
        Self {
            target,
            depth,
            cancel,
            report: SyncReport::default(),
        }
    }

    pub fn into_report(self) -> SyncReport {
        self.report
    }

    fn reconcile(&mut self, node: &UnifiedNode<'_>) -> bool {
        let path = node.path().clone();
        let resources = node.resources();
        let current = node.resource().and_then(|id| resources.kind(id).map(|kind| (id, kind)));

        match (current, node.info()) {
            (None, None) => false,
            (Some((_, ResourceKind::Root)), _) => true,
            (Some(_), None) => {
                debug!(%path, "removed from disk");
                self.report.removed.push(path);
                false
            }
            (None, Some(info)) => self.discover(path, info.is_dir(), Some(info.into())),
            (Some((id, kind)), Some(info)) => {
                if kind.is_container() != info.is_dir() {
                    debug!(%path, was = %kind, "kind changed on disk");
                    self.report.removed.push(path.clone());
                    return self.discover(path, info.is_dir(), Some(info.into()));
                }
                let stamp = SyncStamp::from(info);
                if kind == ResourceKind::File && resources.stamp(id) != Some(stamp) {
                    self.report.changed.push(Change {
                        path,
                        kind,
                        stamp: Some(stamp),
                    });
                }
                kind.is_container()
            }
        }
    }

    fn discover(&mut self, path: ResourcePath, is_dir: bool, stamp: Option<SyncStamp>) -> bool {
        if path.segment_count() == 1 && !is_dir {
            // Only directories can be projects.
            return false;
        }
        let kind = ResourceKind::for_path(&path, is_dir);
        debug!(%path, %kind, "discovered on disk");
        self.report.added.push(Change { path, kind, stamp });
        is_dir
    }
}

impl UnifiedVisitor for RefreshVisitor<'_> {
    fn visit(&mut self, node: &mut UnifiedNode<'_>) -> SyncResult<bool> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            return Err(SyncError::Cancelled);
        }
        let path = node.path();
        match path.distance_from(&self.target) {
            Some(distance) => {
                if !self.depth.includes(distance) {
                    return Ok(false);
                }
                let descend = self.reconcile(node);
                Ok(descend && self.depth.includes(distance + 1))
            }
            // An ancestor of the target: pass through.
            None if path.is_prefix_of(&self.target) => Ok(self.reconcile(node)),
            None => Ok(false),
        }
    }
}

/// Brings a [`ResourceTree`] in line with the file system.
pub struct Synchronizer<'a> {
    fs: &'a dyn FileStore,
    base: PathBuf,
    excluded: BTreeSet<String>,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(fs: &'a dyn FileStore, base: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            base: base.into(),
            excluded: BTreeSet::new(),
            cancel: None,
        }
    }

    /// Ignore a top-level name (such as the metadata directory).
    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    /// Abort with [`SyncError::Cancelled`] once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Compute the differences under `path` without changing anything.
    pub fn scan(
        &self,
        resources: &ResourceTree,
        path: &ResourcePath,
        depth: Depth,
    ) -> SyncResult<SyncReport> {
        // Start at the closest ancestor the tree knows about so that new
        // intermediate directories get created too.
        let mut start = path.clone();
        while resources.find(&start).is_none() {
            match start.parent() {
                Some(parent) => start = parent,
                None => break,
            }
        }

        let mut tree = UnifiedTree::new(resources, self.fs, &self.base);
        for name in &self.excluded {
            tree = tree.excluding(name.clone());
        }
        let mut visitor = RefreshVisitor::new(path.clone(), depth, self.cancel.as_deref());
        tree.accept(&start, Depth::Infinite, &mut visitor)?;
        Ok(visitor.into_report())
    }

    /// Scan, then apply the report.
    pub fn refresh(
        &self,
        resources: &mut ResourceTree,
        path: &ResourcePath,
        depth: Depth,
    ) -> SyncResult<SyncReport> {
        let report = self.scan(resources, path, depth)?;
        apply(resources, &report)?;
        info!(
            %path,
            %depth,
            added = report.added.len(),
            removed = report.removed.len(),
            changed = report.changed.len(),
            "refreshed"
        );
        Ok(report)
    }
}

/// Refresh `path` to `depth` against the directory `base`.
pub fn refresh(
    resources: &mut ResourceTree,
    fs: &dyn FileStore,
    base: &Path,
    path: &ResourcePath,
    depth: Depth,
    cancel: Option<Arc<AtomicBool>>,
) -> SyncResult<SyncReport> {
    let mut sync = Synchronizer::new(fs, base);
    if let Some(flag) = cancel {
        sync = sync.with_cancel(flag);
    }
    sync.refresh(resources, path, depth)
}

fn apply(resources: &mut ResourceTree, report: &SyncReport) -> SyncResult<()> {
    for path in &report.removed {
        match resources.remove(path) {
            Ok(_) | Err(SyncError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    let mut added: Vec<&Change> = report.added.iter().collect();
    added.sort_by(|a, b| a.path.cmp(&b.path));
    for change in added {
        resources.create(&change.path, change.kind, change.stamp)?;
    }
    for change in &report.changed {
        if let (Some(id), Some(stamp)) = (resources.find(&change.path), change.stamp) {
            resources.set_stamp(id, stamp);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use keep_fs::LocalFileStore;

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    fn paths(changes: &[Change]) -> Vec<String> {
        changes.iter().map(|c| c.path.to_string()).collect()
    }

    fn write(base: &Path, rel: &str, content: &str) {
        let path = base.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn refresh_all(resources: &mut ResourceTree, base: &Path) -> SyncReport {
        let fs = LocalFileStore::new();
        refresh(resources, &fs, base, &ResourcePath::root(), Depth::Infinite, None).unwrap()
    }

    #[test]
    fn discovers_new_tree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/src/main.rs", "fn main() {}");
        write(dir.path(), "proj/Cargo.toml", "[package]");
        write(dir.path(), "loose.txt", "ignored");

        let mut resources = ResourceTree::new();
        let report = refresh_all(&mut resources, dir.path());

        assert_eq!(
            paths(&report.added),
            vec!["/proj", "/proj/Cargo.toml", "/proj/src", "/proj/src/main.rs"]
        );
        assert!(report.removed.is_empty());
        assert!(resources.find(&p("/loose.txt")).is_none());
        let main = resources.find(&p("/proj/src/main.rs")).unwrap();
        assert_eq!(resources.kind(main), Some(ResourceKind::File));
        assert_eq!(resources.stamp(main).unwrap().size, 12);

        // A second pass finds nothing new.
        assert!(refresh_all(&mut resources, dir.path()).is_empty());
    }

    #[test]
    fn reports_removed_and_changed() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/a.txt", "one");
        write(dir.path(), "proj/dir/b.txt", "two");
        let mut resources = ResourceTree::new();
        refresh_all(&mut resources, dir.path());

        std::fs::remove_dir_all(dir.path().join("proj/dir")).unwrap();
        write(dir.path(), "proj/a.txt", "changed!");

        let report = refresh_all(&mut resources, dir.path());
        assert_eq!(report.removed, vec![p("/proj/dir")]);
        assert_eq!(paths(&report.changed), vec!["/proj/a.txt"]);
        assert!(resources.find(&p("/proj/dir/b.txt")).is_none());
        let a = resources.find(&p("/proj/a.txt")).unwrap();
        assert_eq!(resources.stamp(a).unwrap().size, 8);
    }

    #[test]
    fn kind_flip_is_remove_plus_add() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/thing", "file first");
        let mut resources = ResourceTree::new();
        refresh_all(&mut resources, dir.path());

        std::fs::remove_file(dir.path().join("proj/thing")).unwrap();
        write(dir.path(), "proj/thing/inner", "now a folder");

        let report = refresh_all(&mut resources, dir.path());
        assert_eq!(report.removed, vec![p("/proj/thing")]);
        assert_eq!(paths(&report.added), vec!["/proj/thing", "/proj/thing/inner"]);
        let thing = resources.find(&p("/proj/thing")).unwrap();
        assert_eq!(resources.kind(thing), Some(ResourceKind::Folder));
    }

    #[test]
    fn depth_limits_refresh() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/a/deep.txt", "x");
        write(dir.path(), "proj/top.txt", "x");
        let mut resources = ResourceTree::new();
        let fs = LocalFileStore::new();

        let report =
            refresh(&mut resources, &fs, dir.path(), &p("/proj"), Depth::One, None).unwrap();
        assert_eq!(paths(&report.added), vec!["/proj", "/proj/a", "/proj/top.txt"]);
        assert!(resources.find(&p("/proj/a/deep.txt")).is_none());

        let report =
            refresh(&mut resources, &fs, dir.path(), &p("/proj/a"), Depth::Zero, None).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn unknown_target_creates_missing_parents() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/x/y/z.txt", "x");
        write(dir.path(), "proj/other.txt", "x");
        let mut resources = ResourceTree::new();
        let fs = LocalFileStore::new();

        let target = p("/proj/x/y/z.txt");
        let report =
            refresh(&mut resources, &fs, dir.path(), &target, Depth::Zero, None).unwrap();
        assert_eq!(
            paths(&report.added),
            vec!["/proj", "/proj/x", "/proj/x/y", "/proj/x/y/z.txt"]
        );
        assert!(resources.find(&p("/proj/other.txt")).is_none());
    }

    #[test]
    fn excluded_directory_is_not_synchronized() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".keep/history/history.journal", "");
        write(dir.path(), "proj/a", "x");
        let mut resources = ResourceTree::new();
        let fs = LocalFileStore::new();

        let report = Synchronizer::new(&fs, dir.path())
            .excluding(".keep")
            .refresh(&mut resources, &ResourcePath::root(), Depth::Infinite)
            .unwrap();
        assert_eq!(paths(&report.added), vec!["/proj", "/proj/a"]);
    }

    #[test]
    fn scan_leaves_tree_untouched() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/a", "x");
        let resources = ResourceTree::new();
        let fs = LocalFileStore::new();
        let report = Synchronizer::new(&fs, dir.path())
            .scan(&resources, &ResourcePath::root(), Depth::Infinite)
            .unwrap();
        assert_eq!(report.added.len(), 2);
        assert!(resources.is_empty());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"/proj/a\""));
    }

    #[test]
    fn cancelled_refresh_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "proj/a", "x");
        let mut resources = ResourceTree::new();
        let fs = LocalFileStore::new();
        let flag = Arc::new(AtomicBool::new(true));

        let root = ResourcePath::root();
        let err = refresh(&mut resources, &fs, dir.path(), &root, Depth::Infinite, Some(flag))
            .unwrap_err();
        assert!(matches!(err, SyncError::Cancelled));
        assert!(resources.is_empty());
    }
}
