use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use keep_fs::{FileInfo, FileStore};
use keep_types::{Depth, ResourcePath};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::resource::{NodeId, ResourceTree};

/// Callback driven by [`UnifiedTree::accept`].
pub trait UnifiedVisitor {
    /// Visit one merged node. Return `true` to descend into its children,
    /// `false` to skip the subtree.
    fn visit(&mut self, node: &mut UnifiedNode<'_>) -> SyncResult<bool>;
}

/// One merged child entry: a name known to the resource tree, the file
/// system, or both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnifiedChild {
    pub name: String,
    pub resource: Option<NodeId>,
    pub info: Option<FileInfo>,
}

/// Merged view of one name during a traversal.
pub struct UnifiedNode<'a> {
    tree: &'a UnifiedTree<'a>,
    path: ResourcePath,
    resource: Option<NodeId>,
    location: PathBuf,
    info: Option<FileInfo>,
    resolved: Option<PathBuf>,
    cycle: bool,
    children: Option<Vec<UnifiedChild>>,
}

impl<'a> UnifiedNode<'a> {
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// The matching resource, or `None` for a name only found on disk.
    pub fn resource(&self) -> Option<NodeId> {
        self.resource
    }

    pub fn resources(&self) -> &'a ResourceTree {
        self.tree.resources
    }

    /// Host path backing this node.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// File system metadata, `None` if nothing exists on disk.
    pub fn info(&self) -> Option<&FileInfo> {
        self.info.as_ref()
    }

    pub fn exists_in_file_system(&self) -> bool {
        self.info.is_some()
    }

    /// On disk but not yet a resource.
    pub fn is_discovered(&self) -> bool {
        self.resource.is_none() && self.info.is_some()
    }

    /// The node's physical location is one of its ancestors'; it is
    /// treated as a leaf.
    pub fn is_cycle(&self) -> bool {
        self.cycle
    }

    /// Merged children, computed on first call.
    pub fn children(&mut self) -> SyncResult<&[UnifiedChild]> {
        if self.children.is_none() {
            self.children = Some(self.compute_children()?);
        }
        Ok(self.children.as_deref().unwrap_or_default())
    }

    fn take_children(&mut self) -> SyncResult<Vec<UnifiedChild>> {
        match self.children.take() {
            Some(children) => Ok(children),
            None => self.compute_children(),
        }
    }

    fn compute_children(&self) -> SyncResult<Vec<UnifiedChild>> {
        if self.cycle {
            return Ok(Vec::new());
        }
        let resources = self.tree.resources;
        let fs = self.tree.fs;
        let mut merged: BTreeMap<String, Option<NodeId>> = BTreeMap::new();

        if let Some(id) = self.resource {
            for (name, child) in resources.children(id) {
                merged.insert(name.to_string(), Some(child));
            }
        }
        if self.info.is_some_and(|info| info.is_dir()) {
            for name in fs.list(&self.location)? {
                merged.entry(name).or_insert(None);
            }
        }
        if self.path.is_root() {
            merged.retain(|name, _| !self.tree.excluded.contains(name));
        }

        let mut children = Vec::with_capacity(merged.len());
        for (name, resource) in merged {
            let info = fs.stat(&self.location.join(&name))?;
            if resource.is_none() && info.is_none() {
                // Listed but gone, e.g. a dangling link.
                debug!(parent = %self.path, %name, "skipping vanished entry");
                continue;
            }
            children.push(UnifiedChild {
                name,
                resource,
                info,
            });
        }
        Ok(children)
    }
}

/// Walks the resource tree and the file system together.
///
/// Nodes are matched by name within their parent. Symbolic-link cycles are
/// cut by remembering the resolved locations on the current descent path:
/// a directory whose location repeats an ancestor's is visited as a leaf.
/// The same location reached along two different branches is not a cycle.
pub struct UnifiedTree<'a> {
    resources: &'a ResourceTree,
    fs: &'a dyn FileStore,
    base: PathBuf,
    excluded: BTreeSet<String>,
}

impl<'a> UnifiedTree<'a> {
    /// `base` is the host directory backing the workspace root.
    pub fn new(
        resources: &'a ResourceTree,
        fs: &'a dyn FileStore,
        base: impl Into<PathBuf>,
    ) -> Self {
        Self {
            resources,
            fs,
            base: base.into(),
            excluded: BTreeSet::new(),
        }
    }

    /// Hide a top-level name from the merged view.
    pub fn excluding(mut self, name: impl Into<String>) -> Self {
        self.excluded.insert(name.into());
        self
    }

    /// Pre-order traversal from `root` down to `depth`.
    pub fn accept<V>(&self, root: &ResourcePath, depth: Depth, visitor: &mut V) -> SyncResult<()>
    where
        V: UnifiedVisitor + ?Sized,
    {
        let location = root.to_fs_path(&self.base);
        let info = self.fs.stat(&location)?;
        let node = UnifiedNode {
            tree: self,
            path: root.clone(),
            resource: self.resources.find(root),
            resolved: self.resolve(&location, info.as_ref()),
            location,
            info,
            cycle: false,
            children: None,
        };
        let mut ancestors = HashSet::new();
        self.walk(node, depth, &mut ancestors, visitor)
    }

    fn walk<V>(
        &self,
        mut node: UnifiedNode<'_>,
        depth: Depth,
        ancestors: &mut HashSet<PathBuf>,
        visitor: &mut V,
    ) -> SyncResult<()>
    where
        V: UnifiedVisitor + ?Sized,
    {
        if !visitor.visit(&mut node)? || node.cycle {
            return Ok(());
        }
        let Some(child_depth) = depth.descend() else {
            return Ok(());
        };

        let children = node.take_children()?;
        let pushed = node
            .resolved
            .as_ref()
            .is_some_and(|resolved| ancestors.insert(resolved.clone()));

        let mut outcome = Ok(());
        for child in children {
            let location = node.location.join(&child.name);
            let resolved = self.resolve(&location, child.info.as_ref());
            let cycle = resolved.as_ref().is_some_and(|r| ancestors.contains(r));
            let path = match node.path.child(&child.name) {
                Ok(path) => path,
                Err(e) => {
                    warn!(
                        parent = %node.path,
                        name = %child.name,
                        error = %e,
                        "skipping unrepresentable name"
                    );
                    continue;
                }
            };
            if cycle {
                debug!(%path, "link cycle; not descending");
            }
            let child_node = UnifiedNode {
                tree: node.tree,
                path,
                resource: child.resource,
                location,
                info: child.info,
                resolved,
                cycle,
                children: None,
            };
            outcome = self.walk(child_node, child_depth, ancestors, visitor);
            if outcome.is_err() {
                break;
            }
        }

        if pushed {
            if let Some(resolved) = &node.resolved {
                ancestors.remove(resolved);
            }
        }
        outcome
    }

    fn resolve(&self, location: &Path, info: Option<&FileInfo>) -> Option<PathBuf> {
        if !info.is_some_and(|i| i.is_dir()) {
            return None;
        }
        Some(self.fs.resolve(location).unwrap_or_else(|_| location.to_path_buf()))
    }
}
