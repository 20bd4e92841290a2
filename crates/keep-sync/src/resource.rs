use std::collections::BTreeMap;
use std::fmt;

use keep_fs::FileInfo;
use keep_types::ResourcePath;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Handle of a node in a [`ResourceTree`]. Handles of removed nodes are
/// never reused while the tree lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Root,
    Project,
    Folder,
    File,
}

impl ResourceKind {
    /// Whether resources of this kind have children.
    pub fn is_container(&self) -> bool {
        !matches!(self, Self::File)
    }

    /// Kind of a resource at `path` backed by a file (`false`) or
    /// directory (`true`).
    pub fn for_path(path: &ResourcePath, is_dir: bool) -> Self {
        match (path.segment_count(), is_dir) {
            (0, _) => Self::Root,
            (1, _) => Self::Project,
            (_, true) => Self::Folder,
            (_, false) => Self::File,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Project => write!(f, "project"),
            Self::Folder => write!(f, "folder"),
            Self::File => write!(f, "file"),
        }
    }
}

/// What the resource looked like on disk when last synchronized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStamp {
    pub last_modified_ms: i64,
    pub size: u64,
}

impl From<&FileInfo> for SyncStamp {
    fn from(info: &FileInfo) -> Self {
        Self {
            last_modified_ms: info.last_modified_ms,
            size: info.size,
        }
    }
}

#[derive(Debug)]
struct Node {
    name: String,
    kind: ResourceKind,
    parent: Option<NodeId>,
    children: BTreeMap<String, NodeId>,
    stamp: Option<SyncStamp>,
}

/// Arena of workspace resources.
///
/// The root always exists. Projects live directly under the root; folders
/// and files live under projects and folders.
#[derive(Debug)]
pub struct ResourceTree {
    nodes: Vec<Option<Node>>,
    live: usize,
}

impl Default for ResourceTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTree {
    pub fn new() -> Self {
        let root = Node {
            name: String::new(),
            kind: ResourceKind::Root,
            parent: None,
            children: BTreeMap::new(),
            stamp: None,
        };
        Self {
            nodes: vec![Some(root)],
            live: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of resources, the root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 1
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn find(&self, path: &ResourcePath) -> Option<NodeId> {
        let mut current = self.root();
        for segment in path.segments() {
            current = *self.node(current)?.children.get(segment)?;
        }
        Some(current)
    }

    pub fn kind(&self, id: NodeId) -> Option<ResourceKind> {
        self.node(id).map(|n| n.kind)
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn stamp(&self, id: NodeId) -> Option<SyncStamp> {
        self.node(id).and_then(|n| n.stamp)
    }

    pub fn set_stamp(&mut self, id: NodeId, stamp: SyncStamp) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.stamp = Some(stamp);
                true
            }
            None => false,
        }
    }

    /// Children of `id` by name, in name order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (&str, NodeId)> + '_ {
        self.node(id)
            .into_iter()
            .flat_map(|n| n.children.iter().map(|(name, child)| (name.as_str(), *child)))
    }

    pub fn path_of(&self, id: NodeId) -> Option<ResourcePath> {
        let mut names = Vec::new();
        let mut current = self.node(id)?;
        while let Some(parent) = current.parent {
            names.push(current.name.clone());
            current = self.node(parent)?;
        }
        names.reverse();
        ResourcePath::from_segments(names).ok()
    }

    /// Add a resource under an existing container.
    pub fn create(
        &mut self,
        path: &ResourcePath,
        kind: ResourceKind,
        stamp: Option<SyncStamp>,
    ) -> SyncResult<NodeId> {
        let (Some(parent_path), Some(name)) = (path.parent(), path.name()) else {
            return Err(SyncError::AlreadyExists(path.clone()));
        };
        let expected_depth = match kind {
            ResourceKind::Root => None,
            ResourceKind::Project => Some(path.segment_count() == 1),
            ResourceKind::Folder | ResourceKind::File => Some(path.segment_count() > 1),
        };
        if expected_depth != Some(true) {
            return Err(SyncError::InvalidArgument(format!(
                "a {kind} cannot be created at {path}"
            )));
        }
        let parent = self
            .find(&parent_path)
            .ok_or_else(|| SyncError::NotFound(parent_path.clone()))?;
        let parent_node = self
            .node(parent)
            .ok_or_else(|| SyncError::NotFound(parent_path.clone()))?;
        if !parent_node.kind.is_container() {
            return Err(SyncError::InvalidArgument(format!("{parent_path} is not a container")));
        }
        if parent_node.children.contains_key(name) {
            return Err(SyncError::AlreadyExists(path.clone()));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            name: name.to_string(),
            kind,
            parent: Some(parent),
            children: BTreeMap::new(),
            stamp,
        }));
        self.live += 1;
        if let Some(parent_node) = self.node_mut(parent) {
            parent_node.children.insert(name.to_string(), id);
        }
        Ok(id)
    }

    /// Remove a resource and everything below it. Returns how many
    /// resources were removed.
    pub fn remove(&mut self, path: &ResourcePath) -> SyncResult<usize> {
        if path.is_root() {
            return Err(SyncError::InvalidArgument("the root cannot be removed".into()));
        }
        let id = self.find(path).ok_or_else(|| SyncError::NotFound(path.clone()))?;
        if let Some(parent) = self.parent(id) {
            if let (Some(node), Some(name)) = (self.node_mut(parent), path.name()) {
                node.children.remove(name);
            }
        }

        let mut removed = 0;
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                pending.extend(node.children.into_values());
                removed += 1;
            }
        }
        self.live -= removed;
        Ok(removed)
    }

    /// `id` and its descendants, pre-order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(node) = self.node(next) else {
                continue;
            };
            out.push(next);
            pending.extend(node.children.values().rev().copied());
        }
        out
    }
}
