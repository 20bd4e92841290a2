use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use keep_types::{Depth, ResourcePath};
use tracing::debug;

use crate::bucket::{read_index, Bucket};
use crate::codec::EntryCodec;
use crate::error::BucketResult;
use crate::visitor::{BucketVisitor, Visit};

/// A namespace of buckets under one directory.
///
/// The workspace root's entry lives in `<root>/<INDEX_FILE>`; everything
/// under a top-level container `P` lives in `<root>/<hex(P)>/<INDEX_FILE>`.
/// Container names too long to hex-encode within a file name get a
/// shortened, checksummed directory instead (see [`bucket_dir_name`]).
/// Only one bucket is held in memory; it is saved before another one is
/// loaded in its place.
pub struct BucketTree<C: EntryCodec> {
    root: PathBuf,
    current: Bucket<C>,
}

impl<C: EntryCodec> BucketTree<C> {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            current: Bucket::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index file holding the entry for `path`.
    pub fn location_for(&self, path: &ResourcePath) -> PathBuf {
        match path.segment(0) {
            None => self.root.join(C::INDEX_FILE),
            Some(container) => self.root.join(bucket_dir_name(container)).join(C::INDEX_FILE),
        }
    }

    /// Make the bucket covering `path` the current one.
    pub fn load_bucket_for(&mut self, path: &ResourcePath) -> BucketResult<()> {
        let namespace = container_of(path);
        let location = self.location_for(path);
        self.current.load(namespace, location, true)
    }

    pub fn current(&self) -> &Bucket<C> {
        &self.current
    }

    pub fn current_mut(&mut self) -> &mut Bucket<C> {
        &mut self.current
    }

    pub fn get(&mut self, path: &ResourcePath) -> BucketResult<Option<C::Value>> {
        self.load_bucket_for(path)?;
        Ok(self.current.get(path).cloned())
    }

    pub fn set(&mut self, path: ResourcePath, value: C::Value) -> BucketResult<()> {
        self.load_bucket_for(&path)?;
        self.current.set(path, value);
        Ok(())
    }

    pub fn remove(&mut self, path: &ResourcePath) -> BucketResult<Option<C::Value>> {
        self.load_bucket_for(path)?;
        Ok(self.current.remove(path))
    }

    /// Flush the current bucket.
    pub fn save(&mut self) -> BucketResult<()> {
        self.current.save()
    }

    /// Visit every entry at or below `root` within `depth`, across all
    /// buckets that cover that subtree.
    ///
    /// From the workspace root, the root bucket is visited first, then
    /// each container bucket found on disk, in name order. Edits made by
    /// the visitor are saved when the traversal moves to the next bucket;
    /// the last bucket visited stays current and unsaved.
    pub fn accept<V>(
        &mut self,
        visitor: &mut V,
        root: &ResourcePath,
        depth: Depth,
    ) -> BucketResult<Visit>
    where
        V: BucketVisitor<C::Value> + ?Sized,
    {
        if !root.is_root() {
            self.load_bucket_for(root)?;
            return Ok(self.current.accept(visitor, root, depth));
        }

        self.load_bucket_for(root)?;
        if self.current.accept(visitor, root, depth) == Visit::Stop {
            return Ok(Visit::Stop);
        }
        if depth == Depth::Zero {
            return Ok(Visit::Continue);
        }
        for container in self.containers()? {
            self.load_bucket_for(&container)?;
            if self.current.accept(visitor, root, depth) == Visit::Stop {
                return Ok(Visit::Stop);
            }
        }
        Ok(Visit::Continue)
    }

    /// Top-level containers that have a bucket directory on disk.
    pub fn containers(&self) -> BucketResult<Vec<ResourcePath>> {
        let listing = match fs::read_dir(&self.root) {
            Ok(listing) => listing,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut containers = Vec::new();
        for dir_entry in listing {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = dir_entry.file_name();
            let decoded = match file_name.to_str() {
                Some(name) if name.starts_with(SHORTENED_PREFIX) => {
                    container_from_index::<C>(&dir_entry.path())
                }
                Some(name) => hex::decode(name)
                    .ok()
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .and_then(|name| ResourcePath::root().child(&name).ok()),
                None => None,
            };
            match decoded {
                Some(path) => containers.push(path),
                None => debug!(dir = ?file_name, "skipping non-bucket directory"),
            }
        }
        containers.sort();
        Ok(containers)
    }

    /// Save the current bucket and release the tree.
    pub fn close(mut self) -> BucketResult<()> {
        self.save()
    }
}

/// Longest container name whose hex encoding is used as is.
const MAX_PLAIN_NAME: usize = 100;
/// Bytes of a long name kept, hex-encoded, in its shortened directory.
const SHORTENED_KEEP: usize = 32;
const SHORTENED_PREFIX: char = '~';

/// Directory holding the bucket of top-level container `name`.
///
/// Names up to [`MAX_PLAIN_NAME`] bytes are hex-encoded, so the result
/// stays within the usual 255-byte file name limit. Longer names become
/// `~<hex of the first bytes>-<crc32 of the whole name>`; the container
/// they belong to is then read back from the index itself.
pub fn bucket_dir_name(name: &str) -> String {
    let bytes = name.as_bytes();
    if bytes.len() <= MAX_PLAIN_NAME {
        return hex::encode(bytes);
    }
    format!(
        "{SHORTENED_PREFIX}{}-{:08x}",
        hex::encode(&bytes[..SHORTENED_KEEP]),
        crc32fast::hash(bytes)
    )
}

/// Container of the first entry stored in a shortened bucket directory.
fn container_from_index<C: EntryCodec>(dir: &Path) -> Option<ResourcePath> {
    let entries = match read_index::<C>(&dir.join(C::INDEX_FILE)) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "unreadable shortened bucket");
            return None;
        }
    };
    let first = entries.keys().next()?;
    first.segment(0)?;
    Some(container_of(first))
}

/// The root for the root path, else the top-level container.
fn container_of(path: &ResourcePath) -> ResourcePath {
    match path.segment(0) {
        None => ResourcePath::root(),
        Some(container) => ResourcePath::root()
            .child(container)
            .unwrap_or_else(|_| ResourcePath::root()),
    }
}
