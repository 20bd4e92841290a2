use std::collections::BTreeMap;
use std::path::PathBuf;

use keep_types::{Depth, ResourcePath};

use crate::codec::{ByteReader, ByteWriter, EntryCodec};
use crate::error::BucketResult;
use crate::tree::BucketTree;
use crate::visitor::{EntryMut, Visit};

/// Persistent string properties of one resource.
pub type Properties = BTreeMap<String, String>;

/// Bucket codec for [`Properties`].
///
/// Payload: `count: u32`, then `count` pairs of length-prefixed key and
/// value strings.
#[derive(Debug)]
pub struct PropertyCodec;

impl EntryCodec for PropertyCodec {
    type Value = Properties;
    const VERSION: u8 = 1;
    const INDEX_FILE: &'static str = "properties.index";

    fn is_empty(value: &Properties) -> bool {
        value.is_empty()
    }

    fn write_value(value: &Properties, out: &mut ByteWriter) {
        out.put_u32(value.len() as u32);
        for (key, val) in value {
            out.put_str(key);
            out.put_str(val);
        }
    }

    fn read_value(input: &mut ByteReader<'_>) -> BucketResult<Properties> {
        // Each pair is at least two length prefixes.
        let count = input.read_count(8)?;
        let mut props = Properties::new();
        for _ in 0..count {
            let key = input.read_str()?.to_string();
            let val = input.read_str()?.to_string();
            props.insert(key, val);
        }
        Ok(props)
    }
}

/// Per-resource persistent properties.
pub struct PropertyStore {
    tree: BucketTree<PropertyCodec>,
}

impl PropertyStore {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            tree: BucketTree::new(location),
        }
    }

    pub fn get(&mut self, path: &ResourcePath, key: &str) -> BucketResult<Option<String>> {
        Ok(self.properties(path)?.remove(key))
    }

    /// Set one property, returning the previous value.
    pub fn set(
        &mut self,
        path: &ResourcePath,
        key: &str,
        value: impl Into<String>,
    ) -> BucketResult<Option<String>> {
        let mut props = self.properties(path)?;
        let previous = props.insert(key.to_string(), value.into());
        self.tree.set(path.clone(), props)?;
        Ok(previous)
    }

    /// Remove one property, returning its value.
    pub fn remove(&mut self, path: &ResourcePath, key: &str) -> BucketResult<Option<String>> {
        let mut props = self.properties(path)?;
        let previous = props.remove(key);
        if previous.is_some() {
            self.tree.set(path.clone(), props)?;
        }
        Ok(previous)
    }

    /// All properties of `path` (empty if none).
    pub fn properties(&mut self, path: &ResourcePath) -> BucketResult<Properties> {
        Ok(self.tree.get(path)?.unwrap_or_default())
    }

    /// Drop the properties of `path` and everything below it. Returns the
    /// number of resources that had properties.
    pub fn remove_all(&mut self, path: &ResourcePath) -> BucketResult<usize> {
        let mut removed = 0;
        let mut visitor = |entry: &mut EntryMut<'_, Properties>| {
            entry.delete();
            removed += 1;
            Visit::Continue
        };
        self.tree.accept(&mut visitor, path, Depth::Infinite)?;
        Ok(removed)
    }

    /// Give each resource below `destination` the properties of its
    /// counterpart below `source`. Returns how many resources had
    /// properties to copy.
    pub fn copy(
        &mut self,
        source: &ResourcePath,
        destination: &ResourcePath,
    ) -> BucketResult<usize> {
        let mut found = Vec::new();
        let mut collect = |entry: &mut EntryMut<'_, Properties>| {
            if let Some(relative) = entry.path().strip_prefix(source) {
                found.push((relative, entry.value().clone()));
            }
            Visit::Continue
        };
        self.tree.accept(&mut collect, source, Depth::Infinite)?;
        for (relative, props) in &found {
            self.tree.set(destination.join(relative), props.clone())?;
        }
        Ok(found.len())
    }

    pub fn save(&mut self) -> BucketResult<()> {
        self.tree.save()
    }

    pub fn close(self) -> BucketResult<()> {
        self.tree.close()
    }
}
