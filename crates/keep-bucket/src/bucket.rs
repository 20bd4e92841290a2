use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use keep_types::{Depth, ResourcePath};
use tracing::{debug, warn};

use crate::codec::{ByteReader, ByteWriter, EntryCodec};
use crate::error::{BucketError, BucketResult};
use crate::visitor::{BucketVisitor, EntryMut, Visit};

/// In-memory table of entries for one index file.
///
/// Mutations stay in memory until [`Bucket::save`]. Entries are kept in
/// path order, which is also the visiting order.
pub struct Bucket<C: EntryCodec> {
    entries: BTreeMap<ResourcePath, C::Value>,
    /// Index file currently associated with the table.
    location: Option<PathBuf>,
    /// Namespace the loaded index covers (root or one container).
    namespace: ResourcePath,
    dirty: bool,
    _codec: PhantomData<C>,
}

impl<C: EntryCodec> Default for Bucket<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: EntryCodec> Bucket<C> {
    /// A detached, empty bucket. Call [`Bucket::load`] before saving.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            location: None,
            namespace: ResourcePath::root(),
            dirty: false,
            _codec: PhantomData,
        }
    }

    /// Associate the bucket with the index file at `location`.
    ///
    /// With `flush_existing`, unsaved entries are written to the previous
    /// location first, and asking for the location that is already loaded
    /// keeps the in-memory table as is. Without it, unsaved entries are
    /// dropped and the table is reread from disk.
    ///
    /// A missing index loads empty. An unreadable one (bad version byte,
    /// garbled payload) also loads empty, with a warning.
    pub fn load(
        &mut self,
        namespace: ResourcePath,
        location: PathBuf,
        flush_existing: bool,
    ) -> BucketResult<()> {
        if flush_existing {
            if self.location.as_ref() == Some(&location) {
                self.namespace = namespace;
                return Ok(());
            }
            self.save()?;
        }

        self.entries.clear();
        self.dirty = false;
        self.namespace = namespace;
        match read_index::<C>(&location) {
            Ok(entries) => self.entries = entries,
            Err(e) if e.is_recoverable() => {
                warn!(
                    location = %location.display(),
                    error = %e,
                    "discarding unreadable bucket index"
                );
            }
            Err(e) => {
                self.location = None;
                return Err(e);
            }
        }
        debug!(location = %location.display(), entries = self.entries.len(), "loaded bucket");
        self.location = Some(location);
        Ok(())
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    pub fn namespace(&self) -> &ResourcePath {
        &self.namespace
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, path: &ResourcePath) -> Option<&C::Value> {
        self.entries.get(path)
    }

    /// Set the value for `path`. An empty value removes the entry.
    pub fn set(&mut self, path: ResourcePath, value: C::Value) {
        if C::is_empty(&value) {
            self.remove(&path);
        } else {
            self.entries.insert(path, value);
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, path: &ResourcePath) -> Option<C::Value> {
        let removed = self.entries.remove(path);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Paths with an entry, in order.
    pub fn paths(&self) -> impl Iterator<Item = &ResourcePath> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourcePath, &C::Value)> {
        self.entries.iter()
    }

    /// Visit every entry at or below `root` within `depth`.
    ///
    /// Returns [`Visit::Stop`] if the visitor stopped early.
    pub fn accept<V>(&mut self, visitor: &mut V, root: &ResourcePath, depth: Depth) -> Visit
    where
        V: BucketVisitor<C::Value> + ?Sized,
    {
        let matching: Vec<ResourcePath> = self
            .entries
            .range(root.clone()..)
            .map(|(path, _)| path)
            .take_while(|path| root.is_prefix_of(path))
            .filter(|path| path.distance_from(root).is_some_and(|d| depth.includes(d)))
            .cloned()
            .collect();

        for path in matching {
            let Some(value) = self.entries.get(&path) else {
                continue;
            };
            let mut entry = EntryMut::new(&path, value);
            let outcome = visitor.visit(&mut entry);
            match entry.into_update() {
                Some(Some(value)) => self.set(path, value),
                Some(None) => {
                    self.remove(&path);
                }
                None => {}
            }
            if outcome == Visit::Stop {
                return Visit::Stop;
            }
        }
        Visit::Continue
    }

    /// Write all entries to the index file.
    ///
    /// A bucket with no entries deletes its index instead, along with the
    /// container directory if that leaves it empty.
    pub fn save(&mut self) -> BucketResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(location) = self.location.clone() else {
            return Ok(());
        };

        if self.entries.is_empty() {
            remove_index(&location, !self.namespace.is_root())?;
        } else {
            write_index::<C>(&location, &self.entries)?;
        }
        self.dirty = false;
        debug!(location = %location.display(), entries = self.entries.len(), "saved bucket");
        Ok(())
    }
}

impl<C: EntryCodec> std::fmt::Debug for Bucket<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("location", &self.location)
            .field("namespace", &self.namespace)
            .field("entries", &self.entries.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

pub(crate) fn encode_index<C: EntryCodec>(entries: &BTreeMap<ResourcePath, C::Value>) -> Vec<u8> {
    let mut out = ByteWriter::new();
    out.put_u8(C::VERSION);
    for (path, value) in entries {
        out.put_str(&path.to_string());
        C::write_value(value, &mut out);
    }
    out.into_bytes()
}

pub(crate) fn decode_index<C: EntryCodec>(
    data: &[u8],
) -> BucketResult<BTreeMap<ResourcePath, C::Value>> {
    let mut input = ByteReader::new(data);
    let found = input.read_u8()?;
    if found != C::VERSION {
        return Err(BucketError::VersionMismatch {
            expected: C::VERSION,
            found,
        });
    }
    let mut entries = BTreeMap::new();
    while !input.is_at_end() {
        let raw = input.read_str()?;
        let path = ResourcePath::parse(raw)
            .map_err(|e| BucketError::Corrupt(format!("bad path {raw:?}: {e}")))?;
        let value = C::read_value(&mut input)?;
        if !C::is_empty(&value) {
            entries.insert(path, value);
        }
    }
    Ok(entries)
}

pub(crate) fn read_index<C: EntryCodec>(
    location: &Path,
) -> BucketResult<BTreeMap<ResourcePath, C::Value>> {
    match fs::read(location) {
        Ok(data) => decode_index::<C>(&data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(e.into()),
    }
}

fn write_index<C: EntryCodec>(
    location: &Path,
    entries: &BTreeMap<ResourcePath, C::Value>,
) -> BucketResult<()> {
    let dir = location
        .parent()
        .ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "index location has no parent")
        })?;
    fs::create_dir_all(dir)?;

    // Write aside, then rename over the old index.
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(&encode_index::<C>(entries))?;
    tmp.as_file().sync_data()?;
    tmp.persist(location).map_err(|e| e.error)?;
    Ok(())
}

fn remove_index(location: &Path, prune_dir: bool) -> BucketResult<()> {
    match fs::remove_file(location) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    if prune_dir {
        if let Some(dir) = location.parent() {
            // Fails harmlessly if other files remain.
            let _ = fs::remove_dir(dir);
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Minimal codec: a counter per path, zero meaning "no entry".
    pub(crate) struct Counter;

    impl EntryCodec for Counter {
        type Value = u32;
        const VERSION: u8 = 3;
        const INDEX_FILE: &'static str = "counter.index";

        fn is_empty(value: &u32) -> bool {
            *value == 0
        }

        fn write_value(value: &u32, out: &mut ByteWriter) {
            out.put_u32(*value);
        }

        fn read_value(input: &mut ByteReader<'_>) -> BucketResult<u32> {
            input.read_u32()
        }
    }

    fn p(s: &str) -> ResourcePath {
        ResourcePath::parse(s).unwrap()
    }

    fn loaded(location: &Path) -> Bucket<Counter> {
        let mut bucket = Bucket::new();
        bucket.load(p("/proj"), location.to_path_buf(), true).unwrap();
        bucket
    }

    #[test]
    fn missing_index_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bucket = loaded(&dir.path().join("proj/counter.index"));
        assert!(bucket.is_empty());
        assert!(!bucket.is_dirty());
    }

    #[test]
    fn set_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("proj/counter.index");

        let mut bucket = loaded(&location);
        bucket.set(p("/proj/a"), 1);
        bucket.set(p("/proj/b/c"), 2);
        bucket.save().unwrap();
        assert!(!bucket.is_dirty());

        let reloaded = loaded(&location);
        assert_eq!(reloaded.get(&p("/proj/a")), Some(&1));
        assert_eq!(reloaded.get(&p("/proj/b/c")), Some(&2));
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn empty_value_removes_entry() {
        let dir = tempfile::tempdir().unwrap();
        let mut bucket = loaded(&dir.path().join("proj/counter.index"));
        bucket.set(p("/proj/a"), 5);
        bucket.set(p("/proj/a"), 0);
        assert!(bucket.get(&p("/proj/a")).is_none());
        assert!(bucket.is_empty());
    }

    #[test]
    fn emptied_bucket_deletes_index_and_dir() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("proj/counter.index");

        let mut bucket = loaded(&location);
        bucket.set(p("/proj/a"), 1);
        bucket.save().unwrap();
        assert!(location.exists());

        bucket.remove(&p("/proj/a"));
        bucket.save().unwrap();
        assert!(!location.exists());
        assert!(!dir.path().join("proj").exists());
    }

    #[test]
    fn version_mismatch_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("proj/counter.index");

        let mut bucket = loaded(&location);
        bucket.set(p("/proj/a"), 1);
        bucket.save().unwrap();

        let mut data = fs::read(&location).unwrap();
        data[0] = 0xee;
        fs::write(&location, &data).unwrap();

        assert!(loaded(&location).is_empty());
        assert!(matches!(
            decode_index::<Counter>(&data),
            Err(BucketError::VersionMismatch { expected: 3, found: 0xee })
        ));
    }

    #[test]
    fn truncated_payload_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("proj/counter.index");

        let mut bucket = loaded(&location);
        bucket.set(p("/proj/a"), 1);
        bucket.save().unwrap();

        let data = fs::read(&location).unwrap();
        fs::write(&location, &data[..data.len() - 2]).unwrap();
        assert!(loaded(&location).is_empty());
    }

    #[test]
    fn load_without_flush_discards_unsaved() {
        let dir = tempfile::tempdir().unwrap();
        let location = dir.path().join("proj/counter.index");

        let mut bucket = loaded(&location);
        bucket.set(p("/proj/a"), 1);
        bucket.save().unwrap();
        bucket.set(p("/proj/b"), 2);

        bucket.load(p("/proj"), location.clone(), false).unwrap();
        assert_eq!(bucket.len(), 1);
        assert!(bucket.get(&p("/proj/b")).is_none());
    }

    #[test]
    fn load_with_flush_saves_previous_location() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one/counter.index");
        let second = dir.path().join("two/counter.index");

        let mut bucket = Bucket::<Counter>::new();
        bucket.load(p("/one"), first.clone(), true).unwrap();
        bucket.set(p("/one/x"), 9);

        bucket.load(p("/two"), second, true).unwrap();
        assert!(bucket.is_empty());
        assert_eq!(bucket.namespace(), &p("/two"));

        bucket.load(p("/one"), first, true).unwrap();
        assert_eq!(bucket.get(&p("/one/x")), Some(&9));
    }

    #[test]
    fn accept_respects_depth() {
        let dir = tempfile::tempdir().unwrap();
        let mut bucket = loaded(&dir.path().join("proj/counter.index"));
        for (path, n) in [("/proj", 1), ("/proj/a", 2), ("/proj/a/b", 3), ("/proj/ab", 4)] {
            bucket.set(p(path), n);
        }

        let mut seen = Vec::new();
        let mut collect = |entry: &mut EntryMut<'_, u32>| {
            seen.push(entry.path().to_string());
            Visit::Continue
        };
        bucket.accept(&mut collect, &p("/proj/a"), Depth::Zero);
        bucket.accept(&mut collect, &p("/proj"), Depth::One);
        bucket.accept(&mut collect, &p("/proj/a"), Depth::Infinite);
        assert_eq!(
            seen,
            vec!["/proj/a", "/proj", "/proj/a", "/proj/ab", "/proj/a", "/proj/a/b"]
        );
    }

    #[test]
    fn accept_applies_edits_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let mut bucket = loaded(&dir.path().join("proj/counter.index"));
        for (path, n) in [("/proj/a", 1), ("/proj/b", 2), ("/proj/c", 3)] {
            bucket.set(p(path), n);
        }

        let mut edit = |entry: &mut EntryMut<'_, u32>| match entry.path().name() {
            Some("a") => {
                entry.set_value(entry.value() * 10);
                Visit::Continue
            }
            Some("b") => {
                entry.delete();
                Visit::Stop
            }
            _ => unreachable!("visit should have stopped"),
        };
        let outcome = bucket.accept(&mut edit, &p("/proj"), Depth::Infinite);

        assert_eq!(outcome, Visit::Stop);
        assert_eq!(bucket.get(&p("/proj/a")), Some(&10));
        assert!(bucket.get(&p("/proj/b")).is_none());
        assert_eq!(bucket.get(&p("/proj/c")), Some(&3));
        assert!(bucket.is_dirty());
    }

    fn arb_path() -> impl Strategy<Value = ResourcePath> {
        proptest::collection::vec("[a-z0-9._-]{1,8}", 1..4).prop_filter_map("dot segments", |segs| {
            ResourcePath::from_segments(segs.iter().map(String::as_str)).ok()
        })
    }

    proptest! {
        #[test]
        fn index_roundtrip(entries in proptest::collection::btree_map(arb_path(), 1u32.., 0..32)) {
            let dir = tempfile::tempdir().unwrap();
            let location = dir.path().join("proj/counter.index");

            let mut bucket = loaded(&location);
            for (path, value) in &entries {
                bucket.set(path.clone(), *value);
            }
            bucket.save().unwrap();

            let reloaded = loaded(&location);
            prop_assert_eq!(reloaded.len(), entries.len());
            for (path, value) in &entries {
                prop_assert_eq!(reloaded.get(path), Some(value));
            }
        }
    }
}
