use std::path::PathBuf;

use keep_bucket::{BucketError, BucketResult, BucketTree, ByteReader, ByteWriter, EntryCodec};
use keep_bucket::{EntryMut, Visit};
use keep_sync::{ResourceKind, ResourceTree, SyncReport, SyncStamp};
use keep_types::{Depth, ResourcePath};
use tracing::{debug, warn};

/// What the index remembers about one resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub kind: ResourceKind,
    pub stamp: Option<SyncStamp>,
}

/// Bucket codec for [`ResourceRecord`].
///
/// Payload: `kind: u8`, `has_stamp: u8`, then for a stamp
/// `last_modified_ms: i64` and `size: u64`.
#[derive(Debug)]
pub struct ResourceCodec;

impl EntryCodec for ResourceCodec {
    type Value = ResourceRecord;
    const VERSION: u8 = 1;
    const INDEX_FILE: &'static str = "resources.index";

    fn is_empty(_value: &ResourceRecord) -> bool {
        false
    }

    fn write_value(value: &ResourceRecord, out: &mut ByteWriter) {
        out.put_u8(kind_tag(value.kind));
        match value.stamp {
            Some(stamp) => {
                out.put_u8(1);
                out.put_i64(stamp.last_modified_ms);
                out.put_u64(stamp.size);
            }
            None => out.put_u8(0),
        }
    }

    fn read_value(input: &mut ByteReader<'_>) -> BucketResult<ResourceRecord> {
        let kind = match input.read_u8()? {
            1 => ResourceKind::Project,
            2 => ResourceKind::Folder,
            3 => ResourceKind::File,
            tag => return Err(BucketError::Corrupt(format!("unknown resource kind {tag}"))),
        };
        let stamp = match input.read_u8()? {
            0 => None,
            1 => Some(SyncStamp {
                last_modified_ms: input.read_i64()?,
                size: input.read_u64()?,
            }),
            flag => return Err(BucketError::Corrupt(format!("bad stamp flag {flag}"))),
        };
        Ok(ResourceRecord { kind, stamp })
    }
}

fn kind_tag(kind: ResourceKind) -> u8 {
    match kind {
        ResourceKind::Root => 0,
        ResourceKind::Project => 1,
        ResourceKind::Folder => 2,
        ResourceKind::File => 3,
    }
}

/// Persistent copy of the resource tree, so a workspace reopens with
/// the tree and sync stamps it last saw.
///
/// The index trails the in-memory tree until saved. After a crash it may
/// be stale, which the next refresh corrects like any offline change.
pub struct ResourceIndex {
    tree: BucketTree<ResourceCodec>,
}

impl ResourceIndex {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            tree: BucketTree::new(location),
        }
    }

    /// Rebuild a resource tree from the index.
    ///
    /// Records whose parent is missing or not a container are skipped
    /// with a warning; a refresh brings them back if they still exist.
    pub fn load(&mut self) -> BucketResult<ResourceTree> {
        let mut records = Vec::new();
        let mut collect = |entry: &mut EntryMut<'_, ResourceRecord>| {
            if !entry.path().is_root() {
                records.push((entry.path().clone(), *entry.value()));
            }
            Visit::Continue
        };
        self.tree.accept(&mut collect, &ResourcePath::root(), Depth::Infinite)?;

        // Buckets are visited parents first, so one pass is enough.
        let mut resources = ResourceTree::new();
        let mut skipped = 0;
        for (path, record) in records {
            if let Err(e) = resources.create(&path, record.kind, record.stamp) {
                debug!(%path, error = %e, "cannot restore resource");
                skipped += 1;
            }
        }
        if skipped > 0 {
            warn!(skipped, "resource index had entries without a parent");
        }
        Ok(resources)
    }

    pub fn record(
        &mut self,
        path: &ResourcePath,
        kind: ResourceKind,
        stamp: Option<SyncStamp>,
    ) -> BucketResult<()> {
        self.tree.set(path.clone(), ResourceRecord { kind, stamp })
    }

    /// Drop `path` and everything below it. Returns how many records were
    /// removed.
    pub fn forget(&mut self, path: &ResourcePath) -> BucketResult<usize> {
        let mut removed = 0;
        let mut drop_record = |entry: &mut EntryMut<'_, ResourceRecord>| {
            entry.delete();
            removed += 1;
            Visit::Continue
        };
        self.tree.accept(&mut drop_record, path, Depth::Infinite)?;
        Ok(removed)
    }

    /// Mirror a refresh: removals first, then additions and new stamps.
    pub fn apply(&mut self, report: &SyncReport) -> BucketResult<()> {
        for path in &report.removed {
            self.forget(path)?;
        }
        for change in report.added.iter().chain(&report.changed) {
            self.record(&change.path, change.kind, change.stamp)?;
        }
        Ok(())
    }

    pub fn save(&mut self) -> BucketResult<()> {
        self.tree.save()
    }

    pub fn close(self) -> BucketResult<()> {
        self.tree.close()
    }
}
