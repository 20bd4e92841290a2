use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use keep_fs::{FileStore, FsError};
use keep_types::BlobId;
use tracing::debug;

use crate::error::{BlobError, BlobResult};
use crate::shard::{shard, validate_limit};

/// Sharded store of immutable blobs.
///
/// Blobs are never rewritten; a new version of some content always gets a
/// new id. All file access goes through the injected [`FileStore`].
pub struct BlobStore {
    root: PathBuf,
    limit: usize,
    fs: Arc<dyn FileStore>,
}

impl BlobStore {
    /// Open a store rooted at an existing directory.
    ///
    /// Fails with [`BlobError::InvalidLimit`] or [`BlobError::InvalidRoot`].
    pub fn new(root: impl Into<PathBuf>, limit: usize, fs: Arc<dyn FileStore>) -> BlobResult<Self> {
        validate_limit(limit)?;
        let store = Self {
            root: root.into(),
            limit,
            fs,
        };
        store.check_root()?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Physical location of a blob, whether or not it exists.
    pub fn file_for(&self, id: &BlobId) -> PathBuf {
        self.root.join(shard(id, self.limit)).join(id.to_hex())
    }

    /// Store the content of `source` under a new id, moving the file when
    /// `move_content` is set and copying it otherwise.
    pub fn add_blob(&self, source: &Path, move_content: bool) -> BlobResult<BlobId> {
        let (id, target) = self.prepare_slot()?;
        if move_content {
            self.fs.rename(source, &target)?;
        } else {
            self.fs.copy(source, &target)?;
        }
        debug!(%id, source = %source.display(), move_content, "added blob");
        Ok(id)
    }

    /// Store an in-memory buffer under a new id.
    pub fn add_bytes(&self, data: &[u8]) -> BlobResult<BlobId> {
        let (id, target) = self.prepare_slot()?;
        self.fs.write(&target, data)?;
        debug!(%id, len = data.len(), "added blob");
        Ok(id)
    }

    /// Open a blob for reading.
    pub fn get_blob(&self, id: &BlobId) -> BlobResult<Box<dyn Read + Send>> {
        self.fs
            .open_read(&self.file_for(id))
            .map_err(|e| not_found_as(e, id))
    }

    /// Read a whole blob into memory.
    pub fn read_blob(&self, id: &BlobId) -> BlobResult<Vec<u8>> {
        let mut data = Vec::new();
        self.get_blob(id)?.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn blob_size(&self, id: &BlobId) -> BlobResult<u64> {
        match self.fs.stat(&self.file_for(id))? {
            Some(info) if info.is_file() => Ok(info.size),
            _ => Err(BlobError::NotFound(*id)),
        }
    }

    pub fn contains(&self, id: &BlobId) -> BlobResult<bool> {
        Ok(self
            .fs
            .stat(&self.file_for(id))?
            .is_some_and(|info| info.is_file()))
    }

    /// Delete a blob. Unknown ids are ignored; returns whether a file was
    /// removed.
    pub fn delete_blob(&self, id: &BlobId) -> BlobResult<bool> {
        let removed = self.fs.delete(&self.file_for(id))?;
        if removed {
            debug!(%id, "deleted blob");
        }
        Ok(removed)
    }

    /// Delete several blobs, returning how many existed.
    pub fn delete_blobs<'a, I>(&self, ids: I) -> BlobResult<usize>
    where
        I: IntoIterator<Item = &'a BlobId>,
    {
        let mut removed = 0;
        for id in ids {
            if self.delete_blob(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Every blob id present on disk, sorted.
    ///
    /// Files that do not look like blobs are ignored.
    pub fn all_ids(&self) -> BlobResult<Vec<BlobId>> {
        self.check_root()?;
        let mut ids = Vec::new();
        for shard_name in self.fs.list(&self.root)? {
            let shard_dir = self.root.join(&shard_name);
            if !is_shard_name(&shard_name) || !self.is_dir(&shard_dir)? {
                continue;
            }
            for name in self.fs.list(&shard_dir)? {
                match BlobId::from_hex(&name) {
                    Ok(id) if shard(&id, self.limit) == shard_name => ids.push(id),
                    _ => debug!(shard = %shard_name, %name, "ignoring stray file in blob store"),
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn prepare_slot(&self) -> BlobResult<(BlobId, PathBuf)> {
        self.check_root()?;
        let id = BlobId::generate();
        let target = self.file_for(&id);
        if let Some(dir) = target.parent() {
            self.fs.create_dir(dir)?;
        }
        Ok((id, target))
    }

    fn check_root(&self) -> BlobResult<()> {
        if self.is_dir(&self.root)? {
            Ok(())
        } else {
            Err(BlobError::InvalidRoot(self.root.clone()))
        }
    }

    fn is_dir(&self, path: &Path) -> BlobResult<bool> {
        Ok(self.fs.stat(path)?.is_some_and(|info| info.is_dir()))
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("root", &self.root)
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

fn is_shard_name(name: &str) -> bool {
    name.len() == 2 && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn not_found_as(err: FsError, id: &BlobId) -> BlobError {
    match err {
        FsError::NotFound(_) => BlobError::NotFound(*id),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keep_fs::LocalFileStore;
    use proptest::prelude::*;

    fn local() -> Arc<dyn FileStore> {
        Arc::new(LocalFileStore::new())
    }

    fn store_in(dir: &Path) -> BlobStore {
        BlobStore::new(dir, 64, local()).unwrap()
    }

    #[test]
    fn rejects_bad_limits() {
        let dir = tempfile::tempdir().unwrap();
        for limit in [0, 35, 512] {
            let err = BlobStore::new(dir.path(), limit, local()).unwrap_err();
            assert!(matches!(err, BlobError::InvalidLimit(n) if n == limit));
        }
        for limit in [64, 128] {
            BlobStore::new(dir.path(), limit, local()).unwrap();
        }
    }

    #[test]
    fn rejects_missing_or_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            BlobStore::new(&missing, 64, local()),
            Err(BlobError::InvalidRoot(_))
        ));

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            BlobStore::new(&file, 64, local()),
            Err(BlobError::InvalidRoot(_))
        ));
    }

    #[test]
    fn add_fails_once_root_is_gone() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        std::fs::create_dir(&root).unwrap();
        let store = store_in(&root);
        std::fs::remove_dir(&root).unwrap();
        assert!(matches!(store.add_bytes(b"x"), Err(BlobError::InvalidRoot(_))));
    }

    #[test]
    fn copy_keeps_source_and_move_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("blobs");
        std::fs::create_dir(&root).unwrap();
        let store = store_in(&root);

        let source = dir.path().join("source.txt");
        std::fs::write(&source, b"content").unwrap();

        let copied = store.add_blob(&source, false).unwrap();
        assert!(source.exists());
        let moved = store.add_blob(&source, true).unwrap();
        assert!(!source.exists());

        assert_ne!(copied, moved);
        assert_eq!(store.read_blob(&copied).unwrap(), b"content");
        assert_eq!(store.read_blob(&moved).unwrap(), b"content");
        assert_eq!(store.blob_size(&moved).unwrap(), 7);
    }

    #[test]
    fn layout_is_shard_then_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let id = store.add_bytes(b"abc").unwrap();
        let expected = dir.path().join(shard(&id, 64)).join(id.to_hex());
        assert_eq!(store.file_for(&id), expected);
        assert!(expected.is_file());
    }

    #[test]
    fn unknown_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let id = BlobId::generate();
        assert!(matches!(store.get_blob(&id).err(), Some(BlobError::NotFound(x)) if x == id));
        assert!(matches!(store.blob_size(&id), Err(BlobError::NotFound(_))));
        assert!(!store.contains(&id).unwrap());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let id = store.add_bytes(b"bye").unwrap();
        assert!(store.delete_blob(&id).unwrap());
        assert!(!store.delete_blob(&id).unwrap());
        assert!(!store.delete_blob(&BlobId::generate()).unwrap());
        assert!(!store.contains(&id).unwrap());
    }

    #[test]
    fn all_ids_lists_every_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut ids: Vec<BlobId> = (0..20)
            .map(|i| store.add_bytes(format!("blob {i}").as_bytes()).unwrap())
            .collect();
        ids.sort();

        std::fs::write(dir.path().join("notes.txt"), b"stray").unwrap();
        std::fs::create_dir_all(dir.path().join("zz")).unwrap();

        assert_eq!(store.all_ids().unwrap(), ids);

        let removed = store.delete_blobs(&ids[..5]).unwrap();
        assert_eq!(removed, 5);
        assert_eq!(store.all_ids().unwrap(), ids[5..].to_vec());
    }

    proptest! {
        #[test]
        fn blob_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let dir = tempfile::tempdir().unwrap();
            let store = store_in(dir.path());
            let id = store.add_bytes(&data).unwrap();
            prop_assert_eq!(store.read_blob(&id).unwrap(), data);
        }
    }
}
