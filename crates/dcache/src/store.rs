//! Snapshot stores: where a repo persists its state between runs.
//!
//! A store is a flat map of string keys to opaque bytes. Writes are buffered
//! until [`SnapshotStore::sync`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Snapshot store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem trouble
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Could not serialize the snapshot
    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),

    /// Could not deserialize the snapshot
    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Store result
pub type StoreResult<T> = Result<T, StoreError>;

/// An external key-value store of byte blobs.
pub trait SnapshotStore: Send + std::fmt::Debug {
    /// Read a value
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Write a value; durable only after [`SnapshotStore::sync`]
    fn set(&mut self, key: &str, value: Vec<u8>);

    /// Make all writes durable
    fn sync(&mut self) -> StoreResult<()>;

    /// Sync and release the store
    fn close(&mut self) -> StoreResult<()> {
        self.sync()
    }
}

/// A store in memory. Clones share the same contents, so a test can keep a
/// handle to what a repo wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore(Arc<Mutex<BTreeMap<String, Vec<u8>>>>);

impl MemoryStore {
    /// Keys currently stored
    pub fn keys(&self) -> Vec<String> {
        self.0.lock().keys().cloned().collect()
    }
}

impl SnapshotStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.0.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.0.lock().insert(key.to_string(), value);
    }

    fn sync(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// A store kept in one MessagePack file. Sync writes a temp file next to it
/// and renames it into place.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, Vec<u8>>,
    dirty: bool,
}

impl FileStore {
    /// The file name used inside a cache directory
    pub const FILE_NAME: &'static str = "dcache.msgpack";

    /// Open (or start) the store at `path`.
    ///
    /// An unreadable snapshot is discarded with a warning: it is only a cache.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match rmp_serde::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "discarding unreadable snapshot");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            entries,
            dirty: false,
        })
    }

    /// Open the store inside `dir`, creating the directory if needed.
    pub fn open_dir(dir: impl AsRef<Path>) -> StoreResult<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        Self::open(dir.as_ref().join(Self::FILE_NAME))
    }

    /// Where the snapshot lives
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
        self.dirty = true;
    }

    fn sync(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = rmp_serde::to_vec(&self.entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty = false;
        tracing::debug!(path = %self.path.display(), "snapshot synced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = FileStore::open_dir(dir.path()).unwrap();
        assert_eq!(s.get("k"), None);
        s.set("k", vec![1, 2, 3]);
        s.close().unwrap();

        let s = FileStore::open_dir(dir.path()).unwrap();
        assert_eq!(s.get("k"), Some(vec![1, 2, 3]));
        assert!(!s.path().with_extension("tmp").exists());
    }

    #[test]
    fn unsynced_writes_are_lost() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = FileStore::open_dir(dir.path()).unwrap();
        s.set("k", vec![1]);
        drop(s);
        assert_eq!(FileStore::open_dir(dir.path()).unwrap().get("k"), None);
    }

    #[test]
    fn garbage_file_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FileStore::FILE_NAME), b"\xc1\xc1 nope").unwrap();
        let s = FileStore::open_dir(dir.path()).unwrap();
        assert_eq!(s.get("version"), None);
    }

    #[test]
    fn memory_store_clones_share() {
        let a = MemoryStore::default();
        let mut b = a.clone();
        b.set("x", vec![9]);
        assert_eq!(a.get("x"), Some(vec![9]));
        assert_eq!(a.keys(), vec!["x".to_string()]);
    }
}
