//! File-based backend: one JSON document per key.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::Backend;
use crate::error::{Result, StoreError};
use crate::record::validate_key;

const RECORD_EXTENSION: &str = "json";
const PROBE_FILE: &str = ".write-probe";

/// Stores each record at `root/<collection>/<prefix>/<key>.json`.
///
/// Writes go to a temporary sibling file which is fsynced and renamed over
/// the target, so a crash leaves either the old or the new value, never a
/// torn one.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
    nonce: AtomicU64,
}

impl FileBackend {
    /// Open (and create if needed) a store rooted at `root`.
    ///
    /// Fails with [`StoreError::Unavailable`] when the directory cannot be
    /// created or is not writable.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let unavailable = |reason: std::io::Error| StoreError::Unavailable {
            location: root.display().to_string(),
            reason: reason.to_string(),
        };

        fs::create_dir_all(&root).await.map_err(unavailable)?;

        let probe = root.join(PROBE_FILE);
        fs::write(&probe, b"ok").await.map_err(unavailable)?;
        fs::remove_file(&probe).await.map_err(unavailable)?;

        log::debug!("Opened file store at {}", root.display());
        Ok(Self {
            root,
            nonce: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_dir(&self, collection: &str) -> PathBuf {
        self.root.join(collection)
    }

    /// Uses the first 2 characters of the key as a subdirectory.
    /// Example: abc123 -> root/collection/ab/abc123.json
    fn record_path(&self, collection: &str, key: &str) -> PathBuf {
        let prefix = if key.len() >= 2 { &key[..2] } else { key };

        self.collection_dir(collection)
            .join(prefix)
            .join(format!("{}.{}", key, RECORD_EXTENSION))
    }

    fn temp_path(&self, target: &Path, key: &str) -> PathBuf {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let name = format!(".{}.{}.{}.tmp", key, std::process::id(), nonce);
        target.with_file_name(name)
    }

    async fn write_atomic(&self, collection: &str, key: &str, value: &[u8]) -> std::io::Result<()> {
        let path = self.record_path(collection, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path(&path, key);
        let mut file = fs::File::create(&temp).await?;
        let written = async {
            file.write_all(value).await?;
            file.sync_all().await
        }
        .await;
        drop(file);

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp, &path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(e);
        }
        Ok(())
    }

    async fn list_keys(&self, collection: &str) -> std::io::Result<Vec<String>> {
        let dir = self.collection_dir(collection);
        let mut keys = Vec::new();

        let mut shards = match fs::read_dir(&dir).await {
            Ok(shards) => shards,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e),
        };

        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut entries = fs::read_dir(shard.path()).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.starts_with('.') {
                    continue;
                }
                if let Some(key) = name.strip_suffix(".json") {
                    keys.push(key.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl Backend for FileBackend {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        validate_key(collection)?;
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::write(collection, "*", e))
    }

    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let path = self.record_path(collection, key);

        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::read(collection, key, e)),
        }
    }

    async fn write(&self, collection: &str, key: &str, value: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.write_atomic(collection, key, &value)
            .await
            .map_err(|e| StoreError::write(collection, key, e))?;

        log::debug!("Stored {}/{} ({} bytes)", collection, key, value.len());
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<()> {
        validate_key(key)?;
        let path = self.record_path(collection, key);

        match fs::remove_file(&path).await {
            Ok(()) => {
                log::debug!("Removed {}/{}", collection, key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::write(collection, key, e)),
        }
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        self.list_keys(collection)
            .await
            .map_err(|e| StoreError::read(collection, "*", e))
    }

    async fn clear(&self, collection: &str) -> Result<usize> {
        let keys = self.keys(collection).await?;
        let mut removed = 0;

        for key in keys {
            self.remove(collection, &key).await?;
            removed += 1;
        }

        Ok(removed)
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("store");

        let backend = FileBackend::open(&root).await.unwrap();
        assert!(backend.root().exists());
        assert!(!root.join(PROBE_FILE).exists());
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();

        let result = FileBackend::open(blocker.join("store")).await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_write_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();

        backend.write("notes", "abc123", b"{}".to_vec()).await.unwrap();
        assert!(temp_dir.path().join("notes/ab/abc123.json").exists());
        assert_eq!(
            backend.read("notes", "abc123").await.unwrap(),
            Some(b"{}".to_vec())
        );

        backend.remove("notes", "abc123").await.unwrap();
        assert!(backend.read("notes", "abc123").await.unwrap().is_none());

        // removing twice is fine
        backend.remove("notes", "abc123").await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();

        backend.write("notes", "k1", b"one".to_vec()).await.unwrap();
        backend.write("notes", "k1", b"two".to_vec()).await.unwrap();

        assert_eq!(backend.read("notes", "k1").await.unwrap(), Some(b"two".to_vec()));
        let shard = std::fs::read_dir(temp_dir.path().join("notes/k1")).unwrap();
        assert_eq!(shard.count(), 1);
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();

        assert!(backend.keys("notes").await.unwrap().is_empty());

        for key in ["zz9", "aa1", "mm5"] {
            backend.write("notes", key, Vec::new()).await.unwrap();
        }
        backend.write("other", "aa1", Vec::new()).await.unwrap();

        assert_eq!(backend.keys("notes").await.unwrap(), vec!["aa1", "mm5", "zz9"]);
        assert_eq!(backend.clear("notes").await.unwrap(), 3);
        assert!(backend.keys("notes").await.unwrap().is_empty());
        assert_eq!(backend.keys("other").await.unwrap(), vec!["aa1"]);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_keys() {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path()).await.unwrap();

        let result = backend.write("notes", "../escape", Vec::new()).await;
        assert!(matches!(result, Err(StoreError::InvalidKey(_))));
    }
}
