//! Byte-level storage backends.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};

/// Raw key/value storage organised into named collections.
///
/// Keys returned by [`Backend::keys`] are sorted ascending.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create the collection if it does not exist yet. Idempotent.
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;

    async fn write(&self, collection: &str, key: &str, value: Vec<u8>) -> Result<()>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, collection: &str, key: &str) -> Result<()>;

    async fn keys(&self, collection: &str) -> Result<Vec<String>>;

    /// Remove every key in the collection, returning how many were removed.
    async fn clear(&self, collection: &str) -> Result<usize>;

    /// Whether data survives the process.
    fn is_persistent(&self) -> bool;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// In-memory backend.
///
/// Counts reads and writes so callers can verify which storage calls an
/// operation made, and can be told to fail reads or writes to exercise
/// error paths.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `read` and `keys` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write` calls served so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.reads.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self, collection: &str, key: &str) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::read(collection, key, "injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self, collection: &str, key: &str) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::write(collection, key, "injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(collection.to_string()).or_default();
        Ok(())
    }

    async fn read(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_read(collection, key)?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    async fn write(&self, collection: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.check_write(collection, key)?;
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, collection: &str, key: &str) -> Result<()> {
        self.check_write(collection, key)?;
        let mut collections = self.collections.write().await;
        if let Some(entries) = collections.get_mut(collection) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>> {
        self.check_read(collection, "*")?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: &str) -> Result<usize> {
        self.check_write(collection, "*")?;
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map(|entries| {
                let removed = entries.len();
                entries.clear();
                removed
            })
            .unwrap_or(0))
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_read_write() {
        let backend = MemoryBackend::new();
        backend.ensure_collection("c").await.unwrap();

        assert!(backend.read("c", "k").await.unwrap().is_none());
        backend.write("c", "k", b"v".to_vec()).await.unwrap();
        assert_eq!(backend.read("c", "k").await.unwrap(), Some(b"v".to_vec()));

        assert_eq!(backend.write_count(), 1);
        assert_eq!(backend.read_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_collections_are_isolated() {
        let backend = MemoryBackend::new();
        backend.write("a", "k", b"1".to_vec()).await.unwrap();
        backend.write("b", "k", b"2".to_vec()).await.unwrap();

        assert_eq!(backend.clear("a").await.unwrap(), 1);
        assert!(backend.read("a", "k").await.unwrap().is_none());
        assert_eq!(backend.read("b", "k").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_memory_keys_sorted() {
        let backend = MemoryBackend::new();
        for key in ["c", "a", "b"] {
            backend.write("c", key, Vec::new()).await.unwrap();
        }
        assert_eq!(backend.keys("c").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let backend = MemoryBackend::new();
        backend.set_fail_writes(true);
        assert!(matches!(
            backend.write("c", "k", Vec::new()).await,
            Err(StoreError::Write { .. })
        ));

        backend.set_fail_writes(false);
        backend.set_fail_reads(true);
        assert!(matches!(
            backend.read("c", "k").await,
            Err(StoreError::Read { .. })
        ));
    }
}
