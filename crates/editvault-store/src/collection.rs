//! Typed collections over a [`Backend`].

use std::marker::PhantomData;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{Backend, MemoryBackend};
use crate::error::{Result, StoreError};
use crate::file::FileBackend;
use crate::record::{decode, encode, validate_key, Direction, IndexKey, Record};

static DEGRADED_WARNING: AtomicBool = AtomicBool::new(false);

/// Entry point to durable storage. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn Backend>,
}

impl Store {
    /// Open a file-backed store rooted at `root`.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let backend = FileBackend::open(root).await?;
        Ok(Self::with_backend(Arc::new(backend)))
    }

    /// Open a file-backed store, falling back to memory when persistent
    /// storage is unavailable. The fallback is announced once per process.
    pub async fn open_or_memory<P: AsRef<Path>>(root: P) -> Self {
        match Self::open(root).await {
            Ok(store) => store,
            Err(e) => {
                if !DEGRADED_WARNING.swap(true, Ordering::SeqCst) {
                    log::warn!("{}; continuing with in-memory storage, nothing will be saved", e);
                }
                Self::memory()
            }
        }
    }

    /// A store that lives only as long as the process.
    pub fn memory() -> Self {
        Self::with_backend(Arc::new(MemoryBackend::new()))
    }

    pub fn with_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// Open the named collection, creating it on first use.
    pub async fn collection<T: Record>(&self, name: &str) -> Result<Collection<T>> {
        validate_key(name)?;
        self.backend.ensure_collection(name).await?;

        Ok(Collection {
            name: name.to_string(),
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        })
    }
}

/// A named key space holding records of one type.
pub struct Collection<T> {
    name: String,
    backend: Arc<dyn Backend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            backend: Arc::clone(&self.backend),
            _marker: PhantomData,
        }
    }
}

impl<T: Record> Collection<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.backend.is_persistent()
    }

    /// Insert or replace a record by its primary key.
    pub async fn put(&self, record: &T) -> Result<()> {
        let (key, bytes) = encode(&self.name, record)?;
        self.backend.write(&self.name, &key, bytes).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<T>> {
        match self.backend.read(&self.name, key).await? {
            Some(bytes) => decode(&self.name, key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Delete a record. Deleting an absent key succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.backend.remove(&self.name, key).await
    }

    /// Delete every record, returning how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        self.backend.clear(&self.name).await
    }

    /// Primary keys in ascending order.
    pub async fn keys(&self) -> Result<Vec<String>> {
        self.backend.keys(&self.name).await
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// All records, ordered by `index` (ties broken by primary key) or by
    /// primary key when no index is given.
    ///
    /// Records without a value for the index are left out, as an index only
    /// covers records that carry the indexed field.
    pub async fn get_all(&self, index: Option<&str>, direction: Direction) -> Result<Vec<T>> {
        let listing = self.load(index, direction, false).await?;
        Ok(listing.records)
    }

    /// Like [`Collection::get_all`], but records that cannot be read or
    /// decoded are skipped and reported instead of failing the call.
    pub async fn get_all_lossy(
        &self,
        index: Option<&str>,
        direction: Direction,
    ) -> Result<Listing<T>> {
        self.load(index, direction, true).await
    }

    async fn load(&self, index: Option<&str>, direction: Direction, lossy: bool) -> Result<Listing<T>> {
        if let Some(index) = index {
            self.check_index(index)?;
        }

        let mut records = Vec::new();
        let mut unreadable = Vec::new();
        for key in self.keys().await? {
            match self.get(&key).await {
                Ok(Some(record)) => records.push((key, record)),
                // a key listed a moment ago may already be gone
                Ok(None) => {}
                Err(e) if lossy && !e.is_unavailable() => {
                    log::warn!("Skipping unreadable record: {}", e);
                    unreadable.push(key);
                }
                Err(e) => return Err(e),
            }
        }

        let mut records: Vec<T> = match index {
            None => records.into_iter().map(|(_, record)| record).collect(),
            Some(index) => {
                let mut keyed: Vec<(IndexKey, String, T)> = records
                    .into_iter()
                    .filter_map(|(key, record)| {
                        record.index_value(index).map(|value| (value, key, record))
                    })
                    .collect();
                keyed.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
                keyed.into_iter().map(|(_, _, record)| record).collect()
            }
        };

        if direction == Direction::Descending {
            records.reverse();
        }
        Ok(Listing {
            records,
            unreadable,
        })
    }

    /// Records whose `index` value equals `value`, in primary-key order.
    pub async fn find(&self, index: &str, value: impl Into<IndexKey>) -> Result<Vec<T>> {
        let value = value.into();
        let records = self.get_all(Some(index), Direction::Ascending).await?;
        Ok(records
            .into_iter()
            .filter(|record| record.index_value(index).as_ref() == Some(&value))
            .collect())
    }

    /// Like [`Collection::find`], skipping records that cannot be decoded.
    pub async fn find_lossy(&self, index: &str, value: impl Into<IndexKey>) -> Result<Listing<T>> {
        let value = value.into();
        let mut listing = self.get_all_lossy(Some(index), Direction::Ascending).await?;
        listing
            .records
            .retain(|record| record.index_value(index).as_ref() == Some(&value));
        Ok(listing)
    }

    /// A lazy walk over the collection in primary-key order.
    pub fn scan(&self, direction: Direction) -> Scan<T> {
        Scan {
            collection: self.clone(),
            direction,
            keys: None,
            position: 0,
        }
    }

    fn check_index(&self, index: &str) -> Result<()> {
        if T::indexes().contains(&index) {
            Ok(())
        } else {
            Err(StoreError::UnknownIndex {
                collection: self.name.clone(),
                index: index.to_string(),
            })
        }
    }
}

/// Records from a best-effort listing.
#[derive(Debug)]
pub struct Listing<T> {
    pub records: Vec<T>,
    /// Keys whose stored bytes could not be read or decoded.
    pub unreadable: Vec<String>,
}

/// Finite, restartable cursor over a collection.
///
/// The key list is captured on the first call to [`Scan::next`]; records are
/// fetched one at a time as the cursor advances. Keys deleted after the
/// capture are skipped.
pub struct Scan<T> {
    collection: Collection<T>,
    direction: Direction,
    keys: Option<Vec<String>>,
    position: usize,
}

impl<T: Record> Scan<T> {
    pub async fn next(&mut self) -> Result<Option<T>> {
        if self.keys.is_none() {
            let mut keys = self.collection.keys().await?;
            if self.direction == Direction::Descending {
                keys.reverse();
            }
            self.keys = Some(keys);
        }

        loop {
            let Some(key) = self
                .keys
                .as_ref()
                .and_then(|keys| keys.get(self.position))
                .cloned()
            else {
                return Ok(None);
            };
            self.position += 1;

            if let Some(record) = self.collection.get(&key).await? {
                return Ok(Some(record));
            }
        }
    }

    /// Start over; the next call to `next` re-reads the key list.
    pub fn restart(&mut self) {
        self.keys = None;
        self.position = 0;
    }
}
