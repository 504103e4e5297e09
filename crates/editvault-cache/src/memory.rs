//! Bounded in-memory tier with insertion-order eviction

use std::collections::{HashMap, VecDeque};

use crate::entry::CacheEntry;

pub struct MemoryTier {
    capacity: usize,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    entries: HashMap<String, CacheEntry>,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut CacheEntry> {
        self.entries.get_mut(key)
    }

    /// Insert or replace an entry, returning the entry evicted to make room.
    ///
    /// Replacing an existing key keeps its original position.
    pub fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        if let Some(existing) = self.entries.get_mut(&entry.key) {
            *existing = entry;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            self.order
                .pop_front()
                .and_then(|oldest| self.entries.remove(&oldest))
        } else {
            None
        };

        self.order.push_back(entry.key.clone());
        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    /// Entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.order.clear();
        count
    }
}
