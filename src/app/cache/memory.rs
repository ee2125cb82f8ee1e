//! In-memory cache store

use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::sync::lock;
use crate::errors::CacheResult;

use super::entry::CacheEntry;
use super::CacheStore;

/// Unbounded map-backed store, mainly for tests and short-lived processes
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        lock(&self.entries).insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        lock(&self.entries).clear();
        Ok(())
    }
}
