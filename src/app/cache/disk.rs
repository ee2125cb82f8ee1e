//! Size-bounded disk cache store
//!
//! Each entry lives in its own file named after the MD5 digest of its key:
//!
//! ```text
//! [u32 LE metadata length][JSON metadata (key + entry)][raw body bytes]
//! ```
//!
//! Writes go through a temporary file in the cache directory and are renamed
//! into place, so readers never observe a partial entry. An in-memory index
//! tracks sizes and recency; once the total exceeds the configured maximum,
//! least recently used entries are evicted until the total drops below 90% of
//! it.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::app::sync::lock;
use crate::constants::cache;
use crate::errors::{CacheError, CacheResult};

use super::entry::CacheEntry;
use super::CacheStore;

/// Disk cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Cache directory; `None` uses the OS cache directory
    pub root: Option<PathBuf>,
    /// Maximum total size of all entry files
    pub max_size_bytes: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_size_bytes: cache::DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

impl DiskCacheConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Resolve the cache directory
    ///
    /// - Linux: ~/.cache/netqueue
    /// - macOS: ~/Library/Caches/netqueue
    /// - Windows: %LOCALAPPDATA%/netqueue
    pub fn resolve_root(&self) -> CacheResult<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => Ok(dirs::cache_dir()
                .ok_or_else(|| CacheError::DirectoryNotAccessible {
                    path: PathBuf::from("system cache directory"),
                })?
                .join(cache::DEFAULT_CACHE_DIR)),
        }
    }
}

/// Snapshot of disk cache usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCacheStats {
    pub root: PathBuf,
    pub entries: usize,
    pub total_size: u64,
    pub max_size: u64,
}

impl DiskCacheStats {
    pub fn usage_percentage(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            (self.total_size as f64 / self.max_size as f64) * 100.0
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    entry: CacheEntry,
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
struct DiskIndex {
    entries: HashMap<String, IndexEntry>,
    total_size: u64,
    clock: u64,
}

impl DiskIndex {
    fn touch(&mut self, key: &str, size: u64) {
        self.clock += 1;
        let access = self.clock;
        if let Some(previous) = self.entries.insert(
            key.to_string(),
            IndexEntry {
                size,
                last_access: access,
            },
        ) {
            self.total_size -= previous.size;
        }
        self.total_size += size;
    }

    fn forget(&mut self, key: &str) {
        if let Some(previous) = self.entries.remove(key) {
            self.total_size -= previous.size;
        }
    }
}

/// File-per-entry cache store
#[derive(Debug)]
pub struct DiskCache {
    root: PathBuf,
    max_size: u64,
    index: Mutex<DiskIndex>,
}

impl DiskCache {
    pub fn new(config: DiskCacheConfig) -> CacheResult<Self> {
        let root = config.resolve_root()?;
        info!(
            "Disk cache at {} (max {} bytes)",
            root.display(),
            config.max_size_bytes
        );
        Ok(Self {
            root,
            max_size: config.max_size_bytes,
            index: Mutex::new(DiskIndex::default()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> DiskCacheStats {
        let index = lock(&self.index);
        DiskCacheStats {
            root: self.root.clone(),
            entries: index.entries.len(),
            total_size: index.total_size,
            max_size: self.max_size,
        }
    }

    fn file_for_key(&self, key: &str) -> PathBuf {
        self.root.join(format!(
            "{:x}.{}",
            md5::compute(key.as_bytes()),
            cache::ENTRY_EXTENSION
        ))
    }

    fn ensure_root(&self) -> CacheResult<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root).map_err(|e| {
                error!("Failed to create cache directory: {}", e);
                CacheError::DirectoryNotAccessible {
                    path: self.root.clone(),
                }
            })?;
            debug!("Created cache directory: {}", self.root.display());
        }
        Ok(())
    }

    fn encode(key: &str, entry: CacheEntry) -> CacheResult<Vec<u8>> {
        let data = entry.data.clone();
        let metadata = serde_json::to_vec(&StoredEntry {
            key: key.to_string(),
            entry,
        })?;
        let mut buffer = Vec::with_capacity(4 + metadata.len() + data.len());
        buffer.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&metadata);
        buffer.extend_from_slice(&data);
        Ok(buffer)
    }

    fn decode(path: &Path, bytes: &[u8]) -> CacheResult<StoredEntry> {
        let corrupt = |reason: &str| CacheError::CorruptEntry {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let header: [u8; 4] = bytes
            .get(..4)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| corrupt("missing length header"))?;
        let metadata_len = u32::from_le_bytes(header) as usize;
        let metadata = bytes
            .get(4..4 + metadata_len)
            .ok_or_else(|| corrupt("truncated metadata"))?;

        let mut stored: StoredEntry = serde_json::from_slice(metadata)?;
        stored.entry.data = bytes[4 + metadata_len..].to_vec();
        Ok(stored)
    }

    fn read_file(path: &Path) -> CacheResult<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(path: &Path) -> CacheResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> CacheResult<()> {
        let mut temp = NamedTempFile::new_in(&self.root)?;
        temp.write_all(bytes)?;
        temp.flush()?;
        temp.persist(path).map_err(|e| {
            error!("Failed to persist cache entry {}: {}", path.display(), e.error);
            CacheError::AtomicWriteFailed {
                path: path.to_path_buf(),
            }
        })?;
        Ok(())
    }

    /// Evict least recently used entries until below the hysteresis mark
    fn prune(&self, index: &mut DiskIndex) {
        if index.total_size <= self.max_size {
            return;
        }
        let target = (self.max_size as f64 * cache::PRUNE_HYSTERESIS) as u64;
        let before = index.total_size;

        let mut by_age: Vec<(String, u64)> = index
            .entries
            .iter()
            .map(|(key, e)| (key.clone(), e.last_access))
            .collect();
        by_age.sort_by_key(|(_, access)| *access);

        let mut pruned = 0usize;
        for (key, _) in by_age {
            if index.total_size <= target {
                break;
            }
            if let Err(e) = Self::remove_file(&self.file_for_key(&key)) {
                warn!("Failed to prune cache entry {}: {}", key, e);
                continue;
            }
            index.forget(&key);
            pruned += 1;
        }

        info!(
            "Pruned {} cache entries ({} -> {} bytes)",
            pruned, before, index.total_size
        );
    }
}

impl CacheStore for DiskCache {
    fn initialize(&self) -> CacheResult<()> {
        self.ensure_root()?;
        let mut index = lock(&self.index);
        *index = DiskIndex::default();

        let mut loaded = 0usize;
        for dir_entry in fs::read_dir(&self.root)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(cache::ENTRY_EXTENSION) {
                continue;
            }
            let Some(bytes) = Self::read_file(&path)? else {
                continue;
            };
            match Self::decode(&path, &bytes) {
                Ok(stored) => {
                    index.touch(&stored.key, bytes.len() as u64);
                    loaded += 1;
                }
                Err(e) => {
                    warn!("Removing unreadable cache file {}: {}", path.display(), e);
                    Self::remove_file(&path)?;
                }
            }
        }

        info!(
            "Disk cache initialized: {} entries, {} bytes",
            loaded, index.total_size
        );
        self.prune(&mut index);
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let path = self.file_for_key(key);
        let mut index = lock(&self.index);

        let Some(bytes) = Self::read_file(&path)? else {
            index.forget(key);
            return Ok(None);
        };

        match Self::decode(&path, &bytes) {
            Ok(stored) if stored.key == key => {
                index.touch(key, bytes.len() as u64);
                Ok(Some(stored.entry))
            }
            Ok(stored) => {
                debug!(
                    "Cache file {} holds key {}, not {}",
                    path.display(),
                    stored.key,
                    key
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Discarding corrupt cache entry for {}: {}", key, e);
                Self::remove_file(&path)?;
                index.forget(key);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        self.ensure_root()?;
        let path = self.file_for_key(key);
        let bytes = Self::encode(key, entry)?;

        let mut index = lock(&self.index);
        self.write_atomic(&path, &bytes)?;
        index.touch(key, bytes.len() as u64);
        debug!("Cached {} ({} bytes)", key, bytes.len());
        self.prune(&mut index);
        Ok(())
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        let path = self.file_for_key(key);
        let mut index = lock(&self.index);
        Self::remove_file(&path)?;
        index.forget(key);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        let mut index = lock(&self.index);
        if self.root.exists() {
            for dir_entry in fs::read_dir(&self.root)? {
                let path = dir_entry?.path();
                if path.extension().and_then(|e| e.to_str()) == Some(cache::ENTRY_EXTENSION) {
                    Self::remove_file(&path)?;
                }
            }
        }
        *index = DiskIndex::default();
        info!("Disk cache cleared: {}", self.root.display());
        Ok(())
    }
}
