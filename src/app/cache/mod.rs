//! Response cache
//!
//! The cache dispatcher consults a [`CacheStore`] before any request reaches
//! the network, and the network dispatcher writes successful, cacheable
//! responses back. Freshness has two horizons: past `soft_expires` an entry
//! is served once and refreshed in the background, past `expires` it is not
//! served at all.

pub mod disk;
pub mod entry;
pub mod headers;
pub mod memory;

use std::fmt::Debug;

use chrono::Utc;

use crate::errors::CacheResult;

pub use disk::{DiskCache, DiskCacheConfig, DiskCacheStats};
pub use entry::{CacheEntry, CacheTtl};
pub use headers::{entry_with_ttl, parse_cache_headers, parse_http_date};
pub use memory::MemoryCache;

/// Keyed storage for cached responses
///
/// Implementations serialize their own operations; the dispatchers call into
/// a store from several threads at once.
pub trait CacheStore: Send + Sync + Debug {
    /// Prepare the store (create directories, rebuild indexes)
    fn initialize(&self) -> CacheResult<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()>;

    fn remove(&self, key: &str) -> CacheResult<()>;

    fn clear(&self) -> CacheResult<()>;

    /// Force a refresh of `key` on next use; with `full_expire` the entry stops
    /// being served at all
    fn invalidate(&self, key: &str, full_expire: bool) -> CacheResult<()> {
        if let Some(mut entry) = self.get(key)? {
            let now = Utc::now();
            entry.soft_expires = now;
            if full_expire {
                entry.expires = now;
            }
            self.put(key, entry)?;
        }
        Ok(())
    }
}
