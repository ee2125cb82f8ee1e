//! Application constants for netqueue
//!
//! This module centralizes the defaults used throughout the engine,
//! organized by functional domain.

use std::time::Duration;

/// HTTP protocol constants
pub mod http {
    use super::Duration;

    /// Default user agent for the reqwest transport
    pub const USER_AGENT: &str = concat!("netqueue/", env!("CARGO_PKG_VERSION"));

    /// Charset used when a response does not declare one
    pub const DEFAULT_CHARSET: &str = "UTF-8";

    /// Delimiter used when folding multi-valued response headers
    pub const HEADER_VALUE_DELIMITER: &str = ";";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Exchanges slower than this are logged with diagnostics
    pub const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(3000);

    /// Read buffer size when draining response bodies
    pub const BODY_CHUNK_SIZE: usize = 4096;

    pub const STATUS_NOT_MODIFIED: u16 = 304;
    pub const STATUS_MOVED_PERMANENTLY: u16 = 301;
    pub const STATUS_MOVED_TEMPORARILY: u16 = 302;
    pub const STATUS_UNAUTHORIZED: u16 = 401;
    pub const STATUS_FORBIDDEN: u16 = 403;
}

/// Retry policy defaults
pub mod retry {
    use super::Duration;

    /// Initial per-attempt timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

    /// Retries after the first attempt
    pub const DEFAULT_MAX_RETRIES: u32 = 1;

    /// Timeout growth factor applied on each retry
    pub const DEFAULT_BACKOFF_MULTIPLIER: f32 = 1.0;

    /// Ceiling for an escalated per-attempt timeout
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
}

/// Request queue defaults
pub mod queue {
    /// Number of network dispatcher threads
    pub const DEFAULT_NETWORK_WORKERS: usize = 4;

    /// Thread name prefix for dispatcher workers
    pub const THREAD_NAME_PREFIX: &str = "netqueue";
}

/// Cache defaults
pub mod cache {
    /// Directory name under the OS cache directory
    pub const DEFAULT_CACHE_DIR: &str = "netqueue";

    /// Maximum disk cache size in bytes
    pub const DEFAULT_MAX_SIZE_BYTES: u64 = 10 * 1024 * 1024;

    /// Fraction of the maximum size kept after pruning
    pub const PRUNE_HYSTERESIS: f64 = 0.9;

    /// Longest freshness lifetime stored for an entry (100 years)
    pub const MAX_FRESHNESS_SECS: i64 = 100 * 365 * 24 * 60 * 60;

    /// File extension for cache entries
    pub const ENTRY_EXTENSION: &str = "entry";
}
