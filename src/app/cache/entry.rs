//! Cache entry model

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::network::{Headers, NetworkResponse};

/// Explicit freshness override supplied by a request
///
/// `soft` is when a refresh becomes due, `hard` is when the entry can no
/// longer be served at all. `hard` is never shorter than `soft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub soft: Duration,
    pub hard: Duration,
}

impl CacheTtl {
    pub fn new(soft: Duration, hard: Duration) -> Self {
        Self {
            soft,
            hard: hard.max(soft),
        }
    }
}

/// A cached response with its freshness metadata
///
/// The body travels in `data`; stores that persist metadata separately
/// (the disk cache) skip it when serializing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(skip)]
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub charset: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub server_date: Option<DateTime<Utc>>,
    /// Refresh is due after this instant
    pub soft_expires: DateTime<Utc>,
    /// Entry is unusable after this instant
    pub expires: DateTime<Utc>,
    pub headers: Headers,
}

impl CacheEntry {
    /// Build an entry from a response with the given expiry instants
    pub fn from_response(
        response: &NetworkResponse,
        soft_expires: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> Self {
        Self {
            data: response.data.clone(),
            content_type: response.content_type().map(str::to_string),
            charset: response.charset.clone(),
            etag: response.header("etag").map(str::to_string),
            last_modified: response.header("last-modified").map(str::to_string),
            server_date: response
                .header("date")
                .and_then(super::headers::parse_http_date),
            soft_expires,
            expires: expires.max(soft_expires),
            headers: response.headers.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    pub fn refresh_needed(&self, now: DateTime<Utc>) -> bool {
        self.soft_expires <= now
    }

    /// Response view of the entry, as delivered on a cache hit
    pub fn to_response(&self) -> NetworkResponse {
        let mut response = NetworkResponse::new(
            200,
            self.data.clone(),
            self.headers.clone(),
            &self.charset,
        );
        response.network_time = Duration::ZERO;
        response
    }

    /// Approximate footprint used for size accounting
    pub fn size(&self) -> u64 {
        self.data.len() as u64
            + self
                .headers
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum::<u64>()
    }
}
