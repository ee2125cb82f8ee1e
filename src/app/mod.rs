//! Core request engine
//!
//! This module contains the request model, the two-stage dispatch pipeline
//! (cache triage, then network), the cache stores, the transport seam and
//! the event delivery executors.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netqueue::app::{
//!     DiskCache, DiskCacheConfig, Event, JsonParser, Priority, RequestBuilder, RequestQueue,
//!     ReqwestTransport, TransportConfig,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = RequestQueue::builder()
//!     .transport(Arc::new(ReqwestTransport::new(&TransportConfig::default())?))
//!     .cache(Arc::new(DiskCache::new(DiskCacheConfig::default())?))
//!     .build()?;
//! queue.start()?;
//!
//! let request = RequestBuilder::get("https://api.example.com/items")
//!     .priority(Priority::High)
//!     .build(JsonParser::<serde_json::Value>::new(), |event| {
//!         if let Event::Success(items) = event {
//!             println!("{}", items);
//!         }
//!     });
//! queue.submit(request);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod delivery;
pub(crate) mod dispatcher;
pub mod network;
pub mod queue;
pub mod request;
pub mod retry;
pub(crate) mod sync;
pub mod transport;

// Re-export main public API
pub use cache::{CacheEntry, CacheStore, CacheTtl, DiskCache, DiskCacheConfig, MemoryCache};
pub use delivery::{
    CallbackExecutor, ChannelExecutor, ChannelPump, Event, InlineExecutor, Listener,
    ThreadExecutor,
};
pub use network::{Headers, NetworkResponse};
pub use queue::{ConfigPresets, QueueConfig, QueueStatsSnapshot, RequestQueue};
pub use request::{
    Body, BytesParser, JsonParser, Method, Priority, Request, RequestBuilder, RequestHandle,
    ResponseParser, TextParser,
};
pub use retry::{DefaultRetryPolicy, RetryConfig, RetryPolicy};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportConfig};
