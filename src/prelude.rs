//! Prelude module for the netqueue library
//!
//! This module re-exports the most commonly used items from the library,
//! providing a convenient way to import everything needed for typical usage
//! with a single `use netqueue::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use netqueue::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let transport = ReqwestTransport::new(&TransportConfig::default())?;
//!     let queue = RequestQueue::builder()
//!         .config(ConfigPresets::production())
//!         .transport(Arc::new(transport))
//!         .build()?;
//!     queue.start()?;
//!
//!     let (request, events) = RequestBuilder::get("https://example.com/").channel(TextParser);
//!     queue.submit(request);
//!     // Continue with event handling...
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ErrorKind, RequestError, Result};

// Essential app components that are used in most integrations
pub use crate::app::{
    // Requests
    Body,
    BytesParser,
    // Cache
    CacheStore,
    CacheTtl,
    CallbackExecutor,
    ChannelExecutor,
    ConfigPresets,
    DiskCache,
    DiskCacheConfig,
    // Delivery
    Event,
    InlineExecutor,
    JsonParser,
    MemoryCache,
    Method,
    NetworkResponse,
    Priority,
    QueueConfig,
    // Queue
    RequestBuilder,
    RequestHandle,
    RequestQueue,
    ReqwestTransport,
    RetryConfig,
    TextParser,
    ThreadExecutor,
    TransportConfig,
};

// Standard library re-exports that are commonly needed
pub use std::sync::Arc;
pub use std::time::Duration;
