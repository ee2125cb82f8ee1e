//! netqueue Library
//!
//! A client-side HTTP request engine: a prioritised queue served by a cache
//! dispatcher and a pool of network dispatchers, with request deduplication,
//! two-horizon response caching, timeout-escalating retries and ordered
//! event delivery on a caller-chosen thread.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
