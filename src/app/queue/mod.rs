//! Request queue and its scheduling primitives
//!
//! The [`RequestQueue`] accepts typed requests and moves them through two
//! stages: a single cache dispatcher thread that answers what it can from the
//! cache, and a pool of network dispatcher threads that perform the
//! remaining exchanges. Identical cacheable requests in flight at the same
//! time share one exchange.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use netqueue::app::queue::{ConfigPresets, RequestQueue};
//! use netqueue::app::request::{RequestBuilder, TextParser};
//! use netqueue::app::transport::{ReqwestTransport, TransportConfig};
//! use netqueue::app::delivery::Event;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = ReqwestTransport::new(&TransportConfig::default())?;
//! let queue = RequestQueue::builder()
//!     .config(ConfigPresets::production())
//!     .transport(Arc::new(transport))
//!     .build()?;
//! queue.start()?;
//!
//! let (request, events) = RequestBuilder::get("https://example.com/").channel(TextParser);
//! queue.submit(request);
//!
//! for event in events.iter() {
//!     match event {
//!         Event::Success(body) => println!("{}", body),
//!         Event::Error(e) => eprintln!("{}", e),
//!         Event::Finish => break,
//!         _ => {}
//!     }
//! }
//! queue.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod priority;
pub mod stats;
pub mod waiting;

pub use self::config::{ConfigPresets, QueueConfig, QueueConfigBuilder};
pub use self::core::{QueueState, RequestQueue, RequestQueueBuilder};
pub use self::priority::PriorityQueue;
pub use self::stats::{QueueStats, QueueStatsSnapshot};
pub use self::waiting::{Admission, WaitingRequests};
