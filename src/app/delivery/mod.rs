//! Event delivery
//!
//! Dispatchers never call listeners directly. Every event is wrapped in a task
//! and handed to a [`CallbackExecutor`], which decides which thread runs it.
//! Events of one request are posted in lifecycle order from whichever worker
//! owns the request, so any FIFO executor preserves that order.

pub mod executor;
pub(crate) mod job;

use crate::errors::RequestError;

pub use executor::{
    CallbackExecutor, ChannelExecutor, ChannelPump, InlineExecutor, Task, ThreadExecutor,
};

/// Callback receiving a request's events
pub type Listener<T> = std::sync::Arc<dyn Fn(Event<T>) + Send + Sync>;

/// Lifecycle event of a request
///
/// A request sees `Start` (unless cancelled before the cache lookup), any
/// number of progress-style events, exactly one of `Success`, `Error` or
/// `Cancel`, and finally `Finish`. `Intermediate` carries a stale cached copy
/// while a refresh is in flight; it never ends the request.
#[derive(Debug)]
pub enum Event<T> {
    Start,
    UsedCache,
    Networking,
    Progress { total: Option<u64>, transferred: u64 },
    Retry,
    Intermediate(T),
    Success(T),
    Error(RequestError),
    Cancel,
    Finish,
}

impl<T> Event<T> {
    /// Whether this is one of the mutually exclusive outcome events
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Success(_) | Event::Error(_) | Event::Cancel)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::Start => "start",
            Event::UsedCache => "used-cache",
            Event::Networking => "networking",
            Event::Progress { .. } => "progress",
            Event::Retry => "retry",
            Event::Intermediate(_) => "intermediate",
            Event::Success(_) => "success",
            Event::Error(_) => "error",
            Event::Cancel => "cancel",
            Event::Finish => "finish",
        }
    }
}

/// Payload-free events posted by the engine on a request's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Start,
    Networking,
    Retry,
    Progress { total: Option<u64>, transferred: u64 },
}

impl<T> From<Lifecycle> for Event<T> {
    fn from(lifecycle: Lifecycle) -> Self {
        match lifecycle {
            Lifecycle::Start => Event::Start,
            Lifecycle::Networking => Event::Networking,
            Lifecycle::Retry => Event::Retry,
            Lifecycle::Progress { total, transferred } => Event::Progress { total, transferred },
        }
    }
}
