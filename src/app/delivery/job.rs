//! Type-erased request jobs
//!
//! Dispatchers handle requests of every response type through `Arc<dyn Job>`.
//! A [`TypedJob`] keeps the parser and listener for its `T` and turns engine
//! decisions into [`Event`]s posted on the callback executor.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use crate::app::network::NetworkResponse;
use crate::app::request::{RequestCore, ResponseParser};
use crate::errors::{ErrorKind, RequestError};

use super::executor::CallbackExecutor;
use super::{Event, Lifecycle, Listener};

/// Where a delivered response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseSource {
    Network,
    /// Fresh cache hit; terminal
    Cache,
    /// Stale cache hit served while a refresh runs; not terminal
    StaleCache,
}

/// How a request ended, reported to the queue's bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    NotModified,
    Failed(ErrorKind),
    Cancelled,
}

/// Called once per request after its terminal event has been posted
pub(crate) type Finisher = Arc<dyn Fn(&RequestCore, Outcome) + Send + Sync>;

pub(crate) trait Job: Send + Sync {
    fn core(&self) -> &Arc<RequestCore>;

    /// Post a payload-free event unless the request already ended
    fn post(&self, event: Lifecycle);

    /// Parse and deliver a response
    ///
    /// On a parse failure nothing is posted and the error is returned so the
    /// caller can decide between self-healing and reporting it.
    fn deliver_response(
        &self,
        response: &NetworkResponse,
        source: ResponseSource,
    ) -> Result<(), RequestError>;

    fn deliver_error(&self, error: RequestError);

    fn deliver_cancel(&self);

    /// End a request whose stale copy already stands in for the response
    fn deliver_finish(&self);
}

pub(crate) struct TypedJob<T> {
    core: Arc<RequestCore>,
    parser: Arc<dyn ResponseParser<T>>,
    listener: Listener<T>,
    executor: Arc<dyn CallbackExecutor>,
    finisher: Finisher,
}

impl<T: Send + 'static> TypedJob<T> {
    pub(crate) fn new(
        core: Arc<RequestCore>,
        parser: Arc<dyn ResponseParser<T>>,
        listener: Listener<T>,
        executor: Arc<dyn CallbackExecutor>,
        finisher: Finisher,
    ) -> Self {
        Self {
            core,
            parser,
            listener,
            executor,
            finisher,
        }
    }

    /// Run the parser; a panic becomes a parse error
    fn parse(&self, response: &NetworkResponse) -> Result<T, RequestError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.parser.parse(response))).unwrap_or_else(
            |_| {
                error!("Response parser panicked for request {}", self.core.id());
                Err(RequestError::parse("response parser panicked"))
            },
        )
    }

    fn emit(&self, event: Event<T>) {
        let listener = Arc::clone(&self.listener);
        self.executor.execute(Box::new(move || listener(event)));
    }

    /// Post the terminal event followed by `Finish`; caller holds the terminal claim
    fn finish(&self, terminal: Option<Event<T>>, outcome: Outcome) {
        if let Some(event) = terminal {
            self.emit(event);
        }
        self.emit(Event::Finish);
        (self.finisher)(&self.core, outcome);
    }

    fn finish_cancelled(&self) {
        debug!("Request {} cancelled", self.core.id());
        self.finish(Some(Event::Cancel), Outcome::Cancelled);
    }
}

impl<T: Send + 'static> Job for TypedJob<T> {
    fn core(&self) -> &Arc<RequestCore> {
        &self.core
    }

    fn post(&self, event: Lifecycle) {
        if !self.core.is_finished() {
            self.emit(event.into());
        }
    }

    fn deliver_response(
        &self,
        response: &NetworkResponse,
        source: ResponseSource,
    ) -> Result<(), RequestError> {
        if source == ResponseSource::StaleCache {
            let value = self.parse(response)?;
            if !self.core.is_finished() {
                self.emit(Event::UsedCache);
                self.emit(Event::Intermediate(value));
                self.core.mark_response_delivered();
            }
            return Ok(());
        }

        if self.core.is_cancelled() {
            self.deliver_cancel();
            return Ok(());
        }

        let value = self.parse(response)?;
        if !self.core.claim_terminal() {
            return Ok(());
        }
        if source == ResponseSource::Cache {
            self.emit(Event::UsedCache);
        }
        self.core.mark_response_delivered();
        self.finish(Some(Event::Success(value)), Outcome::Success);
        Ok(())
    }

    fn deliver_error(&self, error: RequestError) {
        if !self.core.claim_terminal() {
            return;
        }
        if self.core.is_cancelled() {
            self.finish_cancelled();
        } else {
            debug!("Request {} failed: {}", self.core.id(), error);
            let kind = error.kind();
            self.finish(Some(Event::Error(error)), Outcome::Failed(kind));
        }
    }

    fn deliver_cancel(&self) {
        if self.core.claim_terminal() {
            self.finish_cancelled();
        }
    }

    fn deliver_finish(&self) {
        if !self.core.claim_terminal() {
            return;
        }
        if self.core.is_cancelled() {
            self.finish_cancelled();
        } else {
            self.finish(None, Outcome::NotModified);
        }
    }
}
