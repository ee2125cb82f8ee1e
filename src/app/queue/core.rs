//! Request queue
//!
//! Owns the dispatcher threads and the bookkeeping of every request that has
//! been submitted but not yet finished.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::app::cache::{CacheStore, MemoryCache};
use crate::app::delivery::job::{Finisher, Outcome, TypedJob};
use crate::app::delivery::{CallbackExecutor, ThreadExecutor};
use crate::app::dispatcher::{CacheDispatcher, DispatchContext, NetworkDispatcher, SharedJob};
use crate::app::network::NetworkExecutor;
use crate::app::request::{Request, RequestCore, RequestHandle};
use crate::app::sync::lock;
use crate::app::transport::Transport;
use crate::constants::queue::THREAD_NAME_PREFIX;
use crate::errors::{QueueError, QueueResult};

use super::config::QueueConfig;
use super::stats::{QueueStats, QueueStatsSnapshot};

/// Lifecycle state of the dispatcher threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Created, dispatchers not started; submissions accumulate
    Created,
    /// Dispatchers running
    Running,
    /// `stop` is joining the dispatchers and cancelling what is left
    Stopping,
    /// Stopped; submissions are cancelled until the next start
    Stopped,
}

#[derive(Default)]
struct InFlight {
    jobs: Mutex<HashMap<u64, SharedJob>>,
}

impl InFlight {
    fn snapshot(&self) -> Vec<SharedJob> {
        lock(&self.jobs).values().cloned().collect()
    }

    fn len(&self) -> usize {
        lock(&self.jobs).len()
    }
}

struct Workers {
    state: QueueState,
    handles: Vec<(String, JoinHandle<()>)>,
}

/// Prioritized, cache-aware request dispatcher
///
/// Requests flow from [`submit`](Self::submit) through the cache dispatcher
/// to the network dispatchers; every request receives its events on the
/// configured [`CallbackExecutor`].
pub struct RequestQueue {
    config: QueueConfig,
    context: Arc<DispatchContext>,
    in_flight: Arc<InFlight>,
    stats: Arc<QueueStats>,
    delivery: Arc<dyn CallbackExecutor>,
    finisher: Finisher,
    sequence: AtomicU64,
    workers: Mutex<Workers>,
}

impl RequestQueue {
    pub fn new(
        config: QueueConfig,
        cache: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
        delivery: Arc<dyn CallbackExecutor>,
    ) -> QueueResult<Self> {
        config.validate()?;

        let stats = Arc::new(QueueStats::new());
        let executor = NetworkExecutor::new(
            transport,
            config.default_charset.clone(),
            config.slow_request_threshold,
        );
        let context = Arc::new(DispatchContext::new(cache, executor, Arc::clone(&stats)));

        let in_flight = Arc::new(InFlight::default());
        let registry = Arc::downgrade(&in_flight);
        let outcome_stats = Arc::clone(&stats);
        let finisher: Finisher = Arc::new(move |core: &RequestCore, outcome: Outcome| {
            outcome_stats.record_outcome(outcome);
            if let Some(registry) = registry.upgrade() {
                lock(&registry.jobs).remove(&core.id());
            }
        });

        Ok(Self {
            config,
            context,
            in_flight,
            stats,
            delivery,
            finisher,
            sequence: AtomicU64::new(0),
            workers: Mutex::new(Workers {
                state: QueueState::Created,
                handles: Vec::new(),
            }),
        })
    }

    pub fn builder() -> RequestQueueBuilder {
        RequestQueueBuilder::new()
    }

    /// Queue a request for dispatch
    ///
    /// Requests may be submitted before [`start`](Self::start); they are
    /// dispatched once the queue runs. After [`stop`](Self::stop) they are
    /// cancelled immediately.
    pub fn submit<T: Send + 'static>(&self, request: Request<T>) -> RequestHandle {
        let (core, parser, listener) = request.into_parts();
        core.install_default_retry_policy(&self.config.retry);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        core.assign_sequence(sequence);

        let job: SharedJob = Arc::new(TypedJob::new(
            Arc::clone(&core),
            parser,
            listener,
            Arc::clone(&self.delivery),
            Arc::clone(&self.finisher),
        ));
        lock(&self.in_flight.jobs).insert(core.id(), Arc::clone(&job));
        self.stats.record_submitted();
        debug!(
            "Submitted request {}: {} {} (priority {}, sequence {})",
            core.id(),
            core.method(),
            core.url(),
            core.priority(),
            sequence
        );

        if let Err(job) = self.context.cache_queue.push(job, core.priority(), sequence) {
            warn!("Request queue is stopped, cancelling request {}", core.id());
            job.core().cancel();
            job.deliver_cancel();
        }
        RequestHandle::new(core)
    }

    /// Cancel every unfinished request carrying `tag`
    pub fn cancel_all(&self, tag: &str) -> usize {
        self.cancel_matching(|core| core.tag() == Some(tag))
    }

    /// Cancel every unfinished request matching `predicate`
    pub fn cancel_matching(&self, predicate: impl Fn(&RequestCore) -> bool) -> usize {
        let mut cancelled = 0;
        for job in self.in_flight.snapshot() {
            if predicate(job.core()) {
                job.core().cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!("Marked {} request(s) cancelled", cancelled);
        }
        cancelled
    }

    /// Start the cache dispatcher and the network dispatchers; idempotent
    pub fn start(&self) -> QueueResult<()> {
        let mut workers = lock(&self.workers);
        match workers.state {
            QueueState::Running => {
                debug!("Request queue already running");
                return Ok(());
            }
            QueueState::Stopping => return Err(QueueError::ShuttingDown),
            QueueState::Created | QueueState::Stopped => {}
        }

        self.context.cache_queue.reopen();
        self.context.network_queue.reopen();
        info!(
            "Starting request queue with {} network dispatchers",
            self.config.network_workers
        );

        let mut handles = Vec::with_capacity(self.config.network_workers + 1);
        let name = format!("{}-cache", THREAD_NAME_PREFIX);
        let context = Arc::clone(&self.context);
        match spawn_worker(&name, move || CacheDispatcher::new(context).run()) {
            Ok(handle) => handles.push((name, handle)),
            Err(e) => return Err(self.abort_start(handles, e)),
        }

        for id in 0..self.config.network_workers {
            let name = format!("{}-network-{}", THREAD_NAME_PREFIX, id);
            let context = Arc::clone(&self.context);
            match spawn_worker(&name, move || NetworkDispatcher::new(id, context).run()) {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => return Err(self.abort_start(handles, e)),
            }
        }

        workers.handles = handles;
        workers.state = QueueState::Running;
        info!("Request queue started");
        Ok(())
    }

    fn abort_start(&self, handles: Vec<(String, JoinHandle<()>)>, error: QueueError) -> QueueError {
        self.context.cache_queue.close();
        self.context.network_queue.close();
        for (_, handle) in handles {
            let _ = handle.join();
        }
        self.context.cache_queue.reopen();
        self.context.network_queue.reopen();
        error
    }

    /// Stop the dispatchers and cancel everything still pending
    ///
    /// Exchanges already running complete first. Every request that has not
    /// finished receives `Cancel` then `Finish`. The lifecycle lock is not held
    /// while joining or cancelling, so listeners may query the queue.
    pub fn stop(&self) -> QueueResult<()> {
        let handles = {
            let mut workers = lock(&self.workers);
            if matches!(workers.state, QueueState::Stopping | QueueState::Stopped) {
                return Ok(());
            }
            workers.state = QueueState::Stopping;
            std::mem::take(&mut workers.handles)
        };
        info!("Stopping request queue");

        self.context.cache_queue.close();
        self.context.network_queue.close();

        let mut panicked = Vec::new();
        for (name, handle) in handles {
            if handle.join().is_err() {
                debug!("Dispatcher {} panicked", name);
                panicked.push(name);
            }
        }
        if !panicked.is_empty() {
            warn!(
                "{} dispatcher(s) terminated abnormally during shutdown",
                panicked.len()
            );
        }

        self.context.cache_queue.drain();
        self.context.network_queue.drain();
        self.context.waiting.drain();
        let pending = self.in_flight.snapshot();
        for job in &pending {
            job.core().cancel();
            job.deliver_cancel();
        }

        lock(&self.workers).state = QueueState::Stopped;
        info!(
            "Request queue stopped ({} pending request(s) cancelled)",
            pending.len()
        );

        match panicked.into_iter().next() {
            Some(name) => Err(QueueError::WorkerPanic { name }),
            None => Ok(()),
        }
    }

    pub fn state(&self) -> QueueState {
        lock(&self.workers).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == QueueState::Running
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        self.stats.snapshot(self.in_flight.len())
    }

    /// Number of submitted requests that have not finished
    pub fn pending(&self) -> usize {
        self.in_flight.len()
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.context.cache
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Request queue shutdown on drop failed: {}", e);
        }
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

fn spawn_worker<F>(name: &str, body: F) -> QueueResult<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|source| QueueError::SpawnFailed {
            name: name.to_string(),
            source,
        })
}

/// Builder for [`RequestQueue`]
#[derive(Default)]
pub struct RequestQueueBuilder {
    config: Option<QueueConfig>,
    cache: Option<Arc<dyn CacheStore>>,
    transport: Option<Arc<dyn Transport>>,
    delivery: Option<Arc<dyn CallbackExecutor>>,
}

impl RequestQueueBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Cache store; defaults to an in-memory cache
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Callback executor; defaults to a dedicated delivery thread
    pub fn delivery(mut self, delivery: Arc<dyn CallbackExecutor>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Build the queue (validates that a transport is set)
    pub fn build(self) -> QueueResult<RequestQueue> {
        let transport = self.transport.ok_or_else(|| QueueError::InvalidConfig {
            reason: "a transport is required".to_string(),
        })?;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCache::new()) as Arc<dyn CacheStore>);
        let delivery = match self.delivery {
            Some(delivery) => delivery,
            None => {
                let name = format!("{}-delivery", THREAD_NAME_PREFIX);
                let executor =
                    ThreadExecutor::new(name.clone()).map_err(|source| QueueError::SpawnFailed {
                        name,
                        source,
                    })?;
                Arc::new(executor)
            }
        };

        RequestQueue::new(self.config.unwrap_or_default(), cache, transport, delivery)
    }
}
