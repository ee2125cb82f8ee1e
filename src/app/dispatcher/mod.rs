//! Cache and network dispatchers
//!
//! One cache dispatcher thread triages every submitted request against the
//! cache; a pool of network dispatcher threads performs the exchanges. Both
//! share a [`DispatchContext`] owned by the request queue.

pub mod cache;
pub mod network;

use std::sync::Arc;

use tracing::debug;

use crate::app::cache::CacheStore;
use crate::app::delivery::job::Job;
use crate::app::network::NetworkExecutor;
use crate::app::queue::priority::PriorityQueue;
use crate::app::queue::stats::QueueStats;
use crate::app::queue::waiting::{Admission, WaitingRequests};

pub use self::cache::CacheDispatcher;
pub use self::network::NetworkDispatcher;

pub(crate) type SharedJob = Arc<dyn Job>;

/// State shared by the dispatcher threads of one queue
pub(crate) struct DispatchContext {
    pub cache_queue: PriorityQueue<SharedJob>,
    pub network_queue: PriorityQueue<SharedJob>,
    pub waiting: WaitingRequests<SharedJob>,
    pub cache: Arc<dyn CacheStore>,
    pub executor: NetworkExecutor,
    pub stats: Arc<QueueStats>,
}

impl DispatchContext {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        executor: NetworkExecutor,
        stats: Arc<QueueStats>,
    ) -> Self {
        Self {
            cache_queue: PriorityQueue::new(),
            network_queue: PriorityQueue::new(),
            waiting: WaitingRequests::new(),
            cache,
            executor,
            stats,
        }
    }

    /// Hand a request to the network stage
    ///
    /// Cacheable requests pass the dedup gate: only the first request per
    /// cache key reaches the network queue, later ones wait for its result.
    pub fn forward_to_network(&self, job: SharedJob) {
        let core = Arc::clone(job.core());
        if !core.should_cache() {
            self.enqueue_network(job);
            return;
        }

        match self.waiting.join_or_lead(core.cache_key(), job) {
            (Admission::Lead, Some(job)) => self.enqueue_network(job),
            (Admission::Joined { waiting }, _) => {
                self.stats.record_deduplicated();
                debug!(
                    "Request {} joined in-flight fetch for {} ({} waiting)",
                    core.id(),
                    core.cache_key(),
                    waiting
                );
            }
            (Admission::Lead, None) => {}
        }
    }

    pub fn enqueue_network(&self, job: SharedJob) {
        let priority = job.core().priority();
        let sequence = job.core().sequence();
        if let Err(job) = self.network_queue.push(job, priority, sequence) {
            debug!("Network queue closed, cancelling request {}", job.core().id());
            job.core().cancel();
            job.deliver_cancel();
        }
    }

    /// Replace a group leader that dropped out before its exchange
    pub fn promote_waiter(&self, job: &SharedJob) {
        let core = job.core();
        if !core.should_cache() {
            return;
        }
        let (leader, dropped) = self
            .waiting
            .promote(core.cache_key(), |waiter| !waiter.core().is_cancelled());
        for waiter in dropped {
            waiter.deliver_cancel();
        }
        if let Some(leader) = leader {
            debug!(
                "Request {} takes over fetch for {} from cancelled request {}",
                leader.core().id(),
                core.cache_key(),
                core.id()
            );
            self.enqueue_network(leader);
        }
    }
}
