//! Cache triage
//!
//! For each request, in priority order:
//!
//! 1. cancelled: `Cancel`, `Finish`, nothing else
//! 2. not cacheable, missing or hard-expired entry: on to the network stage
//! 3. fresh entry: `UsedCache`, `Success`, `Finish`
//! 4. stale entry: `UsedCache`, `Intermediate`, then a refresh through the
//!    network stage carrying conditional headers
//!
//! An entry that no longer parses is evicted and treated as a miss.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::delivery::job::ResponseSource;
use crate::app::delivery::Lifecycle;
use crate::errors::RequestError;

use super::{DispatchContext, SharedJob};

pub struct CacheDispatcher {
    context: Arc<DispatchContext>,
}

impl CacheDispatcher {
    pub(crate) fn new(context: Arc<DispatchContext>) -> Self {
        Self { context }
    }

    /// Serve the cache queue until it is closed
    pub fn run(self) {
        info!("Cache dispatcher started");
        if let Err(e) = self.context.cache.initialize() {
            warn!("Cache initialization failed, continuing: {}", e);
        }
        while let Some(job) = self.context.cache_queue.pop() {
            self.process(job);
        }
        info!("Cache dispatcher stopped");
    }

    fn process(&self, job: SharedJob) {
        let context = &self.context;
        let core = Arc::clone(job.core());

        if core.is_cancelled() {
            debug!("Request {} cancelled before cache lookup", core.id());
            job.deliver_cancel();
            return;
        }
        job.post(Lifecycle::Start);

        if !core.should_cache() {
            context.forward_to_network(job);
            return;
        }

        let entry = match context.cache.get(core.cache_key()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}: {}", core.cache_key(), e);
                None
            }
        };
        let now = Utc::now();
        let entry = match entry {
            Some(entry) if !entry.is_expired(now) => entry,
            Some(_) => {
                debug!("Cache entry for {} expired", core.cache_key());
                context.stats.record_cache_miss();
                context.forward_to_network(job);
                return;
            }
            None => {
                debug!("Cache miss for {}", core.cache_key());
                context.stats.record_cache_miss();
                context.forward_to_network(job);
                return;
            }
        };

        let response = entry.to_response();
        if !entry.refresh_needed(now) {
            match job.deliver_response(&response, ResponseSource::Cache) {
                Ok(()) => {
                    debug!("Cache hit for {}", core.cache_key());
                    context.stats.record_cache_hit();
                }
                Err(e) => self.evict_and_forward(job, e),
            }
            return;
        }

        match job.deliver_response(&response, ResponseSource::StaleCache) {
            Ok(()) => {
                debug!("Stale cache hit for {}, refreshing", core.cache_key());
                context.stats.record_stale_hit();
                core.set_refresh_entry(Arc::new(entry));
                context.forward_to_network(job);
            }
            Err(e) => self.evict_and_forward(job, e),
        }
    }

    fn evict_and_forward(&self, job: SharedJob, error: RequestError) {
        let key = job.core().cache_key().to_string();
        warn!("Cached entry for {} failed to parse, evicting: {}", key, error);
        if let Err(e) = self.context.cache.remove(&key) {
            warn!("Failed to evict cache entry {}: {}", key, e);
        }
        self.context.stats.record_cache_miss();
        self.context.forward_to_network(job);
    }
}
