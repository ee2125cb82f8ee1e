//! Network stage
//!
//! Each network dispatcher takes requests from the network queue, runs the
//! exchange and fans the result out to every request waiting on the same
//! cache key. Successful cacheable responses are written to the cache before
//! anyone is notified.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::cache::{entry_with_ttl, parse_cache_headers, CacheEntry};
use crate::app::delivery::job::ResponseSource;
use crate::app::network::NetworkResponse;
use crate::app::request::RequestCore;
use crate::errors::RequestError;

use super::{DispatchContext, SharedJob};

pub struct NetworkDispatcher {
    id: usize,
    context: Arc<DispatchContext>,
}

impl NetworkDispatcher {
    pub(crate) fn new(id: usize, context: Arc<DispatchContext>) -> Self {
        Self { id, context }
    }

    /// Serve the network queue until it is closed
    pub fn run(self) {
        info!("Network dispatcher {} started", self.id);
        while let Some(job) = self.context.network_queue.pop() {
            self.process(job);
        }
        info!("Network dispatcher {} stopped", self.id);
    }

    fn process(&self, job: SharedJob) {
        let context = &self.context;
        let core = Arc::clone(job.core());

        if core.is_cancelled() {
            debug!(
                "Network dispatcher {}: request {} cancelled before exchange",
                self.id,
                core.id()
            );
            job.deliver_cancel();
            context.promote_waiter(&job);
            return;
        }

        context.stats.record_network_exchange();
        match context.executor.perform(job.as_ref()) {
            Ok(Some(response)) => self.complete(job, response),
            Ok(None) => {
                job.deliver_cancel();
                context.promote_waiter(&job);
            }
            Err(error) => self.fail(job, error),
        }
    }

    fn complete(&self, job: SharedJob, response: NetworkResponse) {
        let core = Arc::clone(job.core());
        if core.should_cache() {
            self.store(&core, &response);
        }

        let members = self.take_group(&core);
        debug!(
            "Network dispatcher {}: {} -> {} for {} request(s)",
            self.id,
            core.effective_url(),
            response.status,
            members.len() + 1
        );
        for member in std::iter::once(job).chain(members) {
            Self::deliver(&member, &response);
        }
    }

    fn deliver(member: &SharedJob, response: &NetworkResponse) {
        if response.not_modified && member.core().response_delivered() {
            member.deliver_finish();
            return;
        }
        if let Err(error) = member.deliver_response(response, ResponseSource::Network) {
            member.deliver_error(error);
        }
    }

    fn fail(&self, job: SharedJob, error: RequestError) {
        let core = Arc::clone(job.core());
        debug!(
            "Network dispatcher {}: {} failed: {}",
            self.id,
            core.effective_url(),
            error
        );
        let members = self.take_group(&core);
        for member in std::iter::once(job).chain(members) {
            member.deliver_error(error.clone());
        }
    }

    fn take_group(&self, core: &RequestCore) -> Vec<SharedJob> {
        if core.should_cache() {
            self.context.waiting.take(core.cache_key())
        } else {
            Vec::new()
        }
    }

    fn store(&self, core: &RequestCore, response: &NetworkResponse) {
        let now = Utc::now();
        if response.not_modified && core.refresh_entry().is_none() {
            return;
        }
        let entry: Option<CacheEntry> = match core.cache_ttl() {
            Some(ttl) => Some(entry_with_ttl(response, ttl, now)),
            None => parse_cache_headers(response, now),
        };
        let Some(entry) = entry else {
            debug!("Response for {} is not cacheable", core.cache_key());
            return;
        };
        if let Err(e) = self.context.cache.put(core.cache_key(), entry) {
            warn!("Failed to cache response for {}: {}", core.cache_key(), e);
        }
    }
}
