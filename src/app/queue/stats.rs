//! Queue statistics

use std::sync::atomic::{AtomicU64, Ordering};

use crate::app::delivery::job::Outcome;

/// Lock-free counters updated by the dispatchers
#[derive(Debug, Default)]
pub struct QueueStats {
    submitted: AtomicU64,
    cache_hits: AtomicU64,
    stale_hits: AtomicU64,
    cache_misses: AtomicU64,
    network_exchanges: AtomicU64,
    deduplicated: AtomicU64,
    succeeded: AtomicU64,
    not_modified: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl QueueStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_submitted(&self) {
        bump(&self.submitted);
    }

    pub(crate) fn record_cache_hit(&self) {
        bump(&self.cache_hits);
    }

    pub(crate) fn record_stale_hit(&self) {
        bump(&self.stale_hits);
    }

    pub(crate) fn record_cache_miss(&self) {
        bump(&self.cache_misses);
    }

    pub(crate) fn record_network_exchange(&self) {
        bump(&self.network_exchanges);
    }

    pub(crate) fn record_deduplicated(&self) {
        bump(&self.deduplicated);
    }

    pub(crate) fn record_outcome(&self, outcome: Outcome) {
        match outcome {
            Outcome::Success => bump(&self.succeeded),
            Outcome::NotModified => bump(&self.not_modified),
            Outcome::Failed(_) => bump(&self.failed),
            Outcome::Cancelled => bump(&self.cancelled),
        }
    }

    pub fn snapshot(&self, in_flight: usize) -> QueueStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        QueueStatsSnapshot {
            submitted: load(&self.submitted),
            cache_hits: load(&self.cache_hits),
            stale_hits: load(&self.stale_hits),
            cache_misses: load(&self.cache_misses),
            network_exchanges: load(&self.network_exchanges),
            deduplicated: load(&self.deduplicated),
            succeeded: load(&self.succeeded),
            not_modified: load(&self.not_modified),
            failed: load(&self.failed),
            cancelled: load(&self.cancelled),
            in_flight,
        }
    }
}

/// Point-in-time copy of [`QueueStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStatsSnapshot {
    pub submitted: u64,
    pub cache_hits: u64,
    pub stale_hits: u64,
    pub cache_misses: u64,
    pub network_exchanges: u64,
    pub deduplicated: u64,
    pub succeeded: u64,
    /// Requests that ended with `Finish` only, after a stale copy and a `304`
    pub not_modified: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub in_flight: usize,
}

impl QueueStatsSnapshot {
    pub fn finished(&self) -> u64 {
        self.succeeded + self.not_modified + self.failed + self.cancelled
    }

    /// Percentage of finished, non-cancelled requests that did not fail
    pub fn success_rate(&self) -> f64 {
        let attempted = self.succeeded + self.not_modified + self.failed;
        if attempted == 0 {
            0.0
        } else {
            ((self.succeeded + self.not_modified) as f64 / attempted as f64) * 100.0
        }
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        format!(
            "{} submitted, {} ok, {} failed, {} cancelled | cache {} hit / {} stale / {} miss | {} exchanges, {} deduplicated",
            self.submitted,
            self.succeeded + self.not_modified,
            self.failed,
            self.cancelled,
            self.cache_hits,
            self.stale_hits,
            self.cache_misses,
            self.network_exchanges,
            self.deduplicated
        )
    }
}
