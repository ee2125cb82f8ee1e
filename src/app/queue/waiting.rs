//! In-flight fetch groups keyed by cache key
//!
//! While a cacheable request is fetching, later requests with the same cache
//! key park here instead of issuing their own exchange. The presence of a key
//! means a fetch is in flight; the leader itself is not stored in the group.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::app::sync::lock;

/// Result of [`WaitingRequests::join_or_lead`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No fetch in flight; the caller must issue one
    Lead,
    /// Parked behind an in-flight fetch
    Joined { waiting: usize },
}

#[derive(Debug)]
pub struct WaitingRequests<J> {
    groups: Mutex<HashMap<String, Vec<J>>>,
}

impl<J> WaitingRequests<J> {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Open a group for `key`, or park `job` in the existing one
    ///
    /// The job is handed back with [`Admission::Lead`] so the caller can
    /// dispatch it.
    pub fn join_or_lead(&self, key: &str, job: J) -> (Admission, Option<J>) {
        let mut groups = lock(&self.groups);
        match groups.get_mut(key) {
            Some(waiters) => {
                waiters.push(job);
                (
                    Admission::Joined {
                        waiting: waiters.len(),
                    },
                    None,
                )
            }
            None => {
                groups.insert(key.to_string(), Vec::new());
                (Admission::Lead, Some(job))
            }
        }
    }

    /// Close the group for `key` and return its waiters
    pub fn take(&self, key: &str) -> Vec<J> {
        lock(&self.groups).remove(key).unwrap_or_default()
    }

    /// Pick a replacement leader after the current one dropped out
    ///
    /// Waiters failing `is_live` are removed and returned alongside. When no
    /// live waiter remains the group is closed.
    pub fn promote(&self, key: &str, is_live: impl Fn(&J) -> bool) -> (Option<J>, Vec<J>) {
        let mut groups = lock(&self.groups);
        let Some(waiters) = groups.get_mut(key) else {
            return (None, Vec::new());
        };

        let mut dropped = Vec::new();
        let mut leader = None;
        while !waiters.is_empty() {
            let candidate = waiters.remove(0);
            if is_live(&candidate) {
                leader = Some(candidate);
                break;
            }
            dropped.push(candidate);
        }

        if leader.is_none() {
            groups.remove(key);
        }
        (leader, dropped)
    }

    /// Close every group and return all waiters
    pub fn drain(&self) -> Vec<J> {
        lock(&self.groups)
            .drain()
            .flat_map(|(_, waiters)| waiters)
            .collect()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.groups).contains_key(key)
    }

    pub fn waiting_for(&self, key: &str) -> usize {
        lock(&self.groups).get(key).map_or(0, Vec::len)
    }

    /// Number of keys with a fetch in flight
    pub fn groups(&self) -> usize {
        lock(&self.groups).len()
    }
}

impl<J> Default for WaitingRequests<J> {
    fn default() -> Self {
        Self::new()
    }
}
