//! Per-request retry policy
//!
//! A policy is owned by its request for the request's whole lifetime. The
//! network executor hands every retryable failure to [`RetryPolicy::retry`];
//! the policy either escalates its state and lets the executor loop again, or
//! gives the error back to end the loop.

use std::fmt::Debug;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::retry;
use crate::errors::RequestError;

/// Stateful retry decision for one request
pub trait RetryPolicy: Send + Debug {
    /// Timeout to apply to the next attempt
    fn current_timeout(&self) -> Duration;

    /// Retries performed so far
    fn current_retry_count(&self) -> u32;

    /// Prepare for another attempt, or return `error` when attempts are exhausted
    fn retry(&mut self, error: RequestError) -> Result<(), RequestError>;
}

/// Retry configuration shared by queue and request defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Timeout of the first attempt
    #[serde(with = "humantime_serde")]
    pub initial_timeout: Duration,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Timeout growth factor per retry
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_timeout: retry::DEFAULT_TIMEOUT,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            backoff_multiplier: retry::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryConfig {
    /// Create a fresh policy from this configuration
    pub fn policy(&self) -> DefaultRetryPolicy {
        DefaultRetryPolicy::new(
            self.initial_timeout,
            self.max_retries,
            self.backoff_multiplier,
        )
    }
}

/// Timeout-escalating policy with a fixed retry budget
///
/// Each retry adds `timeout * backoff_multiplier` to the timeout, saturating
/// at [`retry::MAX_TIMEOUT`]. With `max_retries = k` the transport sees at
/// most `k + 1` attempts.
#[derive(Debug, Clone)]
pub struct DefaultRetryPolicy {
    current_timeout: Duration,
    current_retry_count: u32,
    max_retries: u32,
    backoff_multiplier: f32,
}

impl DefaultRetryPolicy {
    pub fn new(initial_timeout: Duration, max_retries: u32, backoff_multiplier: f32) -> Self {
        Self {
            current_timeout: initial_timeout,
            current_retry_count: 0,
            max_retries,
            backoff_multiplier: if backoff_multiplier.is_finite() {
                backoff_multiplier.max(0.0)
            } else {
                0.0
            },
        }
    }

    pub fn backoff_multiplier(&self) -> f32 {
        self.backoff_multiplier
    }

    pub fn has_attempt_remaining(&self) -> bool {
        self.current_retry_count <= self.max_retries
    }
}

impl Default for DefaultRetryPolicy {
    fn default() -> Self {
        RetryConfig::default().policy()
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn current_timeout(&self) -> Duration {
        self.current_timeout
    }

    fn current_retry_count(&self) -> u32 {
        self.current_retry_count
    }

    fn retry(&mut self, error: RequestError) -> Result<(), RequestError> {
        self.current_retry_count = self.current_retry_count.saturating_add(1);
        let growth = Duration::try_from_secs_f64(
            self.current_timeout.as_secs_f64() * f64::from(self.backoff_multiplier),
        )
        .unwrap_or(retry::MAX_TIMEOUT);
        self.current_timeout = self
            .current_timeout
            .saturating_add(growth)
            .min(retry::MAX_TIMEOUT);

        if self.has_attempt_remaining() {
            Ok(())
        } else {
            Err(error)
        }
    }
}
