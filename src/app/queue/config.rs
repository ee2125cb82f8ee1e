//! Request queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::retry::RetryConfig;
use crate::constants::{http, queue};
use crate::errors::{QueueError, QueueResult};

/// Runtime configuration of a [`RequestQueue`](super::RequestQueue)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Network dispatcher threads
    pub network_workers: usize,
    /// Charset assumed when a response declares none
    pub default_charset: String,
    /// Defaults for requests without their own retry policy
    pub retry: RetryConfig,
    /// Exchanges slower than this are logged at info level
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        ConfigPresets::production()
    }
}

impl QueueConfig {
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::new()
    }

    pub fn validate(&self) -> QueueResult<()> {
        if self.network_workers == 0 {
            return Err(QueueError::InvalidConfig {
                reason: "network_workers must be greater than 0".to_string(),
            });
        }
        if self.default_charset.trim().is_empty() {
            return Err(QueueError::InvalidConfig {
                reason: "default_charset must not be empty".to_string(),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(QueueError::InvalidConfig {
                reason: format!(
                    "backoff_multiplier must be a non-negative number, got {}",
                    multiplier
                ),
            });
        }
        if self.retry.initial_timeout.is_zero() {
            return Err(QueueError::InvalidConfig {
                reason: "initial_timeout must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for [`QueueConfig`]
#[derive(Debug, Clone, Default)]
pub struct QueueConfigBuilder {
    network_workers: Option<usize>,
    default_charset: Option<String>,
    initial_timeout: Option<Duration>,
    max_retries: Option<u32>,
    backoff_multiplier: Option<f32>,
    slow_request_threshold: Option<Duration>,
}

impl QueueConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of network dispatcher threads
    pub fn network_workers(mut self, workers: usize) -> Self {
        self.network_workers = Some(workers);
        self
    }

    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = Some(charset.into());
        self
    }

    /// Set the default initial per-attempt timeout
    pub fn initial_timeout(mut self, timeout: Duration) -> Self {
        self.initial_timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f32) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn slow_request_threshold(mut self, threshold: Duration) -> Self {
        self.slow_request_threshold = Some(threshold);
        self
    }

    pub fn build(self) -> QueueConfig {
        let retry_defaults = RetryConfig::default();
        QueueConfig {
            network_workers: self
                .network_workers
                .unwrap_or(queue::DEFAULT_NETWORK_WORKERS),
            default_charset: self
                .default_charset
                .unwrap_or_else(|| http::DEFAULT_CHARSET.to_string()),
            retry: RetryConfig {
                initial_timeout: self
                    .initial_timeout
                    .unwrap_or(retry_defaults.initial_timeout),
                max_retries: self.max_retries.unwrap_or(retry_defaults.max_retries),
                backoff_multiplier: self
                    .backoff_multiplier
                    .unwrap_or(retry_defaults.backoff_multiplier),
            },
            slow_request_threshold: self
                .slow_request_threshold
                .unwrap_or(http::SLOW_REQUEST_THRESHOLD),
        }
    }
}

/// Configuration presets for different use cases
pub struct ConfigPresets;

impl ConfigPresets {
    /// Default engine settings
    pub fn production() -> QueueConfig {
        QueueConfigBuilder::new().build()
    }

    /// More verbose slow-request logging, single retry budget kept
    pub fn development() -> QueueConfig {
        QueueConfigBuilder::new()
            .network_workers(2)
            .slow_request_threshold(Duration::from_millis(500))
            .build()
    }

    /// Small, fast-failing settings for tests
    pub fn testing() -> QueueConfig {
        QueueConfigBuilder::new()
            .network_workers(2)
            .initial_timeout(Duration::from_millis(200))
            .max_retries(0)
            .build()
    }
}
