//! Configuration management for netqueue
//!
//! The TOML file mirrors the runtime configuration types section by section
//! and is converted with [`AppConfig::to_runtime_config`]. Every key is
//! optional; missing keys keep the engine defaults.
//!
//! ```toml
//! [queue]
//! network_workers = 4
//! default_charset = "UTF-8"
//! slow_request_threshold = "3s"
//!
//! [retry]
//! initial_timeout = "2500ms"
//! max_retries = 1
//! backoff_multiplier = 1.0
//!
//! [cache]
//! max_size_bytes = 10485760
//!
//! [transport]
//! connect_timeout = "15s"
//!
//! [logging]
//! level = "info"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::app::cache::DiskCacheConfig;
use crate::app::queue::QueueConfig;
use crate::app::retry::RetryConfig;
use crate::app::transport::TransportConfig;
use crate::constants::{cache, http, queue, retry};
use crate::errors::{ConfigError, ConfigResult};

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfigToml,
    pub retry: RetryConfigToml,
    pub cache: CacheConfigToml,
    pub transport: TransportConfigToml,
    pub logging: LoggingConfig,
}

/// `[queue]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfigToml {
    pub network_workers: usize,
    pub default_charset: String,
    #[serde(with = "humantime_serde")]
    pub slow_request_threshold: Duration,
}

impl Default for QueueConfigToml {
    fn default() -> Self {
        Self {
            network_workers: queue::DEFAULT_NETWORK_WORKERS,
            default_charset: http::DEFAULT_CHARSET.to_string(),
            slow_request_threshold: http::SLOW_REQUEST_THRESHOLD,
        }
    }
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfigToml {
    #[serde(with = "humantime_serde")]
    pub initial_timeout: Duration,
    pub max_retries: u32,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfigToml {
    fn default() -> Self {
        Self {
            initial_timeout: retry::DEFAULT_TIMEOUT,
            max_retries: retry::DEFAULT_MAX_RETRIES,
            backoff_multiplier: retry::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

/// `[cache]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigToml {
    /// Cache directory; defaults to the OS cache directory
    pub root: Option<PathBuf>,
    pub max_size_bytes: u64,
}

impl Default for CacheConfigToml {
    fn default() -> Self {
        Self {
            root: None,
            max_size_bytes: cache::DEFAULT_MAX_SIZE_BYTES,
        }
    }
}

/// `[transport]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfigToml {
    pub user_agent: String,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub cookie_store: bool,
}

impl Default for TransportConfigToml {
    fn default() -> Self {
        Self {
            user_agent: http::USER_AGENT.to_string(),
            connect_timeout: http::CONNECT_TIMEOUT,
            cookie_store: false,
        }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when no CLI verbosity flag is given
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl AppConfig {
    /// Convert TOML-friendly configuration to runtime configuration
    pub fn to_runtime_config(&self) -> (QueueConfig, DiskCacheConfig, TransportConfig) {
        (
            self.queue_config(),
            self.cache.to_runtime_config(),
            self.transport.to_runtime_config(),
        )
    }

    fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            network_workers: self.queue.network_workers,
            default_charset: self.queue.default_charset.clone(),
            retry: self.retry.to_runtime_config(),
            slow_request_threshold: self.queue.slow_request_threshold,
        }
    }

    /// Load configuration from an explicit path or the standard locations
    ///
    /// An explicit path must exist; when none is given and no file is found
    /// the defaults are returned.
    pub fn load(config_file_override: Option<&Path>) -> ConfigResult<Self> {
        let path = match config_file_override {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::find_config_file(),
        };

        match path {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check the loaded values the engine would otherwise reject late
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.network_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "queue.network_workers".to_string(),
                value: "0".to_string(),
                reason: "At least one network worker is required".to_string(),
            });
        }
        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.backoff_multiplier".to_string(),
                value: multiplier.to_string(),
                reason: "Must be a non-negative number".to_string(),
            });
        }
        Ok(())
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from("./netqueue.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            search_paths.push(config_dir.join("netqueue").join("config.toml"));
        }

        let found = search_paths.into_iter().find(|path| path.exists());
        if let Some(path) = &found {
            debug!("Found config file: {}", path.display());
        }
        found
    }

    fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }
}

impl RetryConfigToml {
    pub fn to_runtime_config(&self) -> RetryConfig {
        RetryConfig {
            initial_timeout: self.initial_timeout,
            max_retries: self.max_retries,
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl CacheConfigToml {
    pub fn to_runtime_config(&self) -> DiskCacheConfig {
        DiskCacheConfig {
            root: self.root.clone(),
            max_size_bytes: self.max_size_bytes,
        }
    }
}

impl TransportConfigToml {
    pub fn to_runtime_config(&self) -> TransportConfig {
        TransportConfig {
            user_agent: self.user_agent.clone(),
            connect_timeout: self.connect_timeout,
            cookie_store: self.cookie_store,
        }
    }
}
