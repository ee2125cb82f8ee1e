//! Error types for netqueue
//!
//! This module defines the error types for all components of the engine.
//! [`RequestError`] is the structured failure delivered to callers; the other
//! enums describe failures of the engine's own collaborators (transport, cache
//! store, queue lifecycle, configuration).

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::app::network::NetworkResponse;

/// Classification of a delivered request failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    NoConnection,
    Redirect,
    AuthFailure,
    Server,
    Parse,
    InvalidUrl,
}

/// Failure delivered to a request's listener through `Event::Error`
///
/// Retryable kinds (`Timeout`, `Redirect`, `AuthFailure`) only surface once the
/// request's retry policy is exhausted. The engine never renders user-facing
/// text from these; callers inspect the kind and the partial response.
#[derive(Error, Debug, Clone)]
pub enum RequestError {
    /// Connection or socket timeout
    #[error("Request timed out")]
    Timeout,

    /// I/O failure before any response was obtained
    #[error("No connection: {reason}")]
    NoConnection { reason: String },

    /// Server answered 301/302
    #[error("Redirected to {}", location.as_deref().unwrap_or("<missing Location>"))]
    Redirect {
        location: Option<String>,
        response: Arc<NetworkResponse>,
    },

    /// Server answered 401/403
    #[error("Authentication failed: HTTP {}", response.status)]
    AuthFailure { response: Arc<NetworkResponse> },

    /// Any other non-2xx status
    #[error("Server error: HTTP {}", response.status)]
    Server { response: Arc<NetworkResponse> },

    /// The response parser rejected the payload
    #[error("Failed to parse response: {reason}")]
    Parse { reason: String },

    /// The request URL could not be parsed
    #[error("Invalid URL: {url} - {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl RequestError {
    /// Create a parse error with a reason
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RequestError::Timeout => ErrorKind::Timeout,
            RequestError::NoConnection { .. } => ErrorKind::NoConnection,
            RequestError::Redirect { .. } => ErrorKind::Redirect,
            RequestError::AuthFailure { .. } => ErrorKind::AuthFailure,
            RequestError::Server { .. } => ErrorKind::Server,
            RequestError::Parse { .. } => ErrorKind::Parse,
            RequestError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
        }
    }

    /// Partial response attached to the failure, if one was received
    pub fn response(&self) -> Option<&NetworkResponse> {
        match self {
            RequestError::Redirect { response, .. }
            | RequestError::AuthFailure { response }
            | RequestError::Server { response } => Some(response),
            _ => None,
        }
    }

    /// Whether the network executor may hand this error to a retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::Redirect | ErrorKind::AuthFailure
        )
    }
}

/// Failures reported by a [`Transport`](crate::app::transport::Transport)
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connect or read timeout
    #[error("Transport timed out")]
    Timeout,

    /// URL rejected before any connection attempt
    #[error("Malformed URL: {url} - {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Connection-level I/O failure, no response obtained
    #[error("Transport I/O failure: {0}")]
    Io(String),

    /// The request body could not be assembled (e.g. multipart file missing)
    #[error("Failed to build request body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_builder() {
            TransportError::MalformedUrl {
                url: error
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                reason: error.to_string(),
            }
        } else {
            TransportError::Io(error.to_string())
        }
    }
}

/// Cache store errors
#[derive(Error, Debug)]
pub enum CacheError {
    /// Cache directory not found or inaccessible
    #[error("Cache directory not accessible: {path}")]
    DirectoryNotAccessible { path: PathBuf },

    /// File I/O error
    #[error("Cache I/O error")]
    Io(#[from] std::io::Error),

    /// Entry metadata could not be (de)serialized
    #[error("Cache entry serialization failed")]
    Serialization(#[from] serde_json::Error),

    /// Entry on disk is truncated or malformed
    #[error("Corrupt cache entry {path}: {reason}")]
    CorruptEntry { path: PathBuf, reason: String },

    /// Atomic file operation failed
    #[error("Atomic cache write failed for {path}")]
    AtomicWriteFailed { path: PathBuf },
}

/// Request queue lifecycle errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Worker thread could not be spawned
    #[error("Failed to spawn {name} thread")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Worker panicked or terminated unexpectedly
    #[error("Worker {name} panicked or terminated unexpectedly")]
    WorkerPanic { name: String },

    /// `start` called while `stop` is still running
    #[error("Request queue is shutting down")]
    ShuttingDown,

    /// Invalid queue configuration
    #[error("Invalid queue configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Request(e) => e.is_retryable(),
            AppError::Transport(TransportError::Timeout)
            | AppError::Transport(TransportError::Io(_)) => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Request(_) => "request",
            AppError::Transport(_) => "transport",
            AppError::Cache(_) => "cache",
            AppError::Queue(_) => "queue",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Transport result type alias
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Cache result type alias
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Queue result type alias
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
