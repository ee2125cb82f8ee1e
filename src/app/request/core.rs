//! Shared per-request state
//!
//! [`RequestCore`] is the type-independent half of a request. It is shared
//! between the caller's [`RequestHandle`], the queue bookkeeping and whichever
//! dispatcher currently owns the request, so all mutable state is behind
//! atomics or short-lived mutexes.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::app::cache::{CacheEntry, CacheTtl};
use crate::app::network::{Headers, NetworkResponse};
use crate::app::retry::{RetryConfig, RetryPolicy};
use crate::app::sync::lock;
use crate::errors::RequestError;

use super::types::{Body, Method, Priority};

/// Hook run against the request's own headers before every attempt
pub type PrepareHook = Arc<dyn Fn(&mut Headers) + Send + Sync>;

/// Hook that may answer a request locally without touching the network
pub type LocalResponseHook = Arc<dyn Fn(&RequestCore) -> Option<NetworkResponse> + Send + Sync>;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Type-independent request state
pub struct RequestCore {
    id: u64,
    method: Method,
    url: String,
    redirect_url: Mutex<Option<String>>,
    headers: Mutex<Headers>,
    body: Body,
    priority: Priority,
    cache_key: String,
    should_cache: bool,
    cache_ttl: Option<CacheTtl>,
    tag: Option<String>,
    timeout: Option<Duration>,
    sequence: AtomicU64,
    retry_policy: Mutex<Option<Box<dyn RetryPolicy>>>,
    cancelled: AtomicBool,
    response_delivered: AtomicBool,
    terminal: AtomicBool,
    refresh_entry: Mutex<Option<Arc<CacheEntry>>>,
    prepare: Option<PrepareHook>,
    local_response: Option<LocalResponseHook>,
}

pub(crate) struct CoreParts {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub body: Body,
    pub priority: Priority,
    pub cache_key: String,
    pub should_cache: bool,
    pub cache_ttl: Option<CacheTtl>,
    pub tag: Option<String>,
    pub timeout: Option<Duration>,
    pub retry_policy: Option<Box<dyn RetryPolicy>>,
    pub prepare: Option<PrepareHook>,
    pub local_response: Option<LocalResponseHook>,
}

impl RequestCore {
    pub(crate) fn from_parts(parts: CoreParts) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method: parts.method,
            url: parts.url,
            redirect_url: Mutex::new(None),
            headers: Mutex::new(parts.headers),
            body: parts.body,
            priority: parts.priority,
            cache_key: parts.cache_key,
            should_cache: parts.should_cache,
            cache_ttl: parts.cache_ttl,
            tag: parts.tag,
            timeout: parts.timeout,
            sequence: AtomicU64::new(0),
            retry_policy: Mutex::new(parts.retry_policy),
            cancelled: AtomicBool::new(false),
            response_delivered: AtomicBool::new(false),
            terminal: AtomicBool::new(false),
            refresh_entry: Mutex::new(None),
            prepare: parts.prepare,
            local_response: parts.local_response,
        }
    }

    /// Process-unique request identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// URL the request was built with
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Redirect target recorded from a 301/302 answer, if any
    pub fn redirect_url(&self) -> Option<String> {
        lock(&self.redirect_url).clone()
    }

    /// URL the next attempt will use
    pub fn effective_url(&self) -> String {
        self.redirect_url().unwrap_or_else(|| self.url.clone())
    }

    pub(crate) fn set_redirect_url(&self, url: String) {
        *lock(&self.redirect_url) = Some(url);
    }

    /// Snapshot of the request headers
    pub fn headers(&self) -> Headers {
        lock(&self.headers).clone()
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn should_cache(&self) -> bool {
        self.should_cache
    }

    pub fn cache_ttl(&self) -> Option<CacheTtl> {
        self.cache_ttl
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Submission order; assigned by the queue
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    pub(crate) fn assign_sequence(&self, sequence: u64) {
        self.sequence.store(sequence, Ordering::Release);
    }

    /// Mark the request cancelled; idempotent
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Whether a response (stale or fresh) has already reached the listener
    pub fn response_delivered(&self) -> bool {
        self.response_delivered.load(Ordering::Acquire)
    }

    pub(crate) fn mark_response_delivered(&self) {
        self.response_delivered.store(true, Ordering::Release);
    }

    /// Whether the terminal event has been delivered
    pub fn is_finished(&self) -> bool {
        self.terminal.load(Ordering::Acquire)
    }

    /// Claim the single terminal delivery; false if another path already did
    pub(crate) fn claim_terminal(&self) -> bool {
        self.terminal
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stale entry that triggered the current refresh, if any
    pub fn refresh_entry(&self) -> Option<Arc<CacheEntry>> {
        lock(&self.refresh_entry).clone()
    }

    pub(crate) fn set_refresh_entry(&self, entry: Arc<CacheEntry>) {
        *lock(&self.refresh_entry) = Some(entry);
    }

    /// Install the queue's default policy unless the request brought its own
    pub(crate) fn install_default_retry_policy(&self, defaults: &RetryConfig) {
        let mut policy = lock(&self.retry_policy);
        if policy.is_none() {
            let mut config = *defaults;
            if let Some(timeout) = self.timeout {
                config.initial_timeout = timeout;
            }
            *policy = Some(Box::new(config.policy()));
        }
    }

    fn with_retry_policy<R>(&self, f: impl FnOnce(&mut Box<dyn RetryPolicy>) -> R) -> R {
        let mut guard = lock(&self.retry_policy);
        let policy = guard
            .get_or_insert_with(|| Box::new(RetryConfig::default().policy()) as Box<dyn RetryPolicy>);
        f(policy)
    }

    /// Timeout for the next attempt
    pub fn current_timeout(&self) -> Duration {
        self.with_retry_policy(|p| p.current_timeout())
    }

    pub fn retry_count(&self) -> u32 {
        self.with_retry_policy(|p| p.current_retry_count())
    }

    pub(crate) fn retry(&self, error: RequestError) -> Result<(), RequestError> {
        self.with_retry_policy(|p| p.retry(error))
    }

    /// Run the prepare hook against the stored headers and return the result
    pub(crate) fn prepare_headers(&self) -> Headers {
        let mut headers = lock(&self.headers);
        if let Some(prepare) = &self.prepare {
            prepare(&mut headers);
        }
        headers.clone()
    }

    pub(crate) fn local_response(&self) -> Option<NetworkResponse> {
        self.local_response.as_ref().and_then(|hook| hook(self))
    }
}

impl fmt::Debug for RequestCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCore")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("priority", &self.priority)
            .field("cache_key", &self.cache_key)
            .field("tag", &self.tag)
            .field("sequence", &self.sequence())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Caller-side handle to a submitted request
#[derive(Debug, Clone)]
pub struct RequestHandle {
    core: Arc<RequestCore>,
}

impl RequestHandle {
    pub(crate) fn new(core: Arc<RequestCore>) -> Self {
        Self { core }
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    pub fn sequence(&self) -> u64 {
        self.core.sequence()
    }

    pub fn url(&self) -> &str {
        self.core.url()
    }

    pub fn tag(&self) -> Option<&str> {
        self.core.tag()
    }

    /// Request cancellation; observed at the next dispatcher checkpoint
    pub fn cancel(&self) {
        self.core.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    pub fn core(&self) -> &RequestCore {
        &self.core
    }
}
