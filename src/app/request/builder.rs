//! Request construction

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use url::form_urlencoded;

use crate::app::cache::CacheTtl;
use crate::app::delivery::{Event, Listener};
use crate::app::network::{Headers, NetworkResponse};
use crate::app::retry::RetryPolicy;

use super::core::{CoreParts, LocalResponseHook, PrepareHook, RequestCore, RequestHandle};
use super::parser::ResponseParser;
use super::types::{Body, Method, Priority};

/// A typed request ready for submission
///
/// Owns the shared [`RequestCore`], the parser producing `T` and the listener
/// that receives the request's events.
pub struct Request<T> {
    core: Arc<RequestCore>,
    parser: Arc<dyn ResponseParser<T>>,
    listener: Listener<T>,
}

impl<T> Request<T> {
    pub fn core(&self) -> &RequestCore {
        &self.core
    }

    /// Handle usable for cancellation before and after submission
    pub fn handle(&self) -> RequestHandle {
        RequestHandle::new(Arc::clone(&self.core))
    }

    pub(crate) fn into_parts(self) -> (Arc<RequestCore>, Arc<dyn ResponseParser<T>>, Listener<T>) {
        (self.core, self.parser, self.listener)
    }
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request").field("core", &self.core).finish()
    }
}

/// Builder for [`Request`]
pub struct RequestBuilder {
    method: Method,
    url: String,
    headers: Headers,
    params: Vec<(String, String)>,
    body: Body,
    priority: Priority,
    tag: Option<String>,
    should_cache: Option<bool>,
    cache_key: Option<String>,
    cache_ttl: Option<CacheTtl>,
    timeout: Option<Duration>,
    retry_policy: Option<Box<dyn RetryPolicy>>,
    prepare: Option<PrepareHook>,
    local_response: Option<LocalResponseHook>,
}

impl RequestBuilder {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            params: Vec::new(),
            body: Body::Empty,
            priority: Priority::default(),
            tag: None,
            should_cache: None,
            cache_key: None,
            cache_ttl: None,
            timeout: None,
            retry_policy: None,
            prepare: None,
            local_response: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::Head, url)
    }

    pub fn options(url: impl Into<String>) -> Self {
        Self::new(Method::Options, url)
    }

    pub fn trace(url: impl Into<String>) -> Self {
        Self::new(Method::Trace, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add a parameter: form body for POST/PUT/PATCH, query string otherwise
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// Raw body with its content type; replaces any form or multipart body
    pub fn body(mut self, content_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes {
            content_type: content_type.into(),
            data: data.into(),
        };
        self
    }

    pub fn multipart_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_multipart(Some((name.into(), value.into())), None);
        self
    }

    pub fn multipart_file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.push_multipart(None, Some((name.into(), path.into())));
        self
    }

    fn push_multipart(&mut self, field: Option<(String, String)>, file: Option<(String, PathBuf)>) {
        if !matches!(self.body, Body::Multipart { .. }) {
            self.body = Body::Multipart {
                fields: Vec::new(),
                files: Vec::new(),
            };
        }
        if let Body::Multipart { fields, files } = &mut self.body {
            fields.extend(field);
            files.extend(file);
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Opt in or out of the response cache (default: GET and HEAD only)
    pub fn should_cache(mut self, should_cache: bool) -> Self {
        self.should_cache = Some(should_cache);
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Override header-derived freshness with explicit soft and hard TTLs
    pub fn cache_ttl(mut self, soft: Duration, hard: Duration) -> Self {
        self.cache_ttl = Some(CacheTtl::new(soft, hard));
        self
    }

    /// Initial per-attempt timeout for the queue's default retry policy
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: impl RetryPolicy + 'static) -> Self {
        self.retry_policy = Some(Box::new(policy));
        self
    }

    pub fn prepare<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Headers) + Send + Sync + 'static,
    {
        self.prepare = Some(Arc::new(hook));
        self
    }

    pub fn local_response<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestCore) -> Option<NetworkResponse> + Send + Sync + 'static,
    {
        self.local_response = Some(Arc::new(hook));
        self
    }

    /// Finish the request with a parser and an event listener
    pub fn build<T, P, L>(self, parser: P, listener: L) -> Request<T>
    where
        P: ResponseParser<T> + 'static,
        L: Fn(Event<T>) + Send + Sync + 'static,
    {
        Request {
            core: Arc::new(RequestCore::from_parts(self.into_core_parts())),
            parser: Arc::new(parser),
            listener: Arc::new(listener),
        }
    }

    /// Finish the request with events sent to a channel
    pub fn channel<T, P>(self, parser: P) -> (Request<T>, Receiver<Event<T>>)
    where
        T: Send + 'static,
        P: ResponseParser<T> + 'static,
    {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let request = self.build(parser, move |event| {
            // Receiver dropped means nobody is listening any more
            let _ = sender.send(event);
        });
        (request, receiver)
    }

    fn into_core_parts(self) -> CoreParts {
        let mut url = self.url;
        let mut body = self.body;

        if !self.params.is_empty() {
            if self.method.carries_body() && body.is_empty() {
                body = Body::Form(self.params);
            } else if let Body::Multipart { fields, .. } = &mut body {
                fields.extend(self.params);
            } else {
                let query = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(&self.params)
                    .finish();
                url.push(if url.contains('?') { '&' } else { '?' });
                url.push_str(&query);
            }
        }

        let cache_key = self
            .cache_key
            .unwrap_or_else(|| default_cache_key(self.method, &url, &body));
        let should_cache = self
            .should_cache
            .unwrap_or(matches!(self.method, Method::Get | Method::Head));

        CoreParts {
            method: self.method,
            url,
            headers: self.headers,
            body,
            priority: self.priority,
            cache_key,
            should_cache,
            cache_ttl: self.cache_ttl,
            tag: self.tag,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            prepare: self.prepare,
            local_response: self.local_response,
        }
    }
}

/// `METHOD:url`, with encoded form parameters appended for form bodies
fn default_cache_key(method: Method, url: &str, body: &Body) -> String {
    match body {
        Body::Form(params) => {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            format!("{}:{}#{}", method, url, encoded)
        }
        _ => format!("{}:{}", method, url),
    }
}
