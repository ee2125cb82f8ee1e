//! Network executor
//!
//! Runs one request's exchange against the [`Transport`], including the retry
//! loop. Each attempt is classified into success, a retryable failure (handed
//! to the request's retry policy) or a fatal failure.
//!
//! | Outcome                               | Classification         |
//! |---------------------------------------|------------------------|
//! | transport timeout                     | retry, `Timeout`       |
//! | malformed URL                         | fatal, `InvalidUrl`    |
//! | I/O failure, no response              | fatal, `NoConnection`  |
//! | 2xx                                   | success                |
//! | 304 while refreshing a cached entry   | success, cached body   |
//! | 301 / 302                             | retry, `Redirect`      |
//! | 401 / 403                             | retry, `AuthFailure`   |
//! | any other status                      | fatal, `Server`        |

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use flate2::write::{GzDecoder, ZlibDecoder};
use tracing::{debug, info};
use url::Url;

use crate::app::delivery::job::Job;
use crate::app::delivery::Lifecycle;
use crate::app::request::RequestCore;
use crate::app::transport::{RawResponse, Transport, TransportRequest};
use crate::constants::http;
use crate::errors::{RequestError, TransportError};

use super::headers::Headers;
use super::response::{parse_charset, NetworkResponse};

enum Failure {
    Retryable(RequestError),
    Fatal(RequestError),
}

/// Decoding sink fed with raw body chunks
enum BodySink {
    Identity(Vec<u8>),
    Gzip(GzDecoder<Vec<u8>>),
    Deflate(ZlibDecoder<Vec<u8>>),
}

impl BodySink {
    fn for_encoding(encoding: Option<&str>) -> Self {
        match encoding.map(|e| e.trim().to_ascii_lowercase()).as_deref() {
            Some("gzip") | Some("x-gzip") => BodySink::Gzip(GzDecoder::new(Vec::new())),
            Some("deflate") => BodySink::Deflate(ZlibDecoder::new(Vec::new())),
            _ => BodySink::Identity(Vec::new()),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        match self {
            BodySink::Identity(buffer) => {
                buffer.extend_from_slice(chunk);
                Ok(())
            }
            BodySink::Gzip(decoder) => decoder.write_all(chunk),
            BodySink::Deflate(decoder) => decoder.write_all(chunk),
        }
    }

    fn finish(self) -> io::Result<Vec<u8>> {
        match self {
            BodySink::Identity(buffer) => Ok(buffer),
            BodySink::Gzip(decoder) => decoder.finish(),
            BodySink::Deflate(decoder) => decoder.finish(),
        }
    }
}

/// Performs network exchanges for the network dispatchers
#[derive(Debug)]
pub struct NetworkExecutor {
    transport: Arc<dyn Transport>,
    default_charset: String,
    slow_request_threshold: Duration,
}

impl NetworkExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        default_charset: impl Into<String>,
        slow_request_threshold: Duration,
    ) -> Self {
        Self {
            transport,
            default_charset: default_charset.into(),
            slow_request_threshold,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run the request's attempts until success, a fatal failure or an
    /// exhausted retry policy
    ///
    /// Returns `Ok(None)` when the request was cancelled before an attempt.
    pub(crate) fn perform(&self, job: &dyn Job) -> Result<Option<NetworkResponse>, RequestError> {
        let core = job.core();
        if let Some(response) = core.local_response() {
            debug!("Request {} answered locally", core.id());
            return Ok(Some(response));
        }

        let started = Instant::now();
        loop {
            if core.is_cancelled() {
                return Ok(None);
            }
            job.post(Lifecycle::Networking);

            let error = match self.attempt(job, started) {
                Ok(response) => return Ok(Some(response)),
                Err(Failure::Fatal(error)) => return Err(error),
                Err(Failure::Retryable(error)) => error,
            };

            let kind = error.kind();
            core.retry(error)?;
            debug!(
                "Retrying {} after {:?} (retry {}, timeout {:?})",
                core.effective_url(),
                kind,
                core.retry_count(),
                core.current_timeout()
            );
            job.post(Lifecycle::Retry);
        }
    }

    fn attempt(&self, job: &dyn Job, started: Instant) -> Result<NetworkResponse, Failure> {
        let core = job.core();
        let refresh = core.refresh_entry();

        let mut headers = core.prepare_headers();
        if let Some(entry) = &refresh {
            if let Some(etag) = &entry.etag {
                headers.insert("If-None-Match", etag.clone());
            }
            if let Some(last_modified) = &entry.last_modified {
                headers.insert("If-Modified-Since", last_modified.clone());
            }
        }

        let url = core.effective_url();
        let request = TransportRequest {
            method: core.method(),
            url: &url,
            headers: &headers,
            body: core.body(),
            timeout: core.current_timeout(),
        };

        let attempt_started = Instant::now();
        let RawResponse {
            status,
            headers: raw_headers,
            body,
            content_length,
        } = self.transport.execute(&request).map_err(classify_transport_error)?;
        let response_headers = Headers::from_multimap(raw_headers);

        if status == http::STATUS_NOT_MODIFIED {
            let mut response = match &refresh {
                Some(entry) => {
                    let mut merged = entry.headers.clone();
                    merged.merge(&response_headers);
                    NetworkResponse::new(status, entry.data.clone(), merged, &entry.charset)
                }
                None => NetworkResponse::new(
                    status,
                    Vec::new(),
                    response_headers,
                    &self.default_charset,
                ),
            };
            response.not_modified = true;
            response.network_time = started.elapsed();
            self.log_exchange(core, attempt_started.elapsed(), &response);
            return Ok(response);
        }

        let redirect = if matches!(
            status,
            http::STATUS_MOVED_PERMANENTLY | http::STATUS_MOVED_TEMPORARILY
        ) {
            let target = response_headers
                .get("location")
                .map(|location| resolve_location(&url, location));
            if let Some(target) = &target {
                debug!("Request {} redirected to {}", core.id(), target);
                core.set_redirect_url(target.clone());
            }
            Some(target)
        } else {
            None
        };

        let success = (200..=299).contains(&status);
        let encoding = response_headers.get("content-encoding");
        let data = drain_body(body, encoding, |transferred| {
            if success {
                job.post(Lifecycle::Progress {
                    total: content_length,
                    transferred,
                });
            }
        })
        .map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => Failure::Retryable(RequestError::Timeout),
            _ => Failure::Fatal(RequestError::NoConnection {
                reason: e.to_string(),
            }),
        })?;

        let charset = parse_charset(&response_headers, &self.default_charset);
        let mut response = NetworkResponse::new(status, data, response_headers, &charset);
        response.network_time = started.elapsed();
        self.log_exchange(core, attempt_started.elapsed(), &response);

        if success {
            return Ok(response);
        }
        let response = Arc::new(response);
        match (status, redirect) {
            (_, Some(location)) => Err(Failure::Retryable(RequestError::Redirect {
                location,
                response,
            })),
            (http::STATUS_UNAUTHORIZED | http::STATUS_FORBIDDEN, _) => {
                Err(Failure::Retryable(RequestError::AuthFailure { response }))
            }
            _ => Err(Failure::Fatal(RequestError::Server { response })),
        }
    }

    fn log_exchange(&self, core: &RequestCore, elapsed: Duration, response: &NetworkResponse) {
        if elapsed > self.slow_request_threshold {
            info!(
                "Slow request {} {}: lifetime={}ms size={} status={} retries={}",
                core.method(),
                core.effective_url(),
                elapsed.as_millis(),
                response.data.len(),
                response.status,
                core.retry_count()
            );
        } else {
            debug!(
                "{} {} -> {} ({} bytes, {}ms)",
                core.method(),
                core.effective_url(),
                response.status,
                response.data.len(),
                elapsed.as_millis()
            );
        }
    }
}

fn classify_transport_error(error: TransportError) -> Failure {
    match error {
        TransportError::Timeout => Failure::Retryable(RequestError::Timeout),
        TransportError::MalformedUrl { url, reason } => {
            Failure::Fatal(RequestError::InvalidUrl { url, reason })
        }
        TransportError::Io(reason) | TransportError::Body(reason) => {
            Failure::Fatal(RequestError::NoConnection { reason })
        }
    }
}

/// Resolve a `Location` header against the URL that produced it
fn resolve_location(current: &str, location: &str) -> String {
    Url::parse(current)
        .and_then(|base| base.join(location))
        .map(String::from)
        .unwrap_or_else(|_| location.to_string())
}

/// Read the body in fixed-size chunks, decoding as it goes
///
/// `on_chunk` receives the number of wire bytes read so far.
fn drain_body(
    mut body: Box<dyn Read + Send>,
    encoding: Option<&str>,
    mut on_chunk: impl FnMut(u64),
) -> io::Result<Vec<u8>> {
    let mut sink = BodySink::for_encoding(encoding);
    let mut buffer = [0u8; http::BODY_CHUNK_SIZE];
    let mut transferred = 0u64;

    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        sink.write(&buffer[..read])?;
        transferred += read as u64;
        on_chunk(transferred);
    }
    sink.finish()
}
