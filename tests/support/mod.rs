//! Shared helpers for the integration tests: a scripted transport and event
//! collection over request channels.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;

use netqueue::app::cache::{CacheStore, MemoryCache};
use netqueue::app::delivery::Event;
use netqueue::app::queue::{QueueConfig, RequestQueue};
use netqueue::app::transport::{RawResponse, Transport, TransportRequest};
use netqueue::errors::{TransportError, TransportResult};

/// How long a test waits for a request to finish before failing
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

pub type Reply = Box<dyn Fn() -> TransportResult<RawResponse> + Send + Sync>;

/// One exchange as seen by the transport
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Transport answering from per-URL scripts
///
/// The n-th call to a URL gets the n-th scripted reply; the last reply
/// repeats once the script runs out. Unknown URLs fail with an I/O error.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Vec<Reply>>>,
    served: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every exchange sleeps for `delay` before answering
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Append a reply to the script for `url`
    pub fn route<F>(&self, url: &str, reply: F) -> &Self
    where
        F: Fn() -> TransportResult<RawResponse> + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push(Box::new(reply));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.url == url)
            .count()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|call| call.url).collect()
    }
}

impl fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("calls", &self.call_count())
            .finish()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &TransportRequest<'_>) -> TransportResult<RawResponse> {
        self.calls.lock().unwrap().push(RecordedRequest {
            url: request.url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            timeout: request.timeout,
        });

        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }

        let index = {
            let mut served = self.served.lock().unwrap();
            let count = served.entry(request.url.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        let routes = self.routes.lock().unwrap();
        match routes.get(request.url) {
            Some(script) if !script.is_empty() => {
                let reply = &script[index.min(script.len() - 1)];
                reply()
            }
            _ => Err(TransportError::Io(format!("no route for {}", request.url))),
        }
    }
}

pub fn ok(body: &str) -> impl Fn() -> TransportResult<RawResponse> + Send + Sync {
    respond(200, &[], body)
}

pub fn respond(
    status: u16,
    headers: &[(&str, &str)],
    body: &str,
) -> impl Fn() -> TransportResult<RawResponse> + Send + Sync {
    let headers: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();
    let body = body.as_bytes().to_vec();
    move || Ok(RawResponse::from_bytes(status, headers.clone(), body.clone()))
}

pub fn timeout() -> impl Fn() -> TransportResult<RawResponse> + Send + Sync {
    || Err(TransportError::Timeout)
}

/// Queue over `transport` with an in-memory cache
pub fn queue(transport: &Arc<ScriptedTransport>, workers: usize, max_retries: u32) -> RequestQueue {
    queue_with_cache(
        transport,
        Arc::new(MemoryCache::new()),
        workers,
        max_retries,
    )
}

pub fn queue_with_cache(
    transport: &Arc<ScriptedTransport>,
    cache: Arc<dyn CacheStore>,
    workers: usize,
    max_retries: u32,
) -> RequestQueue {
    let config = QueueConfig::builder()
        .network_workers(workers)
        .initial_timeout(Duration::from_millis(200))
        .max_retries(max_retries)
        .build();
    RequestQueue::builder()
        .config(config)
        .cache(cache)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
        .unwrap()
}

/// Receive events until `Finish`; panics if the request does not finish in time
pub fn collect<T>(events: &Receiver<Event<T>>) -> Vec<Event<T>> {
    let mut collected = Vec::new();
    loop {
        let event = events
            .recv_timeout(EVENT_TIMEOUT)
            .unwrap_or_else(|_| panic!("request did not finish, got {:?}", names(&collected)));
        let done = matches!(event, Event::Finish);
        collected.push(event);
        if done {
            return collected;
        }
    }
}

pub fn names<T>(events: &[Event<T>]) -> Vec<&'static str> {
    events.iter().map(Event::name).collect()
}

/// Exactly one terminal event, and `Finish` is last
pub fn assert_well_formed<T>(events: &[Event<T>]) {
    let terminals = events.iter().filter(|event| event.is_terminal()).count();
    assert!(terminals <= 1, "multiple terminal events: {:?}", names(events));
    assert!(
        matches!(events.last(), Some(Event::Finish)),
        "Finish is not last: {:?}",
        names(events)
    );
    let finishes = events
        .iter()
        .filter(|event| matches!(event, Event::Finish))
        .count();
    assert_eq!(finishes, 1, "Finish posted more than once: {:?}", names(events));
}
