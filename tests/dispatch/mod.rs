//! Integration tests for the dispatch pipeline
//!
//! Covers deduplication, cache triage, retry classification and the event
//! sequences each path produces.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;

use netqueue::app::cache::{CacheEntry, CacheStore, MemoryCache};
use netqueue::app::delivery::Event;
use netqueue::app::network::{Headers, NetworkResponse};
use netqueue::app::request::{JsonParser, RequestBuilder, TextParser};
use netqueue::constants::retry;
use netqueue::errors::{ErrorKind, RequestError};
use support::{
    assert_well_formed, collect, names, ok, queue, queue_with_cache, respond, timeout,
    ScriptedTransport,
};

fn url(path: &str) -> String {
    format!("http://dispatch.test/{}", path)
}

fn success_body(events: &[Event<String>]) -> Option<&str> {
    events.iter().find_map(|event| match event {
        Event::Success(body) => Some(body.as_str()),
        _ => None,
    })
}

fn error_of(events: &[Event<String>]) -> &RequestError {
    events
        .iter()
        .find_map(|event| match event {
            Event::Error(error) => Some(error),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no error event in {:?}", names(events)))
}

fn stale_entry(body: &str, etag: &str) -> CacheEntry {
    let mut headers = Headers::new();
    headers.insert("ETag", etag);
    let response = NetworkResponse::new(200, body.as_bytes().to_vec(), headers, "UTF-8");
    let now = Utc::now();
    CacheEntry::from_response(
        &response,
        now - ChronoDuration::minutes(1),
        now + ChronoDuration::hours(1),
    )
}

#[test]
fn test_identical_requests_share_one_exchange() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
    transport.route(&url("shared"), ok("payload"));

    let queue = queue(&transport, 2, 0);
    let (first, first_events) = RequestBuilder::get(url("shared")).channel(TextParser);
    let (second, second_events) = RequestBuilder::get(url("shared")).channel(TextParser);
    queue.submit(first);
    queue.submit(second);
    queue.start().unwrap();

    let first_events = collect(&first_events);
    let second_events = collect(&second_events);
    assert_well_formed(&first_events);
    assert_well_formed(&second_events);

    assert_eq!(transport.call_count(), 1);
    assert_eq!(success_body(&first_events), Some("payload"));
    assert_eq!(success_body(&second_events), Some("payload"));
    // The waiter never touches the network itself
    assert_eq!(names(&second_events), vec!["start", "success", "finish"]);
    assert_eq!(queue.stats().deduplicated, 1);
}

#[test]
fn test_shared_failure_reaches_every_member() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(200)));
    transport.route(&url("down"), respond(500, &[], "unavailable"));

    let queue = queue(&transport, 2, 0);
    let (first, first_events) = RequestBuilder::get(url("down")).channel(TextParser);
    let (second, second_events) = RequestBuilder::get(url("down")).channel(TextParser);
    queue.submit(first);
    queue.submit(second);
    queue.start().unwrap();

    let first_events = collect(&first_events);
    let second_events = collect(&second_events);
    assert_well_formed(&first_events);
    assert_well_formed(&second_events);

    for events in [&first_events, &second_events] {
        let error = error_of(events);
        assert_eq!(error.kind(), ErrorKind::Server);
        let response = error.response().unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.data, b"unavailable");
    }
    assert_eq!(names(&second_events), vec!["start", "error", "finish"]);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_uncacheable_requests_are_not_deduplicated() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(50)));
    transport.route(&url("each"), ok("each"));

    let queue = queue(&transport, 2, 0);
    let receivers: Vec<_> = (0..2)
        .map(|_| {
            let (request, events) = RequestBuilder::get(url("each"))
                .should_cache(false)
                .channel(TextParser);
            queue.submit(request);
            events
        })
        .collect();
    queue.start().unwrap();

    for events in &receivers {
        assert_eq!(success_body(&collect(events)), Some("each"));
    }
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_cached_response_served_without_network() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        &url("cached"),
        respond(200, &[("Cache-Control", "max-age=60")], "fresh"),
    );

    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("cached")).channel(TextParser);
    queue.submit(request);
    assert_eq!(success_body(&collect(&events)), Some("fresh"));

    let (request, events) = RequestBuilder::get(url("cached")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_eq!(names(&events), vec!["start", "used-cache", "success", "finish"]);
    assert_eq!(success_body(&events), Some("fresh"));

    assert_eq!(transport.call_count(), 1);
    let stats = queue.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.network_exchanges, 1);
}

#[test]
fn test_timeouts_retry_until_policy_exhausted() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("slow"), timeout());

    let queue = queue(&transport, 1, 2);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("slow")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert_eq!(
        names(&events),
        vec![
            "start",
            "networking",
            "retry",
            "networking",
            "retry",
            "networking",
            "error",
            "finish"
        ]
    );
    assert_eq!(error_of(&events).kind(), ErrorKind::Timeout);

    // Each retry grows the timeout by itself with the default multiplier
    let timeouts: Vec<Duration> = transport.requests().iter().map(|r| r.timeout).collect();
    assert_eq!(
        timeouts,
        vec![
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800)
        ]
    );
}

#[test]
fn test_success_after_timeouts() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .route(&url("flaky"), timeout())
        .route(&url("flaky"), timeout())
        .route(&url("flaky"), ok("third time"));

    let queue = queue(&transport, 1, 2);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("flaky")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert_eq!(success_body(&events), Some("third time"));
    assert_eq!(events.iter().filter(|e| matches!(e, Event::Retry)).count(), 2);
    assert_eq!(transport.call_count(), 3);
}

#[test]
fn test_long_retry_budget_still_finishes() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("never"), timeout());

    let queue = queue(&transport, 1, 80);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("never")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert_eq!(error_of(&events).kind(), ErrorKind::Timeout);
    assert_eq!(transport.call_count(), 81);
    assert_eq!(events.iter().filter(|e| matches!(e, Event::Retry)).count(), 80);

    let timeouts: Vec<Duration> = transport.requests().iter().map(|r| r.timeout).collect();
    assert!(timeouts.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(timeouts.last().copied(), Some(retry::MAX_TIMEOUT));
}

#[test]
fn test_request_timeout_overrides_queue_default() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("patient"), ok("done"));

    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("patient"))
        .timeout(Duration::from_secs(7))
        .channel(TextParser);
    queue.submit(request);
    collect(&events);

    assert_eq!(transport.requests()[0].timeout, Duration::from_secs(7));
}

#[test]
fn test_redirects_are_followed_until_exhausted() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("start"), respond(302, &[("Location", "/hop1")], ""));
    transport.route(&url("hop1"), respond(302, &[("Location", "/hop2")], ""));
    transport.route(&url("hop2"), respond(302, &[("Location", "/hop3")], ""));

    let queue = queue(&transport, 1, 2);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("start")).channel(TextParser);
    let handle = queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert_eq!(transport.urls(), vec![url("start"), url("hop1"), url("hop2")]);
    let error = error_of(&events);
    assert_eq!(error.kind(), ErrorKind::Redirect);
    assert_eq!(error.response().map(|r| r.status), Some(302));
    assert_eq!(
        handle.core().redirect_url().as_deref(),
        Some(url("hop3").as_str())
    );
}

#[test]
fn test_redirect_to_success() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        &url("old"),
        respond(301, &[("Location", "http://dispatch.test/new")], ""),
    );
    transport.route(&url("new"), ok("moved here"));

    let queue = queue(&transport, 1, 1);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("old")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);

    assert_eq!(
        names(&events),
        vec![
            "start",
            "networking",
            "retry",
            "networking",
            "progress",
            "success",
            "finish"
        ]
    );
    assert_eq!(success_body(&events), Some("moved here"));
}

#[test]
fn test_auth_failure_retries_with_prepared_headers() {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .route(&url("private"), respond(401, &[], "denied"))
        .route(&url("private"), ok("welcome"));

    let queue = queue(&transport, 1, 1);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("private"))
        .prepare(|headers| headers.insert("Authorization", "Bearer token"))
        .channel(TextParser);
    queue.submit(request);
    let events = collect(&events);

    assert_eq!(success_body(&events), Some("welcome"));
    assert_eq!(events.iter().filter(|e| matches!(e, Event::Retry)).count(), 1);
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests
        .iter()
        .all(|r| r.header("authorization") == Some("Bearer token")));
}

#[test]
fn test_server_error_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("broken"), respond(500, &[], "oops"));

    let queue = queue(&transport, 1, 3);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("broken")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);

    assert_eq!(names(&events), vec!["start", "networking", "error", "finish"]);
    let error = error_of(&events);
    assert_eq!(error.kind(), ErrorKind::Server);
    let response = error.response().unwrap();
    assert_eq!(response.status, 500);
    assert_eq!(response.data, b"oops");
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_connection_failure_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::new());
    let queue = queue(&transport, 1, 3);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("unrouted")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);

    assert_eq!(error_of(&events).kind(), ErrorKind::NoConnection);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_stale_entry_refreshed_with_not_modified() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("stale"), respond(304, &[("ETag", "\"v1\"")], ""));

    let cache = Arc::new(MemoryCache::new());
    let key = format!("GET:{}", url("stale"));
    cache.put(&key, stale_entry("cached copy", "\"v1\"")).unwrap();

    let queue = queue_with_cache(&transport, cache.clone(), 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("stale"))
        .cache_ttl(Duration::from_secs(60), Duration::from_secs(3600))
        .channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert_eq!(
        names(&events),
        vec!["start", "used-cache", "intermediate", "networking", "finish"]
    );
    assert!(matches!(&events[2], Event::Intermediate(body) if body == "cached copy"));
    assert_eq!(
        transport.requests()[0].header("if-none-match"),
        Some("\"v1\"")
    );

    // The entry is fresh again and still carries the cached body
    let entry = cache.get(&key).unwrap().unwrap();
    assert!(!entry.refresh_needed(Utc::now()));
    assert_eq!(entry.data, b"cached copy");
    assert_eq!(queue.stats().not_modified, 1);
}

#[test]
fn test_stale_entry_replaced_by_new_content() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        &url("changing"),
        respond(200, &[("Cache-Control", "max-age=60")], "new copy"),
    );

    let cache = Arc::new(MemoryCache::new());
    let key = format!("GET:{}", url("changing"));
    cache.put(&key, stale_entry("old copy", "\"v1\"")).unwrap();

    let queue = queue_with_cache(&transport, cache.clone(), 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("changing")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert!(matches!(&events[2], Event::Intermediate(body) if body == "old copy"));
    assert_eq!(success_body(&events), Some("new copy"));
    assert_eq!(cache.get(&key).unwrap().unwrap().data, b"new copy");
}

#[derive(Debug, Deserialize)]
struct Reading {
    value: u32,
}

#[test]
fn test_unparseable_cache_entry_is_evicted() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("reading"), ok(r#"{"value": 7}"#));

    let cache = Arc::new(MemoryCache::new());
    let key = format!("GET:{}", url("reading"));
    let garbage = NetworkResponse::ok(b"not json".to_vec(), "UTF-8");
    let now = Utc::now();
    cache
        .put(
            &key,
            CacheEntry::from_response(
                &garbage,
                now + ChronoDuration::hours(1),
                now + ChronoDuration::hours(2),
            ),
        )
        .unwrap();

    let queue = queue_with_cache(&transport, cache.clone(), 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("reading")).channel(JsonParser::<Reading>::new());
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);

    assert!(!names(&events).contains(&"used-cache"));
    let value = events.iter().find_map(|event| match event {
        Event::Success(reading) => Some(reading.value),
        _ => None,
    });
    assert_eq!(value, Some(7));
    assert_eq!(transport.call_count(), 1);
    // Response had no freshness headers, so nothing replaced the evicted entry
    assert!(cache.get(&key).unwrap().is_none());
}

#[test]
fn test_cancelled_waiter_does_not_receive_shared_result() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(300)));
    transport.route(&url("group"), ok("shared"));

    let queue = queue(&transport, 1, 0);
    let (leader, leader_events) = RequestBuilder::get(url("group")).channel(TextParser);
    let (waiter, waiter_events) = RequestBuilder::get(url("group")).channel(TextParser);
    queue.submit(leader);
    let waiter_handle = queue.submit(waiter);
    queue.start().unwrap();

    // The waiter joins the leader's group right after its cache triage
    let started = waiter_events
        .recv_timeout(support::EVENT_TIMEOUT)
        .expect("waiter never reached cache triage");
    assert!(matches!(started, Event::Start));
    waiter_handle.cancel();

    let leader_events = collect(&leader_events);
    assert_eq!(success_body(&leader_events), Some("shared"));
    assert_eq!(names(&collect(&waiter_events)), vec!["cancel", "finish"]);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_local_response_skips_transport() {
    let transport = Arc::new(ScriptedTransport::new());
    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("local"))
        .local_response(|_| Some(NetworkResponse::ok(b"from memory".to_vec(), "UTF-8")))
        .channel(TextParser);
    queue.submit(request);
    let events = collect(&events);

    assert_eq!(names(&events), vec!["start", "success", "finish"]);
    assert_eq!(success_body(&events), Some("from memory"));
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_huge_max_age_is_served_and_cached() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(
        &url("forever"),
        respond(200, &[("Cache-Control", "max-age=99999999999999")], "eternal"),
    );

    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("forever")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);
    assert_eq!(success_body(&events), Some("eternal"));

    let (request, events) = RequestBuilder::get(url("forever")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_eq!(names(&events), vec!["start", "used-cache", "success", "finish"]);
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_panicking_parser_does_not_stall_queue() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("fragile"), ok("from network"));

    let cache = Arc::new(MemoryCache::new());
    let key = format!("GET:{}", url("fragile"));
    let now = Utc::now();
    cache
        .put(
            &key,
            CacheEntry::from_response(
                &NetworkResponse::ok(b"cached".to_vec(), "UTF-8"),
                now + ChronoDuration::hours(1),
                now + ChronoDuration::hours(2),
            ),
        )
        .unwrap();

    let queue = queue_with_cache(&transport, cache.clone(), 1, 0);
    queue.start().unwrap();

    let (request, events) = RequestBuilder::get(url("fragile")).channel(
        |_: &NetworkResponse| -> Result<String, RequestError> { panic!("parser bug") },
    );
    queue.submit(request);
    let events = collect(&events);
    assert_well_formed(&events);
    assert_eq!(error_of(&events).kind(), ErrorKind::Parse);

    // Both dispatchers are still serving requests
    let (request, events) = RequestBuilder::get(url("fragile")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_eq!(success_body(&events), Some("from network"));
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn test_cancelled_leader_hands_fetch_to_waiter() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(300)));
    transport
        .route(&url("busy"), ok("busy"))
        .route(&url("handover"), ok("handed over"));

    // One network worker, occupied by the first request
    let queue = queue(&transport, 1, 0);
    let (busy, busy_events) = RequestBuilder::get(url("busy")).channel(TextParser);
    let (leader, leader_events) = RequestBuilder::get(url("handover")).channel(TextParser);
    let (waiter, waiter_events) = RequestBuilder::get(url("handover")).channel(TextParser);
    queue.submit(busy);
    let leader_handle = queue.submit(leader);
    queue.submit(waiter);
    queue.start().unwrap();

    let started = waiter_events
        .recv_timeout(support::EVENT_TIMEOUT)
        .expect("waiter never reached cache triage");
    assert!(matches!(started, Event::Start));
    leader_handle.cancel();

    assert_eq!(success_body(&collect(&busy_events)), Some("busy"));
    assert_eq!(
        names(&collect(&leader_events)),
        vec!["start", "cancel", "finish"]
    );

    let waiter_events = collect(&waiter_events);
    assert_well_formed(&waiter_events);
    assert_eq!(
        names(&waiter_events),
        vec!["networking", "progress", "success", "finish"]
    );
    assert_eq!(success_body(&waiter_events), Some("handed over"));
    assert_eq!(transport.calls_to(&url("handover")), 1);
}
