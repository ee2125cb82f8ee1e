//! Integration tests for the request queue
//!
//! These tests drive a real queue (dispatcher threads, delivery thread) over
//! a scripted transport and verify scheduling and lifecycle behaviour.

#[path = "../support/mod.rs"]
mod support;

use std::sync::Arc;
use std::time::Duration;

use netqueue::app::delivery::Event;
use netqueue::app::queue::QueueState;
use netqueue::app::request::{Priority, RequestBuilder, TextParser};
use support::{assert_well_formed, collect, names, ok, queue, ScriptedTransport};

fn url(name: &str) -> String {
    format!("http://queue.test/{}", name)
}

#[test]
fn test_dispatch_follows_priority_then_submission_order() {
    let transport = Arc::new(ScriptedTransport::new());
    let submissions = [
        ("low", Priority::Low),
        ("normal-a", Priority::Normal),
        ("immediate", Priority::Immediate),
        ("normal-b", Priority::Normal),
        ("high", Priority::High),
    ];
    for (name, _) in &submissions {
        transport.route(&url(name), ok(name));
    }

    let queue = queue(&transport, 1, 0);
    let receivers: Vec<_> = submissions
        .iter()
        .map(|(name, priority)| {
            let (request, events) = RequestBuilder::get(url(name))
                .priority(*priority)
                .should_cache(false)
                .channel(TextParser);
            queue.submit(request);
            events
        })
        .collect();

    // Everything is queued before the dispatchers exist
    queue.start().unwrap();
    for events in &receivers {
        assert_well_formed(&collect(events));
    }

    let expected: Vec<String> = ["immediate", "high", "normal-a", "normal-b", "low"]
        .iter()
        .map(|name| url(name))
        .collect();
    assert_eq!(transport.urls(), expected);
}

#[test]
fn test_cancel_all_by_tag() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("keep"), ok("kept"));

    let queue = queue(&transport, 2, 0);
    let tagged: Vec<_> = (0..3)
        .map(|i| {
            let (request, events) = RequestBuilder::get(url(&format!("batch-{}", i)))
                .tag("batch")
                .channel(TextParser);
            queue.submit(request);
            events
        })
        .collect();
    let (request, untagged) = RequestBuilder::get(url("keep")).channel(TextParser);
    queue.submit(request);

    assert_eq!(queue.cancel_all("batch"), 3);
    assert_eq!(queue.cancel_all("unknown"), 0);
    queue.start().unwrap();

    for events in &tagged {
        // Cancelled before the cache lookup: no Start
        assert_eq!(names(&collect(events)), vec!["cancel", "finish"]);
    }
    let events = collect(&untagged);
    assert!(matches!(events[events.len() - 2], Event::Success(ref body) if body == "kept"));
    assert_eq!(transport.call_count(), 1);

    let stats = queue.stats();
    assert_eq!(stats.cancelled, 3);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_handle_cancels_single_request() {
    let transport = Arc::new(ScriptedTransport::new());
    let queue = queue(&transport, 1, 0);

    let (request, events) = RequestBuilder::get(url("gone")).channel(TextParser);
    let handle = queue.submit(request);
    handle.cancel();
    assert!(handle.is_cancelled());

    queue.start().unwrap();
    assert_eq!(names(&collect(&events)), vec!["cancel", "finish"]);
    assert!(handle.is_finished());
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_stop_cancels_pending_requests() {
    let transport = Arc::new(ScriptedTransport::with_delay(Duration::from_millis(300)));
    for name in ["first", "second", "third"] {
        transport.route(&url(name), ok(name));
    }

    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();
    let receivers: Vec<_> = ["first", "second", "third"]
        .iter()
        .map(|name| {
            let (request, events) = RequestBuilder::get(url(name))
                .should_cache(false)
                .channel(TextParser);
            queue.submit(request);
            events
        })
        .collect();

    // Wait until the first exchange is under way
    loop {
        let event = receivers[0]
            .recv_timeout(support::EVENT_TIMEOUT)
            .expect("first request never reached the network");
        if matches!(event, Event::Networking) {
            break;
        }
    }
    queue.stop().unwrap();
    assert_eq!(queue.state(), QueueState::Stopped);

    // The running exchange completes, the rest are cancelled
    let first = collect(&receivers[0]);
    assert!(matches!(first[first.len() - 2], Event::Success(ref body) if body == "first"));
    for events in &receivers[1..] {
        let events = collect(events);
        assert_well_formed(&events);
        assert!(matches!(events[events.len() - 2], Event::Cancel));
    }
    assert_eq!(transport.call_count(), 1);
    assert_eq!(queue.pending(), 0);
}

#[test]
fn test_submit_after_stop_is_cancelled() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("late"), ok("late"));

    let queue = queue(&transport, 1, 0);
    queue.start().unwrap();
    queue.stop().unwrap();

    let (request, events) = RequestBuilder::get(url("late")).channel(TextParser);
    let handle = queue.submit(request);
    assert_eq!(names(&collect(&events)), vec!["cancel", "finish"]);
    assert!(handle.is_cancelled());
    assert_eq!(transport.call_count(), 0);
}

#[test]
fn test_start_is_idempotent_and_restartable() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("again"), ok("again"));

    let queue = queue(&transport, 2, 0);
    queue.start().unwrap();
    queue.start().unwrap();
    queue.stop().unwrap();
    queue.start().unwrap();
    assert!(queue.is_running());

    let (request, events) = RequestBuilder::get(url("again")).channel(TextParser);
    queue.submit(request);
    let events = collect(&events);
    assert_eq!(
        names(&events),
        vec!["start", "networking", "progress", "success", "finish"]
    );
    assert_eq!(transport.call_count(), 1);
}

#[test]
fn test_stats_track_outcomes() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.route(&url("fine"), ok("fine"));

    let queue = queue(&transport, 2, 0);
    queue.start().unwrap();

    let (request, good) = RequestBuilder::get(url("fine")).channel(TextParser);
    queue.submit(request);
    let (request, bad) = RequestBuilder::get(url("missing")).channel(TextParser);
    queue.submit(request);
    collect(&good);
    collect(&bad);

    let stats = queue.stats();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.finished(), 2);
    assert_eq!(stats.in_flight, 0);
    assert!((stats.success_rate() - 50.0).abs() < f64::EPSILON);
}
