//! Integration tests for the dispatcher and wait registry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use snek_client::dispatch::spawn_dispatcher;
use snek_client::{DispatchError, Event, Hooks, Listener};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Helpers
// ============================================================================

/// Records every `on_error` source label.
#[derive(Default)]
struct RecordingHooks {
    sources: Mutex<Vec<String>>,
}

#[async_trait]
impl Hooks for RecordingHooks {
    async fn on_error(&self, source: &str, _error: &anyhow::Error) {
        self.sources.lock().unwrap().push(source.to_string());
    }
}

async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Listener Isolation
// ============================================================================

#[tokio::test]
async fn test_k_of_n_failures_reach_hook_and_peers_complete() {
    const N: usize = 6;
    const K: usize = 3;

    let hooks = Arc::new(RecordingHooks::default());
    let dispatcher = spawn_dispatcher(hooks.clone(), CancellationToken::new());
    let completed = Arc::new(AtomicUsize::new(0));

    for i in 0..N {
        let completed = Arc::clone(&completed);
        let listener = Listener::new("tick", format!("listener-{i}"), move |_event, _token| {
            let completed = Arc::clone(&completed);
            async move {
                completed.fetch_add(1, Ordering::SeqCst);
                match i {
                    0 => anyhow::bail!("listener {i} failed"),
                    1 => panic!("listener {i} panicked"),
                    2 => Err(anyhow::anyhow!("listener {i} failed")),
                    _ => Ok(()),
                }
            }
        });
        dispatcher.add_listener(listener).unwrap();
    }

    dispatcher.dispatch(Event::empty("tick"));

    let mut waited = 0;
    while hooks.sources.lock().unwrap().len() < K && waited < 200 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        waited += 1;
    }
    settle().await;

    assert_eq!(completed.load(Ordering::SeqCst), N);
    let mut sources = hooks.sources.lock().unwrap().clone();
    sources.sort();
    assert_eq!(
        sources,
        vec![
            "tick (listener-0)".to_string(),
            "tick (listener-1)".to_string(),
            "tick (listener-2)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_listeners_for_other_events_are_not_invoked() {
    let dispatcher = spawn_dispatcher(Arc::new(RecordingHooks::default()), CancellationToken::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    dispatcher
        .add_listener(Listener::new("a", "count", move |_event, _token| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }))
        .unwrap();

    dispatcher.dispatch(Event::empty("b"));
    dispatcher.dispatch(Event::empty("a"));
    let done = dispatcher.wait_for("a", |_| true, Some(Duration::from_secs(1)));
    dispatcher.dispatch(Event::empty("a"));
    done.await.unwrap();
    settle().await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Wait Registry
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_resolves_and_is_removed() {
    let dispatcher = spawn_dispatcher(Arc::new(RecordingHooks::default()), CancellationToken::new());
    let before = dispatcher.wait_count().await.unwrap();

    let wait = dispatcher.wait_for(
        "x",
        |event| event.resolved_name() == "x" && !event.is_empty(),
        Some(Duration::from_secs(10)),
    );
    assert_eq!(dispatcher.wait_count().await.unwrap(), before + 1);

    dispatcher.dispatch(Event::empty("x"));
    dispatcher.dispatch(Event::raw("X", serde_json::json!({"n": 1})));
    // `raw` events are named `raw_x`, so this one does not match either.
    assert_eq!(dispatcher.wait_count().await.unwrap(), before + 1);

    dispatcher.dispatch(Event::new(
        "x",
        snek_client::EventPayload::Raw(Arc::new(serde_json::json!({"n": 2}))),
    ));
    let event = wait.await.unwrap();
    assert_eq!(event.raw_data().unwrap()["n"], 2);
    assert_eq!(dispatcher.wait_count().await.unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_and_is_removed() {
    let dispatcher = spawn_dispatcher(Arc::new(RecordingHooks::default()), CancellationToken::new());
    let before = dispatcher.wait_count().await.unwrap();

    let wait = dispatcher.wait_for("x", |_| false, Some(Duration::from_secs(3)));
    dispatcher.dispatch(Event::empty("x"));

    let err = wait.await.unwrap_err();
    assert_eq!(err, DispatchError::Timeout { event: "x".to_string() });
    assert_eq!(dispatcher.wait_count().await.unwrap(), before);
}

#[tokio::test(start_paused = true)]
async fn test_wait_dropped_before_timeout_is_removed() {
    let dispatcher = spawn_dispatcher(Arc::new(RecordingHooks::default()), CancellationToken::new());
    let before = dispatcher.wait_count().await.unwrap();

    let wait = dispatcher.wait_for("x", |_| true, Some(Duration::from_secs(60)));
    let unpolled = dispatcher.wait_for("y", |_| true, None);
    assert_eq!(dispatcher.wait_count().await.unwrap(), before + 2);

    tokio::select! {
        _ = wait => panic!("no event was dispatched"),
        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
    }
    drop(unpolled);

    assert_eq!(dispatcher.wait_count().await.unwrap(), before);
    dispatcher.dispatch(Event::empty("x"));
    settle().await;
    assert_eq!(dispatcher.wait_count().await.unwrap(), before);
}

#[tokio::test]
async fn test_two_waits_matching_one_dispatch_both_resolve() {
    let dispatcher = spawn_dispatcher(Arc::new(RecordingHooks::default()), CancellationToken::new());

    let unrelated = dispatcher.wait_for("x", |_| false, None);
    let first = dispatcher.wait_for("x", |_| true, None);
    let second = dispatcher.wait_for("x", |_| true, None);
    let third = dispatcher.wait_for("x", |_| false, Some(Duration::from_millis(50)));

    dispatcher.dispatch(Event::empty("x"));

    assert!(first.await.is_ok());
    assert!(second.await.is_ok());
    assert!(third.await.is_err());
    assert_eq!(dispatcher.wait_count().await.unwrap(), 1);
    drop(unrelated);
}
