//! Integration tests for spawned systems shared between subscribers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feedback_engine::{react, system, FeedbackError, FeedbackLoop, StateStream, System, SystemConfig};
use feedback_streams::testing::{collect_until_idle, DEFAULT_IDLE};
use feedback_streams::FeedbackStreamExt;
use futures::stream::{self, BoxStream};
use futures::StreamExt;

fn append(state: String, suffix: String) -> String {
    state + &suffix
}

fn chain() -> FeedbackLoop<String, String> {
    react(
        |state: &String| match state.as_str() {
            "initial" => Some("_a".to_string()),
            "initial_a" => Some("_b".to_string()),
            "initial_a_b" => Some("_c".to_string()),
            _ => None,
        },
        |suffix: String| stream::iter(vec![suffix]),
    )
}

struct DropCounter(Arc<AtomicUsize>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn never_with_guard(drops: Arc<AtomicUsize>) -> FeedbackLoop<String, String> {
    FeedbackLoop::new(move |_states: StateStream<String>| -> BoxStream<'static, String> {
        let guard = DropCounter(Arc::clone(&drops));
        stream::pending::<String>()
            .map(move |event| {
                let _held = &guard;
                event
            })
            .boxed()
    })
}

/// Answers every state with the next number, immediately and forever.
fn endless_counter(drops: Arc<AtomicUsize>) -> FeedbackLoop<u64, u64> {
    FeedbackLoop::new(move |states: StateStream<u64>| {
        let guard = DropCounter(Arc::clone(&drops));
        states.switch_map(move |n| {
            let _held = &guard;
            stream::iter(vec![n + 1]).boxed()
        })
    })
    .named("endless")
}

// =========================================================================
// Tests
// =========================================================================

#[test]
fn spawning_outside_a_runtime_fails() {
    let states = system("initial".to_string(), append, [chain()]);

    let result = states.spawn();

    assert!(matches!(result, Err(FeedbackError::NoRuntime)));
}

#[tokio::test]
async fn every_subscriber_sees_the_whole_run() {
    let shared = system("initial".to_string(), append, [chain()])
        .spawn()
        .unwrap();
    let first = shared.subscribe();
    let second = shared.subscribe();

    let (a, b) = tokio::join!(
        collect_until_idle(first, DEFAULT_IDLE),
        collect_until_idle(second, DEFAULT_IDLE),
    );

    let expected = vec!["initial", "initial_a", "initial_a_b", "initial_a_b_c"];
    assert_eq!(a, expected);
    assert_eq!(b, expected);
}

#[tokio::test]
async fn late_subscriber_starts_from_latest_state() {
    let shared = system("initial".to_string(), append, [chain()])
        .spawn()
        .unwrap();
    let early = collect_until_idle(shared.subscribe(), DEFAULT_IDLE).await;
    assert_eq!(early.len(), 4);

    let mut late = shared.subscribe();
    assert_eq!(late.next().await.as_deref(), Some("initial_a_b_c"));
    assert_eq!(shared.latest(), "initial_a_b_c");
}

#[tokio::test]
async fn last_subscriber_leaving_tears_the_system_down() {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared = system(
        "initial".to_string(),
        append,
        [never_with_guard(Arc::clone(&drops))],
    )
    .spawn()
    .unwrap();

    let mut subscription = shared.subscribe();
    drop(shared);
    assert_eq!(subscription.next().await.as_deref(), Some("initial"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(drops.load(Ordering::SeqCst), 0, "still subscribed");

    drop(subscription);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn bounded_shared_system_completes_its_subscribers() {
    let config = SystemConfig::new("bounded-shared").with_max_transitions(1);
    let shared = System::with_config(config, "initial".to_string(), append, [chain()])
        .spawn()
        .unwrap();

    let seen: Vec<String> = shared.subscribe().collect().await;

    assert_eq!(seen, vec!["initial", "initial_a"]);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(shared.is_finished());
}

#[tokio::test]
async fn busy_system_still_lets_subscribers_run_and_tear_it_down() {
    let drops = Arc::new(AtomicUsize::new(0));
    let shared = system(
        0u64,
        |_old: u64, new: u64| new,
        [endless_counter(Arc::clone(&drops))],
    )
    .spawn()
    .unwrap();

    let mut subscription = shared.subscribe();
    let mut first = Vec::new();
    for _ in 0..5 {
        first.extend(subscription.next().await);
    }
    assert_eq!(first, vec![0, 1, 2, 3, 4]);

    drop(subscription);
    drop(shared);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(drops.load(Ordering::SeqCst), 1);
}
