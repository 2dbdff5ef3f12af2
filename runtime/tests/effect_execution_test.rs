//! Integration tests for effect execution in the Store runtime
//!
//! Tests run on a paused tokio clock so delays only elapse when the test
//! advances time.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use cart_sync_core::effect::{Effect, EffectId};
use cart_sync_core::{reducer::Reducer, smallvec, SmallVec};
use cart_sync_runtime::{Store, StoreError, wait_for_action};
use futures::stream;
use std::time::Duration;

const TIMER: EffectId = EffectId::from_static("timer");
const FEED: EffectId = EffectId::from_static("feed");

#[derive(Clone, Debug, Default, PartialEq)]
struct TestState {
    received: Vec<String>,
    fired: u32,
}

#[derive(Clone, Debug, PartialEq)]
enum TestAction {
    StartStream { items: Vec<String> },
    StartFeed,
    StopFeed,
    Item { text: String },
    Restart,
    Cancel,
    Fired,
    Both,
}

#[derive(Clone)]
struct TestReducer;

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::StartStream { items } => smallvec![Effect::Stream(Box::pin(
                stream::iter(items.into_iter().map(|text| TestAction::Item { text }))
            ))],
            TestAction::StartFeed => smallvec![
                Effect::Stream(Box::pin(stream::pending::<TestAction>())).cancellable(FEED)
            ],
            TestAction::StopFeed => smallvec![Effect::Cancel(FEED)],
            TestAction::Item { text } => {
                state.received.push(text);
                smallvec![Effect::None]
            },
            TestAction::Restart => smallvec![Effect::Delay {
                duration: Duration::from_millis(100),
                action: Box::new(TestAction::Fired),
            }
            .cancellable(TIMER)],
            TestAction::Cancel => smallvec![Effect::Cancel(TIMER)],
            TestAction::Fired => {
                state.fired += 1;
                smallvec![Effect::None]
            },
            TestAction::Both => smallvec![
                Effect::Sequential(vec![
                    Effect::Future(Box::pin(async {
                        Some(TestAction::Item {
                            text: "first".to_string(),
                        })
                    })),
                    Effect::Future(Box::pin(async {
                        Some(TestAction::Item {
                            text: "second".to_string(),
                        })
                    })),
                ])
            ],
        }
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn stream_items_are_fed_back_in_order() {
    let store = Store::new(TestState::default(), TestReducer, ());

    let mut handle = store
        .send(TestAction::StartStream {
            items: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        })
        .await
        .unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();

    let received = store.state(|s| s.received.clone()).await;
    assert_eq!(received, vec!["a", "b", "c"]);
}

#[tokio::test(start_paused = true)]
async fn sequential_effects_run_in_order() {
    let store = Store::new(TestState::default(), TestReducer, ());

    let mut handle = store.send(TestAction::Both).await.unwrap();
    handle
        .wait_with_timeout(Duration::from_secs(1))
        .await
        .unwrap();

    let received = store.state(|s| s.received.clone()).await;
    assert_eq!(received, vec!["first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn restarting_a_cancellable_delay_debounces_it() {
    let store = Store::new(TestState::default(), TestReducer, ());

    store.send(TestAction::Restart).await.unwrap();
    settle().await;
    tokio::time::advance(Duration::from_millis(60)).await;
    settle().await;
    store.send(TestAction::Restart).await.unwrap();
    settle().await;
    tokio::time::advance(Duration::from_millis(60)).await;
    settle().await;
    store.send(TestAction::Restart).await.unwrap();
    settle().await;

    // 120ms after the first start, nothing has fired yet
    assert_eq!(store.state(|s| s.fired).await, 0);
    assert!(store.is_running(&TIMER));

    tokio::time::advance(Duration::from_millis(99)).await;
    settle().await;
    assert_eq!(store.state(|s| s.fired).await, 0);

    tokio::time::advance(Duration::from_millis(2)).await;
    settle().await;

    assert_eq!(store.state(|s| s.fired).await, 1);
    assert!(!store.is_running(&TIMER));
}

#[tokio::test(start_paused = true)]
async fn cancelled_delay_never_fires() {
    let store = Store::new(TestState::default(), TestReducer, ());

    store.send(TestAction::Restart).await.unwrap();
    settle().await;
    store.send(TestAction::Cancel).await.unwrap();
    settle().await;

    tokio::time::advance(Duration::from_secs(5)).await;
    settle().await;

    assert_eq!(store.state(|s| s.fired).await, 0);
    assert!(!store.is_running(&TIMER));
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_a_long_lived_stream() {
    let store = Store::new(TestState::default(), TestReducer, ());

    store.send(TestAction::StartFeed).await.unwrap();
    settle().await;
    assert!(store.is_running(&FEED));

    store.send(TestAction::StopFeed).await.unwrap();
    settle().await;
    assert!(!store.is_running(&FEED));
}

#[tokio::test(start_paused = true)]
async fn feedback_actions_are_broadcast() {
    let store = Store::new(TestState::default(), TestReducer, ());
    let mut rx = store.subscribe_actions();

    store.send(TestAction::Restart).await.unwrap();
    settle().await;
    tokio::time::advance(Duration::from_millis(101)).await;

    let action = wait_for_action(
        &mut rx,
        |a| matches!(a, TestAction::Fired),
        Duration::from_secs(1),
    )
    .await
    .unwrap();
    assert_eq!(action, TestAction::Fired);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_running_effects_and_rejects_actions() {
    let store = Store::new(TestState::default(), TestReducer, ());

    store.send(TestAction::StartFeed).await.unwrap();
    store.send(TestAction::Restart).await.unwrap();
    settle().await;

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    let result = store.send(TestAction::Restart).await;
    assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    assert!(!store.is_running(&FEED));
    assert_eq!(store.state(|s| s.fired).await, 0);
}
