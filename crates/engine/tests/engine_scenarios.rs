//! End-to-end scenarios against an in-memory engine and its gateway.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use flowtest_engine::{EngineConfig, EngineError, GatewayClient, InMemoryEngine, TestEngine};
use flowtest_records::{Intent, MessageValue, RecordType, RejectionType, TimerValue, ValueType};
use futures::future::join_all;

const DAY_MS: i64 = 86_400_000;

async fn started_engine() -> Arc<InMemoryEngine> {
    let engine = Arc::new(InMemoryEngine::new(
        EngineConfig::ephemeral().with_clock_origin(DateTime::from_timestamp_millis(0).unwrap()),
    ));
    engine.start().await.unwrap();
    engine
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_day_timer_triggers_exactly_once() {
    let engine = started_engine().await;
    let mut gateway = GatewayClient::connect(engine.gateway_address()).await.unwrap();

    let now = engine.get_time().await.unwrap().timestamp_millis();
    let key = gateway
        .create_timer(TimerValue {
            target_element_id: "wait_a_day".to_string(),
            due_date: now + DAY_MS,
            ..TimerValue::default()
        })
        .await
        .unwrap();

    engine.increase_time(Duration::from_millis(86_400_001)).await.unwrap();
    engine.wait_for_idle_state(Duration::from_millis(1_000)).await.unwrap();

    let records = engine.records().await.unwrap();
    let triggered: Vec<_> = records
        .iter()
        .filter(|r| {
            r.record_type == RecordType::Event
                && r.value_type == ValueType::Timer
                && r.intent == Intent::Triggered
        })
        .collect();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].key, key);

    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timer_not_yet_due_does_not_trigger() {
    let engine = started_engine().await;
    let mut gateway = GatewayClient::connect(engine.gateway_address()).await.unwrap();

    gateway
        .create_timer(TimerValue {
            due_date: DAY_MS,
            ..TimerValue::default()
        })
        .await
        .unwrap();
    engine.increase_time(Duration::from_millis(1_000)).await.unwrap();
    engine.wait_for_idle_state(Duration::from_millis(1_000)).await.unwrap();

    let records = engine.records().await.unwrap();
    assert!(records.iter().all(|r| r.intent != Intent::Triggered));
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_of_unknown_timer_is_rejected() {
    let engine = started_engine().await;
    let mut gateway = GatewayClient::connect(engine.gateway_address()).await.unwrap();

    let err = gateway.cancel_timer(42).await.unwrap_err();
    match err {
        EngineError::CommandRejected { rejection_type, .. } => {
            assert_eq!(rejection_type, RejectionType::NotFound);
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let records = engine.records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records[1].is_rejection());
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_message_expires_after_time_to_live() {
    let engine = started_engine().await;
    let mut gateway = GatewayClient::connect(engine.gateway_address()).await.unwrap();

    gateway
        .publish_message(MessageValue {
            name: "payment_received".to_string(),
            correlation_key: "order-7".to_string(),
            message_id: "m-1".to_string(),
            time_to_live: 60_000,
            ..MessageValue::default()
        })
        .await
        .unwrap();

    engine.increase_time(Duration::from_secs(60)).await.unwrap();
    engine.wait_for_idle_state(Duration::from_millis(1_000)).await.unwrap();

    let expired = engine
        .records()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.is_event() && r.intent == Intent::Expired)
        .count();
    assert_eq!(expired, 1);
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_busy_observes_clock_advance() {
    let engine = started_engine().await;

    let waiter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.wait_for_busy_state(Duration::from_secs(5)).await })
    };
    // give the waiter time to subscribe
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.increase_time(Duration::from_millis(1)).await.unwrap();

    waiter.await.unwrap().unwrap();
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_for_busy_with_zero_timeout_on_idle_engine_times_out() {
    let engine = started_engine().await;

    let err = engine.wait_for_busy_state(Duration::ZERO).await.unwrap_err();
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
    engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_for_idle_on_idle_engine_returns_immediately() {
    let engine = started_engine().await;
    engine.wait_for_idle_state(Duration::ZERO).await.unwrap();
    engine.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_releases_outstanding_idle_waiter() {
    let engine = started_engine().await;
    // work that never completes keeps the engine busy
    engine.monitor().work_enqueued();

    let waiter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.wait_for_idle_state(Duration::from_secs(60)).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter must not hang")
        .unwrap();
    assert!(result.unwrap_err().is_interrupted());
}

#[tokio::test]
async fn test_gateway_is_released_on_stop() {
    let engine = started_engine().await;
    let address = engine.gateway_address();
    engine.stop().await.unwrap();

    let result = GatewayClient::connect(address).await;
    assert!(matches!(result, Err(EngineError::Transport(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_releases_every_waiter() {
    let engine = started_engine().await;
    engine.monitor().work_enqueued();

    let waiters: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                if i % 2 == 0 {
                    engine.wait_for_idle_state(Duration::from_secs(60)).await
                } else {
                    engine.wait_for_busy_state(Duration::from_secs(60)).await
                }
            })
        })
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.stop().await.unwrap();

    let results = tokio::time::timeout(Duration::from_secs(5), join_all(waiters))
        .await
        .expect("waiters must not hang");
    let released = results.into_iter().map(Result::unwrap).collect::<Vec<_>>();
    // busy waiters see the engine already busy and succeed
    assert!(released[0].as_ref().unwrap_err().is_interrupted());
    assert!(released[1].is_ok());
    assert!(released[2].as_ref().unwrap_err().is_interrupted());
    assert!(released[3].is_ok());
}
