//! A remote engine driven through a loopback control server.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use flowtest_control::{ControlServer, EngineControlService, RemoteEngine};
use flowtest_engine::{EngineConfig, EngineError, GatewayClient, TestEngine};
use flowtest_protocol::{ControlRequest, ControlResponse, FrameTransport, RecordsReceived};
use flowtest_records::{Intent, TimerValue, ValueType};
use tokio::net::TcpListener;

const DAY_MS: i64 = 86_400_000;

struct Harness {
    service: Arc<EngineControlService>,
    server: ControlServer,
    engine: RemoteEngine,
}

impl Harness {
    async fn new() -> Self {
        let config =
            EngineConfig::ephemeral().with_clock_origin(DateTime::from_timestamp_millis(0).unwrap());
        let service = Arc::new(EngineControlService::in_memory(config.clone()));
        let server = ControlServer::bind(
            SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            Arc::clone(&service),
        )
        .await
        .unwrap();
        let engine = RemoteEngine::new(server.local_addr(), config.gateway_address);
        Self {
            service,
            server,
            engine,
        }
    }

    async fn gateway(&self) -> GatewayClient {
        let address = self.service.engine().gateway_address();
        GatewayClient::connect(address).await.unwrap()
    }

    async fn create_timer(&self, due_date: i64) -> i64 {
        self.gateway()
            .await
            .create_timer(TimerValue {
                target_element_id: "timer".to_string(),
                due_date,
                ..TimerValue::default()
            })
            .await
            .unwrap()
    }

    async fn close(self) {
        self.engine.stop().await.unwrap();
        self.server.shutdown().await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_day_timer_triggers_exactly_once() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();

    let now = harness.engine.get_time().await.unwrap().timestamp_millis();
    let key = harness.create_timer(now + DAY_MS).await;

    harness
        .engine
        .increase_time(Duration::from_millis(86_400_001))
        .await
        .unwrap();
    harness
        .engine
        .wait_for_idle_state(Duration::from_millis(1_000))
        .await
        .unwrap();

    let records = harness.engine.get_records().await.unwrap();
    let triggered: Vec<_> = records
        .iter()
        .filter(|r| r.is_event() && r.value_type == ValueType::Timer && r.intent == Intent::Triggered)
        .collect();
    assert_eq!(triggered.len(), 1);
    assert_eq!(triggered[0].key, key);

    harness.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_get_records_returns_only_the_delta() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();

    harness.create_timer(DAY_MS).await;
    let first = harness.engine.get_records().await.unwrap();
    assert_eq!(first.len(), 2);
    assert!(harness.engine.get_records().await.unwrap().is_empty());

    harness.create_timer(2 * DAY_MS).await;
    let second = harness.engine.get_records().await.unwrap();
    assert_eq!(second.len(), 2);
    assert!(second[0].position > first[1].position);

    let all = harness.engine.records().await.unwrap();
    let positions: Vec<u64> = all.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);

    harness.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_read_leaves_records_for_the_next_call() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();
    harness.create_timer(DAY_MS).await;

    // read the whole stream, then hang up without confirming it
    {
        let mut transport = FrameTransport::connect(harness.engine.control_address())
            .await
            .unwrap();
        transport.send(&ControlRequest::GetRecords).await.unwrap();
        let mut streamed = 0;
        loop {
            match transport.recv::<ControlResponse>().await.unwrap() {
                ControlResponse::Record(_) => streamed += 1,
                ControlResponse::EndOfRecords { count } => {
                    assert_eq!(count, 2);
                    break;
                }
                other => panic!("unexpected response {other:?}"),
            }
        }
        assert_eq!(streamed, 2);
    }

    let records = harness.engine.get_records().await.unwrap();
    let positions: Vec<u64> = records.iter().map(|r| r.position).collect();
    assert_eq!(positions, vec![1, 2]);
    assert!(harness.engine.get_records().await.unwrap().is_empty());

    harness.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reset_drops_records_of_the_old_engine() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();
    harness.create_timer(DAY_MS).await;
    assert_eq!(harness.engine.records().await.unwrap().len(), 2);

    harness.engine.reset().await.unwrap();
    assert!(harness.engine.records().await.unwrap().is_empty());

    // the new engine starts stopped
    let err = harness
        .engine
        .wait_for_idle_state(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_interrupted());

    harness.engine.start().await.unwrap();
    harness.create_timer(DAY_MS).await;
    let records = harness.engine.get_records().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].position, 1);

    harness.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_releases_an_outstanding_wait() {
    let harness = Arc::new(Harness::new().await);
    harness.engine.start().await.unwrap();

    let waiter = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .engine
                .wait_for_busy_state(Duration::from_secs(60))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.engine.stop().await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter must not hang")
        .unwrap();
    assert!(result.unwrap_err().is_interrupted());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_busy_with_zero_timeout_is_a_timeout() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();

    let err = harness
        .engine
        .wait_for_busy_state(Duration::ZERO)
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::Timeout {
                operation: "waitForBusyState",
                ..
            }
        ),
        "expected timeout, got {err:?}"
    );

    harness.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_busy_observes_increase_time_from_another_client() {
    let harness = Arc::new(Harness::new().await);
    harness.engine.start().await.unwrap();

    let waiter = {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .engine
                .wait_for_busy_state(Duration::from_secs(5))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness
        .engine
        .increase_time(Duration::from_millis(1))
        .await
        .unwrap();

    waiter.await.unwrap().unwrap();
    harness.engine.stop().await.unwrap();
}

#[tokio::test]
async fn test_increase_time_is_additive() {
    let harness = Harness::new().await;
    harness.engine.start().await.unwrap();

    harness
        .engine
        .increase_time(Duration::from_millis(400))
        .await
        .unwrap();
    harness
        .engine
        .increase_time(Duration::from_millis(600))
        .await
        .unwrap();
    assert_eq!(
        harness.engine.get_time().await.unwrap().timestamp_millis(),
        1_000
    );

    harness.close().await;
}

#[tokio::test]
async fn test_malformed_payload_fails_the_whole_call() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let fake = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FrameTransport::new(stream);
        let request: ControlRequest = transport.recv().await.unwrap();
        assert_eq!(request, ControlRequest::GetRecords);
        transport
            .send(&ControlResponse::Record("{not a record".to_string()))
            .await
            .unwrap();
        let _ = transport
            .send(&ControlResponse::EndOfRecords { count: 1 })
            .await;
        let receipt = transport.recv::<RecordsReceived>().await;
        assert!(receipt.is_err(), "malformed records must not be confirmed");
    });

    let engine = RemoteEngine::new(address, address);
    let err = engine.get_records().await.unwrap_err();
    assert!(matches!(err, EngineError::MalformedRecord(_)), "got {err:?}");
    fake.await.unwrap();
}
