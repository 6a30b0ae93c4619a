//! Request/response exchanges over real TCP connections.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::arithmetic_side_effects)]

use flowtest_protocol::{ControlRequest, ControlResponse, FrameTransport, Status, TransportError};
use proptest::prelude::*;
use tokio::net::TcpListener;

async fn listener() -> TcpListener {
    TcpListener::bind("127.0.0.1:0").await.expect("bind should succeed")
}

#[tokio::test]
async fn test_request_response_over_tcp() {
    let listener = listener().await;
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FrameTransport::new(stream);
        let request: ControlRequest = transport.recv().await.unwrap();
        let response = match request {
            ControlRequest::WaitForIdleState { timeout_millis } => ControlResponse::Failed(
                Status::deadline_exceeded(format!("not idle within {timeout_millis} ms")),
            ),
            other => ControlResponse::Failed(Status::invalid_argument(other.operation())),
        };
        transport.send(&response).await.unwrap();
    });

    let mut client = FrameTransport::connect(address).await.unwrap();
    client
        .send(&ControlRequest::WaitForIdleState { timeout_millis: 25 })
        .await
        .unwrap();
    let response: ControlResponse = client.recv().await.unwrap();

    assert_eq!(
        response,
        ControlResponse::Failed(Status::deadline_exceeded("not idle within 25 ms"))
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_streamed_records_arrive_in_order() {
    let listener = listener().await;
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut transport = FrameTransport::new(stream);
        let _: ControlRequest = transport.recv().await.unwrap();
        for position in 1..=3 {
            transport
                .send(&ControlResponse::Record(format!("{{\"position\":{position}}}")))
                .await
                .unwrap();
        }
        transport
            .send(&ControlResponse::EndOfRecords { count: 3 })
            .await
            .unwrap();
    });

    let mut client = FrameTransport::connect(address).await.unwrap();
    client.send(&ControlRequest::GetRecords).await.unwrap();

    let mut payloads = Vec::new();
    loop {
        match client.recv::<ControlResponse>().await.unwrap() {
            ControlResponse::Record(payload) => payloads.push(payload),
            ControlResponse::EndOfRecords { count } => {
                assert_eq!(count, 3);
                break;
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
    assert_eq!(payloads[2], "{\"position\":3}");
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_to_closed_port_fails() {
    let address = {
        let listener = listener().await;
        listener.local_addr().unwrap()
    };

    let result = FrameTransport::connect(address).await;
    assert!(matches!(result, Err(TransportError::ConnectFailed { .. })));
}

proptest! {
    /// Property: any sequence of payloads sent on one side arrives unchanged
    /// and in order on the other.
    #[test]
    fn prop_frames_preserve_order_and_content(
        payloads in prop::collection::vec(".{0,64}", 1..20),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let received = runtime.block_on(async {
            let (mut client, mut server) = FrameTransport::pair();
            for payload in &payloads {
                client.send(&ControlResponse::Record(payload.clone())).await.unwrap();
            }
            let mut received = Vec::new();
            for _ in 0..payloads.len() {
                match server.recv::<ControlResponse>().await.unwrap() {
                    ControlResponse::Record(payload) => received.push(payload),
                    other => panic!("unexpected response {other:?}"),
                }
            }
            received
        });

        prop_assert_eq!(received, payloads);
    }
}
