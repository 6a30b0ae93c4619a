//! Remote proxy for an engine behind a control service.
//!
//! Every operation opens its own connection, sends one request, reads the
//! answer and closes the connection. Failed waits come back as the same
//! [`EngineError::Timeout`] and [`EngineError::Interrupted`] an in-process
//! engine produces.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtest_engine::{EngineError, Result, TestEngine};
use flowtest_protocol::{
    ControlRequest, ControlResponse, FrameTransport, RecordsReceived, Status, StatusCode,
    TransportError,
};
use flowtest_records::{Record, codec};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// An engine reached through its control service.
#[derive(Debug)]
pub struct RemoteEngine {
    control_address: SocketAddr,
    gateway_address: SocketAddr,
    /// Every record delivered so far, in order.
    received: Mutex<Vec<Record>>,
}

impl RemoteEngine {
    #[must_use]
    pub fn new(control_address: SocketAddr, gateway_address: SocketAddr) -> Self {
        Self {
            control_address,
            gateway_address,
            received: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn control_address(&self) -> SocketAddr {
        self.control_address
    }

    /// Replace the remote engine with a new, stopped one. Records received
    /// from the old engine are discarded.
    ///
    /// # Errors
    /// Returns [`EngineError::Transport`] on connection failures.
    pub async fn reset(&self) -> Result<()> {
        let mut received = self.received.lock().await;
        self.acknowledge(ControlRequest::ResetEngine).await?;
        received.clear();
        Ok(())
    }

    /// Records the engine appended since the previous call.
    ///
    /// The whole call fails if any payload does not decode, and nothing is
    /// added to [`records`](TestEngine::records) in that case. Records are
    /// confirmed to the service only after every payload decoded, so a failed
    /// or abandoned call leaves them to be delivered again.
    ///
    /// # Errors
    /// - [`EngineError::MalformedRecord`] if a payload does not decode
    /// - [`EngineError::Transport`] on connection failures
    pub async fn get_records(&self) -> Result<Vec<Record>> {
        let mut received = self.received.lock().await;

        let mut transport = self.open(ControlRequest::GetRecords).await?;
        let mut delta = Vec::new();
        loop {
            match transport.recv::<ControlResponse>().await? {
                ControlResponse::Record(payload) => delta.push(codec::decode(&payload)?),
                ControlResponse::EndOfRecords { .. } => break,
                ControlResponse::Failed(status) => {
                    return Err(EngineError::remote(status.code, status.message));
                }
                other => {
                    return Err(TransportError::unexpected_message("Record", other).into());
                }
            }
        }

        let count = u64::try_from(delta.len()).unwrap_or(u64::MAX);
        transport.send(&RecordsReceived { count }).await?;
        match transport.recv::<ControlResponse>().await? {
            ControlResponse::Ack => {}
            ControlResponse::Failed(status) => {
                return Err(EngineError::remote(status.code, status.message));
            }
            other => return Err(TransportError::unexpected_message("Ack", other).into()),
        }
        if let Err(e) = transport.shutdown().await {
            tracing::trace!(error = %e, "Control connection shutdown failed");
        }

        tracing::debug!(received = delta.len(), "Records received");
        received.extend(delta.iter().cloned());
        Ok(delta)
    }

    async fn open(&self, request: ControlRequest) -> Result<FrameTransport<TcpStream>> {
        let mut transport = FrameTransport::connect(self.control_address).await?;
        transport.send(&request).await?;
        Ok(transport)
    }

    /// Send `request` and read its single response.
    async fn call(&self, request: ControlRequest) -> Result<std::result::Result<ControlResponse, Status>> {
        let mut transport = self.open(request).await?;
        let response = transport.recv::<ControlResponse>().await?;
        if let Err(e) = transport.shutdown().await {
            tracing::trace!(error = %e, "Control connection shutdown failed");
        }
        Ok(match response {
            ControlResponse::Failed(status) => Err(status),
            response => Ok(response),
        })
    }

    async fn acknowledge(&self, request: ControlRequest) -> Result<()> {
        match self.call(request).await? {
            Ok(ControlResponse::Ack) => Ok(()),
            Ok(other) => Err(TransportError::unexpected_message("Ack", other).into()),
            Err(status) => Err(EngineError::remote(status.code, status.message)),
        }
    }

    async fn wait(&self, request: ControlRequest, timeout: Duration) -> Result<()> {
        match self.call(request).await? {
            Ok(ControlResponse::Ack) => Ok(()),
            Ok(other) => Err(TransportError::unexpected_message("Ack", other).into()),
            Err(status) => Err(wait_error(request.operation(), timeout, status)),
        }
    }
}

#[async_trait]
impl TestEngine for RemoteEngine {
    async fn start(&self) -> Result<()> {
        self.acknowledge(ControlRequest::StartEngine).await
    }

    async fn stop(&self) -> Result<()> {
        self.acknowledge(ControlRequest::StopEngine).await
    }

    async fn increase_time(&self, by: Duration) -> Result<()> {
        let milliseconds = u64::try_from(by.as_millis())
            .map_err(|_| EngineError::invalid_argument(format!("{by:?} does not fit in u64 milliseconds")))?;
        self.acknowledge(ControlRequest::IncreaseTime { milliseconds }).await
    }

    async fn get_time(&self) -> Result<DateTime<Utc>> {
        match self.call(ControlRequest::GetTime).await? {
            Ok(ControlResponse::Time { epoch_millis }) => DateTime::from_timestamp_millis(epoch_millis)
                .ok_or_else(|| {
                    EngineError::remote(
                        StatusCode::Internal,
                        format!("virtual time {epoch_millis} is out of range"),
                    )
                }),
            Ok(other) => Err(TransportError::unexpected_message("Time", other).into()),
            Err(status) => Err(EngineError::remote(status.code, status.message)),
        }
    }

    async fn wait_for_idle_state(&self, timeout: Duration) -> Result<()> {
        let timeout_millis = saturating_millis(timeout);
        self.wait(ControlRequest::WaitForIdleState { timeout_millis }, timeout)
            .await
    }

    async fn wait_for_busy_state(&self, timeout: Duration) -> Result<()> {
        let timeout_millis = saturating_millis(timeout);
        self.wait(ControlRequest::WaitForBusyState { timeout_millis }, timeout)
            .await
    }

    /// Fetches the latest delta, then returns everything received so far.
    async fn records(&self) -> Result<Vec<Record>> {
        self.get_records().await?;
        Ok(self.received.lock().await.clone())
    }

    fn gateway_address(&self) -> SocketAddr {
        self.gateway_address
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn wait_error(operation: &'static str, timeout: Duration, status: Status) -> EngineError {
    match status.code {
        StatusCode::DeadlineExceeded => EngineError::timeout(operation, timeout),
        StatusCode::Internal => EngineError::interrupted(status.message),
        code => EngineError::remote(code, status.message),
    }
}
