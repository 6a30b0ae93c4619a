//! Engine control service: the engine's lifecycle and synchronization
//! operations as control plane requests.
//!
//! The service owns the current engine and one record cursor over its log.
//! Lifecycle changes (`startEngine`, `resetEngine`) and cursor updates are
//! serialized by one lock. The current engine is published through a watch
//! channel, so time queries and waits never queue behind a start or reset.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use flowtest_engine::{EngineConfig, EngineError, EngineFactory, EngineRuntime, InMemoryEngineFactory};
use flowtest_protocol::{ControlRequest, ControlResponse, Status};
use flowtest_records::{Record, RecordLog, RecordStreamCursor, codec};
use tokio::sync::{Mutex, watch};

/// Result of one control operation as seen by the caller.
pub type StatusResult<T> = std::result::Result<T, Status>;

/// Records read from the cursor but not yet marked as delivered.
#[derive(Debug, Clone)]
pub struct PendingRecords {
    log: RecordLog,
    records: Vec<Arc<Record>>,
}

impl PendingRecords {
    #[must_use]
    pub fn records(&self) -> &[Arc<Record>] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Arc<Record>> {
        self.records
    }

    fn last_position(&self) -> Option<u64> {
        self.records.last().map(|record| record.position)
    }
}

/// Answer to one control request.
///
/// Records streamed by a `GetRecords` answer stay undelivered until the
/// client confirms them and the reply is passed back to
/// [`EngineControlService::complete`].
#[derive(Debug)]
pub struct Reply {
    responses: Vec<ControlResponse>,
    pending: Option<PendingRecords>,
}

impl Reply {
    fn single(response: ControlResponse) -> Self {
        Self {
            responses: vec![response],
            pending: None,
        }
    }

    #[must_use]
    pub fn responses(&self) -> &[ControlResponse] {
        &self.responses
    }

    /// Number of streamed records the client must confirm, if this reply is
    /// a record stream.
    #[must_use]
    pub fn records_to_confirm(&self) -> Option<u64> {
        self.pending
            .as_ref()
            .map(|pending| u64::try_from(pending.records.len()).unwrap_or(u64::MAX))
    }
}

/// Control plane over one engine at a time.
pub struct EngineControlService {
    factory: Arc<dyn EngineFactory>,
    config: EngineConfig,
    engine: watch::Sender<Arc<dyn EngineRuntime>>,
    cursor: Mutex<RecordStreamCursor>,
}

impl fmt::Debug for EngineControlService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineControlService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineControlService {
    /// A service over a new, stopped engine built by `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn EngineFactory>, config: EngineConfig) -> Self {
        let engine = factory.create(&config);
        let cursor = engine.record_log().cursor();
        Self {
            factory,
            config,
            engine: watch::Sender::new(engine),
            cursor: Mutex::new(cursor),
        }
    }

    /// A service over in-memory engines.
    #[must_use]
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Arc::new(InMemoryEngineFactory), config)
    }

    /// The engine currently under control.
    #[must_use]
    pub fn engine(&self) -> Arc<dyn EngineRuntime> {
        Arc::clone(&self.engine.borrow())
    }

    /// Start the engine. Starting a running engine does nothing.
    ///
    /// # Errors
    /// Returns a failed [`Status`] if the engine cannot be started.
    pub async fn start_engine(&self) -> StatusResult<()> {
        let mut cursor = self.cursor.lock().await;
        let engine = self.engine();
        engine.start().await.map_err(status_for)?;

        let log = engine.record_log();
        if !cursor.is_bound_to(&log) {
            *cursor = log.cursor();
        }
        Ok(())
    }

    /// Stop the engine, releasing every outstanding wait with an error.
    ///
    /// # Errors
    /// Returns [`StatusCode::Internal`](flowtest_protocol::StatusCode::Internal)
    /// if the engine did not stop cleanly.
    pub async fn stop_engine(&self) -> StatusResult<()> {
        self.engine().stop().await.map_err(status_for)
    }

    /// Replace the engine with a new, stopped one built from the same
    /// configuration. Records of the old engine are no longer reachable.
    ///
    /// A failure to stop the old engine is logged and does not prevent the
    /// replacement.
    pub async fn reset_engine(&self) {
        let mut cursor = self.cursor.lock().await;
        if let Err(e) = self.engine().stop().await {
            tracing::warn!(error = %e, "Failed to stop engine during reset");
        }
        let engine = self.factory.create(&self.config);
        *cursor = engine.record_log().cursor();
        self.engine.send_replace(engine);
        tracing::info!("Engine reset");
    }

    /// Advance the virtual clock by `milliseconds`.
    ///
    /// # Errors
    /// Returns [`StatusCode::InvalidArgument`](flowtest_protocol::StatusCode::InvalidArgument)
    /// if the clock would overflow.
    pub async fn increase_time(&self, milliseconds: u64) -> StatusResult<()> {
        self.engine()
            .increase_time(Duration::from_millis(milliseconds))
            .await
            .map_err(status_for)
    }

    /// Current virtual time in milliseconds since the Unix epoch.
    ///
    /// # Errors
    /// Returns a failed [`Status`] if the engine cannot report its time.
    pub async fn get_time(&self) -> StatusResult<i64> {
        let now = self.engine().get_time().await.map_err(status_for)?;
        Ok(now.timestamp_millis())
    }

    /// Wait until the engine is idle.
    ///
    /// # Errors
    /// - [`StatusCode::DeadlineExceeded`](flowtest_protocol::StatusCode::DeadlineExceeded) on timeout
    /// - [`StatusCode::Internal`](flowtest_protocol::StatusCode::Internal) if the engine stopped
    pub async fn wait_for_idle_state(&self, timeout_millis: u64) -> StatusResult<()> {
        let engine = self.engine();
        engine
            .wait_for_idle_state(Duration::from_millis(timeout_millis))
            .await
            .map_err(|e| match e {
                EngineError::Timeout { timeout, .. } => Status::deadline_exceeded(format!(
                    "Engine has not reached idle state within specified timeout of {} ms",
                    timeout.as_millis()
                )),
                other => status_for(other),
            })
    }

    /// Wait until the engine has begun processing new work.
    ///
    /// # Errors
    /// - [`StatusCode::DeadlineExceeded`](flowtest_protocol::StatusCode::DeadlineExceeded) on timeout
    /// - [`StatusCode::Internal`](flowtest_protocol::StatusCode::Internal) if the engine stopped
    pub async fn wait_for_busy_state(&self, timeout_millis: u64) -> StatusResult<()> {
        let engine = self.engine();
        engine
            .wait_for_busy_state(Duration::from_millis(timeout_millis))
            .await
            .map_err(|e| match e {
                EngineError::Timeout { timeout, .. } => Status::deadline_exceeded(format!(
                    "Engine has not started processing within specified timeout of {} ms",
                    timeout.as_millis()
                )),
                other => status_for(other),
            })
    }

    /// Records appended since the previous call.
    pub async fn get_records(&self) -> Vec<Arc<Record>> {
        let pending = self.pending_records().await;
        self.commit_records(&pending).await;
        pending.into_records()
    }

    /// Records appended since the last commit. Until they are committed,
    /// the next call returns them again.
    pub async fn pending_records(&self) -> PendingRecords {
        let cursor = self.cursor.lock().await;
        PendingRecords {
            log: cursor.log().clone(),
            records: cursor.pending(),
        }
    }

    /// Mark `pending` as delivered. Records of an engine that has since been
    /// reset are ignored.
    pub async fn commit_records(&self, pending: &PendingRecords) {
        let Some(last) = pending.last_position() else {
            return;
        };
        let mut cursor = self.cursor.lock().await;
        if cursor.is_bound_to(&pending.log) {
            cursor.commit(last);
        } else {
            tracing::debug!("Discarding delivery for a replaced engine");
        }
    }

    /// Answer one request. `GetRecords` yields one response per record
    /// followed by [`ControlResponse::EndOfRecords`]; every other request
    /// yields exactly one response.
    pub async fn handle(&self, request: ControlRequest) -> Reply {
        tracing::debug!(operation = request.operation(), "Control request");

        let outcome = match request {
            ControlRequest::StartEngine => self.start_engine().await.map(|()| ControlResponse::Ack),
            ControlRequest::StopEngine => self.stop_engine().await.map(|()| ControlResponse::Ack),
            ControlRequest::ResetEngine => {
                self.reset_engine().await;
                Ok(ControlResponse::Ack)
            }
            ControlRequest::IncreaseTime { milliseconds } => self
                .increase_time(milliseconds)
                .await
                .map(|()| ControlResponse::Ack),
            ControlRequest::GetTime => self
                .get_time()
                .await
                .map(|epoch_millis| ControlResponse::Time { epoch_millis }),
            ControlRequest::WaitForIdleState { timeout_millis } => self
                .wait_for_idle_state(timeout_millis)
                .await
                .map(|()| ControlResponse::Ack),
            ControlRequest::WaitForBusyState { timeout_millis } => self
                .wait_for_busy_state(timeout_millis)
                .await
                .map(|()| ControlResponse::Ack),
            ControlRequest::GetRecords => return self.record_stream().await,
        };

        match outcome {
            Ok(response) => Reply::single(response),
            Err(status) => {
                tracing::debug!(operation = request.operation(), %status, "Control request failed");
                Reply::single(ControlResponse::Failed(status))
            }
        }
    }

    /// Finish a reply once every response reached the caller.
    pub async fn complete(&self, reply: Reply) {
        if let Some(pending) = reply.pending {
            self.commit_records(&pending).await;
        }
    }

    /// Stop the current engine for good.
    ///
    /// # Errors
    /// Returns a failed [`Status`] if the engine did not stop cleanly.
    pub async fn shutdown(&self) -> StatusResult<()> {
        self.stop_engine().await
    }

    async fn record_stream(&self) -> Reply {
        let pending = self.pending_records().await;
        let count = u64::try_from(pending.records.len()).unwrap_or(u64::MAX);

        let encoded: Result<Vec<ControlResponse>, _> = pending
            .records
            .iter()
            .map(|record| codec::encode(record).map(ControlResponse::Record))
            .collect();

        match encoded {
            Ok(mut responses) => {
                responses.push(ControlResponse::EndOfRecords { count });
                Reply {
                    responses,
                    pending: Some(pending),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode records");
                Reply::single(ControlResponse::Failed(Status::internal(e.to_string())))
            }
        }
    }
}

fn status_for(error: EngineError) -> Status {
    match error {
        EngineError::Timeout { .. } => Status::deadline_exceeded(error.to_string()),
        EngineError::InvalidArgument { reason } => Status::invalid_argument(reason),
        EngineError::NotRunning => Status::unavailable(error.to_string()),
        EngineError::Remote { code, message } => Status::new(code, message),
        other => Status::internal(other.to_string()),
    }
}
