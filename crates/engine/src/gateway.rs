//! Command gateway: the endpoint test code sends commands to.
//!
//! The server is bound when the engine starts and released when it stops.
//! A connection carries any number of request/response exchanges.

use std::net::SocketAddr;

use flowtest_protocol::{FrameTransport, GatewayRequest, GatewayResponse, Status};
use flowtest_records::{Intent, MessageValue, RecordEntry, RecordError, RecordValue, TimerValue};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{EngineError, Result};
use crate::inbox::Inbox;
use crate::processor::CommandOutcome;

/// Running gateway server.
#[derive(Debug)]
pub(crate) struct GatewayServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl GatewayServer {
    /// Bind to `address` and start accepting connections.
    pub(crate) async fn bind(address: SocketAddr, inbox: Inbox) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| EngineError::bind_failed(address, &e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| EngineError::bind_failed(address, &e))?;
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, inbox, stop));

        tracing::debug!(address = %local_addr, "Gateway listening");
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, drop every open connection and release the port.
    pub(crate) async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Gateway task ended abnormally");
        }
        tracing::debug!(address = %self.local_addr, "Gateway closed");
    }
}

async fn accept_loop(listener: TcpListener, inbox: Inbox, mut stop: oneshot::Receiver<()>) {
    // dropping the set aborts every connection
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "Gateway connection accepted");
                    connections.spawn(serve_connection(stream, inbox.clone()));
                }
                Err(e) => tracing::warn!(error = %e, "Gateway accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream, inbox: Inbox) {
    let mut transport = FrameTransport::new(stream);
    loop {
        let request = match transport.recv::<GatewayRequest>().await {
            Ok(request) => request,
            Err(e) if e.is_closed() => return,
            Err(e) => {
                tracing::debug!(error = %e, "Dropping gateway connection");
                return;
            }
        };
        let response = handle(request, &inbox).await;
        if let Err(e) = transport.send(&response).await {
            tracing::debug!(error = %e, "Failed to answer gateway request");
            return;
        }
    }
}

async fn handle(request: GatewayRequest, inbox: &Inbox) -> GatewayResponse {
    let GatewayRequest::ExecuteCommand {
        value_type,
        intent,
        key,
        value,
    } = request;

    let decoded = serde_json::from_str(&value)
        .and_then(|raw| RecordValue::decode(value_type, raw));
    let value = match decoded {
        Ok(value) => value,
        Err(e) => {
            return GatewayResponse::Failed(Status::invalid_argument(format!(
                "command value is not a valid {value_type}: {e}"
            )));
        }
    };

    match inbox.execute(RecordEntry::command(intent, value).with_key(key)).await {
        Ok(CommandOutcome::Accepted { key, value }) => match serde_json::to_string(&value) {
            Ok(value) => GatewayResponse::Accepted { key, value },
            Err(e) => GatewayResponse::Failed(Status::internal(e.to_string())),
        },
        Ok(CommandOutcome::Rejected {
            rejection_type,
            reason,
        }) => GatewayResponse::Rejected {
            rejection_type,
            reason,
        },
        Err(EngineError::NotRunning) => {
            GatewayResponse::Failed(Status::unavailable("engine is not running"))
        }
        Err(e) => GatewayResponse::Failed(Status::internal(e.to_string())),
    }
}

/// Test-side client of the command gateway.
///
/// # Example
/// ```rust,no_run
/// use flowtest_engine::GatewayClient;
/// use flowtest_records::TimerValue;
///
/// # async fn run(address: std::net::SocketAddr) -> flowtest_engine::Result<()> {
/// let mut client = GatewayClient::connect(address).await?;
/// let key = client
///     .create_timer(TimerValue { due_date: 86_400_000, ..TimerValue::default() })
///     .await?;
/// client.cancel_timer(key).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GatewayClient {
    transport: FrameTransport<TcpStream>,
}

impl GatewayClient {
    /// Connect to the gateway at `address`.
    ///
    /// # Errors
    /// Returns [`EngineError::Transport`] if the connection fails.
    pub async fn connect(address: SocketAddr) -> Result<Self> {
        Ok(Self {
            transport: FrameTransport::connect(address).await?,
        })
    }

    /// Send a command and wait for the engine to process it.
    ///
    /// Returns the key of the affected entity and the value of the resulting
    /// event.
    ///
    /// # Errors
    /// - [`EngineError::CommandRejected`] if the engine rejected the command
    /// - [`EngineError::Remote`] if the gateway could not hand it to the engine
    /// - [`EngineError::Transport`] on connection failures
    pub async fn execute_command(
        &mut self,
        intent: Intent,
        key: i64,
        value: &RecordValue,
    ) -> Result<(i64, RecordValue)> {
        let value_type = value.value_type();
        let encoded = serde_json::to_string(value)
            .map_err(|e| EngineError::invalid_argument(e.to_string()))?;

        self.transport
            .send(&GatewayRequest::ExecuteCommand {
                value_type,
                intent,
                key,
                value: encoded,
            })
            .await?;

        match self.transport.recv::<GatewayResponse>().await? {
            GatewayResponse::Accepted { key, value } => {
                let value = serde_json::from_str(&value)
                    .and_then(|raw| RecordValue::decode(value_type, raw))
                    .map_err(|e| RecordError::malformed(e.to_string()))?;
                Ok((key, value))
            }
            GatewayResponse::Rejected {
                rejection_type,
                reason,
            } => Err(EngineError::command_rejected(rejection_type, reason)),
            GatewayResponse::Failed(status) => Err(EngineError::remote(status.code, status.message)),
        }
    }

    /// Schedule a timer. Returns its key.
    ///
    /// # Errors
    /// See [`execute_command`](Self::execute_command).
    pub async fn create_timer(&mut self, timer: TimerValue) -> Result<i64> {
        let (key, _) = self
            .execute_command(Intent::Create, -1, &RecordValue::Timer(timer))
            .await?;
        Ok(key)
    }

    /// Cancel the timer with `key`.
    ///
    /// # Errors
    /// Returns [`EngineError::CommandRejected`] if no such timer exists.
    pub async fn cancel_timer(&mut self, key: i64) -> Result<()> {
        self.execute_command(Intent::Cancel, key, &RecordValue::Timer(TimerValue::default()))
            .await
            .map(|_| ())
    }

    /// Publish a message. Returns its key.
    ///
    /// # Errors
    /// See [`execute_command`](Self::execute_command).
    pub async fn publish_message(&mut self, message: MessageValue) -> Result<i64> {
        let (key, _) = self
            .execute_command(Intent::Publish, -1, &RecordValue::Message(message))
            .await?;
        Ok(key)
    }
}
