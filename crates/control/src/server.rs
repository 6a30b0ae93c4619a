//! TCP endpoint of the control service.
//!
//! Each connection carries exactly one request. The server answers it,
//! streams any records, and closes the connection. Streamed records count as
//! delivered only once the client confirms the whole stream; the server
//! answers the confirmation after the records are marked delivered.

use std::net::SocketAddr;
use std::sync::Arc;

use flowtest_protocol::{ControlRequest, ControlResponse, FrameTransport, RecordsReceived, Status};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::{ControlError, Result};
use crate::service::EngineControlService;

/// Running control server.
#[derive(Debug)]
pub struct ControlServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ControlServer {
    /// Bind to `address` and start serving `service`.
    ///
    /// # Errors
    /// Returns [`ControlError::BindFailed`] if the address cannot be bound.
    pub async fn bind(address: SocketAddr, service: Arc<EngineControlService>) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ControlError::bind_failed(address, &e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ControlError::bind_failed(address, &e))?;
        let (shutdown, stop) = oneshot::channel();
        let task = tokio::spawn(accept_loop(listener, service, stop));

        tracing::info!(address = %local_addr, "Control service listening");
        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and abort requests still in flight.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Control server task ended abnormally");
        }
        tracing::info!(address = %self.local_addr, "Control service closed");
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<EngineControlService>,
    mut stop: oneshot::Receiver<()>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut stop => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::trace!(%peer, "Control connection accepted");
                    connections.spawn(serve_connection(stream, Arc::clone(&service)));
                }
                Err(e) => tracing::warn!(error = %e, "Control accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
}

async fn serve_connection(stream: TcpStream, service: Arc<EngineControlService>) {
    let mut transport = FrameTransport::new(stream);
    let request = match transport.recv::<ControlRequest>().await {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "Dropping control connection");
            return;
        }
    };

    let reply = service.handle(request).await;
    for response in reply.responses() {
        if let Err(e) = transport.send(response).await {
            tracing::debug!(
                operation = request.operation(),
                error = %e,
                "Failed to answer control request"
            );
            return;
        }
    }

    if let Some(expected) = reply.records_to_confirm() {
        let answer = match transport.recv::<RecordsReceived>().await {
            Ok(receipt) if receipt.count == expected => {
                service.complete(reply).await;
                ControlResponse::Ack
            }
            Ok(receipt) => ControlResponse::Failed(Status::invalid_argument(format!(
                "Expected receipt for {expected} records, but got one for {}",
                receipt.count
            ))),
            Err(e) => {
                tracing::debug!(error = %e, "Records not confirmed, keeping them pending");
                return;
            }
        };
        if let Err(e) = transport.send(&answer).await {
            tracing::debug!(error = %e, "Failed to answer record receipt");
            return;
        }
    }

    if let Err(e) = transport.shutdown().await {
        tracing::trace!(error = %e, "Control connection shutdown failed");
    }
}
