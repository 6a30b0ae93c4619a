//! Transport layer for length-prefixed bincode messages over async streams
//!
//! # Type Parameters
//! - `S`: byte stream (implements `AsyncRead + AsyncWrite + Unpin`), usually
//!   a `TcpStream`
//!
//! A transport is owned by one task at a time; it is not meant to be shared.

use std::net::SocketAddr;

use serde::{Serialize, de::DeserializeOwned};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream, DuplexStream};
use tokio::net::TcpStream;

use crate::error::Direction;
use crate::{LENGTH_PREFIX_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, TransportError, TransportResult};

/// Length-prefixed bincode framing over an async byte stream.
///
/// # Example
/// ```rust
/// use flowtest_protocol::FrameTransport;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let (mut client, mut server) = FrameTransport::pair();
///
/// client.send(&"hello world".to_string()).await?;
/// let received = server.recv::<String>().await?;
/// assert_eq!(received, "hello world");
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FrameTransport<S> {
    stream: BufStream<S>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FrameTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufStream::new(stream),
        }
    }

    /// Send one message and flush it.
    ///
    /// # Errors
    /// - `Encode` if bincode fails
    /// - `FrameTooLarge` if the payload exceeds [`MAX_PAYLOAD_SIZE`]
    /// - `Io` if the stream write fails
    pub async fn send<T: Serialize + ?Sized>(&mut self, msg: &T) -> TransportResult<()> {
        let payload = bincode::serde::encode_to_vec(msg, bincode::config::standard())
            .map_err(|e| TransportError::encode(e.to_string()))?;
        let Some(length) = u32::try_from(payload.len())
            .ok()
            .filter(|_| payload.len() <= MAX_PAYLOAD_SIZE)
        else {
            tracing::debug!(
                size = payload.len(),
                limit = MAX_PAYLOAD_SIZE,
                "Refusing to send oversized frame"
            );
            return Err(TransportError::frame_too_large(payload.len(), MAX_PAYLOAD_SIZE));
        };

        let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE.saturating_add(payload.len()));
        frame.extend_from_slice(&length.to_be_bytes());
        frame.extend_from_slice(&payload);

        let write = |e: std::io::Error| TransportError::io(Direction::Write, &e, 0, 0);
        self.stream.write_all(&frame).await.map_err(write)?;
        self.stream.flush().await.map_err(write)
    }

    /// Receive one message.
    ///
    /// # Errors
    /// - `Truncated` if the stream ends before a full frame; with
    ///   `received == 0` when it ends on a frame boundary
    /// - `InvalidLength` if the prefix is zero or above [`MAX_PAYLOAD_SIZE`]
    /// - `Decode` if bincode fails
    /// - `Io` if the stream read fails
    pub async fn recv<T: DeserializeOwned>(&mut self) -> TransportResult<T> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.stream
            .read_exact(&mut prefix)
            .await
            .map_err(|e| TransportError::io(Direction::Read, &e, 0, LENGTH_PREFIX_SIZE))?;

        let length = u32::from_be_bytes(prefix);
        let payload_length = match usize::try_from(length) {
            Ok(len) if (1..=MAX_PAYLOAD_SIZE).contains(&len) => len,
            other => {
                let reason = if matches!(other, Ok(0)) {
                    "empty payload"
                } else {
                    "payload above the frame limit"
                };
                tracing::debug!(length, reason, "Rejecting frame");
                return Err(TransportError::invalid_length(length, reason));
            }
        };

        let mut payload = vec![0u8; payload_length];
        self.stream.read_exact(&mut payload).await.map_err(|e| {
            TransportError::io(
                Direction::Read,
                &e,
                LENGTH_PREFIX_SIZE,
                LENGTH_PREFIX_SIZE.saturating_add(payload_length),
            )
        })?;

        bincode::serde::decode_from_slice(&payload, bincode::config::standard())
            .map(|(message, _)| message)
            .map_err(|e| {
                tracing::debug!(length = payload_length, error = %e, "Failed to decode frame");
                TransportError::decode(payload_length, e.to_string())
            })
    }

    /// Flush and shut down the write half.
    ///
    /// # Errors
    /// Returns `Io` if the shutdown fails.
    pub async fn shutdown(&mut self) -> TransportResult<()> {
        self.stream
            .shutdown()
            .await
            .map_err(|e| TransportError::io(Direction::Write, &e, 0, 0))
    }

    /// Unwrap the underlying stream. Buffered, unread bytes are lost.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }
}

impl FrameTransport<TcpStream> {
    /// Open a TCP connection to `address`.
    ///
    /// # Errors
    /// Returns `ConnectFailed` if the connection cannot be established.
    pub async fn connect(address: SocketAddr) -> TransportResult<Self> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|e| TransportError::connect_failed(address, &e))?;
        // request/response exchanges are small; don't wait for Nagle
        if let Err(e) = stream.set_nodelay(true) {
            tracing::trace!(%address, error = %e, "Could not disable Nagle");
        }
        Ok(Self::new(stream))
    }
}

impl FrameTransport<DuplexStream> {
    /// A pair of connected in-memory transports.
    ///
    /// What one side sends the other receives, in both directions.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (client, server) = tokio::io::duplex(MAX_FRAME_SIZE.saturating_mul(2));
        (Self::new(client), Self::new(server))
    }
}
