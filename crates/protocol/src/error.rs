//! Errors of the frame transport.

use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Which half of the stream an I/O error happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
        })
    }
}

/// Failure to move one frame across a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// An outgoing message encodes to more than the payload limit.
    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// An incoming length prefix is zero or above the payload limit.
    #[error("invalid length prefix {length}: {reason}")]
    InvalidLength { length: u32, reason: &'static str },

    /// The stream ended inside a frame. `received == 0` is a close on a
    /// frame boundary.
    #[error("connection closed after {received} of {expected} bytes")]
    Truncated { received: usize, expected: usize },

    #[error("failed to encode frame: {reason}")]
    Encode { reason: String },

    #[error("failed to decode {len} byte frame: {reason}")]
    Decode { len: usize, reason: String },

    #[error("{direction} failed: {kind}")]
    Io { direction: Direction, kind: ErrorKind },

    #[error("failed to connect to {address}: {kind}")]
    ConnectFailed { address: SocketAddr, kind: ErrorKind },

    /// The peer answered with a message that does not fit the exchange.
    #[error("expected {expected}, got {actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: String,
    },
}

impl TransportError {
    #[must_use]
    pub fn frame_too_large(size: usize, limit: usize) -> Self {
        Self::FrameTooLarge { size, limit }
    }

    #[must_use]
    pub fn invalid_length(length: u32, reason: &'static str) -> Self {
        Self::InvalidLength { length, reason }
    }

    #[must_use]
    pub fn truncated(received: usize, expected: usize) -> Self {
        Self::Truncated { received, expected }
    }

    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    pub fn decode(len: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            len,
            reason: reason.into(),
        }
    }

    /// Map a stream error; an EOF while reading becomes [`Truncated`](Self::Truncated).
    #[must_use]
    pub fn io(direction: Direction, err: &std::io::Error, received: usize, expected: usize) -> Self {
        if direction == Direction::Read && err.kind() == ErrorKind::UnexpectedEof {
            return Self::truncated(received, expected);
        }
        Self::Io {
            direction,
            kind: err.kind(),
        }
    }

    #[must_use]
    pub fn connect_failed(address: SocketAddr, err: &std::io::Error) -> Self {
        Self::ConnectFailed {
            address,
            kind: err.kind(),
        }
    }

    pub fn unexpected_message(expected: &'static str, actual: impl fmt::Debug) -> Self {
        Self::UnexpectedMessage {
            expected,
            actual: format!("{actual:?}"),
        }
    }

    /// Whether the peer closed the connection on a frame boundary.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Truncated { received: 0, .. })
    }
}
