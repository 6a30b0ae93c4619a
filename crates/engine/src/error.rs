//! Engine error types.
//!
//! `Timeout` and `Interrupted` are the two ways a busy/idle wait can fail and
//! are never folded into each other: a timeout is a failed expectation in the
//! test, an interruption means the engine itself went away.

use std::net::SocketAddr;
use std::time::Duration;

use flowtest_protocol::{StatusCode, TransportError};
use flowtest_records::{RecordError, RejectionType};
use thiserror::Error;

/// The standard Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error type for engine operations, local or remote.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{operation} did not complete within {} ms", timeout.as_millis())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("engine control failed with {code}: {message}")]
    Remote { code: StatusCode, message: String },

    #[error(transparent)]
    MalformedRecord(#[from] RecordError),

    #[error("engine is not running")]
    NotRunning,

    #[error("command rejected ({rejection_type}): {reason}")]
    CommandRejected {
        rejection_type: RejectionType,
        reason: String,
    },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("failed to bind gateway on {address}: {reason}")]
    BindFailed { address: SocketAddr, reason: String },

    #[error("state store error: {0}")]
    State(#[from] flowtest_core::Error),
}

impl EngineError {
    /// Create a timeout error.
    #[must_use]
    pub fn timeout(operation: &'static str, timeout: Duration) -> Self {
        Self::Timeout { operation, timeout }
    }

    /// Create an interrupted error.
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Create an error for a non-wait failure reported by the control plane.
    pub fn remote(code: StatusCode, message: impl Into<String>) -> Self {
        Self::Remote {
            code,
            message: message.into(),
        }
    }

    pub fn command_rejected(rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self::CommandRejected {
            rejection_type,
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn bind_failed(address: SocketAddr, err: &std::io::Error) -> Self {
        Self::BindFailed {
            address,
            reason: err.to_string(),
        }
    }

    /// Whether this is a wait that ran out of time.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether this is a wait that was cut short by the engine going away.
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_operation_and_millis() {
        let err = EngineError::timeout("waitForIdleState", Duration::from_millis(250));
        assert_eq!(
            err.to_string(),
            "waitForIdleState did not complete within 250 ms"
        );
        assert!(err.is_timeout());
        assert!(!err.is_interrupted());
    }

    #[test]
    fn test_rejection_display() {
        let err = EngineError::command_rejected(RejectionType::NotFound, "no timer with key 3");
        assert_eq!(
            err.to_string(),
            "command rejected (NOT_FOUND): no timer with key 3"
        );
    }
}
