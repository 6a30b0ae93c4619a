//! Message types for the engine control plane and the command gateway.
//!
//! # Message Flow
//!
//! **Control plane**: one [`ControlRequest`] per connection, answered by one
//! [`ControlResponse`]. `GetRecords` is the exception: the service streams
//! one [`ControlResponse::Record`] per record and closes the stream with
//! [`ControlResponse::EndOfRecords`]. The client confirms the stream with
//! [`RecordsReceived`], which the service answers with
//! [`ControlResponse::Ack`] once the records count as delivered. Unconfirmed
//! records are streamed again on the next `GetRecords`.
//!
//! **Gateway**: one [`GatewayRequest`] per exchange, answered by one
//! [`GatewayResponse`]. A gateway connection may carry many exchanges.
//!
//! Records and command values travel as JSON strings; bincode only frames
//! them.

use std::fmt;

use flowtest_records::{Intent, RejectionType, ValueType};
use serde::{Deserialize, Serialize};

/// Requests accepted by the engine control service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlRequest {
    StartEngine,
    StopEngine,
    ResetEngine,
    /// Advance the virtual clock.
    IncreaseTime {
        milliseconds: u64,
    },
    GetTime,
    WaitForIdleState {
        timeout_millis: u64,
    },
    WaitForBusyState {
        timeout_millis: u64,
    },
    /// Drain every record the service's cursor has not delivered yet.
    GetRecords,
}

impl ControlRequest {
    /// Operation name used in logs and error messages.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::StartEngine => "startEngine",
            Self::StopEngine => "stopEngine",
            Self::ResetEngine => "resetEngine",
            Self::IncreaseTime { .. } => "increaseTime",
            Self::GetTime => "getTime",
            Self::WaitForIdleState { .. } => "waitForIdleState",
            Self::WaitForBusyState { .. } => "waitForBusyState",
            Self::GetRecords => "getRecords",
        }
    }
}

/// Responses sent by the engine control service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlResponse {
    Ack,
    /// Current virtual time in milliseconds since the Unix epoch.
    Time {
        epoch_millis: i64,
    },
    /// One record of a `GetRecords` stream, JSON encoded.
    Record(String),
    /// End of a `GetRecords` stream.
    EndOfRecords {
        count: u64,
    },
    Failed(Status),
}

/// Client confirmation that a whole `GetRecords` stream arrived and decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsReceived {
    pub count: u64,
}

/// Failure reported by the control plane or the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Internal, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Failure kinds of the control plane.
///
/// `DeadlineExceeded` and `Internal` are the two outcomes of a failed wait and
/// must stay distinguishable: the first is a failed expectation, the second a
/// broken engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusCode {
    DeadlineExceeded,
    Internal,
    InvalidArgument,
    /// The engine is not running.
    Unavailable,
}

impl StatusCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::Internal => "INTERNAL",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requests accepted by the engine's command gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayRequest {
    /// Write a command to the engine and wait for it to be processed.
    ExecuteCommand {
        value_type: ValueType,
        intent: Intent,
        /// Key of the entity the command targets, `-1` for none.
        key: i64,
        /// Command value, JSON encoded.
        value: String,
    },
}

/// Responses sent by the command gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayResponse {
    /// The command was processed; `key` identifies the affected entity.
    Accepted {
        key: i64,
        /// Value of the resulting event, JSON encoded.
        value: String,
    },
    /// The engine rejected the command.
    Rejected {
        rejection_type: RejectionType,
        reason: String,
    },
    /// The command never reached the engine.
    Failed(Status),
}
