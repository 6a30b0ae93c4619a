//! Error types for the records crate.

use thiserror::Error;

/// Result type alias for record operations.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Record encoding and decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// A payload could not be turned back into a record.
    #[error("malformed record: {reason}")]
    Malformed { reason: String },

    /// A record could not be serialized.
    #[error("failed to encode record at position {position}: {reason}")]
    EncodeFailed { position: u64, reason: String },
}

impl RecordError {
    /// Create a malformed record error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Create an encode error.
    pub fn encode_failed(position: u64, reason: impl Into<String>) -> Self {
        Self::EncodeFailed {
            position,
            reason: reason.into(),
        }
    }
}
