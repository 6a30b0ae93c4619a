//! Storage error types.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// The standard Result type for state store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for state store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("failed to encode value for column family '{family}': {reason}")]
    EncodeFailed { family: &'static str, reason: String },

    #[error("failed to decode value in column family '{family}': {reason}")]
    DecodeFailed { family: &'static str, reason: String },
}

impl Error {
    /// Create an encode error.
    pub fn encode_failed(family: &'static str, reason: impl Into<String>) -> Self {
        Self::EncodeFailed {
            family,
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode_failed(family: &'static str, reason: impl Into<String>) -> Self {
        Self::DecodeFailed {
            family,
            reason: reason.into(),
        }
    }
}
