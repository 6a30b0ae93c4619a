//! Control plane error types.

use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

/// The standard Result type for control plane setup.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Failures while configuring or binding the control plane.
///
/// Errors of individual control operations are reported to the caller as a
/// [`Status`](flowtest_protocol::Status), not as this type.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to read config file {path}: {reason}")]
    ConfigRead { path: String, reason: String },

    #[error("failed to parse config file {path}: {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to bind control service on {address}: {reason}")]
    BindFailed { address: SocketAddr, reason: String },
}

impl ControlError {
    #[must_use]
    pub fn config_read(path: &Path, err: &std::io::Error) -> Self {
        Self::ConfigRead {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    #[must_use]
    pub fn config_parse(path: &Path, err: &toml::de::Error) -> Self {
        Self::ConfigParse {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_failed_names_the_address() {
        let address: SocketAddr = ([127, 0, 0, 1], 26501).into();
        let err = ControlError::bind_failed(
            address,
            &std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        );
        assert_eq!(
            err.to_string(),
            "failed to bind control service on 127.0.0.1:26501: in use"
        );
    }
}
