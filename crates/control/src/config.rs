//! Agent configuration.
//!
//! Built-in defaults, optionally overridden by a TOML file, then by command
//! line arguments or environment variables in the agent binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use chrono::DateTime;
use flowtest_engine::{DEFAULT_GATEWAY_PORT, EngineConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

/// Default port of the engine control service.
pub const DEFAULT_CONTROL_PORT: u16 = 26501;

/// Configuration of an engine agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Interface both endpoints bind to.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Port of the engine control service.
    #[serde(default = "default_control_port")]
    pub control_port: u16,

    /// Port of the command gateway.
    #[serde(default = "default_gateway_port")]
    pub gateway_port: u16,

    /// Default tracing filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Initial virtual time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub clock_origin_millis: Option<i64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            control_port: default_control_port(),
            gateway_port: default_gateway_port(),
            log_filter: default_log_filter(),
            clock_origin_millis: None,
        }
    }
}

impl AgentConfig {
    /// Load a configuration file. Keys missing from the file keep their
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML is malformed
    pub fn load_toml_file(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ControlError::config_read(path, &e))?;
        toml::from_str(&content).map_err(|e| ControlError::config_parse(path, &e))
    }

    /// Set the bind address.
    #[must_use]
    pub const fn bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Set the control service port.
    #[must_use]
    pub const fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Set the command gateway port.
    #[must_use]
    pub const fn gateway_port(mut self, port: u16) -> Self {
        self.gateway_port = port;
        self
    }

    /// Set the default log filter.
    #[must_use]
    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the initial virtual time.
    #[must_use]
    pub const fn clock_origin_millis(mut self, millis: i64) -> Self {
        self.clock_origin_millis = Some(millis);
        self
    }

    /// Address of the engine control service.
    #[must_use]
    pub const fn control_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.control_port)
    }

    /// Address of the command gateway.
    #[must_use]
    pub const fn gateway_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.gateway_port)
    }

    /// Check that the configuration can be served.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if both endpoints share a fixed
    /// port or the clock origin is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.control_port != 0 && self.control_port == self.gateway_port {
            return Err(ControlError::invalid_config(format!(
                "control and gateway port must differ, both are {}",
                self.control_port
            )));
        }
        self.engine_config().map(|_| ())
    }

    /// Configuration every engine of this agent is built from.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::InvalidConfig`] if the clock origin is not a
    /// representable instant.
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let config = EngineConfig::new(self.gateway_address());
        match self.clock_origin_millis {
            None => Ok(config),
            Some(millis) => DateTime::from_timestamp_millis(millis)
                .map(|origin| config.with_clock_origin(origin))
                .ok_or_else(|| {
                    ControlError::invalid_config(format!("clock origin {millis} is out of range"))
                }),
        }
    }
}

const fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_control_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

const fn default_gateway_port() -> u16 {
    DEFAULT_GATEWAY_PORT
}

fn default_log_filter() -> String {
    "info".to_string()
}
