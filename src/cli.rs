//! Command line of the engine agent.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use flowtest_control::{AgentConfig, ControlError};

/// flowtest engine agent
#[derive(Parser, Debug)]
#[command(name = "flowtest-agent")]
#[command(version)]
#[command(about = "Runs a test engine behind an engine control service")]
#[command(
    long_about = "Boots an in-memory engine with a virtual clock and serves its control plane. \
                  Tests start, stop and reset the engine, advance time, wait for busy or idle \
                  state and fetch the records it emitted."
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "FLOWTEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Interface to bind both endpoints to
    #[arg(long, env = "FLOWTEST_BIND_ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// Port of the engine control service
    #[arg(long, env = "FLOWTEST_CONTROL_PORT")]
    pub control_port: Option<u16>,

    /// Port of the command gateway
    #[arg(long, env = "FLOWTEST_GATEWAY_PORT")]
    pub gateway_port: Option<u16>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, env = "FLOWTEST_LOG")]
    pub log_filter: Option<String>,

    /// Initial virtual time in milliseconds since the Unix epoch
    #[arg(long, env = "FLOWTEST_CLOCK_ORIGIN_MILLIS")]
    pub clock_origin_millis: Option<i64>,
}

impl Cli {
    /// Defaults, then the config file, then arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be loaded or the result is
    /// not a servable configuration.
    pub fn into_config(self) -> Result<AgentConfig, ControlError> {
        let mut config = match &self.config {
            Some(path) => AgentConfig::load_toml_file(path)?,
            None => AgentConfig::default(),
        };

        if let Some(address) = self.bind_address {
            config = config.bind_address(address);
        }
        if let Some(port) = self.control_port {
            config = config.control_port(port);
        }
        if let Some(port) = self.gateway_port {
            config = config.gateway_port(port);
        }
        if let Some(filter) = self.log_filter {
            config = config.log_filter(filter);
        }
        if let Some(millis) = self.clock_origin_millis {
            config = config.clock_origin_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    #[test]
    fn test_no_arguments_gives_defaults() {
        let config = Cli::try_parse_from(["flowtest-agent"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config, AgentConfig::default());
    }

    #[test]
    fn test_arguments_override_defaults() {
        let config = Cli::try_parse_from([
            "flowtest-agent",
            "--control-port",
            "9001",
            "--gateway-port",
            "9000",
            "--bind-address",
            "127.0.0.1",
            "--clock-origin-millis",
            "0",
        ])
        .unwrap()
        .into_config()
        .unwrap();

        assert_eq!(config.control_address().to_string(), "127.0.0.1:9001");
        assert_eq!(config.gateway_address().to_string(), "127.0.0.1:9000");
        assert_eq!(config.clock_origin_millis, Some(0));
    }

    #[test]
    fn test_conflicting_ports_are_rejected() {
        let result = Cli::try_parse_from([
            "flowtest-agent",
            "--control-port",
            "9000",
            "--gateway-port",
            "9000",
        ])
        .unwrap()
        .into_config();
        assert!(matches!(result, Err(ControlError::InvalidConfig { .. })));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let result = Cli::try_parse_from(["flowtest-agent", "--config", "/nonexistent/agent.toml"])
            .unwrap()
            .into_config();
        assert!(matches!(result, Err(ControlError::ConfigRead { .. })));
    }
}
