//! Engine configuration.

use std::net::{Ipv4Addr, SocketAddr};

use chrono::{DateTime, Utc};

/// Default port of the command gateway.
pub const DEFAULT_GATEWAY_PORT: u16 = 26500;

/// Everything needed to build an engine. A reset builds the replacement engine
/// from the same configuration, so it listens on the same gateway endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Address the command gateway binds to on start. Port `0` picks a free
    /// port.
    pub gateway_address: SocketAddr,
    /// Initial virtual time. `None` starts at the wall-clock time the engine
    /// is created.
    pub clock_origin: Option<DateTime<Utc>>,
}

impl EngineConfig {
    #[must_use]
    pub fn new(gateway_address: SocketAddr) -> Self {
        Self {
            gateway_address,
            clock_origin: None,
        }
    }

    /// Gateway on a free loopback port.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
    }

    #[must_use]
    pub fn with_clock_origin(mut self, origin: DateTime<Utc>) -> Self {
        self.clock_origin = Some(origin);
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_GATEWAY_PORT)))
    }
}
