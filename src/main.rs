//! # flowtest-agent
//!
//! Runs one in-memory test engine behind an engine control service, the way
//! a containerized engine is run for remote tests.
//!
//! ## Startup
//!
//! 1. **Configuration** - defaults, optional TOML file, then arguments and
//!    environment variables
//! 2. **Tracing** - `RUST_LOG` if set, the configured filter otherwise
//! 3. **Engine** - built from the configured gateway endpoint and clock origin,
//!    then started
//! 4. **Control service** - bound on the control port
//!
//! ## Shutdown
//!
//! On Ctrl+C the control service stops accepting requests and the current
//! engine is stopped, releasing any outstanding waits.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flowtest_control::{ControlServer, EngineControlService};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse()
        .into_config()
        .context("Invalid agent configuration")?;

    init_tracing(&config.log_filter);

    let engine_config = config
        .engine_config()
        .context("Invalid engine configuration")?;
    let service = Arc::new(EngineControlService::in_memory(engine_config));
    service
        .start_engine()
        .await
        .map_err(|status| anyhow::anyhow!("{status}"))
        .context("Failed to start engine")?;

    let server = ControlServer::bind(config.control_address(), Arc::clone(&service))
        .await
        .context("Failed to start control service")?;

    info!(
        control = %server.local_addr(),
        gateway = %service.engine().gateway_address(),
        "Engine agent started. Press Ctrl+C to stop."
    );

    wait_for_shutdown().await;

    server.shutdown().await;
    if let Err(status) = service.shutdown().await {
        warn!(%status, "Engine did not stop cleanly");
    }

    info!("Engine agent stopped");
    Ok(())
}

/// Initialize tracing subscriber. `RUST_LOG` wins over `default_filter`.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
