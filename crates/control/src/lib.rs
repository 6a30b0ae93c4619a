//! # flowtest-control
//!
//! The engine control plane:
//!
//! - [`EngineControlService`]: lifecycle, virtual time, busy/idle waits and
//!   incremental record delivery over one engine, replaced on reset
//! - [`ControlServer`]: serves the service over TCP, one request per
//!   connection
//! - [`RemoteEngine`]: a [`TestEngine`](flowtest_engine::TestEngine) that
//!   talks to a control server
//! - [`AgentConfig`]: ports, bind address, log filter and clock origin of an
//!   engine agent
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use flowtest_control::{ControlServer, EngineControlService, RemoteEngine};
//! use flowtest_engine::{EngineConfig, TestEngine};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = Arc::new(EngineControlService::in_memory(EngineConfig::ephemeral()));
//! let server = ControlServer::bind("127.0.0.1:0".parse()?, Arc::clone(&service)).await?;
//!
//! let engine = RemoteEngine::new(server.local_addr(), service.engine().gateway_address());
//! engine.start().await?;
//! engine.increase_time(Duration::from_secs(60)).await?;
//! engine.wait_for_idle_state(Duration::from_secs(1)).await?;
//! let records = engine.get_records().await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod client;
mod config;
mod error;
mod server;
mod service;

pub use client::RemoteEngine;
pub use config::{AgentConfig, DEFAULT_CONTROL_PORT};
pub use error::{ControlError, Result};
pub use server::ControlServer;
pub use service::{EngineControlService, PendingRecords, Reply, StatusResult};
