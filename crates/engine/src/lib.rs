//! # flowtest-engine
//!
//! A deterministic engine for tests:
//!
//! - [`TestEngine`]: lifecycle, virtual time and busy/idle synchronization
//! - [`InMemoryEngine`]: the in-process implementation, with a
//!   [`VirtualClock`], an [`ActivityMonitor`] and a command gateway
//! - [`GatewayClient`]: sends commands to a running engine
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use flowtest_engine::{EngineConfig, GatewayClient, InMemoryEngine, TestEngine};
//! use flowtest_records::TimerValue;
//!
//! # async fn run() -> flowtest_engine::Result<()> {
//! let engine = InMemoryEngine::new(EngineConfig::ephemeral());
//! engine.start().await?;
//!
//! let mut gateway = GatewayClient::connect(engine.gateway_address()).await?;
//! let due_date = engine.get_time().await?.timestamp_millis() + 86_400_000;
//! gateway.create_timer(TimerValue { due_date, ..TimerValue::default() }).await?;
//!
//! engine.increase_time(Duration::from_millis(86_400_001)).await?;
//! engine.wait_for_idle_state(Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod activity;
mod clock;
mod config;
mod engine;
mod error;
mod gateway;
mod inbox;
mod processor;
mod runtime;

pub use activity::{Activity, ActivityMonitor, ProcessingState};
pub use clock::VirtualClock;
pub use config::{DEFAULT_GATEWAY_PORT, EngineConfig};
pub use engine::{EngineFactory, EngineRuntime, InMemoryEngineFactory, TestEngine};
pub use error::{EngineError, Result};
pub use gateway::GatewayClient;
pub use processor::{CommandOutcome, StreamProcessor};
pub use runtime::InMemoryEngine;
