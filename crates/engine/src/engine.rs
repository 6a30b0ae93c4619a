//! The engine contract shared by in-process and remote engines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtest_records::{Record, RecordLog};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::runtime::InMemoryEngine;

/// Lifecycle, virtual time and busy/idle synchronization of a test engine.
///
/// Test code written against this trait cannot tell an in-process engine from
/// one behind the control plane: both report failed waits as
/// [`EngineError::Timeout`](crate::EngineError::Timeout) or
/// [`EngineError::Interrupted`](crate::EngineError::Interrupted).
#[async_trait]
pub trait TestEngine: Send + Sync {
    /// Start processing. Starting a running engine does nothing.
    async fn start(&self) -> Result<()>;

    /// Stop processing and release every busy/idle waiter with an error.
    /// Stopping a stopped engine does nothing.
    async fn stop(&self) -> Result<()>;

    /// Advance the virtual clock and schedule re-evaluation of due work.
    async fn increase_time(&self, by: Duration) -> Result<()>;

    /// Current virtual time.
    async fn get_time(&self) -> Result<DateTime<Utc>>;

    /// Wait until the engine has no pending work.
    async fn wait_for_idle_state(&self, timeout: Duration) -> Result<()>;

    /// Wait until the engine has begun processing new work.
    async fn wait_for_busy_state(&self, timeout: Duration) -> Result<()>;

    /// Every record the engine has emitted, in position order.
    async fn records(&self) -> Result<Vec<Record>>;

    /// Address of the command gateway.
    fn gateway_address(&self) -> SocketAddr;
}

/// An engine running in this process, with direct access to its record log.
pub trait EngineRuntime: TestEngine {
    /// Handle to the log this engine writes to.
    fn record_log(&self) -> RecordLog;
}

/// Builds engines, both the first one and every replacement after a reset.
pub trait EngineFactory: Send + Sync {
    fn create(&self, config: &EngineConfig) -> Arc<dyn EngineRuntime>;
}

impl<F> EngineFactory for F
where
    F: Fn(&EngineConfig) -> Arc<dyn EngineRuntime> + Send + Sync,
{
    fn create(&self, config: &EngineConfig) -> Arc<dyn EngineRuntime> {
        self(config)
    }
}

/// Factory for [`InMemoryEngine`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryEngineFactory;

impl EngineFactory for InMemoryEngineFactory {
    fn create(&self, config: &EngineConfig) -> Arc<dyn EngineRuntime> {
        Arc::new(InMemoryEngine::new(config.clone()))
    }
}
