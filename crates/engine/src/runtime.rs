//! In-memory engine: one processing task, a virtual clock and a gateway.
//!
//! The processing task owns the [`StreamProcessor`] while the engine runs and
//! hands it back on stop, so an engine can be stopped and started again
//! without losing state or records.

use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowtest_records::{Record, RecordLog};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::activity::{ActivityMonitor, ProcessingState};
use crate::clock::VirtualClock;
use crate::config::EngineConfig;
use crate::engine::{EngineRuntime, TestEngine};
use crate::error::{EngineError, Result};
use crate::gateway::GatewayServer;
use crate::inbox::{EngineInput, Inbox};
use crate::processor::StreamProcessor;

type Parked = (StreamProcessor, mpsc::UnboundedReceiver<EngineInput>);

#[derive(Debug)]
enum Lifecycle {
    Stopped {
        processor: StreamProcessor,
        inputs: mpsc::UnboundedReceiver<EngineInput>,
    },
    Running {
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Parked>,
        gateway: GatewayServer,
    },
    /// The processing task died and took the processor with it.
    Failed { reason: String },
}

/// Engine running entirely in this process.
#[derive(Debug)]
pub struct InMemoryEngine {
    config: EngineConfig,
    clock: VirtualClock,
    monitor: ActivityMonitor,
    log: RecordLog,
    inbox: Inbox,
    gateway_address: RwLock<SocketAddr>,
    lifecycle: Mutex<Lifecycle>,
}

impl InMemoryEngine {
    /// A stopped engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let clock = config
            .clock_origin
            .map_or_else(VirtualClock::default, VirtualClock::new);
        let monitor = ActivityMonitor::new();
        let (inbox, inputs) = Inbox::new(monitor.clone());
        let processor = StreamProcessor::new(clock.clone());
        let log = processor.record_log();

        Self {
            gateway_address: RwLock::new(config.gateway_address),
            config,
            clock,
            monitor,
            log,
            inbox,
            lifecycle: Mutex::new(Lifecycle::Stopped { processor, inputs }),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    #[must_use]
    pub const fn monitor(&self) -> &ActivityMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.monitor.current().state != ProcessingState::Stopped
    }
}

#[async_trait]
impl TestEngine for InMemoryEngine {
    async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let current = std::mem::replace(
            &mut *lifecycle,
            Lifecycle::Failed {
                reason: "engine start did not complete".to_string(),
            },
        );

        match current {
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                tracing::debug!("Engine already running");
                Ok(())
            }
            Lifecycle::Failed { reason } => {
                *lifecycle = Lifecycle::Failed {
                    reason: reason.clone(),
                };
                Err(EngineError::interrupted(reason))
            }
            Lifecycle::Stopped { processor, inputs } => {
                let gateway =
                    match GatewayServer::bind(self.config.gateway_address, self.inbox.clone()).await {
                        Ok(gateway) => gateway,
                        Err(e) => {
                            *lifecycle = Lifecycle::Stopped { processor, inputs };
                            return Err(e);
                        }
                    };
                let address = gateway.local_addr();
                *self
                    .gateway_address
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = address;

                let (shutdown, stop) = oneshot::channel();
                self.monitor.started();
                let task = tokio::spawn(process_inputs(processor, inputs, self.monitor.clone(), stop));
                *lifecycle = Lifecycle::Running {
                    shutdown,
                    task,
                    gateway,
                };

                tracing::info!(
                    gateway = %address,
                    time = %self.clock.now(),
                    "Engine started"
                );
                Ok(())
            }
        }
    }

    async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        let current = std::mem::replace(
            &mut *lifecycle,
            Lifecycle::Failed {
                reason: "engine stop did not complete".to_string(),
            },
        );

        let (shutdown, task, gateway) = match current {
            Lifecycle::Running {
                shutdown,
                task,
                gateway,
            } => (shutdown, task, gateway),
            other => {
                *lifecycle = other;
                return Ok(());
            }
        };

        self.monitor.stopped();
        gateway.shutdown().await;
        let _ = shutdown.send(());

        match task.await {
            Ok((processor, inputs)) => {
                *lifecycle = Lifecycle::Stopped { processor, inputs };
                tracing::info!(records = self.log.len(), "Engine stopped");
                Ok(())
            }
            Err(e) => {
                let reason = format!("processing task failed: {e}");
                tracing::error!(%reason, "Engine stopped abnormally");
                *lifecycle = Lifecycle::Failed {
                    reason: reason.clone(),
                };
                Err(EngineError::interrupted(reason))
            }
        }
    }

    async fn increase_time(&self, by: Duration) -> Result<()> {
        let now = self.clock.advance(by)?;
        self.inbox.clock_advanced()?;
        tracing::debug!(by_ms = by.as_millis(), %now, "Virtual time increased");
        Ok(())
    }

    async fn get_time(&self) -> Result<DateTime<Utc>> {
        Ok(self.clock.now())
    }

    async fn wait_for_idle_state(&self, timeout: Duration) -> Result<()> {
        self.monitor.wait_for_idle(timeout).await
    }

    async fn wait_for_busy_state(&self, timeout: Duration) -> Result<()> {
        self.monitor.wait_for_busy(timeout).await
    }

    async fn records(&self) -> Result<Vec<Record>> {
        Ok(self.log.records())
    }

    fn gateway_address(&self) -> SocketAddr {
        *self
            .gateway_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl EngineRuntime for InMemoryEngine {
    fn record_log(&self) -> RecordLog {
        self.log.clone()
    }
}

/// Processing loop. Runs until `stop` fires or its sender is dropped, then
/// hands the processor and the unprocessed inputs back.
async fn process_inputs(
    mut processor: StreamProcessor,
    mut inputs: mpsc::UnboundedReceiver<EngineInput>,
    monitor: ActivityMonitor,
    mut stop: oneshot::Receiver<()>,
) -> Parked {
    loop {
        let input = tokio::select! {
            biased;
            _ = &mut stop => break,
            input = inputs.recv() => match input {
                Some(input) => input,
                None => break,
            },
        };

        match input {
            EngineInput::Command { command, responder } => {
                let outcome = processor
                    .process(command)
                    .and_then(|outcome| processor.trigger_due_work().map(|_| outcome));
                if let Err(e) = &outcome {
                    tracing::error!(error = %e, "Command processing failed");
                }
                if let Some(responder) = responder {
                    let _ = responder.send(outcome);
                }
            }
            EngineInput::ClockAdvanced => {
                if let Err(e) = processor.trigger_due_work() {
                    tracing::error!(error = %e, "Triggering due work failed");
                }
            }
        }
        monitor.work_completed();
    }
    (processor, inputs)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use super::*;

    fn engine() -> InMemoryEngine {
        InMemoryEngine::new(
            EngineConfig::ephemeral().with_clock_origin(DateTime::from_timestamp_millis(0).unwrap()),
        )
    }

    #[tokio::test]
    async fn test_start_binds_gateway_and_stop_is_idempotent() {
        let engine = engine();
        assert!(!engine.is_running());

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        assert!(engine.is_running());
        assert_ne!(engine.gateway_address().port(), 0);

        engine.stop().await.unwrap();
        engine.stop().await.unwrap();
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn test_increase_time_is_visible_immediately() {
        let engine = engine();
        engine.start().await.unwrap();

        engine.increase_time(Duration::from_millis(1_000)).await.unwrap();
        engine.increase_time(Duration::from_millis(500)).await.unwrap();
        assert_eq!(engine.get_time().await.unwrap().timestamp_millis(), 1_500);

        engine.wait_for_idle_state(Duration::from_secs(1)).await.unwrap();
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_time_advanced_while_stopped_is_processed_on_start() {
        let engine = engine();
        engine.increase_time(Duration::from_millis(10)).await.unwrap();
        assert_eq!(engine.monitor().current().pending, 1);

        engine.start().await.unwrap();
        engine.wait_for_idle_state(Duration::from_secs(1)).await.unwrap();
        assert_eq!(engine.monitor().current().pending, 0);
        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_keeps_the_same_log() {
        let engine = engine();
        let log = engine.record_log();

        engine.start().await.unwrap();
        engine.stop().await.unwrap();
        engine.start().await.unwrap();

        assert!(engine.record_log().same_log(&log));
        engine.stop().await.unwrap();
    }
}
