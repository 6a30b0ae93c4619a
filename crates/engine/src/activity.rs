//! Busy/idle signalling between the processing loop and waiters.
//!
//! Every change of the processing indicator is published through a
//! `tokio::sync::watch` channel. Waiters re-check their condition against each
//! published value, so a transition that already happened can never be missed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{EngineError, Result};

/// Processing indicator of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Running with no pending work.
    Idle,
    /// Running with pending work.
    Busy,
    Stopped,
}

/// Snapshot published on every change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activity {
    pub state: ProcessingState,
    /// Work items enqueued but not yet completed.
    pub pending: usize,
    /// Number of IDLE to BUSY transitions so far.
    pub busy_transitions: u64,
}

/// Tracks pending work and broadcasts busy/idle transitions.
///
/// Work is counted when it is enqueued, not when the processor picks it up,
/// so a caller that enqueues work and then waits for idle can never observe a
/// stale IDLE.
#[derive(Debug, Clone)]
pub struct ActivityMonitor {
    sender: Arc<watch::Sender<Activity>>,
}

impl ActivityMonitor {
    /// A monitor for an engine that has not been started.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Activity {
            state: ProcessingState::Stopped,
            pending: 0,
            busy_transitions: 0,
        });
        Self {
            sender: Arc::new(sender),
        }
    }

    #[must_use]
    pub fn current(&self) -> Activity {
        *self.sender.borrow()
    }

    /// The engine started: BUSY if work queued up while it was stopped.
    pub fn started(&self) {
        self.sender.send_modify(|activity| {
            activity.state = if activity.pending > 0 {
                activity.busy_transitions = activity.busy_transitions.saturating_add(1);
                ProcessingState::Busy
            } else {
                ProcessingState::Idle
            };
        });
    }

    /// The engine stopped. Releases every waiter.
    pub fn stopped(&self) {
        self.sender
            .send_modify(|activity| activity.state = ProcessingState::Stopped);
    }

    /// One unit of work was enqueued.
    pub fn work_enqueued(&self) {
        self.sender.send_modify(|activity| {
            activity.pending = activity.pending.saturating_add(1);
            if activity.state == ProcessingState::Idle {
                activity.state = ProcessingState::Busy;
                activity.busy_transitions = activity.busy_transitions.saturating_add(1);
            }
        });
    }

    /// One unit of work finished, including any follow-up work it produced.
    pub fn work_completed(&self) {
        self.sender.send_modify(|activity| {
            activity.pending = activity.pending.saturating_sub(1);
            if activity.pending == 0 && activity.state == ProcessingState::Busy {
                activity.state = ProcessingState::Idle;
            }
        });
    }

    /// Wait until no work is pending.
    ///
    /// Returns at once if the engine is already idle.
    ///
    /// # Errors
    /// - [`EngineError::Timeout`] if work is still pending after `timeout`
    /// - [`EngineError::Interrupted`] if the engine is or becomes stopped
    pub async fn wait_for_idle(&self, timeout: Duration) -> Result<()> {
        let mut receiver = self.sender.subscribe();
        let outcome = tokio::time::timeout(
            timeout,
            receiver.wait_for(|activity| activity.state != ProcessingState::Busy),
        )
        .await
        .map(|changed| changed.map(|activity| activity.state));

        match outcome {
            Err(_) => Err(EngineError::timeout("waitForIdleState", timeout)),
            Ok(Err(_)) => Err(EngineError::interrupted("engine was dropped while waiting for idle state")),
            Ok(Ok(ProcessingState::Stopped)) => {
                Err(EngineError::interrupted("engine stopped while waiting for idle state"))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Wait until the engine is BUSY or has become BUSY since the call started.
    ///
    /// # Errors
    /// - [`EngineError::Timeout`] if the engine did not start processing
    ///   within `timeout`
    /// - [`EngineError::Interrupted`] if the engine is or becomes stopped
    pub async fn wait_for_busy(&self, timeout: Duration) -> Result<()> {
        let mut receiver = self.sender.subscribe();
        let baseline = receiver.borrow_and_update().busy_transitions;
        let outcome = tokio::time::timeout(
            timeout,
            receiver.wait_for(|activity| {
                activity.state != ProcessingState::Idle || activity.busy_transitions > baseline
            }),
        )
        .await
        .map(|changed| changed.map(|activity| (activity.state, activity.busy_transitions)));

        match outcome {
            Err(_) => Err(EngineError::timeout("waitForBusyState", timeout)),
            Ok(Err(_)) => Err(EngineError::interrupted("engine was dropped while waiting for busy state")),
            Ok(Ok((ProcessingState::Stopped, transitions))) if transitions == baseline => {
                Err(EngineError::interrupted("engine stopped while waiting for busy state"))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }
}

impl Default for ActivityMonitor {
    fn default() -> Self {
        Self::new()
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

    fn running() -> ActivityMonitor {
        let monitor = ActivityMonitor::new();
        monitor.started();
        monitor
    }

    #[test]
    fn test_enqueue_and_complete_toggle_state() {
        let monitor = running();
        assert_eq!(monitor.current().state, ProcessingState::Idle);

        monitor.work_enqueued();
        monitor.work_enqueued();
        assert_eq!(monitor.current().state, ProcessingState::Busy);
        assert_eq!(monitor.current().busy_transitions, 1);

        monitor.work_completed();
        assert_eq!(monitor.current().state, ProcessingState::Busy);
        monitor.work_completed();
        assert_eq!(monitor.current().state, ProcessingState::Idle);
    }

    #[test]
    fn test_work_queued_while_stopped_makes_start_busy() {
        let monitor = ActivityMonitor::new();
        monitor.work_enqueued();
        assert_eq!(monitor.current().state, ProcessingState::Stopped);

        monitor.started();
        assert_eq!(monitor.current().state, ProcessingState::Busy);
    }

    #[tokio::test]
    async fn test_wait_for_idle_returns_immediately_when_idle() {
        let monitor = running();
        monitor.wait_for_idle(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_idle_times_out_while_busy() {
        let monitor = running();
        monitor.work_enqueued();

        let err = monitor.wait_for_idle(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_wait_for_busy_with_zero_timeout_is_deadline_exceeded() {
        let monitor = running();
        let err = monitor.wait_for_busy(Duration::ZERO).await.unwrap_err();
        assert!(err.is_timeout(), "expected timeout, got {err:?}");
    }

    #[tokio::test]
    async fn test_wait_for_busy_sees_transition_that_already_ended() {
        let monitor = running();
        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_busy(Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;

        monitor.work_enqueued();
        monitor.work_completed();
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_stop_releases_idle_waiters() {
        let monitor = running();
        monitor.work_enqueued();

        let waiter = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.wait_for_idle(Duration::from_secs(30)).await })
        };
        tokio::task::yield_now().await;
        monitor.stopped();

        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_interrupted());
    }

    #[tokio::test]
    async fn test_waits_on_stopped_engine_fail_immediately() {
        let monitor = ActivityMonitor::new();
        assert!(monitor.wait_for_idle(Duration::from_secs(30)).await.unwrap_err().is_interrupted());
        assert!(monitor.wait_for_busy(Duration::from_secs(30)).await.unwrap_err().is_interrupted());
    }
}
