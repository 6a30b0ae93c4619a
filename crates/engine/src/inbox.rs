//! Work queue feeding the processing task.

use tokio::sync::{mpsc, oneshot};

use flowtest_records::RecordEntry;

use crate::activity::ActivityMonitor;
use crate::error::{EngineError, Result};
use crate::processor::CommandOutcome;

/// One unit of work for the processing task.
#[derive(Debug)]
pub(crate) enum EngineInput {
    Command {
        command: RecordEntry,
        responder: Option<oneshot::Sender<Result<CommandOutcome>>>,
    },
    /// The virtual clock moved; due timers and messages must be handled.
    ClockAdvanced,
}

/// Sending side of the work queue.
///
/// Every enqueue is counted by the [`ActivityMonitor`] before it is sent, so
/// the engine is BUSY from the moment the work exists.
#[derive(Debug, Clone)]
pub(crate) struct Inbox {
    sender: mpsc::UnboundedSender<EngineInput>,
    monitor: ActivityMonitor,
}

impl Inbox {
    pub(crate) fn new(monitor: ActivityMonitor) -> (Self, mpsc::UnboundedReceiver<EngineInput>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender, monitor }, receiver)
    }

    /// Queue `command` and wait until it has been processed.
    pub(crate) async fn execute(&self, command: RecordEntry) -> Result<CommandOutcome> {
        let (responder, response) = oneshot::channel();
        self.enqueue(EngineInput::Command {
            command,
            responder: Some(responder),
        })?;
        response
            .await
            .map_err(|_| EngineError::interrupted("engine stopped before the command was processed"))?
    }

    /// Queue a re-evaluation of due work.
    pub(crate) fn clock_advanced(&self) -> Result<()> {
        self.enqueue(EngineInput::ClockAdvanced)
    }

    fn enqueue(&self, input: EngineInput) -> Result<()> {
        self.monitor.work_enqueued();
        self.sender.send(input).map_err(|_| {
            self.monitor.work_completed();
            EngineError::NotRunning
        })
    }
}
