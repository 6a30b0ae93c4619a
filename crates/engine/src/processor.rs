//! Stream processor of the in-memory engine.
//!
//! Every command is first written to the record log, then applied to the
//! state store, which writes the resulting event or a rejection. Scheduled
//! work (timers, message expiry) is kept in the store keyed by
//! `(due time, key)`, so "everything due by now" is one ordered range scan.

use flowtest_core::{ByteKey, ColumnFamily, InMemoryDb};
use flowtest_records::{
    Intent, MessageValue, Record, RecordEntry, RecordLog, RecordLogWriter, RecordValue,
    RejectionType, TimerValue,
};
use serde::{Deserialize, Serialize};

use crate::clock::VirtualClock;
use crate::error::Result;

/// Timers by `(due date, key)`.
const TIMERS: ColumnFamily = ColumnFamily::new("timers");
/// Timer due dates by key.
const TIMER_KEYS: ColumnFamily = ColumnFamily::new("timer_keys");
/// Buffered messages by `(deadline, key)`.
const MESSAGES: ColumnFamily = ColumnFamily::new("messages");
/// Buffered message deadlines by key.
const MESSAGE_KEYS: ColumnFamily = ColumnFamily::new("message_keys");
/// Keys of buffered messages by `(name, correlation key, message id)`.
const MESSAGE_IDS: ColumnFamily = ColumnFamily::new("message_ids");

/// First key handed out on partition 1.
const FIRST_KEY: i64 = (1 << 51) + 1;

/// Result of processing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Accepted { key: i64, value: RecordValue },
    Rejected {
        rejection_type: RejectionType,
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct ScheduledTimer {
    key: i64,
    timer: TimerValue,
}

#[derive(Debug, Serialize, Deserialize)]
struct BufferedMessage {
    key: i64,
    /// JSON, since variables are free-form.
    message: String,
}

/// Applies commands to the engine state and writes the resulting records.
#[derive(Debug)]
pub struct StreamProcessor {
    state: InMemoryDb,
    writer: RecordLogWriter,
    clock: VirtualClock,
    next_key: i64,
}

impl StreamProcessor {
    /// A processor with empty state that writes to a fresh log.
    #[must_use]
    pub fn new(clock: VirtualClock) -> Self {
        let (writer, _) = RecordLog::open();
        Self {
            state: InMemoryDb::new(),
            writer,
            clock,
            next_key: FIRST_KEY,
        }
    }

    /// The log this processor writes to.
    #[must_use]
    pub fn record_log(&self) -> RecordLog {
        self.writer.reader()
    }

    /// Write `command` to the log and apply it.
    ///
    /// # Errors
    /// Returns [`EngineError::State`](crate::EngineError::State) if the state store cannot encode or
    /// decode an entry. Business failures are rejections, not errors.
    pub fn process(&mut self, command: RecordEntry) -> Result<CommandOutcome> {
        let command = self
            .writer
            .append(command.with_timestamp(self.clock.now_millis()));

        let outcome = match (&command.value, command.intent) {
            (RecordValue::Timer(timer), Intent::Create) => self.create_timer(&command, timer)?,
            (RecordValue::Timer(_), Intent::Trigger) => self.trigger_timer(&command)?,
            (RecordValue::Timer(_), Intent::Cancel) => self.cancel_timer(&command)?,
            (RecordValue::Message(message), Intent::Publish) => {
                self.publish_message(&command, message)?
            }
            (RecordValue::Message(_), Intent::Expire) => self.expire_message(&command)?,
            _ => {
                let reason = format!(
                    "Expected a supported command, but got {} {}",
                    command.value_type, command.intent
                );
                self.reject(&command, RejectionType::InvalidArgument, reason)
            }
        };

        tracing::debug!(
            position = command.position,
            value_type = %command.value_type,
            intent = %command.intent,
            accepted = matches!(outcome, CommandOutcome::Accepted { .. }),
            "Command processed"
        );
        Ok(outcome)
    }

    /// Trigger every timer and expire every message due at the current
    /// virtual time. Returns how many were handled.
    ///
    /// # Errors
    /// Returns [`EngineError::State`](crate::EngineError::State) if the state store fails.
    pub fn trigger_due_work(&mut self) -> Result<usize> {
        let now = self.clock.now_millis();
        let due_by_now = ByteKey::builder().push_i64(now).push_i64(i64::MAX).build();

        let timers: Vec<(ByteKey, ScheduledTimer)> = self.state.scan_up_to(TIMERS, &due_by_now)?;
        let messages: Vec<(ByteKey, BufferedMessage)> =
            self.state.scan_up_to(MESSAGES, &due_by_now)?;
        let handled = timers.len().saturating_add(messages.len());

        for (_, scheduled) in timers {
            self.process(
                RecordEntry::command(Intent::Trigger, RecordValue::Timer(scheduled.timer))
                    .with_key(scheduled.key),
            )?;
        }
        for (_, buffered) in messages {
            let message: MessageValue = serde_json::from_str(&buffered.message)
                .map_err(|e| flowtest_core::Error::decode_failed(MESSAGES.name(), e.to_string()))?;
            self.process(
                RecordEntry::command(Intent::Expire, RecordValue::Message(message))
                    .with_key(buffered.key),
            )?;
        }

        if handled > 0 {
            tracing::debug!(now, timers_and_messages = handled, "Due work triggered");
        }
        Ok(handled)
    }

    fn create_timer(&mut self, command: &Record, timer: &TimerValue) -> Result<CommandOutcome> {
        let key = self.generate_key();
        self.state.put(
            TIMERS,
            scheduled_key(timer.due_date, key),
            &ScheduledTimer {
                key,
                timer: timer.clone(),
            },
        )?;
        self.state.put(TIMER_KEYS, key_of(key), &timer.due_date)?;
        Ok(self.accept(command, Intent::Created, key, RecordValue::Timer(timer.clone())))
    }

    fn trigger_timer(&mut self, command: &Record) -> Result<CommandOutcome> {
        self.remove_timer(command, Intent::Triggered, "trigger")
    }

    fn cancel_timer(&mut self, command: &Record) -> Result<CommandOutcome> {
        self.remove_timer(command, Intent::Canceled, "cancel")
    }

    fn remove_timer(&mut self, command: &Record, intent: Intent, action: &str) -> Result<CommandOutcome> {
        let key = command.key;
        let Some(due_date) = self.state.get::<i64>(TIMER_KEYS, &key_of(key))? else {
            let reason =
                format!("Expected to {action} timer with key '{key}', but no such timer was found");
            return Ok(self.reject(command, RejectionType::NotFound, reason));
        };

        let scheduled_at = scheduled_key(due_date, key);
        let scheduled = self.state.get::<ScheduledTimer>(TIMERS, &scheduled_at)?;
        self.state.delete(TIMERS, &scheduled_at);
        self.state.delete(TIMER_KEYS, &key_of(key));

        let timer = scheduled.map(|s| s.timer).unwrap_or_default();
        Ok(self.accept(command, intent, key, RecordValue::Timer(timer)))
    }

    fn publish_message(&mut self, command: &Record, message: &MessageValue) -> Result<CommandOutcome> {
        if message.time_to_live < 0 {
            let reason = format!(
                "Expected message time to live to be non-negative, but was {}",
                message.time_to_live
            );
            return Ok(self.reject(command, RejectionType::InvalidArgument, reason));
        }

        let id_key = message_id_key(message);
        if id_key
            .as_ref()
            .is_some_and(|key| self.state.contains(MESSAGE_IDS, key))
        {
            let reason = format!(
                "Expected to publish a new message with id '{}', but a message with that id was already published",
                message.message_id
            );
            return Ok(self.reject(command, RejectionType::AlreadyExists, reason));
        }

        let Some(deadline) = command.timestamp.checked_add(message.time_to_live) else {
            let reason = format!(
                "Expected message time to live to fit the clock, but was {}",
                message.time_to_live
            );
            return Ok(self.reject(command, RejectionType::InvalidArgument, reason));
        };

        let key = self.generate_key();
        let published = MessageValue {
            deadline,
            ..message.clone()
        };

        if published.time_to_live > 0 {
            let encoded = serde_json::to_string(&published)
                .map_err(|e| flowtest_core::Error::encode_failed(MESSAGES.name(), e.to_string()))?;
            self.state.put(
                MESSAGES,
                scheduled_key(deadline, key),
                &BufferedMessage {
                    key,
                    message: encoded,
                },
            )?;
            self.state.put(MESSAGE_KEYS, key_of(key), &deadline)?;
            if let Some(id_key) = id_key {
                self.state.put(MESSAGE_IDS, id_key, &key)?;
            }
        }

        Ok(self.accept(command, Intent::Published, key, RecordValue::Message(published)))
    }

    fn expire_message(&mut self, command: &Record) -> Result<CommandOutcome> {
        let key = command.key;
        let Some(deadline) = self.state.get::<i64>(MESSAGE_KEYS, &key_of(key))? else {
            let reason =
                format!("Expected to expire message with key '{key}', but no such message was found");
            return Ok(self.reject(command, RejectionType::NotFound, reason));
        };

        let buffered_at = scheduled_key(deadline, key);
        let message = match self.state.get::<BufferedMessage>(MESSAGES, &buffered_at)? {
            Some(buffered) => serde_json::from_str::<MessageValue>(&buffered.message)
                .map_err(|e| flowtest_core::Error::decode_failed(MESSAGES.name(), e.to_string()))?,
            None => MessageValue::default(),
        };

        self.state.delete(MESSAGES, &buffered_at);
        self.state.delete(MESSAGE_KEYS, &key_of(key));
        if let Some(id_key) = message_id_key(&message) {
            self.state.delete(MESSAGE_IDS, &id_key);
        }

        Ok(self.accept(command, Intent::Expired, key, RecordValue::Message(message)))
    }

    fn accept(&mut self, command: &Record, intent: Intent, key: i64, value: RecordValue) -> CommandOutcome {
        self.writer.append(
            RecordEntry::event(intent, key, value.clone())
                .with_timestamp(command.timestamp)
                .with_source(command.position),
        );
        CommandOutcome::Accepted { key, value }
    }

    fn reject(&mut self, command: &Record, rejection_type: RejectionType, reason: String) -> CommandOutcome {
        self.writer.append(
            RecordEntry::rejection(command, rejection_type, reason.clone())
                .with_timestamp(command.timestamp),
        );
        CommandOutcome::Rejected {
            rejection_type,
            reason,
        }
    }

    fn generate_key(&mut self) -> i64 {
        let key = self.next_key;
        self.next_key = self.next_key.saturating_add(1);
        key
    }
}

fn scheduled_key(due: i64, key: i64) -> ByteKey {
    ByteKey::builder().push_i64(due).push_i64(key).build()
}

fn key_of(key: i64) -> ByteKey {
    ByteKey::builder().push_i64(key).build()
}

fn message_id_key(message: &MessageValue) -> Option<ByteKey> {
    if message.message_id.is_empty() {
        return None;
    }
    Some(
        ByteKey::builder()
            .push_str(&message.name)
            .push_str(&message.correlation_key)
            .push_str(&message.message_id)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::indexing_slicing)]
    #![allow(clippy::arithmetic_side_effects)]

    use std::time::Duration;

    use chrono::DateTime;
    use flowtest_records::RecordType;

    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn processor() -> (StreamProcessor, VirtualClock) {
        let clock = VirtualClock::new(DateTime::from_timestamp_millis(0).unwrap());
        (StreamProcessor::new(clock.clone()), clock)
    }

    fn create_timer(due_date: i64) -> RecordEntry {
        RecordEntry::command(
            Intent::Create,
            RecordValue::Timer(TimerValue {
                target_element_id: "timer".to_string(),
                due_date,
                ..TimerValue::default()
            }),
        )
    }

    fn publish(name: &str, message_id: &str, time_to_live: i64) -> RecordEntry {
        RecordEntry::command(
            Intent::Publish,
            RecordValue::Message(MessageValue {
                name: name.to_string(),
                correlation_key: "order-1".to_string(),
                message_id: message_id.to_string(),
                time_to_live,
                ..MessageValue::default()
            }),
        )
    }

    fn accepted_key(outcome: CommandOutcome) -> i64 {
        match outcome {
            CommandOutcome::Accepted { key, .. } => key,
            CommandOutcome::Rejected { reason, .. } => panic!("unexpected rejection: {reason}"),
        }
    }

    fn intents(processor: &StreamProcessor) -> Vec<(RecordType, Intent)> {
        processor
            .record_log()
            .records()
            .iter()
            .map(|r| (r.record_type, r.intent))
            .collect()
    }

    #[test]
    fn test_timer_fires_once_clock_passes_due_date() {
        let (mut processor, clock) = processor();
        let key = accepted_key(processor.process(create_timer(DAY_MS)).unwrap());

        assert_eq!(processor.trigger_due_work().unwrap(), 0);
        clock.advance(Duration::from_millis(86_400_001)).unwrap();
        assert_eq!(processor.trigger_due_work().unwrap(), 1);
        assert_eq!(processor.trigger_due_work().unwrap(), 0);

        let records = processor.record_log().records();
        let triggered: Vec<_> = records
            .iter()
            .filter(|r| r.is_event() && r.intent == Intent::Triggered)
            .collect();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].key, key);
        assert_eq!(triggered[0].timestamp, 86_400_001);
    }

    #[test]
    fn test_timers_fire_in_due_date_order() {
        let (mut processor, clock) = processor();
        let late = accepted_key(processor.process(create_timer(3_000)).unwrap());
        let early = accepted_key(processor.process(create_timer(1_000)).unwrap());

        clock.advance(Duration::from_millis(5_000)).unwrap();
        processor.trigger_due_work().unwrap();

        let fired: Vec<i64> = processor
            .record_log()
            .records()
            .iter()
            .filter(|r| r.intent == Intent::Triggered)
            .map(|r| r.key)
            .collect();
        assert_eq!(fired, vec![early, late]);
    }

    #[test]
    fn test_cancel_removes_timer() {
        let (mut processor, clock) = processor();
        let key = accepted_key(processor.process(create_timer(1_000)).unwrap());

        let cancel = RecordEntry::command(Intent::Cancel, RecordValue::Timer(TimerValue::default())).with_key(key);
        accepted_key(processor.process(cancel.clone()).unwrap());

        clock.advance(Duration::from_millis(2_000)).unwrap();
        assert_eq!(processor.trigger_due_work().unwrap(), 0);

        let again = processor.process(cancel).unwrap();
        assert!(matches!(
            again,
            CommandOutcome::Rejected {
                rejection_type: RejectionType::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn test_message_with_ttl_expires() {
        let (mut processor, clock) = processor();
        accepted_key(processor.process(publish("paid", "m-1", 1_000)).unwrap());

        clock.advance(Duration::from_millis(1_000)).unwrap();
        assert_eq!(processor.trigger_due_work().unwrap(), 1);

        assert_eq!(
            intents(&processor),
            vec![
                (RecordType::Command, Intent::Publish),
                (RecordType::Event, Intent::Published),
                (RecordType::Command, Intent::Expire),
                (RecordType::Event, Intent::Expired),
            ]
        );
    }

    #[test]
    fn test_duplicate_message_id_is_rejected_while_buffered() {
        let (mut processor, clock) = processor();
        accepted_key(processor.process(publish("paid", "m-1", 1_000)).unwrap());

        let duplicate = processor.process(publish("paid", "m-1", 1_000)).unwrap();
        assert!(matches!(
            duplicate,
            CommandOutcome::Rejected {
                rejection_type: RejectionType::AlreadyExists,
                ..
            }
        ));

        clock.advance(Duration::from_millis(1_000)).unwrap();
        processor.trigger_due_work().unwrap();
        accepted_key(processor.process(publish("paid", "m-1", 1_000)).unwrap());
    }

    #[test]
    fn test_messages_without_id_are_never_duplicates() {
        let (mut processor, clock) = processor();
        accepted_key(processor.process(publish("paid", "", 1_000)).unwrap());
        accepted_key(processor.process(publish("paid", "", 1_000)).unwrap());

        clock.advance(Duration::from_millis(1_000)).unwrap();
        assert_eq!(processor.trigger_due_work().unwrap(), 2);
    }

    #[test]
    fn test_message_without_ttl_is_not_buffered() {
        let (mut processor, clock) = processor();
        accepted_key(processor.process(publish("paid", "m-1", 0)).unwrap());
        accepted_key(processor.process(publish("paid", "m-1", 0)).unwrap());

        clock.advance(Duration::from_millis(1)).unwrap();
        assert_eq!(processor.trigger_due_work().unwrap(), 0);
    }

    #[test]
    fn test_unsupported_command_is_rejected() {
        let (mut processor, _) = processor();
        let outcome = processor
            .process(RecordEntry::command(
                Intent::Create,
                RecordValue::Message(MessageValue::default()),
            ))
            .unwrap();

        assert!(matches!(
            outcome,
            CommandOutcome::Rejected {
                rejection_type: RejectionType::InvalidArgument,
                ..
            }
        ));
        let records = processor.record_log().records();
        assert!(records[1].is_rejection());
        assert_eq!(records[1].source_record_position, Some(1));
    }
}
