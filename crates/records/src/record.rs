//! Record metadata: record type, value type, intent and the record itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::RecordValue;

/// Declares a wire enum whose variants serialize as SCREAMING_SNAKE_CASE names
/// and display the same way.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// Name of the variant as it appears on the wire.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }
    };
}

wire_enum! {
    /// Kind of log entry.
    pub enum RecordType {
        Command => "COMMAND",
        Event => "EVENT",
        CommandRejection => "COMMAND_REJECTION",
    }
}

wire_enum! {
    /// Semantic kind of a record's payload.
    pub enum ValueType {
        Job => "JOB",
        JobBatch => "JOB_BATCH",
        Deployment => "DEPLOYMENT",
        DeploymentDistribution => "DEPLOYMENT_DISTRIBUTION",
        Process => "PROCESS",
        ProcessInstance => "PROCESS_INSTANCE",
        ProcessInstanceCreation => "PROCESS_INSTANCE_CREATION",
        ProcessInstanceResult => "PROCESS_INSTANCE_RESULT",
        ProcessInstanceModification => "PROCESS_INSTANCE_MODIFICATION",
        ProcessInstanceBatch => "PROCESS_INSTANCE_BATCH",
        ProcessEvent => "PROCESS_EVENT",
        Incident => "INCIDENT",
        Message => "MESSAGE",
        MessageSubscription => "MESSAGE_SUBSCRIPTION",
        ProcessMessageSubscription => "PROCESS_MESSAGE_SUBSCRIPTION",
        MessageStartEventSubscription => "MESSAGE_START_EVENT_SUBSCRIPTION",
        Timer => "TIMER",
        Variable => "VARIABLE",
        VariableDocument => "VARIABLE_DOCUMENT",
        Error => "ERROR",
        Escalation => "ESCALATION",
        Signal => "SIGNAL",
        SignalSubscription => "SIGNAL_SUBSCRIPTION",
        ResourceDeletion => "RESOURCE_DELETION",
        CommandDistribution => "COMMAND_DISTRIBUTION",
        Decision => "DECISION",
        DecisionRequirements => "DECISION_REQUIREMENTS",
        DecisionEvaluation => "DECISION_EVALUATION",
        Checkpoint => "CHECKPOINT",
        SbeUnknown => "SBE_UNKNOWN",
    }
}

wire_enum! {
    /// Action within a value type. Which intents are meaningful depends on the
    /// record's [`ValueType`].
    pub enum Intent {
        Create => "CREATE",
        Created => "CREATED",
        Cancel => "CANCEL",
        Canceled => "CANCELED",
        Trigger => "TRIGGER",
        Triggered => "TRIGGERED",
        Publish => "PUBLISH",
        Published => "PUBLISHED",
        Expire => "EXPIRE",
        Expired => "EXPIRED",
        Activate => "ACTIVATE",
        Activated => "ACTIVATED",
        Complete => "COMPLETE",
        Completed => "COMPLETED",
        Fail => "FAIL",
        Failed => "FAILED",
        TimeOut => "TIME_OUT",
        TimedOut => "TIMED_OUT",
        ThrowError => "THROW_ERROR",
        ErrorThrown => "ERROR_THROWN",
        Update => "UPDATE",
        Updated => "UPDATED",
        Resolve => "RESOLVE",
        Resolved => "RESOLVED",
        Delete => "DELETE",
        Deleted => "DELETED",
        Broadcast => "BROADCAST",
        Broadcasted => "BROADCASTED",
        Correlate => "CORRELATE",
        Correlated => "CORRELATED",
        Escalated => "ESCALATED",
        NotEscalated => "NOT_ESCALATED",
        ActivateElement => "ACTIVATE_ELEMENT",
        ElementActivating => "ELEMENT_ACTIVATING",
        ElementActivated => "ELEMENT_ACTIVATED",
        CompleteElement => "COMPLETE_ELEMENT",
        ElementCompleting => "ELEMENT_COMPLETING",
        ElementCompleted => "ELEMENT_COMPLETED",
        TerminateElement => "TERMINATE_ELEMENT",
        ElementTerminating => "ELEMENT_TERMINATING",
        ElementTerminated => "ELEMENT_TERMINATED",
        SequenceFlowTaken => "SEQUENCE_FLOW_TAKEN",
        Distributing => "DISTRIBUTING",
        Acknowledge => "ACKNOWLEDGE",
        Acknowledged => "ACKNOWLEDGED",
        Finished => "FINISHED",
    }
}

wire_enum! {
    /// Why a command was rejected. `NullVal` on every record that is not a
    /// rejection.
    pub enum RejectionType {
        NullVal => "NULL_VAL",
        InvalidArgument => "INVALID_ARGUMENT",
        NotFound => "NOT_FOUND",
        AlreadyExists => "ALREADY_EXISTS",
        InvalidState => "INVALID_STATE",
        ProcessingError => "PROCESSING_ERROR",
    }
}

impl Default for RejectionType {
    fn default() -> Self {
        Self::NullVal
    }
}

/// Immutable log entry emitted by the engine.
///
/// `position` is unique and strictly increasing in emission order. On the wire
/// a record is a JSON object whose `value` is decoded according to
/// `valueType`; see [`RecordValue::decode`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawRecord")]
pub struct Record {
    pub position: u64,
    pub source_record_position: Option<u64>,
    pub key: i64,
    pub timestamp: i64,
    pub record_type: RecordType,
    pub value_type: ValueType,
    pub intent: Intent,
    pub rejection_type: RejectionType,
    pub rejection_reason: String,
    pub value: RecordValue,
}

impl Record {
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.record_type == RecordType::Command
    }

    #[must_use]
    pub fn is_event(&self) -> bool {
        self.record_type == RecordType::Event
    }

    #[must_use]
    pub fn is_rejection(&self) -> bool {
        self.record_type == RecordType::CommandRejection
    }
}

/// Wire shape of a record before its value has been decoded.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    position: u64,
    #[serde(default)]
    source_record_position: Option<u64>,
    key: i64,
    timestamp: i64,
    record_type: RecordType,
    value_type: ValueType,
    intent: Intent,
    #[serde(default)]
    rejection_type: RejectionType,
    #[serde(default)]
    rejection_reason: String,
    value: serde_json::Value,
}

impl TryFrom<RawRecord> for Record {
    type Error = String;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let value = RecordValue::decode(raw.value_type, raw.value).map_err(|e| {
            format!(
                "value of record at position {} is not a valid {}: {e}",
                raw.position, raw.value_type
            )
        })?;
        Ok(Self {
            position: raw.position,
            source_record_position: raw.source_record_position,
            key: raw.key,
            timestamp: raw.timestamp,
            record_type: raw.record_type,
            value_type: raw.value_type,
            intent: raw.intent,
            rejection_type: raw.rejection_type,
            rejection_reason: raw.rejection_reason,
            value,
        })
    }
}

/// A record as handed to the log writer, before a position is assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub record_type: RecordType,
    pub intent: Intent,
    pub key: i64,
    pub timestamp: i64,
    pub source_record_position: Option<u64>,
    pub rejection_type: RejectionType,
    pub rejection_reason: String,
    pub value: RecordValue,
}

impl RecordEntry {
    /// A command with no key assigned yet.
    #[must_use]
    pub fn command(intent: Intent, value: RecordValue) -> Self {
        Self::new(RecordType::Command, intent, -1, value)
    }

    #[must_use]
    pub fn event(intent: Intent, key: i64, value: RecordValue) -> Self {
        Self::new(RecordType::Event, intent, key, value)
    }

    /// A rejection of `command`, carrying the command's intent and value.
    #[must_use]
    pub fn rejection(command: &Record, rejection_type: RejectionType, reason: impl Into<String>) -> Self {
        Self {
            rejection_type,
            rejection_reason: reason.into(),
            source_record_position: Some(command.position),
            ..Self::new(
                RecordType::CommandRejection,
                command.intent,
                command.key,
                command.value.clone(),
            )
        }
    }

    fn new(record_type: RecordType, intent: Intent, key: i64, value: RecordValue) -> Self {
        Self {
            record_type,
            intent,
            key,
            timestamp: 0,
            source_record_position: None,
            rejection_type: RejectionType::NullVal,
            rejection_reason: String::new(),
            value,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_key(mut self, key: i64) -> Self {
        self.key = key;
        self
    }

    #[must_use]
    pub fn with_source(mut self, position: u64) -> Self {
        self.source_record_position = Some(position);
        self
    }

    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }

    pub(crate) fn into_record(self, position: u64) -> Record {
        Record {
            position,
            source_record_position: self.source_record_position,
            key: self.key,
            timestamp: self.timestamp,
            record_type: self.record_type,
            value_type: self.value.value_type(),
            intent: self.intent,
            rejection_type: self.rejection_type,
            rejection_reason: self.rejection_reason,
            value: self.value,
        }
    }
}
