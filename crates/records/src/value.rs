//! Record payloads.
//!
//! [`RecordValue`] is a closed sum type with one variant per value type that
//! carries structured detail, plus [`RecordValue::Opaque`] for value types whose
//! payload is passed through undecoded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, Serializer};

use crate::record::{Intent, ValueType};

/// Process variables, in name order.
pub type Variables = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimerValue {
    pub element_instance_key: i64,
    pub process_instance_key: i64,
    pub process_definition_key: i64,
    pub target_element_id: String,
    pub due_date: i64,
    pub repetitions: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageValue {
    pub name: String,
    pub correlation_key: String,
    pub message_id: String,
    pub time_to_live: i64,
    pub deadline: i64,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageSubscriptionValue {
    pub message_name: String,
    pub correlation_key: String,
    pub process_instance_key: i64,
    pub element_instance_key: i64,
    pub element_id: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobValue {
    #[serde(rename = "type")]
    pub job_type: String,
    pub element_id: String,
    pub bpmn_process_id: String,
    pub process_instance_key: i64,
    pub worker: String,
    pub retries: i32,
    pub deadline: i64,
    pub error_message: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobBatchValue {
    #[serde(rename = "type")]
    pub job_type: String,
    pub worker: String,
    pub max_jobs_to_activate: i32,
    pub job_keys: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentResource {
    pub resource_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentValue {
    pub resources: Vec<DeploymentResource>,
    pub process_metadata: Vec<ProcessMetadataValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessMetadataValue {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: i64,
    pub resource_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessInstanceValue {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: i64,
    pub process_instance_key: i64,
    pub element_id: String,
    pub flow_scope_key: i64,
    pub bpmn_element_type: String,
    pub bpmn_event_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartInstruction {
    pub element_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessInstanceCreationValue {
    pub bpmn_process_id: String,
    pub version: i32,
    pub process_definition_key: i64,
    pub process_instance_key: i64,
    pub variables: Variables,
    pub start_instructions: Vec<StartInstruction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessInstanceResultValue {
    pub bpmn_process_id: String,
    pub process_instance_key: i64,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncidentValue {
    pub error_type: String,
    pub error_message: String,
    pub bpmn_process_id: String,
    pub element_id: String,
    pub process_instance_key: i64,
    pub job_key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableValue {
    pub name: String,
    pub value: String,
    pub scope_key: i64,
    pub process_instance_key: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableDocumentValue {
    pub scope_key: i64,
    pub update_semantics: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ErrorValue {
    pub exception_message: String,
    pub stacktrace: String,
    pub error_event_position: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignalValue {
    pub signal_name: String,
    pub variables: Variables,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EscalationValue {
    pub process_instance_key: i64,
    pub escalation_code: String,
    pub throw_element_id: String,
    pub catch_element_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceDeletionValue {
    pub resource_key: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDistributionValue {
    pub partition_id: i32,
    pub value_type: ValueType,
    pub intent: Intent,
}

/// Structured payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Timer(TimerValue),
    Message(MessageValue),
    MessageSubscription(MessageSubscriptionValue),
    ProcessMessageSubscription(MessageSubscriptionValue),
    Job(JobValue),
    JobBatch(JobBatchValue),
    Deployment(DeploymentValue),
    Process(ProcessMetadataValue),
    ProcessInstance(ProcessInstanceValue),
    ProcessInstanceCreation(ProcessInstanceCreationValue),
    ProcessInstanceResult(ProcessInstanceResultValue),
    Incident(IncidentValue),
    Variable(VariableValue),
    VariableDocument(VariableDocumentValue),
    Error(ErrorValue),
    Signal(SignalValue),
    Escalation(EscalationValue),
    ResourceDeletion(ResourceDeletionValue),
    CommandDistribution(CommandDistributionValue),
    /// Payload of a value type without structured detail, kept as received.
    Opaque {
        value_type: ValueType,
        payload: serde_json::Value,
    },
}

impl RecordValue {
    /// Decode a raw JSON payload according to `value_type`.
    ///
    /// # Errors
    /// Returns the JSON error if the payload does not match the shape the value
    /// type requires.
    pub fn decode(value_type: ValueType, raw: serde_json::Value) -> Result<Self, serde_json::Error> {
        let value = match value_type {
            ValueType::Timer => Self::Timer(serde_json::from_value(raw)?),
            ValueType::Message => Self::Message(serde_json::from_value(raw)?),
            ValueType::MessageSubscription => {
                Self::MessageSubscription(serde_json::from_value(raw)?)
            }
            ValueType::ProcessMessageSubscription => {
                Self::ProcessMessageSubscription(serde_json::from_value(raw)?)
            }
            ValueType::Job => Self::Job(serde_json::from_value(raw)?),
            ValueType::JobBatch => Self::JobBatch(serde_json::from_value(raw)?),
            ValueType::Deployment => Self::Deployment(serde_json::from_value(raw)?),
            ValueType::Process => Self::Process(serde_json::from_value(raw)?),
            ValueType::ProcessInstance => Self::ProcessInstance(serde_json::from_value(raw)?),
            ValueType::ProcessInstanceCreation => {
                Self::ProcessInstanceCreation(serde_json::from_value(raw)?)
            }
            ValueType::ProcessInstanceResult => {
                Self::ProcessInstanceResult(serde_json::from_value(raw)?)
            }
            ValueType::Incident => Self::Incident(serde_json::from_value(raw)?),
            ValueType::Variable => Self::Variable(serde_json::from_value(raw)?),
            ValueType::VariableDocument => Self::VariableDocument(serde_json::from_value(raw)?),
            ValueType::Error => Self::Error(serde_json::from_value(raw)?),
            ValueType::Signal => Self::Signal(serde_json::from_value(raw)?),
            ValueType::Escalation => Self::Escalation(serde_json::from_value(raw)?),
            ValueType::ResourceDeletion => Self::ResourceDeletion(serde_json::from_value(raw)?),
            ValueType::CommandDistribution => {
                Self::CommandDistribution(serde_json::from_value(raw)?)
            }
            ValueType::DeploymentDistribution
            | ValueType::ProcessInstanceModification
            | ValueType::ProcessInstanceBatch
            | ValueType::ProcessEvent
            | ValueType::MessageStartEventSubscription
            | ValueType::SignalSubscription
            | ValueType::Decision
            | ValueType::DecisionRequirements
            | ValueType::DecisionEvaluation
            | ValueType::Checkpoint
            | ValueType::SbeUnknown => Self::Opaque {
                value_type,
                payload: raw,
            },
        };
        Ok(value)
    }

    /// The value type this payload belongs to.
    #[must_use]
    pub const fn value_type(&self) -> ValueType {
        match self {
            Self::Timer(_) => ValueType::Timer,
            Self::Message(_) => ValueType::Message,
            Self::MessageSubscription(_) => ValueType::MessageSubscription,
            Self::ProcessMessageSubscription(_) => ValueType::ProcessMessageSubscription,
            Self::Job(_) => ValueType::Job,
            Self::JobBatch(_) => ValueType::JobBatch,
            Self::Deployment(_) => ValueType::Deployment,
            Self::Process(_) => ValueType::Process,
            Self::ProcessInstance(_) => ValueType::ProcessInstance,
            Self::ProcessInstanceCreation(_) => ValueType::ProcessInstanceCreation,
            Self::ProcessInstanceResult(_) => ValueType::ProcessInstanceResult,
            Self::Incident(_) => ValueType::Incident,
            Self::Variable(_) => ValueType::Variable,
            Self::VariableDocument(_) => ValueType::VariableDocument,
            Self::Error(_) => ValueType::Error,
            Self::Signal(_) => ValueType::Signal,
            Self::Escalation(_) => ValueType::Escalation,
            Self::ResourceDeletion(_) => ValueType::ResourceDeletion,
            Self::CommandDistribution(_) => ValueType::CommandDistribution,
            Self::Opaque { value_type, .. } => *value_type,
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Timer(v) => v.serialize(serializer),
            Self::Message(v) => v.serialize(serializer),
            Self::MessageSubscription(v) | Self::ProcessMessageSubscription(v) => {
                v.serialize(serializer)
            }
            Self::Job(v) => v.serialize(serializer),
            Self::JobBatch(v) => v.serialize(serializer),
            Self::Deployment(v) => v.serialize(serializer),
            Self::Process(v) => v.serialize(serializer),
            Self::ProcessInstance(v) => v.serialize(serializer),
            Self::ProcessInstanceCreation(v) => v.serialize(serializer),
            Self::ProcessInstanceResult(v) => v.serialize(serializer),
            Self::Incident(v) => v.serialize(serializer),
            Self::Variable(v) => v.serialize(serializer),
            Self::VariableDocument(v) => v.serialize(serializer),
            Self::Error(v) => v.serialize(serializer),
            Self::Signal(v) => v.serialize(serializer),
            Self::Escalation(v) => v.serialize(serializer),
            Self::ResourceDeletion(v) => v.serialize(serializer),
            Self::CommandDistribution(v) => v.serialize(serializer),
            Self::Opaque { payload, .. } => payload.serialize(serializer),
        }
    }
}
