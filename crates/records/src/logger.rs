//! Human-readable dump of a record stream.
//!
//! Used when a test fails, so the author can see every record the engine
//! emitted. Each record becomes one table row: record type, value type and
//! intent in fixed-width columns, followed by the details that matter for its
//! value type.

use std::fmt::Write as _;

use chrono::DateTime;
use itertools::Itertools;

use crate::record::{Record, RecordType};
use crate::value::{RecordValue, Variables};

/// Formats records as a table and writes it to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordStreamLogger;

impl RecordStreamLogger {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Log every record in `records` as one `info` event.
    pub fn log<'a>(&self, records: impl IntoIterator<Item = &'a Record>) {
        let table = self.render(records);
        tracing::info!("{table}");
    }

    /// Render `records` as a table, one row per record.
    #[must_use]
    pub fn render<'a>(&self, records: impl IntoIterator<Item = &'a Record>) -> String {
        let mut table = String::from("The following records have been recorded during this test:");
        for record in records {
            table.push('\n');
            table.push_str(&self.format_record(record));
        }
        table
    }

    /// One table row for `record`.
    #[must_use]
    pub fn format_record(&self, record: &Record) -> String {
        let mut row = String::new();
        let _ = write!(
            row,
            "| {:<20}{:<35}{:<30}| {}",
            record.record_type,
            record.value_type,
            record.intent,
            details(record)
        );
        row
    }
}

fn details(record: &Record) -> String {
    let is_event = record.record_type == RecordType::Event;
    match &record.value {
        RecordValue::Job(job) => {
            // these fields are empty on commands
            if !is_event {
                return String::new();
            }
            join([
                format!("(Element id: {})", job.element_id),
                format!("(Job type: {})", job.job_type),
                variables(&job.variables),
            ])
        }
        RecordValue::JobBatch(batch) => join([
            format!("(Worker: {})", batch.worker),
            format!("(Job type: {})", batch.job_type),
        ]),
        RecordValue::Deployment(deployment) => {
            if deployment.resources.is_empty() {
                return String::new();
            }
            format!(
                "(Processes: [{}])",
                deployment.resources.iter().map(|r| &r.resource_name).join(", ")
            )
        }
        RecordValue::Process(process) => format!("(Process: {})", process.resource_name),
        RecordValue::ProcessInstance(instance) => join([
            format!("(Element id: {})", instance.element_id),
            format!("(Element type: {})", instance.bpmn_element_type),
            format!("(Event type: {})", instance.bpmn_event_type),
            format!("(Process id: {})", instance.bpmn_process_id),
        ]),
        RecordValue::ProcessInstanceCreation(creation) => {
            let start = if creation.start_instructions.is_empty() {
                "(default start)".to_string()
            } else {
                format!(
                    "(starting before elements: {})",
                    creation.start_instructions.iter().map(|i| &i.element_id).join(", ")
                )
            };
            join([
                format!("(Process id: {})", creation.bpmn_process_id),
                variables(&creation.variables),
                start,
            ])
        }
        RecordValue::ProcessInstanceResult(result) => join([
            format!("(Process id: {})", result.bpmn_process_id),
            variables(&result.variables),
        ]),
        RecordValue::Incident(incident) => {
            if !is_event {
                return String::new();
            }
            join([
                format!("(Element id: {})", incident.element_id),
                format!("(Process id: {})", incident.bpmn_process_id),
            ])
        }
        RecordValue::Message(message) => join([
            format!("(Message name: {})", message.name),
            format!("(Correlation key: {})", message.correlation_key),
            variables(&message.variables),
        ]),
        RecordValue::MessageSubscription(subscription) => join([
            format!("(Message name: {})", subscription.message_name),
            format!("(Correlation key: {})", subscription.correlation_key),
            variables(&subscription.variables),
        ]),
        RecordValue::ProcessMessageSubscription(subscription) => {
            let mut parts = vec![format!("(Message name: {})", subscription.message_name)];
            if is_event {
                parts.push(format!("(Correlation key: {})", subscription.correlation_key));
                parts.push(format!("(Element id: {})", subscription.element_id));
            }
            parts.push(variables(&subscription.variables));
            join(parts)
        }
        RecordValue::Timer(timer) => join([
            format!("(Element id: {})", timer.target_element_id),
            format!("(Due date: {})", due_date(timer.due_date)),
        ]),
        RecordValue::Variable(variable) => join([
            format!("(Name: {})", variable.name),
            format!("(Value: {})", variable.value),
        ]),
        RecordValue::VariableDocument(document) => variables(&document.variables),
        RecordValue::Error(error) => format!("(Exception message: {})", error.exception_message),
        RecordValue::Signal(signal) => join([
            format!("(Signal name: {})", signal.signal_name),
            variables(&signal.variables),
        ]),
        RecordValue::Escalation(escalation) => join([
            format!("(Process id: {})", escalation.process_instance_key),
            format!("(Escalation code: {})", escalation.escalation_code),
            format!("(Throw element id: {})", escalation.throw_element_id),
            format!("(Catch element id: {})", escalation.catch_element_id),
        ]),
        RecordValue::ResourceDeletion(deletion) => {
            format!("(Resource key: {})", deletion.resource_key)
        }
        RecordValue::CommandDistribution(distribution) => join([
            format!("(To partition id: {})", distribution.partition_id),
            format!("(Value type: {})", distribution.value_type),
        ]),
        // nothing worth showing
        RecordValue::Opaque { .. } => String::new(),
    }
}

fn join<I: IntoIterator<Item = String>>(parts: I) -> String {
    parts.into_iter().filter(|part| !part.is_empty()).join(", ")
}

fn variables(variables: &Variables) -> String {
    if variables.is_empty() {
        return String::new();
    }
    format!(
        "(Variables: [{}])",
        variables
            .iter()
            .map(|(name, value)| format!("{name} -> {value}"))
            .join(", ")
    )
}

fn due_date(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis).map_or_else(|| millis.to_string(), |date| date.to_rfc3339())
}
