//! # flowtest-records
//!
//! Records emitted by the engine and the machinery to read them back:
//!
//! - [`Record`] and its typed [`RecordValue`] payloads
//! - [`RecordLog`]: append-only log with a single [`RecordLogWriter`]
//! - [`RecordStreamCursor`]: exactly-once incremental reads over a log
//! - [`codec`]: the JSON transport encoding used across the control plane
//! - [`RecordStreamLogger`]: a readable table of a record stream
//!
//! # Example
//!
//! ```rust
//! use flowtest_records::{Intent, RecordEntry, RecordLog, RecordValue, TimerValue};
//!
//! let (mut writer, log) = RecordLog::open();
//! let mut cursor = log.cursor();
//!
//! writer.append(RecordEntry::command(Intent::Create, RecordValue::Timer(TimerValue::default())));
//! assert_eq!(cursor.read().len(), 1);
//! assert!(cursor.read().is_empty());
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod codec;
mod cursor;
mod error;
mod log;
mod logger;
mod record;
mod value;

pub use cursor::RecordStreamCursor;
pub use error::{RecordError, Result};
pub use log::{RecordLog, RecordLogWriter};
pub use logger::RecordStreamLogger;
pub use record::{Intent, Record, RecordEntry, RecordType, RejectionType, ValueType};
pub use value::{
    CommandDistributionValue, DeploymentResource, DeploymentValue, ErrorValue, EscalationValue,
    IncidentValue, JobBatchValue, JobValue, MessageSubscriptionValue, MessageValue,
    ProcessInstanceCreationValue, ProcessInstanceResultValue, ProcessInstanceValue,
    ProcessMetadataValue, RecordValue, ResourceDeletionValue, SignalValue, StartInstruction,
    TimerValue, VariableDocumentValue, VariableValue, Variables,
};
