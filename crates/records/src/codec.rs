//! JSON transport encoding of records.
//!
//! Records cross the control plane as opaque JSON strings. Decoding is strict:
//! a payload that does not decode is an error, never skipped.

use crate::error::{RecordError, Result};
use crate::record::Record;

/// Encode a record as its JSON transport payload.
///
/// # Errors
/// Returns [`RecordError::EncodeFailed`] if serialization fails.
pub fn encode(record: &Record) -> Result<String> {
    serde_json::to_string(record).map_err(|e| RecordError::encode_failed(record.position, e.to_string()))
}

/// Decode one JSON transport payload.
///
/// # Errors
/// Returns [`RecordError::Malformed`] if the payload is not a valid record.
pub fn decode(payload: &str) -> Result<Record> {
    serde_json::from_str(payload).map_err(|e| RecordError::malformed(e.to_string()))
}

/// Decode a batch of payloads in order, failing on the first malformed one.
///
/// # Errors
/// Returns [`RecordError::Malformed`] naming the index of the first bad payload.
pub fn decode_all<S: AsRef<str>>(payloads: &[S]) -> Result<Vec<Record>> {
    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            decode(payload.as_ref()).map_err(|e| RecordError::malformed(format!("payload {index}: {e}")))
        })
        .collect()
}
