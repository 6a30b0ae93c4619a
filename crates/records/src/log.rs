//! Append-only record log.
//!
//! One [`RecordLogWriter`] appends; any number of [`RecordLog`] handles read.
//! Readers take an O(1) persistent snapshot of the log and iterate it outside
//! the lock, so a reader never holds up the writer for longer than that clone
//! and never observes a partially appended record.
//!
//! Positions start at 1 and are contiguous: the record at index `i` has
//! position `i + 1`.

use std::sync::{Arc, PoisonError, RwLock};

use crate::cursor::RecordStreamCursor;
use crate::record::{Record, RecordEntry};

type Snapshot = im::Vector<Arc<Record>>;

/// Read handle to a record log. Cheap to clone; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordLog {
    records: Arc<RwLock<Snapshot>>,
}

impl RecordLog {
    /// Create an empty log and its single writer.
    #[must_use]
    pub fn open() -> (RecordLogWriter, RecordLog) {
        let log = Self::default();
        let writer = RecordLogWriter {
            log: log.clone(),
            next_position: 1,
        };
        (writer, log)
    }

    /// Consistent snapshot of every record appended so far.
    #[must_use]
    pub fn snapshot(&self) -> im::Vector<Arc<Record>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every record appended so far, in position order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> {
        self.snapshot().iter().map(|r| (**r).clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the most recent record, if any.
    #[must_use]
    pub fn last_position(&self) -> Option<u64> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|r| r.position)
    }

    /// A new cursor positioned at the start of this log.
    #[must_use]
    pub fn cursor(&self) -> RecordStreamCursor {
        RecordStreamCursor::new(self.clone())
    }

    /// Whether `other` is a handle to the same log.
    #[must_use]
    pub fn same_log(&self, other: &RecordLog) -> bool {
        Arc::ptr_eq(&self.records, &other.records)
    }
}

/// The single writer of a record log.
#[derive(Debug)]
pub struct RecordLogWriter {
    log: RecordLog,
    next_position: u64,
}

impl RecordLogWriter {
    /// Assign the next position to `entry` and append it.
    pub fn append(&mut self, entry: RecordEntry) -> Arc<Record> {
        let record = Arc::new(entry.into_record(self.next_position));
        self.log
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Arc::clone(&record));
        self.next_position = self.next_position.saturating_add(1);

        tracing::trace!(
            position = record.position,
            record_type = %record.record_type,
            value_type = %record.value_type,
            intent = %record.intent,
            "Record appended"
        );
        record
    }

    /// Position the next appended record will get.
    #[must_use]
    pub const fn next_position(&self) -> u64 {
        self.next_position
    }

    /// A read handle to the log this writer appends to.
    #[must_use]
    pub fn reader(&self) -> RecordLog {
        self.log.clone()
    }
}
