//! Incremental read position over a record log.

use std::sync::Arc;

use crate::log::RecordLog;
use crate::record::Record;

/// Per-consumer read position into a [`RecordLog`].
///
/// Every [`read`](RecordStreamCursor::read) returns exactly the records appended
/// since the previous read, so concatenating all reads reproduces the log with
/// no duplicates and no gaps. Records appended while a read is in progress are
/// left for the next read.
#[derive(Debug, Clone)]
pub struct RecordStreamCursor {
    log: RecordLog,
    next_position: u64,
}

impl RecordStreamCursor {
    /// A cursor at the start of `log`.
    #[must_use]
    pub fn new(log: RecordLog) -> Self {
        Self {
            log,
            next_position: 1,
        }
    }

    /// Position of the first record the next read will return.
    #[must_use]
    pub const fn next_position(&self) -> u64 {
        self.next_position
    }

    /// The log this cursor reads from.
    #[must_use]
    pub const fn log(&self) -> &RecordLog {
        &self.log
    }

    /// Whether this cursor reads from `log`.
    #[must_use]
    pub fn is_bound_to(&self, log: &RecordLog) -> bool {
        self.log.same_log(log)
    }

    /// Return every record not yet delivered by this cursor and advance past them.
    pub fn read(&mut self) -> Vec<Arc<Record>> {
        let delta = self.pending();
        if let Some(last) = delta.last() {
            self.commit(last.position);
        }
        delta
    }

    /// Every record not yet delivered, without advancing.
    ///
    /// Repeated calls return the same records plus any appended in between,
    /// until [`commit`](RecordStreamCursor::commit) moves past them.
    #[must_use]
    pub fn pending(&self) -> Vec<Arc<Record>> {
        let snapshot = self.log.snapshot();
        let start = usize::try_from(self.next_position.saturating_sub(1)).unwrap_or(usize::MAX);
        if start >= snapshot.len() {
            return Vec::new();
        }
        snapshot.skip(start).into_iter().collect()
    }

    /// Mark every record up to and including `position` as delivered.
    ///
    /// A position the cursor has already passed leaves it unchanged.
    pub fn commit(&mut self, position: u64) {
        let next = position.saturating_add(1);
        if next <= self.next_position {
            return;
        }
        tracing::debug!(
            delivered = next.saturating_sub(self.next_position),
            next_position = next,
            "Cursor advanced"
        );
        self.next_position = next;
    }
}
