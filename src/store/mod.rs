//! Bounded, in-memory history of handled faults.
//!
//! The log keeps at most `capacity` entries. Appending beyond that evicts the
//! oldest entries first, so the newest `capacity` entries are always retained.
//! Nothing here survives a restart.

pub mod stats;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::error::{AppError, ErrorEnvelope, ErrorId};

/// Position of an entry in one [`ErrorLog`]. Sequences only grow, so a stale
/// sequence never matches a later entry, even after eviction or `clear`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntrySeq(u64);

pub use stats::{format_stats, ErrorStats};

/// One handled fault plus its bookkeeping flags.
#[derive(Clone, Debug, PartialEq)]
pub struct LogEntry {
    pub error: AppError,
    /// Always true for entries written by the handler.
    pub handled: bool,
    /// Set once a reporting sink accepted the report.
    pub reported_to_service: bool,
}

impl LogEntry {
    pub fn handled(error: AppError) -> Self {
        Self {
            error,
            handled: true,
            reported_to_service: false,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogEntryWire<'a> {
    #[serde(flatten)]
    envelope: ErrorEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    component: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    handled: bool,
    reported_to_service: bool,
}

impl Serialize for LogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let context = self.error.context();
        LogEntryWire {
            envelope: self.error.to_envelope(),
            user_id: self.error.user_id(),
            component: context.component.as_deref(),
            action: context.action.as_deref(),
            handled: self.handled,
            reported_to_service: self.reported_to_service,
        }
        .serialize(serializer)
    }
}

/// FIFO-evicting log of [`LogEntry`] values.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<(EntrySeq, LogEntry)>,
    capacity: usize,
    next_seq: u64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_seq: 0,
        }
    }

    /// Appends an entry and prunes to capacity. Returns the entry's
    /// sequence, which stays valid for [`ErrorLog::mark_reported`] even if
    /// the same error is logged again.
    pub fn push(&mut self, entry: LogEntry) -> EntrySeq {
        let seq = EntrySeq(self.next_seq);
        self.next_seq += 1;
        self.entries.push_back((seq, entry));
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
        seq
    }

    /// Marks the entry written as `seq` as reported. Returns false if it has
    /// already been evicted or cleared.
    pub fn mark_reported(&mut self, seq: EntrySeq) -> bool {
        match self.entries.iter_mut().find(|(s, _)| *s == seq) {
            Some((_, entry)) => {
                entry.reported_to_service = true;
                true
            }
            None => false,
        }
    }

    /// Marks the newest entry for `id` as reported.
    pub fn mark_latest_reported(&mut self, id: &ErrorId) -> bool {
        match self
            .entries
            .iter_mut()
            .rev()
            .find(|(_, e)| e.error.id() == id)
        {
            Some((_, entry)) => {
                entry.reported_to_service = true;
                true
            }
            None => false,
        }
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Aggregates the current entries relative to `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> ErrorStats {
        ErrorStats::collect(self.iter(), now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry::handled(AppError::new(message))
    }

    #[test]
    fn test_keeps_most_recent_entries() {
        let mut log = ErrorLog::new(2);
        for i in 0..5 {
            log.push(entry(&format!("fault {i}")));
        }

        let messages: Vec<_> = log
            .snapshot()
            .into_iter()
            .map(|e| e.error.message().to_string())
            .collect();
        assert_eq!(messages, vec!["fault 3", "fault 4"]);
    }

    #[test]
    fn test_push_hands_out_increasing_sequences() {
        let mut log = ErrorLog::new(1);
        let first = log.push(entry("a"));
        let second = log.push(entry("b"));
        assert!(second > first);
        assert_eq!(log.len(), 1);
        assert!(!log.mark_reported(first));
        assert!(log.mark_reported(second));
    }

    #[test]
    fn test_zero_capacity_holds_nothing() {
        let mut log = ErrorLog::new(0);
        log.push(entry("a"));
        assert!(log.is_empty());
    }

    #[test]
    fn test_mark_reported() {
        let mut log = ErrorLog::new(10);
        let seq = log.push(entry("a"));
        log.push(entry("b"));

        assert!(log.mark_reported(seq));
        let snapshot = log.snapshot();
        assert!(snapshot[0].reported_to_service);
        assert!(!snapshot[1].reported_to_service);

        log.clear();
        assert!(!log.mark_reported(seq));
    }

    #[test]
    fn test_same_error_logged_twice_is_marked_per_entry() {
        let mut log = ErrorLog::new(10);
        let error = AppError::network("down");
        let older = log.push(LogEntry::handled(error.clone()));
        log.push(LogEntry::handled(error.clone()));

        assert!(log.mark_reported(older));
        let flags: Vec<_> = log.iter().map(|e| e.reported_to_service).collect();
        assert_eq!(flags, vec![true, false]);

        assert!(log.mark_latest_reported(error.id()));
        let flags: Vec<_> = log.iter().map(|e| e.reported_to_service).collect();
        assert_eq!(flags, vec![true, true]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut log = ErrorLog::new(10);
        log.push(entry("a"));
        let snapshot = log.snapshot();
        log.clear();
        assert_eq!(snapshot.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_entry_serializes_flat() {
        let e = LogEntry::handled(AppError::validation("bad").with_user_id("u-1"));
        let value = serde_json::to_value(&e).unwrap();
        assert_eq!(value["kind"], "validation");
        assert_eq!(value["severity"], "low");
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["handled"], true);
        assert_eq!(value["reportedToService"], false);
        assert!(value["context"].is_object());
    }
}
