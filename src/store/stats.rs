//! Aggregate statistics over the error log.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::LogEntry;
use crate::error::{ErrorKind, Severity};

/// Counts over a set of log entries.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total: usize,
    pub by_kind: BTreeMap<ErrorKind, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    /// Entries stamped within the hour before the reference instant.
    pub recent_last_hour: usize,
}

impl ErrorStats {
    /// Computes all counters in a single pass.
    pub fn collect<'a>(entries: impl IntoIterator<Item = &'a LogEntry>, now: DateTime<Utc>) -> Self {
        let one_hour_ago = now - Duration::hours(1);
        let mut stats = Self::default();
        for entry in entries {
            stats.total += 1;
            *stats.by_kind.entry(entry.error.kind()).or_insert(0) += 1;
            *stats.by_severity.entry(entry.error.severity()).or_insert(0) += 1;
            if entry.error.timestamp() > one_hour_ago {
                stats.recent_last_hour += 1;
            }
        }
        stats
    }

    /// The kind seen most often, ties broken by declaration order.
    pub fn most_common_kind(&self) -> Option<ErrorKind> {
        self.by_kind
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(kind, _)| *kind)
    }
}

/// Renders stats as a short markdown summary.
pub fn format_stats(stats: &ErrorStats) -> String {
    let mut output = String::from("## Error Statistics\n\n");
    output.push_str(&format!("- **Total**: {}\n", stats.total));
    output.push_str(&format!("- **Last hour**: {}\n", stats.recent_last_hour));

    if !stats.by_kind.is_empty() {
        output.push_str("\n### By Kind\n");
        let mut kinds: Vec<_> = stats.by_kind.iter().collect();
        kinds.sort_by(|a, b| b.1.cmp(a.1));
        for (kind, count) in kinds {
            output.push_str(&format!("- **{}**: {}\n", kind.as_str(), count));
        }
    }

    if !stats.by_severity.is_empty() {
        output.push_str("\n### By Severity\n");
        for (severity, count) in stats.by_severity.iter().rev() {
            output.push_str(&format!("- **{}**: {}\n", severity.as_str(), count));
        }
    }

    output
}
