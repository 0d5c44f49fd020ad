//! Operation log
//!
//! Every state-changing call on an [`Estimator`](super::Estimator) appends an
//! entry recording the operation, its arguments and when it was made.

use std::fmt::Write as _;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A single logged operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub operation: String,
    /// `(name, value)` pairs, values rendered with `Debug`
    pub arguments: Vec<(String, String)>,
    /// Seconds since the Unix epoch
    pub timestamp: u64,
}

/// Append-only list of operations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationLog {
    entries: Vec<LogEntry>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: Vec<LogEntry>) -> Self {
        Self { entries }
    }

    /// Append an entry stamped with the current time.
    pub fn record(&mut self, operation: &str, arguments: Vec<(&str, String)>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        log::debug!("recording operation {}", operation);
        self.entries.push(LogEntry {
            operation: operation.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            timestamp,
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One line per entry: `[timestamp] operation(name=value, ...)`
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            let args: Vec<String> = entry
                .arguments
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            let _ = writeln!(text, "[{}] {}({})", entry.timestamp, entry.operation, args.join(", "));
        }
        text
    }
}
