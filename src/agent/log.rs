use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// One agent invocation, for post-hoc inspection only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub input_summary: String,
    pub output_keys: Vec<String>,
    pub duration_ms: u64,
    pub success: bool,
}

/// Append-only history owned by a single agent.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: LogEntry) {
        // A poisoned lock only means another append panicked; keep the data.
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_read_back() {
        let log = ExecutionLog::new();
        assert!(log.is_empty());
        log.record(LogEntry {
            at: Utc::now(),
            input_summary: "repository=acme/widgets".to_string(),
            output_keys: vec!["file_count".to_string()],
            duration_ms: 3,
            success: true,
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].output_keys, vec!["file_count"]);
    }
}
