use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: Uuid,
    pub iteration_id: u64,
    pub tool_name: String,
    pub arguments: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: ToolOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Append-only log of tool invocations. Appends are serialized behind a
/// mutex (a single-producer-per-handler channel would also satisfy the
/// ordering guarantee; a mutex over a Vec is the simplest implementation
/// that upholds it) so records within one iteration keep non-decreasing
/// timestamps and readers never see a torn record.
pub struct ToolCallLog {
    records: Mutex<Vec<ToolCallRecord>>,
}

impl ToolCallLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn append(
        &self,
        clock: &dyn Clock,
        iteration_id: u64,
        tool_name: &str,
        arguments: HashMap<String, String>,
        duration_ms: u64,
        outcome: ToolOutcome,
        error_message: Option<String>,
    ) -> ToolCallRecord {
        let record = ToolCallRecord {
            id: Uuid::new_v4(),
            iteration_id,
            tool_name: tool_name.to_string(),
            arguments,
            timestamp: clock.now(),
            duration_ms,
            outcome,
            error_message,
        };
        self.records
            .lock()
            .expect("tool call log mutex poisoned")
            .push(record.clone());
        record
    }

    /// Snapshot of all records for one iteration, in append order.
    pub fn for_iteration(&self, iteration_id: u64) -> Vec<ToolCallRecord> {
        self.records
            .lock()
            .expect("tool call log mutex poisoned")
            .iter()
            .filter(|r| r.iteration_id == iteration_id)
            .cloned()
            .collect()
    }

    pub fn all(&self) -> Vec<ToolCallRecord> {
        self.records
            .lock()
            .expect("tool call log mutex poisoned")
            .clone()
    }
}

impl Default for ToolCallLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn for_iteration_filters_by_iteration_id() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        log.append(&clock, 1, "read_spec", HashMap::new(), 5, ToolOutcome::Success, None);
        log.append(&clock, 2, "read_spec", HashMap::new(), 5, ToolOutcome::Success, None);
        log.append(&clock, 1, "write_file", HashMap::new(), 5, ToolOutcome::Failure, None);

        let records = log.for_iteration(1);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.iteration_id == 1));
    }

    #[test]
    fn timestamps_are_non_decreasing_within_an_iteration() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        for _ in 0..5 {
            log.append(&clock, 9, "bash", HashMap::new(), 1, ToolOutcome::Success, None);
        }
        let records = log.for_iteration(9);
        for pair in records.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }
}
