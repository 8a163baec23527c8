//! Tool-call audit log (§4.C): an in-memory, append-only record of every
//! tool invocation made during a module run, plus run-level persistence so
//! a crashed run's history survives a restart.

mod record;

pub mod logger;
pub use logger::AuditLogger;
pub use record::{ToolCallLog, ToolCallRecord, ToolOutcome};

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub module: String,
    pub project_dir: PathBuf,
    pub spec_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum RunOutcome {
    InProgress,
    Completed,
    Error { message: String },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration: u64,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub step: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRun {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    pub iterations: Vec<IterationSummary>,
    pub outcome: RunOutcome,
}

impl AuditRun {
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            iterations: Vec::new(),
            outcome: RunOutcome::InProgress,
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_run_starts_in_progress_with_no_end_time() {
        let run = AuditRun::new(RunConfig {
            module: "auth".into(),
            project_dir: PathBuf::from("."),
            spec_file: PathBuf::from("spec.md"),
        });
        assert!(run.ended_at.is_none());
        assert_eq!(run.outcome, RunOutcome::InProgress);
        assert!(run.iterations.is_empty());
    }
}
