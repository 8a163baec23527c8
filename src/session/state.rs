use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tasktree::TaskTree;
use crate::workflow::{WorkflowPhase, WorkflowStep};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub module: String,
    pub step: WorkflowStep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    pub task_tree: TaskTree,
    pub section_hashes: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_task_completion_commit: Option<String>,
    /// Scopes a `verify_*_completion` call has passed for, within the
    /// current iteration. `update_task_status` checks this before marking
    /// anything complete; the orchestrator clears it before every iteration
    /// so a stale pass can't gate a later, unrelated claim.
    #[serde(default)]
    pub verified_scopes: BTreeSet<String>,
    pub is_complete: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, module: impl Into<String>, now: DateTime<Utc>) -> Self {
        let module = module.into();
        Self {
            session_id: session_id.into(),
            task_tree: TaskTree::new(&module, &module),
            module,
            step: WorkflowStep::DraftSpec,
            component: None,
            task: None,
            section_hashes: HashMap::new(),
            last_task_completion_commit: None,
            verified_scopes: BTreeSet::new(),
            is_complete: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self) -> Option<WorkflowPhase> {
        self.step.phase()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    pub fn advance_to(&mut self, step: WorkflowStep, now: DateTime<Utc>) {
        self.step = step;
        self.is_complete = step.is_terminal();
        self.touch(now);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IterationTokenUsage {
    pub input: u64,
    pub output: u64,
    pub context_window_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub iteration_count: u64,
    pub cumulative_input_tokens: u64,
    pub cumulative_output_tokens: u64,
    pub premium_request_count: u64,
    pub per_iteration_tokens: Vec<IterationTokenUsage>,
}

impl SessionMetrics {
    pub fn record_iteration(&mut self, usage: IterationTokenUsage) {
        self.iteration_count += 1;
        self.cumulative_input_tokens += usage.input;
        self.cumulative_output_tokens += usage.output;
        self.per_iteration_tokens.push(usage);
    }

    pub fn record_premium_request(&mut self) {
        self.premium_request_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_at_draft_spec_and_incomplete() {
        let now = Utc::now();
        let state = SessionState::new("auth-20260801-1", "auth", now);
        assert_eq!(state.step, WorkflowStep::DraftSpec);
        assert!(!state.is_complete);
    }

    #[test]
    fn advancing_to_complete_sets_is_complete() {
        let now = Utc::now();
        let mut state = SessionState::new("auth-20260801-1", "auth", now);
        state.advance_to(WorkflowStep::Complete, now);
        assert!(state.is_complete);
    }

    #[test]
    fn metrics_accumulate_across_iterations() {
        let mut metrics = SessionMetrics::default();
        metrics.record_iteration(IterationTokenUsage {
            input: 100,
            output: 50,
            context_window_size: 8000,
        });
        metrics.record_iteration(IterationTokenUsage {
            input: 200,
            output: 75,
            context_window_size: 8200,
        });
        assert_eq!(metrics.iteration_count, 2);
        assert_eq!(metrics.cumulative_input_tokens, 300);
        assert_eq!(metrics.cumulative_output_tokens, 125);
    }
}
