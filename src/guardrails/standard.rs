use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::audit::ToolOutcome;
use crate::budget::{BudgetTracker, Severity};
use crate::clock::{Clock, SystemClock};
use crate::detectors::{BackPressure, BackPressureLevel, ChurnDetector, CircularBehaviorDetector, SlidingWindowCounter};

use super::{Guardrail, GuardrailContext, GuardrailResult};

/// Order 100 — reports Warn at >=80% of token budget, Block(confirm) at
/// >=90%.
pub struct BudgetGuardrail {
    tracker: BudgetTracker,
}

impl BudgetGuardrail {
    pub fn new(tracker: BudgetTracker) -> Self {
        Self { tracker }
    }

    /// Feed the latest token usage in; called by the orchestrator after an
    /// LLM invocation, ahead of the *next* iteration's guardrail pass.
    pub fn record_tokens(&self, tokens: i64) -> crate::budget::BudgetVerdict {
        self.tracker.record(tokens)
    }
}

impl Guardrail for BudgetGuardrail {
    fn order(&self) -> u32 {
        100
    }
    fn short_circuit_on_block(&self) -> bool {
        true
    }
    fn category(&self) -> &'static str {
        "budget"
    }
    fn evaluate(&self, _ctx: &GuardrailContext<'_>) -> GuardrailResult {
        let verdict = self.tracker.record(0);
        match verdict.severity {
            Severity::Info => GuardrailResult::Pass,
            Severity::Warning => GuardrailResult::Warn {
                message: format!("token budget at {:.0}%", verdict.fraction_used * 100.0),
                corrective_instruction: Some(
                    "Token budget is running low; wrap up the current task efficiently.".into(),
                ),
            },
            Severity::ConfirmationRequired => GuardrailResult::Block {
                message: format!("token budget at {:.0}%, confirmation required", verdict.fraction_used * 100.0),
                requires_user_confirmation: true,
            },
        }
    }
}

/// Order 200 — Block(confirm) once a task has reached the churn threshold.
pub struct ChurnGuardrail {
    detector: Mutex<ChurnDetector>,
}

impl ChurnGuardrail {
    pub fn new(threshold: u32) -> Self {
        Self {
            detector: Mutex::new(ChurnDetector::new(threshold)),
        }
    }

    /// Returns the task's new consecutive-failure count, so callers can feed
    /// it straight into a back-pressure tracker without re-deriving it.
    pub fn record_failure(&self, task_id: &str, reason: &str) -> u32 {
        self.detector
            .lock()
            .expect("churn detector mutex poisoned")
            .record_failure(task_id, reason)
    }

    pub fn record_success(&self, task_id: &str) {
        self.detector
            .lock()
            .expect("churn detector mutex poisoned")
            .record_success(task_id);
    }
}

impl Guardrail for ChurnGuardrail {
    fn order(&self) -> u32 {
        200
    }
    fn short_circuit_on_block(&self) -> bool {
        true
    }
    fn category(&self) -> &'static str {
        "churn"
    }
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult {
        let Some(task_id) = ctx.task_id else {
            return GuardrailResult::Pass;
        };
        let detector = self.detector.lock().expect("churn detector mutex poisoned");
        if detector.is_escalated(task_id) {
            GuardrailResult::Block {
                message: format!("task {task_id} has failed {} times in a row", detector.consecutive_failures(task_id)),
                requires_user_confirmation: true,
            }
        } else {
            GuardrailResult::Pass
        }
    }
}

/// Order 220 — aggregates the churn signal into a back-pressure level
/// instead of gating on one task's count in isolation: a module that keeps
/// failing across several different tasks escalates here even though no
/// single task has crossed the churn threshold itself.
pub struct BackPressureGuardrail {
    state: Mutex<BackPressure>,
    clock: Arc<dyn Clock>,
}

impl BackPressureGuardrail {
    pub fn new(warning_at: u32, intervention_at: u32, halted_at: u32) -> Self {
        Self {
            state: Mutex::new(BackPressure::new(warning_at, intervention_at, halted_at)),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(warning_at: u32, intervention_at: u32, halted_at: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(BackPressure::new(warning_at, intervention_at, halted_at)),
            clock,
        }
    }

    pub fn record_failure_count(&self, count: u32, reason: &str) -> BackPressureLevel {
        self.state
            .lock()
            .expect("back-pressure mutex poisoned")
            .record_failure_count(count, reason, self.clock.now())
    }

    pub fn reset(&self) {
        self.state.lock().expect("back-pressure mutex poisoned").reset();
    }

    pub fn level(&self) -> BackPressureLevel {
        self.state.lock().expect("back-pressure mutex poisoned").level()
    }
}

impl Guardrail for BackPressureGuardrail {
    fn order(&self) -> u32 {
        220
    }
    fn short_circuit_on_block(&self) -> bool {
        true
    }
    fn category(&self) -> &'static str {
        "back_pressure"
    }
    fn evaluate(&self, _ctx: &GuardrailContext<'_>) -> GuardrailResult {
        match self.level() {
            BackPressureLevel::Normal => GuardrailResult::Pass,
            BackPressureLevel::Warning => GuardrailResult::Warn {
                message: "repeated failures across tasks; escalating caution".into(),
                corrective_instruction: Some(
                    "Several tasks have failed recently. Slow down and double-check assumptions before the next change.".into(),
                ),
            },
            BackPressureLevel::InterventionRequired | BackPressureLevel::Halted => GuardrailResult::Block {
                message: "back-pressure threshold crossed; failures are compounding across tasks".into(),
                requires_user_confirmation: true,
            },
        }
    }
}

/// Order 210 — Warn, never blocks, when the same resource/action is
/// observed with unchanged content repeatedly.
pub struct CircularBehaviorGuardrail {
    detector: Mutex<CircularBehaviorDetector>,
}

impl CircularBehaviorGuardrail {
    pub fn new(threshold: u32) -> Self {
        Self {
            detector: Mutex::new(CircularBehaviorDetector::new(threshold)),
        }
    }

    /// Observe one tool access; returns true if intervention is warranted.
    pub fn observe(&self, resource_id: &str, action: &str, content: &str) -> bool {
        self.detector
            .lock()
            .expect("circular detector mutex poisoned")
            .observe(resource_id, action, content)
    }

    pub fn reset_for_iteration(&self) {
        self.detector
            .lock()
            .expect("circular detector mutex poisoned")
            .reset();
    }
}

impl Guardrail for CircularBehaviorGuardrail {
    fn order(&self) -> u32 {
        210
    }
    fn short_circuit_on_block(&self) -> bool {
        false
    }
    fn category(&self) -> &'static str {
        "circular_behavior"
    }
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult {
        let records = ctx.tool_call_log.for_iteration(ctx.iteration_id);
        let mut by_resource: HashMap<(&str, &str), u32> = HashMap::new();
        for record in &records {
            if let Some(path) = record.arguments.get("path") {
                *by_resource
                    .entry((path.as_str(), record.tool_name.as_str()))
                    .or_insert(0) += 1;
            }
        }
        if by_resource.values().any(|&n| n >= 3) {
            GuardrailResult::Warn {
                message: "the same resource has been accessed repeatedly with unchanged content".into(),
                corrective_instruction: Some(
                    "You have read the same file multiple times without new information. Try a different approach.".into(),
                ),
            }
        } else {
            GuardrailResult::Pass
        }
    }
}

/// Order 300 — Block unless the current iteration's audit log already
/// contains a successful `verify_*_completion` call matching the claimed
/// scope. Enforces the "completion claims earn their verdict" invariant.
pub struct OracleGateGuardrail;

impl Guardrail for OracleGateGuardrail {
    fn order(&self) -> u32 {
        300
    }
    fn short_circuit_on_block(&self) -> bool {
        true
    }
    fn category(&self) -> &'static str {
        "oracle_gate"
    }
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult {
        if !ctx.is_completion_claim {
            return GuardrailResult::Pass;
        }
        let scope = ctx.completion_scope.unwrap_or_default();
        let records = ctx.tool_call_log.for_iteration(ctx.iteration_id);
        let verified = records.iter().any(|r| {
            r.tool_name.starts_with("verify_")
                && r.tool_name.ends_with("_completion")
                && r.outcome == ToolOutcome::Success
                && r.arguments.get("scope_id").map(String::as_str) == Some(scope)
        });
        if verified {
            GuardrailResult::Pass
        } else {
            GuardrailResult::Block {
                message: format!("completion of '{scope}' claimed without a passing verification call"),
                requires_user_confirmation: false,
            }
        }
    }
}

/// Order 400 — Warn, never blocks, on repeated reads, repeated command
/// failures, or shotgun editing without running tests.
///
/// The repeated-reads check is windowed over wall-clock time and the whole
/// session, not just the current iteration's tool calls: a file re-read
/// once per iteration across many iterations is the same waste as re-reading
/// it five times in one, and counting only within one iteration's log never
/// caught that.
pub struct ToolDisciplineGuardrail {
    pub max_same_file_reads: u32,
    pub max_consecutive_failures: u32,
    pub shotgun_file_threshold: u32,
    read_window: Duration,
    clock: Arc<dyn Clock>,
    read_counters: Mutex<HashMap<String, SlidingWindowCounter>>,
    reads_observed: Mutex<usize>,
}

impl ToolDisciplineGuardrail {
    pub fn new(max_same_file_reads: u32, max_consecutive_failures: u32, shotgun_file_threshold: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_same_file_reads,
            max_consecutive_failures,
            shotgun_file_threshold,
            read_window: Duration::minutes(15),
            clock,
            read_counters: Mutex::new(HashMap::new()),
            reads_observed: Mutex::new(0),
        }
    }

    /// Feeds every read-tool record not yet seen into its path's counter and
    /// reports whether any path is now over threshold within the window.
    fn observe_new_reads(&self, all_records: &[crate::audit::ToolCallRecord]) -> bool {
        let mut observed = self.reads_observed.lock().expect("reads_observed mutex poisoned");
        let new_records = &all_records[(*observed).min(all_records.len())..];
        let mut counters = self.read_counters.lock().expect("read counters mutex poisoned");
        let mut triggered = false;
        for r in new_records.iter().filter(|r| READ_TOOLS.contains(&r.tool_name.as_str())) {
            if let Some(path) = r.arguments.get("path") {
                let counter = counters
                    .entry(path.clone())
                    .or_insert_with(|| SlidingWindowCounter::new(self.read_window, self.clock.clone()));
                if counter.observe() as u32 >= self.max_same_file_reads {
                    triggered = true;
                }
            }
        }
        *observed = all_records.len();
        triggered
    }
}

impl Default for ToolDisciplineGuardrail {
    fn default() -> Self {
        Self::new(3, 3, 5, Arc::new(SystemClock))
    }
}

const READ_TOOLS: &[&str] = &["read_file", "view_file", "read_spec"];
const COMMAND_TOOLS: &[&str] = &["bash", "run_command"];
const EDIT_TOOLS: &[&str] = &["write_file", "edit_file"];
const TEST_TOOLS: &[&str] = &["verify_tests", "run_tests"];

impl Guardrail for ToolDisciplineGuardrail {
    fn order(&self) -> u32 {
        400
    }
    fn short_circuit_on_block(&self) -> bool {
        false
    }
    fn category(&self) -> &'static str {
        "tool_discipline"
    }
    fn evaluate(&self, ctx: &GuardrailContext<'_>) -> GuardrailResult {
        let records = ctx.tool_call_log.for_iteration(ctx.iteration_id);
        let mut instructions = Vec::new();

        if self.observe_new_reads(&ctx.tool_call_log.all()) {
            instructions.push(
                "You've read the same file several times recently; try acting on what you already know instead of re-reading.",
            );
        }

        let mut command_failures: HashMap<&str, u32> = HashMap::new();
        for r in records
            .iter()
            .filter(|r| COMMAND_TOOLS.contains(&r.tool_name.as_str()) && r.outcome == ToolOutcome::Failure)
        {
            if let Some(cmd) = r.arguments.get("command") {
                *command_failures.entry(cmd.as_str()).or_insert(0) += 1;
            }
        }
        if command_failures.values().any(|&n| n >= self.max_consecutive_failures) {
            instructions.push("The same command has failed repeatedly; diagnose the root cause before retrying it again.");
        }

        let edit_count = records
            .iter()
            .filter(|r| EDIT_TOOLS.contains(&r.tool_name.as_str()))
            .count() as u32;
        let ran_tests = records
            .iter()
            .any(|r| TEST_TOOLS.contains(&r.tool_name.as_str()));
        if edit_count >= self.shotgun_file_threshold && !ran_tests {
            instructions.push("Several files have been edited without running tests; verify the change before continuing.");
        }

        if instructions.is_empty() {
            GuardrailResult::Pass
        } else {
            GuardrailResult::Warn {
                message: "tool-discipline pattern detected".into(),
                corrective_instruction: Some(instructions.join(" ")),
            }
        }
    }
}
