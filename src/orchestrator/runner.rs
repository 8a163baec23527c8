//! Orchestrator (§4.K): the run loop that drives one module through its
//! workflow steps, wiring together every other collaborator in the crate.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use std::collections::HashSet;

use crate::assessor::Assessor;
use crate::audit::{AuditLogger, IterationSummary, RunConfig, RunOutcome, ToolCallLog, ToolOutcome};
use crate::budget::BudgetTracker;
use crate::clock::Clock;
use crate::config::Config;
use crate::git::GitCollaborator;
use crate::guardrails::{
    ArcGuardrail, BackPressureGuardrail, BudgetGuardrail, ChurnGuardrail, CircularBehaviorGuardrail,
    GuardrailContext, GuardrailPipeline, OracleGateGuardrail, ToolDisciplineGuardrail,
};
use crate::llm::{CancelToken, LlmConfig, LlmError, LlmRunner};
use crate::sections::SectionStore;
use crate::session::{SessionMetrics, SessionState, SessionStore};
use crate::tasktree::{self, NodeKind, NodeState};
use crate::workflow::{Trigger, WorkflowEngine, WorkflowStep};

/// Headers the assessor watches for drift; re-hashed every iteration so a
/// resolved drift doesn't keep re-triggering on the next pass.
const TRACKED_HEADERS: &[&str] = &["Overview", "Acceptance Criteria", "Dependencies"];

/// Drives a single module from its current step to `Complete`. Owns the
/// in-memory, per-run audit log and the long-lived collaborators; the
/// session itself is loaded, mutated, and saved by the caller across
/// iterations so a crash mid-run resumes from the last save.
pub struct Orchestrator {
    config: Config,
    clock: Arc<dyn Clock>,
    store: SessionStore,
    sections: SectionStore,
    llm: LlmRunner,
    git: GitCollaborator,
    engine: WorkflowEngine,
    audit_log: ToolCallLog,
    audit: AuditLogger,
    budget: Arc<BudgetGuardrail>,
    churn: Arc<ChurnGuardrail>,
    circular: Arc<CircularBehaviorGuardrail>,
    backpressure: Arc<BackPressureGuardrail>,
    pipeline: GuardrailPipeline,
}

impl Orchestrator {
    pub fn new(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.ensure_directories().context("failed to prepare on-disk layout")?;

        let store = SessionStore::new(config.lopen_root());
        // The assessor keeps its own section store for drift checks; the
        // orchestrator keeps a second instance, pointed at the same disk
        // cache, for pulling section text into prompts. Both read/write the
        // same `(path, header, mtime)`-keyed cache entries, so the two stay
        // consistent without needing to share ownership.
        let assessor_sections = SectionStore::new(config.section_cache_dir());
        let sections = SectionStore::new(config.section_cache_dir());
        let engine = WorkflowEngine::new(Assessor::new(assessor_sections));

        let llm = LlmRunner::new(LlmConfig {
            llm_cmd: config.llm_cmd.clone(),
            timeout: config.llm_timeout,
            ..Default::default()
        });
        let git = GitCollaborator::new(&config.project_dir).context("failed to open git repository")?;

        let budget = Arc::new(BudgetGuardrail::new(BudgetTracker::with_standard_thresholds(
            config.token_budget_per_module,
            config.budget_warning_threshold,
            config.budget_confirmation_threshold,
        )));
        let churn = Arc::new(ChurnGuardrail::new(config.churn_threshold));
        let circular = Arc::new(CircularBehaviorGuardrail::new(config.circular_threshold));
        // Escalates on the same signal as `churn`, but across the whole
        // module rather than one task in isolation, so failures spread
        // thin across several different tasks still trip intervention.
        let backpressure = Arc::new(BackPressureGuardrail::with_clock(
            config.churn_threshold,
            config.churn_threshold * 2,
            config.churn_threshold * 3,
            clock.clone(),
        ));

        let mut pipeline = GuardrailPipeline::new();
        pipeline.register(Box::new(ArcGuardrail(budget.clone())));
        pipeline.register(Box::new(ArcGuardrail(churn.clone())));
        pipeline.register(Box::new(ArcGuardrail(circular.clone())));
        pipeline.register(Box::new(ArcGuardrail(backpressure.clone())));
        pipeline.register(Box::new(OracleGateGuardrail));
        pipeline.register(Box::new(ToolDisciplineGuardrail::new(
            config.max_same_file_reads,
            config.max_consecutive_failures,
            config.shotgun_file_threshold,
            clock.clone(),
        )));

        let audit = AuditLogger::new(&config.audit_dir());

        Ok(Self {
            config,
            clock,
            store,
            sections,
            llm,
            git,
            engine,
            audit_log: ToolCallLog::new(),
            audit,
            budget,
            churn,
            circular,
            backpressure,
            pipeline,
        })
    }

    /// Loads the module's latest session, or allocates a fresh one.
    pub fn load_or_create_session(&self, module: &str) -> Result<SessionState> {
        if let Some(session_id) = self.store.latest_session_id()
            && session_id.starts_with(&format!("{module}-"))
            && let Some(state) = self.store.load_state(&session_id)?
            && !state.is_complete
        {
            return Ok(state);
        }
        let session_id = self.store.allocate_session_id(module, self.clock.as_ref())?;
        Ok(SessionState::new(session_id, module, self.clock.now()))
    }

    /// Runs `session` to completion or until cancelled, persisting after
    /// every iteration. Returns the step the session ended on; a fatal error
    /// or a mid-iteration cancellation is propagated rather than swallowed,
    /// since the caller needs to distinguish those from a clean halt.
    pub async fn run(
        &mut self,
        session: &mut SessionState,
        cancel: &CancelToken,
    ) -> Result<WorkflowStep> {
        let module = session.module.clone();
        let spec_path = self.config.spec_path(&module);
        let branch = format!("module/{module}");
        self.git.ensure_branch(&branch).context("failed to prepare module branch")?;

        self.audit
            .start_run(RunConfig {
                module: module.clone(),
                project_dir: self.config.project_dir.clone(),
                spec_file: spec_path.clone(),
            })
            .context("failed to start audit run")?;

        let mut metrics = self
            .store
            .load_metrics(&session.session_id)?
            .unwrap_or_default();
        let mut iteration_id: u64 = metrics.iteration_count;

        loop {
            let step = self.engine.current_step(session, &spec_path)?;
            if step.is_terminal() {
                session.advance_to(step, self.clock.now());
                self.store.save_state(session)?;
                self.store.save_metrics(&session.session_id, &metrics)?;
                self.audit.finish_run(RunOutcome::Completed)?;
                return Ok(session.step);
            }

            if cancel.is_cancelled() {
                self.audit.finish_run(RunOutcome::Cancelled)?;
                anyhow::bail!("run cancelled before iteration {iteration_id}");
            }

            iteration_id += 1;
            if let Err(e) = self
                .run_iteration(session, &spec_path, step, iteration_id, &mut metrics, cancel)
                .await
            {
                match e.downcast_ref::<LlmError>() {
                    Some(LlmError::Cancelled) => {
                        self.audit.finish_run(RunOutcome::Cancelled)?;
                        return Err(e);
                    }
                    Some(LlmError::Transient(reason)) => {
                        warn!(reason = %reason, "transient llm failure, retrying next iteration");
                        session.touch(self.clock.now());
                        let _ = self.store.save_state(session);
                        continue;
                    }
                    _ => {
                        let _ = self.store.save_state(session);
                        self.audit.finish_run(RunOutcome::Error { message: e.to_string() })?;
                        return Err(e);
                    }
                }
            }

            if step == WorkflowStep::DraftSpec && !self.config.auto_confirm {
                // No external approval arrived this run; stop and let the
                // caller re-invoke once the draft has been reviewed. The
                // audit run is left open so the next invocation's iterations
                // append to it instead of starting a new one.
                self.store.save_metrics(&session.session_id, &metrics)?;
                return Ok(session.step);
            }
        }
    }

    async fn run_iteration(
        &mut self,
        session: &mut SessionState,
        spec_path: &Path,
        step: WorkflowStep,
        iteration_id: u64,
        metrics: &mut SessionMetrics,
        cancel: &CancelToken,
    ) -> Result<()> {
        let started_at = self.clock.now();

        if step == WorkflowStep::Repeat {
            return self.advance_repeat(session, spec_path);
        }

        // 2. Context build.
        let sections_text = self.load_context_sections(session, spec_path)?;
        self.sync_plan(session)?;
        self.select_scope(session, step);

        // 3. Guardrails (general back-pressure checks; completion claims
        // are gated separately once the tree reflects what actually got
        // marked complete this iteration).
        let task_id = session.task.clone();
        let pre_ctx = GuardrailContext {
            module: &session.module,
            step: step_name(step),
            task_id: task_id.as_deref(),
            iteration_id,
            tool_call_log: &self.audit_log,
            is_completion_claim: false,
            completion_scope: None,
        };
        let pre_outcome = self.pipeline.evaluate(&pre_ctx);
        if pre_outcome.is_blocked() {
            warn!(blocks = ?pre_outcome.blocks(), "guardrail pipeline blocked the iteration");
            session.touch(self.clock.now());
            self.store.save_state(session)?;
            return Ok(());
        }
        let corrective = pre_outcome.build_corrective_instructions();

        // 4. Prompt assembly.
        let prompt = self.build_prompt(step, session, &sections_text);
        let previously_complete = completed_node_names(session);

        // 5. LLM invocation. `verified_scopes` is cleared and persisted
        // first so the out-of-process MCP server (which reloads session
        // state from disk on every tool call) only sees a pass recorded
        // during this iteration, never a stale one from an earlier task.
        session.verified_scopes.clear();
        self.store.save_state(session)?;
        let tools = crate::llm::tools::tool_set(step);
        let invocation = self
            .llm
            .invoke(
                &self.config.project_dir,
                &prompt,
                corrective.as_deref(),
                iteration_id,
                &session.session_id,
                &tools,
                &self.audit_log,
                self.clock.as_ref(),
                cancel,
            )
            .await?;

        // `update_task_status` runs inside the MCP server subprocess, not
        // here; reload so the tree/verified_scopes mutations it made on
        // disk are visible before we decide whether to advance.
        if let Some(reloaded) = self.store.load_state(&session.session_id)? {
            *session = reloaded;
        }

        // 6. Post-processing.
        self.budget
            .record_tokens((invocation.token_usage.input + invocation.token_usage.output) as i64);
        self.reconcile_completion_claims(session, iteration_id, &previously_complete);
        metrics.record_iteration(invocation.token_usage.clone());
        session.touch(self.clock.now());
        self.store.save_state(session)?;
        self.store.save_metrics(&session.session_id, metrics)?;

        let duration_ms = (self.clock.now() - started_at).num_milliseconds().max(0) as u64;
        self.record_iteration_history(session, iteration_id, step, started_at, duration_ms, &invocation)?;

        // 7. Trigger determination, gated on the scope's actual tree state:
        // `update_task_status` only reaches `Complete` once it's been
        // verified, so checking `aggregate_state` here is checking ground
        // truth, not trusting a claim the LLM made this turn.
        let more_components = has_pending_component(session);
        let more_tasks = session
            .component
            .as_ref()
            .is_some_and(|c| has_pending_task(session, c));

        if let Some(scope) = completion_scope(session, step) {
            let scope_complete = session
                .task_tree
                .find_by_name(&scope)
                .is_some_and(|id| session.task_tree.aggregate_state(id) == NodeState::Complete);
            if !scope_complete {
                info!(scope = %scope, "scope not yet complete; staying on this task");
                return Ok(());
            }
            let gate_ctx = GuardrailContext {
                module: &session.module,
                step: step_name(step),
                task_id: task_id.as_deref(),
                iteration_id,
                tool_call_log: &self.audit_log,
                is_completion_claim: true,
                completion_scope: Some(scope.as_str()),
            };
            if self.pipeline.evaluate(&gate_ctx).is_blocked() {
                info!(scope = %scope, "completion claim did not clear the guardrail pipeline; staying on this task");
                return Ok(());
            }
        }

        let trigger = determine_trigger(step, more_components, more_tasks, self.config.auto_confirm);
        if let Some(trigger) = trigger {
            let next = self
                .engine
                .advance(session, spec_path, trigger, more_components, more_tasks, self.clock.now())?;

            // 8. Commit.
            if matches!(trigger, Trigger::TaskComplete | Trigger::ComponentComplete) {
                let scope = completion_scope(session, step).unwrap_or_else(|| session.module.clone());
                let component = session.component.clone().unwrap_or_default();
                let message = format!("feat({}): complete {} in {}", session.module, scope, component);
                let sha = self.git.commit_all(&message).context("failed to commit completed work")?;
                session.last_task_completion_commit = Some(sha);
            }

            if matches!(trigger, Trigger::TaskComplete) {
                // Clear the finished task so the next iteration selects a
                // fresh one from the component's remaining pending tasks.
                session.task = None;
            }
            if matches!(trigger, Trigger::ComponentComplete | Trigger::AllDone) {
                session.component = None;
            }

            // 9. Save after transition.
            session.touch(self.clock.now());
            self.store.save_state(session)?;
            info!(from = ?step, to = ?next, "workflow advanced");
        }

        Ok(())
    }

    /// `Repeat` does no external work; it just re-derives the next step.
    fn advance_repeat(&mut self, session: &mut SessionState, spec_path: &Path) -> Result<()> {
        let more_components = has_pending_component(session);
        self.engine
            .advance(session, spec_path, Trigger::Assess, more_components, true, self.clock.now())?;
        self.store.save_state(session)?;
        Ok(())
    }

    fn load_context_sections(&mut self, session: &mut SessionState, spec_path: &Path) -> Result<String> {
        let mut out = String::new();
        for header in TRACKED_HEADERS {
            if let Some(section) = self.sections.extract(spec_path, header)? {
                session.section_hashes.insert((*header).to_string(), section.content_hash.clone());
                out.push_str(&format!("## {header}\n{}\n\n", section.content));
            }
        }
        Ok(out)
    }

    fn sync_plan(&self, session: &mut SessionState) -> Result<()> {
        let plan_path = self.config.plan_path(&session.module);
        let Ok(markdown) = std::fs::read_to_string(&plan_path) else {
            return Ok(());
        };
        let plan = tasktree::parse_plan(&markdown);
        tasktree::sync_tree_from_plan(&mut session.task_tree, &plan);
        Ok(())
    }

    /// Picks the component/task the iteration should focus on, when the
    /// session hasn't already settled on one.
    fn select_scope(&self, session: &mut SessionState, step: WorkflowStep) {
        if step == WorkflowStep::SelectNextComponent || session.component.is_none() {
            if let Some(id) = session.task_tree.find_next_pending() {
                // `find_next_pending` returns a leaf; walk up to the
                // component ancestor if the leaf itself is a task.
                let component_id = match session.task_tree.node(id).map(|n| n.kind) {
                    Some(NodeKind::Component) => Some(id),
                    _ => find_component_ancestor(session, id),
                };
                if let Some(component_id) = component_id {
                    session.component = session.task_tree.node(component_id).map(|n| n.name.clone());
                }
            }
        }

        if step == WorkflowStep::IterateTasks && session.task.is_none() {
            if let Some(component_id) = session.component.clone().and_then(|name| session.task_tree.find_by_name(&name)) {
                let next_task = session
                    .task_tree
                    .descendants(component_id)
                    .into_iter()
                    .find(|&id| {
                        id != component_id
                            && session.task_tree.node(id).is_some_and(|n| n.kind == NodeKind::Task)
                            && session.task_tree.aggregate_state(id) == NodeState::Pending
                    });
                session.task = next_task.and_then(|id| session.task_tree.node(id).map(|n| n.name.clone()));
            }
        }
    }

    fn build_prompt(&self, step: WorkflowStep, session: &SessionState, sections_text: &str) -> String {
        let instructions = match step {
            WorkflowStep::DraftSpec => {
                "Draft or refine the module specification at SPECIFICATION.md. Cover an Overview, \
                 Acceptance Criteria, and Dependencies section. Do not mark anything complete; this \
                 step only produces the document for human review."
                    .to_string()
            }
            WorkflowStep::DetermineDependencies => {
                "Read the module specification's Dependencies section and confirm each dependency \
                 is available or record what's missing."
                    .to_string()
            }
            WorkflowStep::IdentifyComponents => {
                format!(
                    "Break the module down into components. Write or update `modules/{}/plan.md` as a \
                     checkbox list: one top-level `- [ ] Component` item per component.",
                    session.module
                )
            }
            WorkflowStep::SelectNextComponent => {
                format!(
                    "The next component to work on is '{}'. Confirm it's ready to decompose into tasks.",
                    session.component.clone().unwrap_or_default()
                )
            }
            WorkflowStep::BreakIntoTasks => {
                format!(
                    "Break component '{}' into concrete tasks. Add nested `- [ ] task` checkboxes under \
                     its entry in `modules/{}/plan.md`.",
                    session.component.clone().unwrap_or_default(),
                    session.module
                )
            }
            WorkflowStep::IterateTasks => {
                format!(
                    "Implement task '{}' in component '{}'. When you believe it's genuinely done, call \
                     verify_task_completion with scope_id='{}'.",
                    session.task.clone().unwrap_or_default(),
                    session.component.clone().unwrap_or_default(),
                    session.task.clone().unwrap_or_default()
                )
            }
            WorkflowStep::Repeat | WorkflowStep::Complete => String::new(),
        };

        format!(
            "You are working on module '{}'.\n\n{}\n\n# Spec context\n{}",
            session.module, instructions, sections_text
        )
    }

    /// Drives churn tracking from ground truth rather than from what the
    /// model claimed: a node that crossed into `Complete` this iteration
    /// (verification happened inside the MCP server, not here) counts as a
    /// success; a refused `update_task_status` call counts as a failure.
    /// Both `verify_*_completion` and `update_task_status` run out of
    /// process, so this is the only place left that can observe either.
    fn reconcile_completion_claims(
        &mut self,
        session: &SessionState,
        iteration_id: u64,
        previously_complete: &HashSet<String>,
    ) {
        let mut any_success = false;
        for scope in completed_node_names(session).difference(previously_complete) {
            self.churn.record_success(scope);
            any_success = true;
        }
        if any_success {
            self.backpressure.reset();
        }

        for record in self.audit_log.for_iteration(iteration_id) {
            if record.tool_name != "update_task_status" || record.outcome != ToolOutcome::Failure {
                continue;
            }
            let scope = record.arguments.get("task").cloned().unwrap_or_default();
            let reason = record.error_message.clone().unwrap_or_default();
            warn!(scope = %scope, reason = %reason, "update_task_status was refused this iteration");
            let count = self.churn.record_failure(&scope, &reason);
            self.backpressure.record_failure_count(count, &reason);
        }
    }

    fn record_iteration_history(
        &mut self,
        session: &SessionState,
        iteration_id: u64,
        step: WorkflowStep,
        started_at: chrono::DateTime<Utc>,
        duration_ms: u64,
        invocation: &crate::llm::LlmInvocation,
    ) -> Result<()> {
        let summary = IterationSummary {
            iteration: iteration_id,
            started_at,
            duration_ms,
            step: step_name(step).to_string(),
            tool_calls: self.audit_log.for_iteration(iteration_id),
            input_tokens: invocation.token_usage.input as u32,
            output_tokens: invocation.token_usage.output as u32,
        };
        self.audit.add_iteration(summary.clone())?;

        if self.config.save_iteration_history {
            let dir = self.config.history_dir(&session.session_id);
            std::fs::create_dir_all(&dir).context("failed to create iteration history directory")?;
            let path = dir.join(format!("iteration-{iteration_id}.json"));
            let json = serde_json::to_string_pretty(&summary).context("failed to serialize iteration history")?;
            crate::util::atomic_write(&path, &json)?;
        }
        Ok(())
    }
}

fn step_name(step: WorkflowStep) -> &'static str {
    match step {
        WorkflowStep::DraftSpec => "DraftSpec",
        WorkflowStep::DetermineDependencies => "DetermineDependencies",
        WorkflowStep::IdentifyComponents => "IdentifyComponents",
        WorkflowStep::SelectNextComponent => "SelectNextComponent",
        WorkflowStep::BreakIntoTasks => "BreakIntoTasks",
        WorkflowStep::IterateTasks => "IterateTasks",
        WorkflowStep::Repeat => "Repeat",
        WorkflowStep::Complete => "Complete",
    }
}

fn completed_node_names(session: &SessionState) -> HashSet<String> {
    let tree = &session.task_tree;
    let root = tree.root_id();
    tree.descendants(root)
        .into_iter()
        .filter(|&id| id != root && tree.aggregate_state(id) == NodeState::Complete)
        .filter_map(|id| tree.node(id).map(|n| n.name.clone()))
        .collect()
}

fn completion_scope(session: &SessionState, step: WorkflowStep) -> Option<String> {
    match step {
        WorkflowStep::IterateTasks => session.task.clone().or_else(|| session.component.clone()),
        WorkflowStep::SelectNextComponent | WorkflowStep::Repeat => session.component.clone(),
        _ => None,
    }
}

fn find_component_ancestor(session: &SessionState, mut id: crate::tasktree::NodeId) -> Option<crate::tasktree::NodeId> {
    loop {
        let node = session.task_tree.node(id)?;
        if node.kind == NodeKind::Component {
            return Some(id);
        }
        id = node.parent?;
    }
}

fn has_pending_component(session: &SessionState) -> bool {
    let tree = &session.task_tree;
    let Some(root_node) = tree.node(tree.root_id()) else {
        return false;
    };
    root_node
        .children
        .iter()
        .any(|&id| tree.aggregate_state(id) != NodeState::Complete)
}

fn has_pending_task(session: &SessionState, component_name: &str) -> bool {
    let tree = &session.task_tree;
    let Some(component_id) = tree.find_by_name(component_name) else {
        return false;
    };
    let Some(component_node) = tree.node(component_id) else {
        return false;
    };
    component_node
        .children
        .iter()
        .any(|&id| tree.aggregate_state(id) != NodeState::Complete)
}

/// Trigger determination rules (§4.K): `DraftSpec` only advances on an
/// external approval, modeled here by `auto_confirm` standing in for that
/// event on a non-interactive run.
fn determine_trigger(step: WorkflowStep, more_components: bool, more_tasks: bool, auto_confirm: bool) -> Option<Trigger> {
    match step {
        WorkflowStep::DraftSpec => auto_confirm.then_some(Trigger::SpecApproved),
        WorkflowStep::DetermineDependencies => Some(Trigger::DependenciesResolved),
        WorkflowStep::IdentifyComponents => Some(Trigger::ComponentsIdentified),
        WorkflowStep::SelectNextComponent => {
            if more_components {
                Some(Trigger::ComponentSelected)
            } else {
                Some(Trigger::AllDone)
            }
        }
        WorkflowStep::BreakIntoTasks => Some(Trigger::TasksBrokenDown),
        WorkflowStep::IterateTasks => {
            if more_tasks {
                Some(Trigger::TaskComplete)
            } else {
                Some(Trigger::ComponentComplete)
            }
        }
        WorkflowStep::Repeat => Some(Trigger::Assess),
        WorkflowStep::Complete => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        let repo = git2::Repository::init(dir).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        std::fs::write(dir.join("seed.txt"), "seed\n").unwrap();
        let collaborator = GitCollaborator::new(dir).unwrap();
        collaborator.commit_all("init").unwrap();
    }

    fn write_spec(dir: &Path, module: &str) {
        std::fs::create_dir_all(dir.join(module)).unwrap();
        std::fs::write(
            dir.join(module).join("SPECIFICATION.md"),
            "# Auth\n\n## Overview\nAuthentication module.\n\n## Acceptance Criteria\n- tokens validated\n\n## Dependencies\nnone\n",
        )
        .unwrap();
    }

    #[test]
    fn determine_trigger_never_auto_advances_draft_spec_without_confirmation() {
        assert_eq!(determine_trigger(WorkflowStep::DraftSpec, true, true, false), None);
        assert_eq!(
            determine_trigger(WorkflowStep::DraftSpec, true, true, true),
            Some(Trigger::SpecApproved)
        );
    }

    #[test]
    fn determine_trigger_branches_on_remaining_work() {
        assert_eq!(
            determine_trigger(WorkflowStep::SelectNextComponent, true, true, false),
            Some(Trigger::ComponentSelected)
        );
        assert_eq!(
            determine_trigger(WorkflowStep::SelectNextComponent, false, true, false),
            Some(Trigger::AllDone)
        );
        assert_eq!(
            determine_trigger(WorkflowStep::IterateTasks, true, true, false),
            Some(Trigger::TaskComplete)
        );
        assert_eq!(
            determine_trigger(WorkflowStep::IterateTasks, true, false, false),
            Some(Trigger::ComponentComplete)
        );
    }

    #[test]
    fn has_pending_component_is_false_once_every_component_completes() {
        let mut session = SessionState::new("auth-20260801-1".to_string(), "auth", Utc::now());
        let root = session.task_tree.root_id();
        let component = session.task_tree.add_child(root, NodeKind::Component, "core").unwrap();
        assert!(has_pending_component(&session));

        session.task_tree.transition(component, NodeState::InProgress).unwrap();
        session.task_tree.transition(component, NodeState::Complete).unwrap();
        assert!(!has_pending_component(&session));
    }

    #[test]
    fn load_or_create_session_reuses_an_incomplete_session() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        write_spec(dir.path(), "auth");

        let config = Config::load(dir.path(), Default::default()).unwrap();
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let orchestrator = Orchestrator::new(config, clock).unwrap();

        let first = orchestrator.load_or_create_session("auth").unwrap();
        orchestrator.store.save_state(&first).unwrap();

        let second = orchestrator.load_or_create_session("auth").unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn run_halts_at_draft_spec_without_auto_confirm_and_without_invoking_llm() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        write_spec(dir.path(), "auth");

        let config = Config::load(dir.path(), Default::default()).unwrap();
        let clock = Arc::new(FakeClock::new(Utc::now()));
        let mut orchestrator = Orchestrator::new(config, clock).unwrap();
        let mut session = orchestrator.load_or_create_session("auth").unwrap();

        let (_source, cancel) = crate::llm::CancelSource::new();
        // `llm_cmd` defaults to "claude", which won't be on PATH in tests;
        // DraftSpec must return before ever invoking it.
        let step = orchestrator.run(&mut session, &cancel).await.unwrap();
        assert_eq!(step, WorkflowStep::DraftSpec);
    }
}
