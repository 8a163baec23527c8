use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::assessor::Assessor;
use crate::session::SessionState;

use super::step::WorkflowStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    SpecApproved,
    Assess,
    DependenciesResolved,
    ComponentsIdentified,
    ComponentSelected,
    AllDone,
    TasksBrokenDown,
    TaskComplete,
    ComponentComplete,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no transition for step {from:?} on trigger {trigger:?}")]
    InvalidTransition { from: WorkflowStep, trigger: Trigger },
}

/// Guarded step transition table (§4.J). Pure: does not touch the session
/// or the filesystem. `more_components`/`more_tasks` stand in for the
/// guards that depend on orchestrator-owned state (task tree contents).
fn next_step(current: WorkflowStep, trigger: Trigger, more_components: bool, more_tasks: bool) -> Option<WorkflowStep> {
    use Trigger::*;
    use WorkflowStep::*;

    match (current, trigger) {
        (DraftSpec, SpecApproved) => Some(DetermineDependencies),
        (DraftSpec, Assess) => Some(DraftSpec),
        (DetermineDependencies, DependenciesResolved) => Some(IdentifyComponents),
        (IdentifyComponents, ComponentsIdentified) => Some(SelectNextComponent),
        (SelectNextComponent, ComponentSelected) if more_components => Some(BreakIntoTasks),
        (SelectNextComponent, AllDone) if !more_components => Some(Complete),
        (BreakIntoTasks, TasksBrokenDown) => Some(IterateTasks),
        (IterateTasks, TaskComplete) if more_tasks => Some(IterateTasks),
        (IterateTasks, ComponentComplete) => Some(Repeat),
        (Repeat, Assess) if more_components => Some(SelectNextComponent),
        (Repeat, Assess) if !more_components => Some(Complete),
        _ => None,
    }
}

/// Drives a module through its steps. "Current state" is never stored on
/// the engine itself; every read re-derives it through the assessor so a
/// crash mid-run can always be resumed correctly.
pub struct WorkflowEngine {
    assessor: Assessor,
}

impl WorkflowEngine {
    pub fn new(assessor: Assessor) -> Self {
        Self { assessor }
    }

    /// Re-entrant: calling this again replays the assessment and returns
    /// the same result for unchanged inputs.
    pub fn initialize(&mut self, session: &mut SessionState, spec_path: &Path, now: DateTime<Utc>) -> anyhow::Result<WorkflowStep> {
        let step = self.assessor.assess(session, spec_path)?;
        session.advance_to(step, now);
        Ok(step)
    }

    pub fn current_step(&mut self, session: &SessionState, spec_path: &Path) -> anyhow::Result<WorkflowStep> {
        self.assessor.assess(session, spec_path)
    }

    pub fn advance(
        &mut self,
        session: &mut SessionState,
        spec_path: &Path,
        trigger: Trigger,
        more_components: bool,
        more_tasks: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<WorkflowStep> {
        let current = self.assessor.assess(session, spec_path)?;
        let next = next_step(current, trigger, more_components, more_tasks)
            .ok_or(WorkflowError::InvalidTransition { from: current, trigger })?;
        session.advance_to(next, now);
        Ok(next)
    }
}
