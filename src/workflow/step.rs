use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    DraftSpec,
    DetermineDependencies,
    IdentifyComponents,
    SelectNextComponent,
    BreakIntoTasks,
    IterateTasks,
    /// Routing pseudo-state; the engine always replaces it with the result
    /// of re-assessing before any external work happens.
    Repeat,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    RequirementGathering,
    Planning,
    Building,
}

impl WorkflowStep {
    pub fn phase(self) -> Option<WorkflowPhase> {
        match self {
            WorkflowStep::DraftSpec => Some(WorkflowPhase::RequirementGathering),
            WorkflowStep::DetermineDependencies
            | WorkflowStep::IdentifyComponents
            | WorkflowStep::SelectNextComponent
            | WorkflowStep::BreakIntoTasks => Some(WorkflowPhase::Planning),
            WorkflowStep::IterateTasks | WorkflowStep::Repeat => Some(WorkflowPhase::Building),
            WorkflowStep::Complete => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStep::Complete)
    }
}
