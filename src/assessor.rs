//! State assessor (§4.I): re-derives the workflow step any time the
//! orchestrator needs "where are we", instead of trusting a stored value
//! that might have drifted from the spec or the task tree on disk.

use std::path::Path;

use crate::sections::{Drift, SectionStore};
use crate::session::SessionState;
use crate::tasktree::{NodeState, TaskTree};
use crate::workflow::WorkflowStep;

pub struct Assessor {
    sections: SectionStore,
}

impl Assessor {
    pub fn new(sections: SectionStore) -> Self {
        Self { sections }
    }

    /// Session state as a hint, spec file on disk as ground truth for drift,
    /// task tree as ground truth for component/task existence. Pure with
    /// respect to its inputs: unchanged session + unchanged spec + unchanged
    /// tree always yields the same step.
    pub fn assess(&mut self, session: &SessionState, spec_path: &Path) -> anyhow::Result<WorkflowStep> {
        let mut step = session.step;

        for (header, hash) in &session.section_hashes {
            match self.sections.drift(spec_path, header, hash)? {
                Drift::Unchanged => {}
                Drift::Drifted | Drift::Removed => {
                    let lower = header.to_lowercase();
                    if lower.contains("acceptance criteria") {
                        step = WorkflowStep::IdentifyComponents;
                    } else if lower.contains("dependencies") && step != WorkflowStep::IdentifyComponents {
                        step = WorkflowStep::DetermineDependencies;
                    }
                    // Any other section drifting keeps the guessed step; the
                    // caller is responsible for logging the drift.
                }
            }
        }

        step = regress_for_missing_nodes(step, session, &session.task_tree);

        if session.task_tree.aggregate_state(session.task_tree.root_id()) == NodeState::Complete {
            step = WorkflowStep::Complete;
        }

        Ok(step)
    }
}

fn regress_for_missing_nodes(step: WorkflowStep, session: &SessionState, tree: &TaskTree) -> WorkflowStep {
    if step != WorkflowStep::IterateTasks {
        return step;
    }

    let component_exists = session
        .component
        .as_ref()
        .map(|name| node_exists(tree, name))
        .unwrap_or(true);
    if !component_exists {
        return WorkflowStep::SelectNextComponent;
    }

    let task_exists = session
        .task
        .as_ref()
        .map(|name| node_exists(tree, name))
        .unwrap_or(true);
    if !task_exists {
        // Task gone: stay within the same component and let task selection
        // happen again on the next iteration.
        return WorkflowStep::IterateTasks;
    }

    step
}

fn node_exists(tree: &TaskTree, name: &str) -> bool {
    tree.descendants(tree.root_id())
        .into_iter()
        .any(|id| tree.node(id).is_some_and(|n| n.name == name))
}
