//! Plan file sync (§6): `modules/<module>/plan.md` is a GitHub-flavored
//! checkbox list that mirrors the task tree. Programmatic updates flip
//! `[ ]`/`[x]` by line-level edit keyed on trimmed text, preserving
//! surrounding whitespace, rather than regenerating the whole file.

use super::node::{NodeId, NodeKind};
use super::state::NodeState;
use super::tree::TaskTree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTask {
    pub name: String,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanComponent {
    pub name: String,
    pub tasks: Vec<PlanTask>,
}

/// Parses the `## Components` checkbox list. A line at indentation 0 under
/// a `- [ ]`/`- [x]` marker is a component; a line indented beneath it is
/// one of its tasks. Lines outside the list, and any fenced code block
/// content, are ignored.
pub fn parse_plan(markdown: &str) -> Vec<PlanComponent> {
    let mut components = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        let trimmed_start = line.trim_start();
        if trimmed_start.starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let Some((checked, text)) = parse_checkbox_line(line) else {
            continue;
        };

        let indent = line.len() - line.trim_start().len();
        if indent == 0 {
            components.push(PlanComponent {
                name: text.to_string(),
                tasks: Vec::new(),
            });
        } else if let Some(component) = components.last_mut() {
            component.tasks.push(PlanTask {
                name: text.to_string(),
                done: checked,
            });
        }
    }

    components
}

fn parse_checkbox_line(line: &str) -> Option<(bool, &str)> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("- [")?;
    let (marker, rest) = rest.split_at(1);
    let rest = rest.strip_prefix(']')?;
    let checked = match marker {
        "x" | "X" => true,
        " " => false,
        _ => return None,
    };
    Some((checked, rest.trim()))
}

/// Adds components/tasks present in `plan` but missing from `tree`, and
/// brings existing node states in line with the plan's checkboxes. Never
/// removes nodes: a task dropped from the plan file is a drift the
/// assessor surfaces, not a silent deletion here.
pub fn sync_tree_from_plan(tree: &mut TaskTree, plan: &[PlanComponent]) {
    for plan_component in plan {
        let component_id = find_or_add_child(tree, tree.root_id(), NodeKind::Component, &plan_component.name);

        for plan_task in &plan_component.tasks {
            let task_id = find_or_add_child(tree, component_id, NodeKind::Task, &plan_task.name);
            if plan_task.done {
                force_complete(tree, task_id);
            }
        }
    }
}

fn find_or_add_child(tree: &mut TaskTree, parent: NodeId, kind: NodeKind, name: &str) -> NodeId {
    if let Some(existing) = tree
        .descendants(parent)
        .into_iter()
        .find(|&id| id != parent && tree.node(id).is_some_and(|n| n.kind == kind && n.name == name))
    {
        return existing;
    }
    tree.add_child(parent, kind, name)
        .expect("plan components/tasks always nest one level below their parent kind")
}

/// Drives a node through whatever legal transition chain reaches `Complete`
/// from its current state. Used both by plan sync (a checked-off box) and
/// by the orchestrator (a verified completion claim).
pub(crate) fn force_complete(tree: &mut TaskTree, id: NodeId) {
    let Some(node) = tree.node(id) else { return };
    match node.state {
        NodeState::Complete => {}
        NodeState::Pending => {
            let _ = tree.transition(id, NodeState::InProgress);
            let _ = tree.transition(id, NodeState::Complete);
        }
        NodeState::InProgress => {
            let _ = tree.transition(id, NodeState::Complete);
        }
        NodeState::Failed => {
            let _ = tree.transition(id, NodeState::InProgress);
            let _ = tree.transition(id, NodeState::Complete);
        }
    }
}

/// Flips the checkbox on the first line whose trimmed checkbox text exactly
/// matches `item_text`, preserving indentation and any trailing content.
pub fn set_checkbox(markdown: &str, item_text: &str, done: bool) -> String {
    let mut out = String::with_capacity(markdown.len());
    for line in markdown.lines() {
        match parse_checkbox_line(line) {
            Some((_, text)) if text == item_text => {
                let indent = &line[..line.len() - line.trim_start().len()];
                let marker = if done { "x" } else { " " };
                out.push_str(indent);
                out.push_str("- [");
                out.push_str(marker);
                out.push_str("] ");
                out.push_str(text);
            }
            _ => out.push_str(line),
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasktree::NodeKind;

    const SAMPLE: &str = "## Components\n- [ ] Component A\n  - [ ] task 1\n  - [x] task 2\n- [x] Component B\n  - [x] task 3\n";

    #[test]
    fn parses_components_and_nested_tasks() {
        let plan = parse_plan(SAMPLE);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].name, "Component A");
        assert_eq!(plan[0].tasks.len(), 2);
        assert!(!plan[0].tasks[0].done);
        assert!(plan[0].tasks[1].done);
    }

    #[test]
    fn ignores_checkbox_like_text_inside_fenced_code() {
        let markdown = "## Components\n```\n- [ ] not a real task\n```\n- [ ] Component A\n";
        let plan = parse_plan(markdown);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].name, "Component A");
    }

    #[test]
    fn sync_adds_missing_nodes_and_marks_done_tasks_complete() {
        let mut tree = TaskTree::new("auth", "auth");
        let plan = parse_plan(SAMPLE);
        sync_tree_from_plan(&mut tree, &plan);

        let component_a = tree
            .descendants(tree.root_id())
            .into_iter()
            .find(|&id| tree.node(id).unwrap().kind == NodeKind::Component && tree.node(id).unwrap().name == "Component A")
            .unwrap();
        let task2 = tree
            .descendants(component_a)
            .into_iter()
            .find(|&id| tree.node(id).unwrap().name == "task 2")
            .unwrap();
        assert_eq!(tree.node(task2).unwrap().state, NodeState::Complete);
    }

    #[test]
    fn sync_is_idempotent() {
        let mut tree = TaskTree::new("auth", "auth");
        let plan = parse_plan(SAMPLE);
        sync_tree_from_plan(&mut tree, &plan);
        sync_tree_from_plan(&mut tree, &plan);
        assert_eq!(tree.descendants(tree.root_id()).len(), 1 + 2 + 3);
    }

    #[test]
    fn set_checkbox_flips_only_the_matching_line() {
        let updated = set_checkbox(SAMPLE, "task 1", true);
        assert!(updated.contains("  - [x] task 1"));
        assert!(updated.contains("  - [x] task 2"));
        assert!(updated.contains("- [x] Component B"));
    }
}
