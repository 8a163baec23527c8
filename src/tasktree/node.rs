use serde::{Deserialize, Serialize};

use super::state::NodeState;

/// Stable identifier for a node, unique within a single `TaskTree`.
/// Allocated once at creation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Component,
    Task,
    Subtask,
}

impl NodeKind {
    /// The only legal child kind, or `None` for a leaf kind.
    pub fn permitted_child(self) -> Option<NodeKind> {
        match self {
            NodeKind::Module => Some(NodeKind::Component),
            NodeKind::Component => Some(NodeKind::Task),
            NodeKind::Task => Some(NodeKind::Subtask),
            NodeKind::Subtask => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    pub state: NodeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
}

impl WorkNode {
    /// A node with no children, whether or not its kind permits adding any.
    /// A `Task` that was never broken into subtasks is just as much a leaf
    /// as a `Subtask` itself.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}
