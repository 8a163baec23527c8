use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::{NodeId, NodeKind, WorkNode};
use super::state::NodeState;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskTreeError {
    #[error("{child_kind:?} cannot be added under {parent_kind:?}")]
    InvalidNesting {
        parent_kind: NodeKind,
        child_kind: NodeKind,
    },
    #[error("node {node:?} has no transition from {from:?} to {to:?}")]
    InvalidTransition {
        node: NodeId,
        from: NodeState,
        to: NodeState,
    },
    #[error("node {0:?} not found")]
    NotFound(NodeId),
}

/// A Module -> Component -> Task -> Subtask hierarchy. The orchestrator owns
/// exactly one instance per module run; mutation happens only through this
/// type's methods, never by reaching into `WorkNode` directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTree {
    module_name: String,
    nodes: HashMap<NodeId, WorkNode>,
    root: NodeId,
    next_id: u64,
}

impl TaskTree {
    pub fn new(_module_key: &str, module_name: &str) -> Self {
        let root_id = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root_id,
            WorkNode {
                id: root_id,
                kind: NodeKind::Module,
                name: module_name.to_string(),
                state: NodeState::Pending,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            module_name: module_name.to_string(),
            nodes,
            root: root_id,
            next_id: 1,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn node(&self, id: NodeId) -> Option<&WorkNode> {
        self.nodes.get(&id)
    }

    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        name: &str,
    ) -> Result<NodeId, TaskTreeError> {
        let parent_kind = self
            .nodes
            .get(&parent)
            .ok_or(TaskTreeError::NotFound(parent))?
            .kind;

        if parent_kind.permitted_child() != Some(kind) {
            return Err(TaskTreeError::InvalidNesting {
                parent_kind,
                child_kind: kind,
            });
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;

        self.nodes.insert(
            id,
            WorkNode {
                id,
                kind,
                name: name.to_string(),
                state: NodeState::Pending,
                parent: Some(parent),
                children: Vec::new(),
            },
        );

        self.nodes.get_mut(&parent).unwrap().children.push(id);
        Ok(id)
    }

    pub fn transition(&mut self, id: NodeId, target: NodeState) -> Result<(), TaskTreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TaskTreeError::NotFound(id))?;
        if !node.state.can_transition_to(target) {
            return Err(TaskTreeError::InvalidTransition {
                node: id,
                from: node.state,
                to: target,
            });
        }
        node.state = target;
        Ok(())
    }

    /// Bypass transition validation to apply persisted state verbatim.
    /// Used only when loading a session snapshot from disk.
    pub fn restore_state(&mut self, id: NodeId, state: NodeState) -> Result<(), TaskTreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TaskTreeError::NotFound(id))?;
        node.state = state;
        Ok(())
    }

    /// Pre-order traversal starting at `id`, including `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_pre_order(id, &mut out);
        out
    }

    fn walk_pre_order(&self, id: NodeId, out: &mut Vec<NodeId>) {
        out.push(id);
        if let Some(node) = self.nodes.get(&id) {
            for &child in &node.children {
                self.walk_pre_order(child, out);
            }
        }
    }

    /// Recursive aggregate-state rule from leaves up. Pure: does not mutate.
    pub fn aggregate_state(&self, id: NodeId) -> NodeState {
        let Some(node) = self.nodes.get(&id) else {
            return NodeState::Pending;
        };
        if node.is_leaf() {
            return node.state;
        }
        let child_states = node.children.iter().map(|&c| self.aggregate_state(c));
        NodeState::aggregate(child_states)
    }

    /// First node (any kind) in pre-order whose name matches exactly.
    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.nodes[&id].name == name)
    }

    /// First leaf in pre-order whose effective state is Pending.
    pub fn find_next_pending(&self) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|&id| self.nodes[&id].is_leaf() && self.aggregate_state(id) == NodeState::Pending)
    }

    /// Re-link parent back-references after deserializing a persisted tree.
    /// Parent links are not themselves persisted as ownership, only as the
    /// `parent` field already present on `WorkNode`; this validates them.
    pub fn reconcile_after_load(&mut self) {
        let mut seen: HashMap<NodeId, NodeId> = HashMap::new();
        for node in self.nodes.values() {
            for &child in &node.children {
                seen.insert(child, node.id);
            }
        }
        for (child, parent) in seen {
            if let Some(node) = self.nodes.get_mut(&child) {
                node.parent = Some(parent);
            }
        }
    }
}
