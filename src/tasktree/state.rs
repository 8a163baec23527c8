use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Pending,
    InProgress,
    Complete,
    Failed,
}

impl NodeState {
    /// Is `self -> target` one of the legal hand-authored transitions.
    /// Restoring persisted state bypasses this check entirely (see
    /// `TaskTree::restore`).
    pub fn can_transition_to(self, target: NodeState) -> bool {
        matches!(
            (self, target),
            (NodeState::Pending, NodeState::InProgress)
                | (NodeState::InProgress, NodeState::Complete)
                | (NodeState::InProgress, NodeState::Failed)
                | (NodeState::Failed, NodeState::InProgress)
        )
    }

    /// Combine a sequence of child states into their parent's effective
    /// state: any Failed wins, then all-Complete, then all-Pending,
    /// otherwise InProgress.
    pub fn aggregate<I: IntoIterator<Item = NodeState>>(children: I) -> NodeState {
        let mut any_failed = false;
        let mut all_complete = true;
        let mut all_pending = true;
        let mut saw_any = false;

        for state in children {
            saw_any = true;
            match state {
                NodeState::Failed => any_failed = true,
                NodeState::Complete => all_pending = false,
                NodeState::Pending => all_complete = false,
                NodeState::InProgress => {
                    all_complete = false;
                    all_pending = false;
                }
            }
        }

        if !saw_any {
            return NodeState::Pending;
        }
        if any_failed {
            NodeState::Failed
        } else if all_complete {
            NodeState::Complete
        } else if all_pending {
            NodeState::Pending
        } else {
            NodeState::InProgress
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_of_no_children_is_pending() {
        assert_eq!(NodeState::aggregate(vec![]), NodeState::Pending);
    }

    #[test]
    fn aggregate_prioritizes_failed_over_complete() {
        let states = vec![NodeState::Complete, NodeState::Failed, NodeState::Complete];
        assert_eq!(NodeState::aggregate(states), NodeState::Failed);
    }

    #[test]
    fn aggregate_is_order_independent() {
        let a = vec![NodeState::Pending, NodeState::InProgress, NodeState::Complete];
        let b = vec![NodeState::Complete, NodeState::Pending, NodeState::InProgress];
        assert_eq!(NodeState::aggregate(a), NodeState::aggregate(b));
    }

    #[test]
    fn legal_transitions_are_exactly_four() {
        let legal: Vec<(NodeState, NodeState)> = vec![
            (NodeState::Pending, NodeState::InProgress),
            (NodeState::InProgress, NodeState::Complete),
            (NodeState::InProgress, NodeState::Failed),
            (NodeState::Failed, NodeState::InProgress),
        ];
        for (from, to) in &legal {
            assert!(from.can_transition_to(*to));
        }
        assert!(!NodeState::Complete.can_transition_to(NodeState::InProgress));
        assert!(!NodeState::Pending.can_transition_to(NodeState::Complete));
    }
}
