//! Typed Module -> Component -> Task -> Subtask hierarchy with validated
//! state transitions and an aggregate-state rule computed bottom-up.

mod node;
mod plan;
mod state;
mod tree;

pub use node::{NodeId, NodeKind, WorkNode};
pub use plan::{PlanComponent, PlanTask, parse_plan, set_checkbox, sync_tree_from_plan};
pub(crate) use plan::force_complete;
pub use state::NodeState;
pub use tree::{TaskTree, TaskTreeError};
