//! Workflow engine (§4.J): the guarded step/phase state machine that drives
//! a module from spec to completion. `current state` is never stored
//! directly — every read delegates to the assessor (`crate::assessor`).

mod engine;
mod step;

pub use engine::{Trigger, WorkflowEngine, WorkflowError};
pub use step::{WorkflowPhase, WorkflowStep};
