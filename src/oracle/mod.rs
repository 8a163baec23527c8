//! Oracle protocol (§4.G): bounded-timeout sub-agent verification dispatched
//! whenever a completion claim needs a verdict before it can gate the
//! guardrail pipeline.

mod dispatch;
mod verdict;

pub use dispatch::{OracleConfig, OracleDispatcher};
pub use verdict::{Confidence, FindingSeverity, OracleFinding, OracleVerdict};
