//! LLM runner (§4.K.1): the concrete subprocess-based implementation of the
//! model-provider transport the orchestrator invokes each iteration.

mod cancel;
mod runner;
pub mod tools;

pub use cancel::{CancelSource, CancelToken};
pub use runner::{LlmConfig, LlmError, LlmInvocation, LlmRunner};
pub use tools::ToolSpec;
