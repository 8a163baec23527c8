//! Top-level error hierarchy the CLI front-end renders (§7). Each
//! subsystem keeps its own error type where one earns its keep (the task
//! tree rejects invalid nesting and transitions; the LLM transport
//! distinguishes transient from fatal failures); `CoreError` composes the
//! ones that can surface all the way to the CLI boundary via `#[from]`.

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;
use crate::tasktree::TaskTreeError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("task tree rejected the operation: {0}")]
    TaskTree(#[from] TaskTreeError),

    #[error("llm transport failed: {0}")]
    Llm(#[from] LlmError),

    #[error("no session found for module '{module}'")]
    NoSuchSession { module: String },

    #[error("session '{session_id}' has no recorded commit to revert to")]
    NoRevertTarget { session_id: String },

    #[error("failed to write to {path}: disk may be full or permissions are wrong")]
    StorageCritical { path: PathBuf, #[source] source: std::io::Error },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
