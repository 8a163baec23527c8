//! CLI command implementations (§4.N). Each function here parses nothing
//! and owns no orchestration logic of its own; `main.rs` parses `Cli` and
//! hands a constructed `Config` straight to one of these.

pub mod mcp_serve;
pub mod revert;
pub mod run;
pub mod session;

pub use mcp_serve::cmd_mcp_serve;
pub use revert::cmd_revert;
pub use run::cmd_run;
pub use session::{cmd_session_delete, cmd_session_list, cmd_session_prune, cmd_session_resume, cmd_session_show};
