//! Core tool registration (§4.G/§6): the five tool names the orchestrator
//! itself answers rather than passing through to the LLM CLI's own tool
//! set. `tool_set(step)` decides which of them are worth advertising for a
//! given workflow step; `mcp_config` turns that list into the stdio MCP
//! server config the child process is pointed at via `--mcp-config`.

use std::path::Path;

use serde_json::{Value, json};

use crate::workflow::WorkflowStep;

pub const READ_SPEC: &str = "read_spec";
pub const UPDATE_TASK_STATUS: &str = "update_task_status";
pub const VERIFY_TASK_COMPLETION: &str = "verify_task_completion";
pub const VERIFY_COMPONENT_COMPLETION: &str = "verify_component_completion";
pub const VERIFY_MODULE_COMPLETION: &str = "verify_module_completion";

#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn read_spec_tool() -> ToolSpec {
    ToolSpec {
        name: READ_SPEC,
        description: "Read a named section of the module specification.",
        input_schema: json!({
            "type": "object",
            "properties": { "header": { "type": "string" } },
            "required": ["header"],
        }),
    }
}

fn verify_tool(name: &'static str, description: &'static str) -> ToolSpec {
    ToolSpec {
        name,
        description,
        input_schema: json!({
            "type": "object",
            "properties": {
                "scope_id": { "type": "string" },
                "evidence": { "type": "string" },
            },
            "required": ["scope_id"],
        }),
    }
}

fn update_task_status_tool() -> ToolSpec {
    ToolSpec {
        name: UPDATE_TASK_STATUS,
        description: "Mark a task complete. Refused unless a verify_* call for the same \
                       scope already passed earlier in this iteration.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "task": { "type": "string" },
                "status": { "type": "string", "enum": ["complete"] },
            },
            "required": ["task", "status"],
        }),
    }
}

/// The tools worth offering at a given step. `read_spec` is always
/// available; the verification and status tools only make sense once
/// there's a scope to verify.
pub fn tool_set(step: WorkflowStep) -> Vec<ToolSpec> {
    let mut tools = vec![read_spec_tool()];
    match step {
        WorkflowStep::IterateTasks => {
            tools.push(verify_tool(VERIFY_TASK_COMPLETION, "Verify a task is genuinely complete."));
            tools.push(update_task_status_tool());
        }
        WorkflowStep::SelectNextComponent | WorkflowStep::Repeat => {
            tools.push(verify_tool(VERIFY_COMPONENT_COMPLETION, "Verify a component is genuinely complete."));
            tools.push(update_task_status_tool());
        }
        WorkflowStep::DetermineDependencies | WorkflowStep::IdentifyComponents | WorkflowStep::BreakIntoTasks => {
            tools.push(verify_tool(VERIFY_MODULE_COMPLETION, "Verify the module is genuinely complete."));
        }
        WorkflowStep::DraftSpec | WorkflowStep::Complete => {}
    }
    tools
}

/// MCP stdio server config pointing back at this binary's `mcp-serve`
/// subcommand, scoped to one session so the server can reload and mutate
/// that session's state on disk per call.
pub fn mcp_config(forge_exe: &Path, session_id: &str, project_dir: &Path) -> Value {
    json!({
        "mcpServers": {
            "forge-core": {
                "command": forge_exe.to_string_lossy(),
                "args": [
                    "mcp-serve",
                    "--session-id", session_id,
                    "--project-dir", project_dir.to_string_lossy(),
                ],
            }
        }
    })
}
