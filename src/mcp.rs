//! Core tool server (§4.G/§6): a stdio MCP server, spawned by the LLM CLI
//! itself via the `--mcp-config` registration `llm::tools::mcp_config`
//! generates, that answers `read_spec`, `verify_*_completion`, and
//! `update_task_status` calls against one session's state on disk.
//!
//! Running this out of the orchestrator's own process is what makes the
//! refusal in `update_task_status` real rather than advisory: the LLM CLI
//! cannot execute the tool itself, so the only way a completion claim takes
//! effect is through this gate.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::oracle::{OracleConfig, OracleDispatcher};
use crate::sections::SectionStore;
use crate::session::{SessionState, SessionStore};
use crate::tasktree::{self, NodeKind};

pub struct McpServer {
    session_id: String,
    spec_path: PathBuf,
    store: SessionStore,
    sections: SectionStore,
    oracle: OracleDispatcher,
    clock: Arc<dyn Clock>,
}

struct CoreToolResult {
    success: bool,
    output: String,
}

impl CoreToolResult {
    fn ok(output: impl Into<String>) -> Self {
        Self { success: true, output: output.into() }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: json!({ "error": true, "message": message.into() }).to_string(),
        }
    }
}

impl McpServer {
    pub fn new(config: &Config, session_id: String) -> Self {
        let store = SessionStore::new(config.lopen_root());
        let sections = SectionStore::new(config.section_cache_dir());
        let oracle = OracleDispatcher::new(OracleConfig {
            llm_cmd: config.llm_cmd.clone(),
            model: None,
            timeout: config.oracle_timeout,
        });
        let module = session_id.split('-').next().unwrap_or_default().to_string();
        Self {
            session_id,
            spec_path: config.spec_path(&module),
            store,
            sections,
            oracle,
            clock: Arc::new(SystemClock),
        }
    }

    /// Reads one JSON-RPC request per line from stdin and writes one
    /// response per line to stdout, until stdin closes.
    pub async fn serve(&mut self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines.next_line().await.context("failed to read mcp request")? {
            if line.trim().is_empty() {
                continue;
            }
            let request: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(_) => continue,
            };
            let response = self.handle(&request).await;
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{response}").context("failed to write mcp response")?;
            stdout.flush().ok();
        }
        Ok(())
    }

    async fn handle(&mut self, request: &Value) -> Value {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
        match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": {} },
                    "serverInfo": { "name": "forge-core-tools", "version": env!("CARGO_PKG_VERSION") },
                },
            }),
            "tools/call" => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
                let arguments = params
                    .get("arguments")
                    .and_then(Value::as_object)
                    .map(|obj| obj.iter().map(|(k, v)| (k.clone(), value_to_string(v))).collect())
                    .unwrap_or_default();
                let result = self.call_tool(&name, &arguments).await;
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{ "type": "text", "text": result.output }],
                        "isError": !result.success,
                    },
                })
            }
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("unsupported mcp method '{other}'") },
            }),
        }
    }

    async fn call_tool(&mut self, name: &str, arguments: &HashMap<String, String>) -> CoreToolResult {
        match name {
            crate::llm::tools::READ_SPEC => self.read_spec(arguments),
            crate::llm::tools::VERIFY_TASK_COMPLETION => self.verify_completion(arguments, NodeKind::Task).await,
            crate::llm::tools::VERIFY_COMPONENT_COMPLETION => self.verify_completion(arguments, NodeKind::Component).await,
            crate::llm::tools::VERIFY_MODULE_COMPLETION => self.verify_completion(arguments, NodeKind::Module).await,
            crate::llm::tools::UPDATE_TASK_STATUS => self.update_task_status(arguments),
            other => CoreToolResult::error(format!("'{other}' is not a core tool")),
        }
    }

    fn read_spec(&mut self, arguments: &HashMap<String, String>) -> CoreToolResult {
        let header = arguments.get("header").map(String::as_str).unwrap_or("Overview");
        match self.sections.extract(&self.spec_path, header) {
            Ok(Some(section)) => CoreToolResult::ok(section.content),
            Ok(None) => CoreToolResult::error(format!("section '{header}' not found")),
            Err(e) => CoreToolResult::error(e.to_string()),
        }
    }

    /// Runs the oracle against the evidence supplied by the caller and, on a
    /// passing verdict, records the scope as verified for the rest of this
    /// iteration. `update_task_status` is the only thing that reads that
    /// record, and the orchestrator clears it before every iteration.
    async fn verify_completion(&mut self, arguments: &HashMap<String, String>, kind: NodeKind) -> CoreToolResult {
        let Some(scope) = arguments.get("scope_id").cloned() else {
            return CoreToolResult::error("missing scope_id");
        };
        let Some(mut session) = self.load_session() else {
            return CoreToolResult::error("no active session");
        };
        let Some(node_id) = session.task_tree.find_by_name(&scope) else {
            return CoreToolResult::error(format!("unknown scope '{scope}'"));
        };
        if session.task_tree.node(node_id).map(|n| n.kind) != Some(kind) {
            return CoreToolResult::error(format!("'{scope}' is not a {kind:?}"));
        }

        let evidence = arguments.get("evidence").cloned().unwrap_or_default();
        let prompt = format!(
            "Verify whether '{scope}' is genuinely complete, based only on the evidence below. \
             Respond with a JSON object: {{\"passed\": bool, \"confidence\": \"low\"|\"medium\"|\"high\", \
             \"findings\": [...], \"summary\": \"...\"}}.\n\nEvidence:\n{evidence}"
        );
        let verdict = match self.oracle.verify(&scope, &prompt).await {
            Ok(v) => v,
            Err(e) => return CoreToolResult::error(format!("oracle dispatch failed: {e}")),
        };

        if !verdict.gates_as_passed() {
            return CoreToolResult::error(verdict.summary);
        }

        session.verified_scopes.insert(scope);
        if self.store.save_state(&session).is_err() {
            return CoreToolResult::error("verified, but failed to persist the verdict");
        }
        CoreToolResult::ok(verdict.summary)
    }

    fn update_task_status(&mut self, arguments: &HashMap<String, String>) -> CoreToolResult {
        let Some(scope) = arguments.get("task").cloned() else {
            return CoreToolResult::error("missing task");
        };
        let status = arguments.get("status").map(String::as_str).unwrap_or("complete");
        if status != "complete" {
            return CoreToolResult::error(format!("unsupported status '{status}'"));
        }
        let Some(mut session) = self.load_session() else {
            return CoreToolResult::error("no active session");
        };
        if !session.verified_scopes.contains(&scope) {
            return CoreToolResult::error("Call verify_task_completion first");
        }
        let Some(node_id) = session.task_tree.find_by_name(&scope) else {
            return CoreToolResult::error(format!("unknown scope '{scope}'"));
        };
        tasktree::force_complete(&mut session.task_tree, node_id);
        if self.store.save_state(&session).is_err() {
            return CoreToolResult::error("marked complete, but failed to persist");
        }
        CoreToolResult::ok(format!("'{scope}' marked complete"))
    }

    fn load_session(&self) -> Option<SessionState> {
        self.store.load_state(&self.session_id).ok().flatten()
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use chrono::Utc;
    use tempfile::tempdir;

    fn server_with_session(dir: &std::path::Path, session: &SessionState) -> McpServer {
        let config = Config::load(dir, CliOverrides::default()).unwrap();
        let mut server = McpServer::new(&config, session.session_id.clone());
        server.store.save_state(session).unwrap();
        server
    }

    #[tokio::test]
    async fn update_task_status_is_refused_without_a_prior_verification() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("auth")).unwrap();
        let mut session = SessionState::new("auth-20260801-1", "auth", Utc::now());
        let root = session.task_tree.root_id();
        let component = session.task_tree.add_child(root, NodeKind::Component, "core").unwrap();
        session.task_tree.add_child(component, NodeKind::Task, "parse-header").unwrap();
        let mut server = server_with_session(dir.path(), &session);

        let mut args = HashMap::new();
        args.insert("task".to_string(), "parse-header".to_string());
        args.insert("status".to_string(), "complete".to_string());
        let result = server.update_task_status(&args);

        assert!(!result.success);
        assert!(result.output.contains("Call verify_task_completion first"));
    }

    #[tokio::test]
    async fn update_task_status_succeeds_once_verified() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("auth")).unwrap();
        let mut session = SessionState::new("auth-20260801-1", "auth", Utc::now());
        let root = session.task_tree.root_id();
        let component = session.task_tree.add_child(root, NodeKind::Component, "core").unwrap();
        session.task_tree.add_child(component, NodeKind::Task, "parse-header").unwrap();
        session.verified_scopes.insert("parse-header".to_string());
        let mut server = server_with_session(dir.path(), &session);

        let mut args = HashMap::new();
        args.insert("task".to_string(), "parse-header".to_string());
        args.insert("status".to_string(), "complete".to_string());
        let result = server.update_task_status(&args);

        assert!(result.success);
        let reloaded = server.load_session().unwrap();
        let task_id = reloaded.task_tree.find_by_name("parse-header").unwrap();
        assert_eq!(reloaded.task_tree.node(task_id).unwrap().state, crate::tasktree::NodeState::Complete);
    }
}
