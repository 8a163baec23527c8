//! LLM runner (§4.K.1): spawns the configured LLM CLI as a child process,
//! registers the core tools (§4.G/§6) via a generated MCP config so calls to
//! them are answered by our own `mcp-serve` subcommand instead of the CLI's
//! built-in tool executor, and folds the resulting NDJSON event stream into
//! the `(final_text, tool_call_log, token_usage)` triple the orchestrator
//! expects from the LLM transport interface.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

use crate::audit::{ToolCallLog, ToolOutcome};
use crate::clock::Clock;
use crate::session::IterationTokenUsage;
use crate::stream::{ContentBlock, StreamEvent, UserContentBlock};

use super::cancel::CancelToken;
use super::tools::{self, ToolSpec};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_cmd: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub resume_session: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_cmd: "claude".to_string(),
            timeout: Duration::from_secs(600),
            max_retries: 1,
            resume_session: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm invocation timed out: {0}")]
    Transient(String),
    #[error("llm invocation failed: {0}")]
    Fatal(String),
    #[error("llm invocation cancelled")]
    Cancelled,
}

pub struct LlmInvocation {
    pub final_text: String,
    pub token_usage: IterationTokenUsage,
}

pub struct LlmRunner {
    config: LlmConfig,
}

/// A tool call awaiting the `tool_result` that answers it, keyed by
/// `tool_use_id`. Anything still pending when the stream ends (the child
/// crashed or timed out mid-call) is flushed as `Timeout` rather than lost.
struct PendingToolCall {
    tool_name: String,
    arguments: HashMap<String, String>,
}

/// Deletes the generated MCP config on every exit path out of `run_once`,
/// including the early returns on timeout, cancellation, and spawn failure.
struct TempFileGuard(PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl LlmRunner {
    pub fn new(config: LlmConfig) -> Self {
        Self { config }
    }

    /// Retries `Transient` failures up to `max_retries` times, then
    /// reclassifies the last one as `Fatal`.
    pub async fn invoke(
        &self,
        working_dir: &Path,
        system_prompt: &str,
        corrective_instruction: Option<&str>,
        iteration_id: u64,
        session_id: &str,
        tools: &[ToolSpec],
        audit_log: &ToolCallLog,
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<LlmInvocation, LlmError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self
                .run_once(
                    working_dir,
                    system_prompt,
                    corrective_instruction,
                    iteration_id,
                    session_id,
                    tools,
                    audit_log,
                    clock,
                    cancel,
                )
                .await
            {
                Ok(invocation) => return Ok(invocation),
                Err(LlmError::Transient(msg)) if attempt <= self.config.max_retries => {
                    tracing::warn!(attempt, reason = %msg, "llm invocation transient failure, retrying");
                }
                Err(LlmError::Transient(msg)) => {
                    return Err(LlmError::Fatal(format!("exhausted retries: {msg}")));
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn run_once(
        &self,
        working_dir: &Path,
        system_prompt: &str,
        corrective_instruction: Option<&str>,
        iteration_id: u64,
        session_id: &str,
        tools: &[ToolSpec],
        audit_log: &ToolCallLog,
        clock: &dyn Clock,
        cancel: &CancelToken,
    ) -> Result<LlmInvocation, LlmError> {
        let forge_exe = std::env::current_exe()
            .map_err(|e| LlmError::Fatal(format!("failed to resolve own executable path: {e}")))?;
        let mcp_config_path = std::env::temp_dir().join(format!("forge-mcp-{}.json", Uuid::new_v4()));
        let config_json = serde_json::to_string(&tools::mcp_config(&forge_exe, session_id, working_dir))
            .map_err(|e| LlmError::Fatal(format!("failed to serialize mcp config: {e}")))?;
        std::fs::write(&mcp_config_path, config_json)
            .map_err(|e| LlmError::Fatal(format!("failed to write mcp config: {e}")))?;
        let _mcp_config_guard = TempFileGuard(mcp_config_path.clone());

        let mut cmd = Command::new(&self.config.llm_cmd);
        cmd.arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose");
        if !tools.is_empty() {
            cmd.arg("--mcp-config").arg(&mcp_config_path);
        }
        if let Some(session) = &self.config.resume_session {
            cmd.arg("--resume").arg(session);
        }
        if let Some(instruction) = corrective_instruction {
            cmd.arg("--append-system-prompt").arg(instruction);
        }
        cmd.current_dir(working_dir);

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LlmError::Fatal(format!("failed to spawn llm process: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(system_prompt.as_bytes())
                .await
                .map_err(|e| LlmError::Fatal(format!("failed to write prompt: {e}")))?;
            let _ = stdin.shutdown().await;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LlmError::Fatal("child process had no stdout".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut accumulated = String::new();
        let mut final_result: Option<String> = None;
        let mut usage = IterationTokenUsage::default();
        let mut pending: HashMap<String, PendingToolCall> = HashMap::new();

        let stream_body = async {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(LlmError::Cancelled);
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if line.is_empty() {
                                    continue;
                                }
                                fold_line(
                                    &line,
                                    iteration_id,
                                    audit_log,
                                    clock,
                                    &mut accumulated,
                                    &mut final_result,
                                    &mut usage,
                                    &mut pending,
                                );
                            }
                            Ok(None) => return Ok(()),
                            Err(e) => return Err(LlmError::Fatal(format!("stdout read failed: {e}"))),
                        }
                    }
                }
            }
        };

        let stream_outcome = tokio::time::timeout(self.config.timeout, stream_body).await;
        flush_pending_as_timeout(pending, iteration_id, audit_log, clock);

        match stream_outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = child.kill().await;
                return Err(e);
            }
            Err(_) => {
                let _ = child.kill().await;
                return Err(LlmError::Transient(format!(
                    "no completion within {:?}",
                    self.config.timeout
                )));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| LlmError::Fatal(format!("failed to wait on child: {e}")))?;

        if !status.success() && final_result.is_none() {
            return Err(LlmError::Transient(format!(
                "process exited with status {:?}",
                status.code()
            )));
        }

        Ok(LlmInvocation {
            final_text: final_result.unwrap_or(accumulated),
            token_usage: usage,
        })
    }
}

/// Classifies one line of the child's NDJSON stream. A `ToolUse` block is
/// stashed in `pending` rather than logged immediately: the audit log only
/// learns the real outcome once the matching `tool_result` arrives, so a
/// refused core-tool call is recorded as the `Failure` it actually was
/// instead of a guess based on the tool's name.
fn fold_line(
    line: &str,
    iteration_id: u64,
    audit_log: &ToolCallLog,
    clock: &dyn Clock,
    accumulated: &mut String,
    final_result: &mut Option<String>,
    usage: &mut IterationTokenUsage,
    pending: &mut HashMap<String, PendingToolCall>,
) {
    let Ok(event) = serde_json::from_str::<StreamEvent>(line) else {
        accumulated.push_str(line);
        accumulated.push('\n');
        return;
    };

    match event {
        StreamEvent::Assistant { message, .. } => {
            for content in message.content {
                match content {
                    ContentBlock::ToolUse { name, input, id } => {
                        pending.insert(id, PendingToolCall { tool_name: name, arguments: flatten_arguments(&input) });
                    }
                    ContentBlock::Text { text } => {
                        accumulated.push_str(&text);
                        accumulated.push('\n');
                    }
                }
            }
        }
        StreamEvent::User { message } => {
            for content in message.content {
                let UserContentBlock::ToolResult { tool_use_id, is_error, content } = content else {
                    continue;
                };
                let Some(call) = pending.remove(&tool_use_id) else {
                    continue;
                };
                let outcome = if is_error { ToolOutcome::Failure } else { ToolOutcome::Success };
                let error_message = is_error.then(|| result_content_to_string(&content));
                audit_log.append(clock, iteration_id, &call.tool_name, call.arguments, 0, outcome, error_message);
            }
        }
        StreamEvent::Result { result, .. } => {
            *final_result = result;
        }
        StreamEvent::System { .. } => {}
    }

    if let Ok(raw) = serde_json::from_str::<Value>(line) {
        extract_usage(&raw, usage);
    }
}

fn flush_pending_as_timeout(
    pending: HashMap<String, PendingToolCall>,
    iteration_id: u64,
    audit_log: &ToolCallLog,
    clock: &dyn Clock,
) {
    for (_, call) in pending {
        audit_log.append(
            clock,
            iteration_id,
            &call.tool_name,
            call.arguments,
            0,
            ToolOutcome::Timeout,
            Some("no tool_result arrived before the stream ended".to_string()),
        );
    }
}

fn result_content_to_string(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn flatten_arguments(input: &Value) -> HashMap<String, String> {
    let Some(obj) = input.as_object() else {
        return HashMap::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

fn extract_usage(raw: &Value, usage: &mut IterationTokenUsage) {
    let Some(message) = raw.get("message") else {
        return;
    };
    let Some(u) = message.get("usage") else {
        return;
    };
    if let Some(input) = u.get("input_tokens").and_then(Value::as_u64) {
        usage.input += input;
    }
    if let Some(output) = u.get("output_tokens").and_then(Value::as_u64) {
        usage.output += output;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    #[test]
    fn fold_line_defers_the_audit_entry_until_the_matching_tool_result() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        let mut accumulated = String::new();
        let mut final_result = None;
        let mut usage = IterationTokenUsage::default();
        let mut pending = HashMap::new();

        let tool_line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"read_spec","input":{"header":"Dependencies"},"id":"1"}]},"session_id":"s"}"#;
        fold_line(tool_line, 7, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);
        assert_eq!(log.for_iteration(7).len(), 0);
        assert_eq!(pending.len(), 1);

        let result_line = r###"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"1","is_error":false,"content":"## Dependencies\nnone"}]}}"###;
        fold_line(result_line, 7, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);

        let records = log.for_iteration(7);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_name, "read_spec");
        assert_eq!(records[0].outcome, ToolOutcome::Success);
        assert!(pending.is_empty());
    }

    #[test]
    fn fold_line_records_a_refused_core_tool_call_as_failure() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        let mut accumulated = String::new();
        let mut final_result = None;
        let mut usage = IterationTokenUsage::default();
        let mut pending = HashMap::new();

        let tool_line = r#"{"type":"assistant","message":{"content":[{"type":"tool_use","name":"update_task_status","input":{"task":"parse-header","status":"complete"},"id":"2"}]},"session_id":"s"}"#;
        fold_line(tool_line, 3, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);

        let refusal_line = r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"2","is_error":true,"content":"{\"error\":true,\"message\":\"Call verify_task_completion first\"}"}]}}"#;
        fold_line(refusal_line, 3, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);

        let records = log.for_iteration(3);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ToolOutcome::Failure);
        assert!(records[0].error_message.as_deref().unwrap().contains("verify_task_completion"));
    }

    #[test]
    fn fold_line_prefers_result_event_over_accumulated_text() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        let mut accumulated = String::new();
        let mut final_result = None;
        let mut usage = IterationTokenUsage::default();
        let mut pending = HashMap::new();

        let text_line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"thinking..."}]},"session_id":"s"}"#;
        fold_line(text_line, 1, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);
        assert!(accumulated.contains("thinking"));

        let result_line = r#"{"type":"result","subtype":"success","result":"done","is_error":false}"#;
        fold_line(result_line, 1, &log, &clock, &mut accumulated, &mut final_result, &mut usage, &mut pending);
        assert_eq!(final_result.as_deref(), Some("done"));
    }

    #[test]
    fn unanswered_tool_calls_are_flushed_as_timeout() {
        let log = ToolCallLog::new();
        let clock = SystemClock;
        let mut pending = HashMap::new();
        pending.insert(
            "1".to_string(),
            PendingToolCall { tool_name: "read_spec".to_string(), arguments: HashMap::new() },
        );

        flush_pending_as_timeout(pending, 9, &log, &clock);

        let records = log.for_iteration(9);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome, ToolOutcome::Timeout);
    }

    #[test]
    fn extract_usage_accumulates_across_events() {
        let mut usage = IterationTokenUsage::default();
        let raw: Value = serde_json::from_str(
            r#"{"message":{"usage":{"input_tokens":120,"output_tokens":40}}}"#,
        )
        .unwrap();
        extract_usage(&raw, &mut usage);
        assert_eq!(usage.input, 120);
        assert_eq!(usage.output, 40);
    }
}
