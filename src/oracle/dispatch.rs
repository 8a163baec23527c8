use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::verdict::{Confidence, FindingSeverity, OracleFinding, OracleVerdict};

const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LLM_CMD: &str = "claude";

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// The LLM CLI command to spawn for verification, e.g. "claude".
    pub llm_cmd: String,
    /// A cheaper model id to pass through, when the CLI supports `--model`.
    pub model: Option<String>,
    pub timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            llm_cmd: DEFAULT_LLM_CMD.to_string(),
            model: None,
            timeout: Duration::from_secs(DEFAULT_ORACLE_TIMEOUT_SECS),
        }
    }
}

/// Dispatches one verification prompt to a sub-agent and returns its verdict.
/// Never returns `Err` for a failed or timed-out verification — those become
/// a failing `OracleVerdict` so the guardrail pipeline always has a verdict
/// to gate on. `Err` is reserved for failure to even spawn the process.
pub struct OracleDispatcher {
    config: OracleConfig,
}

impl OracleDispatcher {
    pub fn new(config: OracleConfig) -> Self {
        Self { config }
    }

    pub async fn verify(&self, scope: &str, prompt: &str) -> Result<OracleVerdict> {
        let raw = match tokio::time::timeout(self.config.timeout, self.run(prompt)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(OracleVerdict::timed_out(scope)),
        };

        Ok(parse_verdict(scope, &raw))
    }

    async fn run(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.config.llm_cmd);
        cmd.arg("--print");
        if let Some(ref model) = self.config.model {
            cmd.arg("--model").arg(model);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().context("failed to spawn oracle subprocess")?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .context("failed to write prompt to oracle stdin")?;
            stdin.shutdown().await.context("failed to close oracle stdin")?;
        }

        let stdout = child.stdout.take().context("oracle process had no stdout")?;
        let mut lines = BufReader::new(stdout).lines();
        let mut output = String::new();
        while let Ok(Some(line)) = lines.next_line().await {
            output.push_str(&line);
            output.push('\n');
        }

        child.wait().await.context("failed to wait for oracle process")?;
        Ok(output)
    }
}

fn parse_verdict(scope: &str, output: &str) -> OracleVerdict {
    let Some(json_str) = crate::util::extract_json_object(output) else {
        return OracleVerdict::unparseable(scope, output);
    };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&json_str) else {
        return OracleVerdict::unparseable(scope, output);
    };

    let passed = value.get("passed").and_then(|v| v.as_bool()).unwrap_or(false);
    let confidence = match value.get("confidence").and_then(|v| v.as_str()) {
        Some("high") => Confidence::High,
        Some("medium") => Confidence::Medium,
        _ => Confidence::Low,
    };
    let findings = value
        .get("findings")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(parse_finding).collect())
        .unwrap_or_default();
    let summary = value
        .get("summary")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    OracleVerdict {
        passed,
        confidence,
        findings,
        summary,
    }
}

fn parse_finding(value: &serde_json::Value) -> Option<OracleFinding> {
    if let Some(message) = value.as_str() {
        return Some(OracleFinding::new(FindingSeverity::Warning, message));
    }
    let message = value.get("message").and_then(|v| v.as_str())?.to_string();
    let severity = match value.get("severity").and_then(|v| v.as_str()) {
        Some("error") => FindingSeverity::Error,
        Some("info") => FindingSeverity::Info,
        _ => FindingSeverity::Warning,
    };
    let location = value.get("location").and_then(|v| v.as_str()).map(str::to_string);
    Some(OracleFinding {
        severity,
        message,
        location,
    })
}
