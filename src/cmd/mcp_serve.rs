//! `forge mcp-serve` — the stdio MCP server the LLM runner points the CLI
//! at via `--mcp-config`. Hidden from `--help`; nothing but the runner's
//! generated config is meant to invoke this.

use anyhow::Result;

use crate::config::Config;
use crate::mcp::McpServer;

pub async fn cmd_mcp_serve(config: Config, session_id: &str) -> Result<()> {
    let mut server = McpServer::new(&config, session_id.to_string());
    server.serve().await
}
