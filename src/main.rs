//! `forge` — the CLI front-end. Parses arguments, builds a `Config`, wires
//! logging, and hands off to the matching `cmd::*` function. No
//! orchestration logic lives here.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use forge::cmd::{
    cmd_mcp_serve, cmd_revert, cmd_run, cmd_session_delete, cmd_session_list, cmd_session_prune, cmd_session_resume,
    cmd_session_show,
};
use forge::config::{CliOverrides, Config};
use forge::logging;

#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "Autonomous spec-to-code orchestrator")]
struct Cli {
    /// Directory the module lives under. Defaults to the current directory.
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Explicit path to an orchestrator.toml, bypassing the project-dir search.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging instead of info.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Auto-confirm guardrail `requires_user_confirmation` stops, for
    /// non-interactive CI use.
    #[arg(long, global = true)]
    yes: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive a module's workflow to completion or interruption.
    Run { module: String },
    /// Session store operations.
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },
    /// Reset the working tree to a session's last completion commit.
    Revert { session_id: String },
    /// Core tool server, spoken to by the LLM CLI over stdio MCP. Launched
    /// by the orchestrator's generated `--mcp-config`, never by hand.
    #[command(hide = true)]
    McpServe {
        #[arg(long)]
        session_id: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List every session on disk, newest first.
    List,
    /// Print a session's full state as JSON.
    Show { session_id: String },
    /// Resume a module's most recent incomplete session.
    Resume { module: String },
    /// Delete a session outright.
    Delete { session_id: String },
    /// Remove completed sessions beyond the configured retention limit.
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = cli.project_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let config = Config::load(
        &project_dir,
        CliOverrides {
            verbose: cli.verbose,
            auto_confirm: cli.yes,
            config_path: cli.config.clone(),
            ..Default::default()
        },
    )?;

    let _logging_guard = logging::init(config.verbose, config.log_dir.as_deref())?;
    for warning in &config.warnings {
        tracing::warn!("{warning}");
    }

    match cli.command {
        Commands::Run { module } => cmd_run(config, &module).await,
        Commands::Session { command } => match command {
            SessionCommands::List => cmd_session_list(&config),
            SessionCommands::Show { session_id } => cmd_session_show(&config, &session_id),
            SessionCommands::Resume { module } => cmd_session_resume(config, &module).await,
            SessionCommands::Delete { session_id } => cmd_session_delete(&config, &session_id),
            SessionCommands::Prune => cmd_session_prune(&config),
        },
        Commands::Revert { session_id } => cmd_revert(&config, &session_id),
        Commands::McpServe { session_id } => cmd_mcp_serve(config, &session_id).await,
    }
}
