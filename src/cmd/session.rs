//! `forge session list|show|resume|delete|prune` — read-only and
//! lifecycle operations over the session store. None of these touch the
//! workflow engine; they only read or mutate what `SessionStore` persists.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::errors::CoreError;
use crate::session::SessionStore;

fn store(config: &Config) -> SessionStore {
    SessionStore::new(config.lopen_root())
}

pub fn cmd_session_list(config: &Config) -> Result<()> {
    let ids = store(config).list_session_ids()?;
    if ids.is_empty() {
        println!("no sessions found");
        return Ok(());
    }
    for id in ids {
        match store(config).load_state(&id)? {
            Some(state) => println!(
                "{:<24} module={:<16} step={:?} complete={}",
                id, state.module, state.step, state.is_complete
            ),
            None => println!("{id:<24} (corrupted)"),
        }
    }
    Ok(())
}

pub fn cmd_session_show(config: &Config, session_id: &str) -> Result<()> {
    let state = store(config)
        .load_state(session_id)?
        .ok_or_else(|| CoreError::NoSuchSession { module: session_id.to_string() })?;
    let json = serde_json::to_string_pretty(&state).context("failed to render session state")?;
    println!("{json}");
    Ok(())
}

/// Resumes `<module>`'s most recent incomplete session (same lookup the
/// orchestrator itself performs on `run`).
pub async fn cmd_session_resume(config: Config, module: &str) -> Result<()> {
    super::run::cmd_run(config, module).await
}

pub fn cmd_session_delete(config: &Config, session_id: &str) -> Result<()> {
    store(config).delete(session_id)?;
    println!("deleted session {session_id}");
    Ok(())
}

pub fn cmd_session_prune(config: &Config) -> Result<()> {
    let removed = store(config).prune(config.session_retention)?;
    if removed.is_empty() {
        println!("nothing to prune (retention limit {})", config.session_retention);
    } else {
        println!("pruned {} session(s): {}", removed.len(), removed.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use crate::session::SessionState;
    use chrono::Utc;
    use tempfile::tempdir;

    fn config() -> (Config, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        config.ensure_directories().unwrap();
        (config, dir)
    }

    #[test]
    fn show_errors_on_an_unknown_session() {
        let (config, _dir) = config();
        let err = cmd_session_show(&config, "nope-1").unwrap_err();
        assert!(err.to_string().contains("nope-1"));
    }

    #[test]
    fn delete_then_list_no_longer_reports_the_session() {
        let (config, _dir) = config();
        let state = SessionState::new("auth-20260801-1", "auth", Utc::now());
        store(&config).save_state(&state).unwrap();

        cmd_session_delete(&config, "auth-20260801-1").unwrap();
        assert!(store(&config).list_session_ids().unwrap().is_empty());
    }

    #[test]
    fn prune_respects_the_configured_retention() {
        let (mut config, _dir) = config();
        config.session_retention = 1;
        for i in 1..=2 {
            let mut state = SessionState::new(format!("auth-20260801-{i}"), "auth", Utc::now());
            state.is_complete = true;
            store(&config).save_state(&state).unwrap();
        }
        cmd_session_prune(&config).unwrap();
        assert_eq!(store(&config).list_session_ids().unwrap().len(), 1);
    }
}
