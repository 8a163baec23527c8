//! `forge revert` — reset the working tree to a session's last known-good
//! commit and clear that pointer, so the next `run` treats the task as
//! not-yet-completed.

use anyhow::Result;

use crate::config::Config;
use crate::errors::CoreError;
use crate::git::GitCollaborator;
use crate::session::SessionStore;

pub fn cmd_revert(config: &Config, session_id: &str) -> Result<()> {
    let store = SessionStore::new(config.lopen_root());
    let mut state = store
        .load_state(session_id)?
        .ok_or_else(|| CoreError::NoSuchSession { module: session_id.to_string() })?;
    let sha = state
        .last_task_completion_commit
        .clone()
        .ok_or_else(|| CoreError::NoRevertTarget { session_id: session_id.to_string() })?;

    let git = GitCollaborator::new(&config.project_dir)?;
    git.reset_hard(&sha)?;

    state.last_task_completion_commit = None;
    store.save_state(&state)?;

    println!("reverted working tree to {sha} and cleared session {session_id}'s completion marker");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CliOverrides;
    use crate::session::SessionState;
    use chrono::Utc;
    use git2::Repository;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo(dir: &std::path::Path) -> String {
        let repo = Repository::init(dir).unwrap();
        let mut cfg = repo.config().unwrap();
        cfg.set_str("user.name", "test").unwrap();
        cfg.set_str("user.email", "test@test.com").unwrap();
        drop(cfg);
        fs::write(dir.join("seed.txt"), "seed\n").unwrap();
        GitCollaborator::new(dir).unwrap().commit_all("init").unwrap()
    }

    #[test]
    fn revert_resets_to_the_recorded_commit_and_clears_it() {
        let dir = tempdir().unwrap();
        let sha = init_repo(dir.path());
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        config.ensure_directories().unwrap();

        fs::write(dir.path().join("seed.txt"), "changed\n").unwrap();

        let mut state = SessionState::new("auth-20260801-1", "auth", Utc::now());
        state.last_task_completion_commit = Some(sha);
        let store = SessionStore::new(config.lopen_root());
        store.save_state(&state).unwrap();

        cmd_revert(&config, "auth-20260801-1").unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("seed.txt")).unwrap(), "seed\n");
        let reloaded = store.load_state("auth-20260801-1").unwrap().unwrap();
        assert!(reloaded.last_task_completion_commit.is_none());
    }

    #[test]
    fn revert_without_a_recorded_commit_is_an_error() {
        let dir = tempdir().unwrap();
        init_repo(dir.path());
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        config.ensure_directories().unwrap();

        let state = SessionState::new("auth-20260801-1", "auth", Utc::now());
        let store = SessionStore::new(config.lopen_root());
        store.save_state(&state).unwrap();

        let err = cmd_revert(&config, "auth-20260801-1").unwrap_err();
        assert!(err.to_string().contains("no recorded commit"));
    }
}
