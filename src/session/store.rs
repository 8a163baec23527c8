use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;

use crate::clock::Clock;
use crate::util::atomic_write;

use super::id;
use super::state::{SessionMetrics, SessionState};

/// On-disk session store rooted at a project directory (§4.H). Every write
/// is atomic; every read tolerates corruption by quarantining the bad file
/// and reporting "no session" rather than propagating a parse error.
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir().join(session_id)
    }

    fn corrupted_dir(&self) -> PathBuf {
        self.root.join("corrupted")
    }

    pub fn allocate_session_id(&self, module: &str, clock: &dyn Clock) -> Result<String> {
        fs::create_dir_all(self.sessions_dir()).context("failed to create sessions directory")?;
        Ok(id::allocate(&self.sessions_dir(), module, clock.now()))
    }

    pub fn save_state(&self, state: &SessionState) -> Result<()> {
        let dir = self.session_dir(&state.session_id);
        fs::create_dir_all(&dir).context("failed to create session directory")?;
        let json = serde_json::to_string_pretty(state).context("failed to serialize session state")?;
        atomic_write(&dir.join("state.json"), &json)?;
        self.set_latest(&state.session_id)
    }

    pub fn save_metrics(&self, session_id: &str, metrics: &SessionMetrics) -> Result<()> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).context("failed to create session directory")?;
        let json = serde_json::to_string_pretty(metrics).context("failed to serialize session metrics")?;
        atomic_write(&dir.join("metrics.json"), &json)
    }

    fn set_latest(&self, session_id: &str) -> Result<()> {
        fs::create_dir_all(&self.root).context("failed to create session root")?;
        atomic_write(&self.root.join("latest.txt"), session_id)
    }

    pub fn latest_session_id(&self) -> Option<String> {
        fs::read_to_string(self.root.join("latest.txt"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Loads session state, quarantining and returning `None` on corruption
    /// rather than propagating a parse error to the caller.
    pub fn load_state(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.load_quarantining(&self.session_dir(session_id).join("state.json"))
    }

    pub fn load_metrics(&self, session_id: &str) -> Result<Option<SessionMetrics>> {
        self.load_quarantining(&self.session_dir(session_id).join("metrics.json"))
    }

    fn load_quarantining<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).context("failed to read session file")?;
        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                self.quarantine(path)?;
                Ok(None)
            }
        }
    }

    fn quarantine(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(self.corrupted_dir()).context("failed to create corrupted directory")?;
        let basename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");
        let dest = self
            .corrupted_dir()
            .join(format!("{basename}.{}", Utc::now().format("%Y%m%dT%H%M%SZ")));
        fs::rename(path, &dest).context("failed to quarantine corrupted session file")?;
        Ok(())
    }

    /// Every session id on disk, newest-first by last update. Tolerates
    /// corrupted entries by skipping them (same quarantine path as `load_state`).
    pub fn list_session_ids(&self) -> Result<Vec<String>> {
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut sessions: Vec<(String, chrono::DateTime<Utc>)> = Vec::new();
        for entry in fs::read_dir(&dir)?.filter_map(|e| e.ok()) {
            let Some(session_id) = entry.file_name().into_string().ok() else {
                continue;
            };
            if let Ok(Some(state)) = self.load_state(&session_id) {
                sessions.push((session_id, state.updated_at));
            }
        }
        sessions.sort_by_key(|(_, updated_at)| std::cmp::Reverse(*updated_at));
        Ok(sessions.into_iter().map(|(id, _)| id).collect())
    }

    /// Removes a session's directory outright, clearing `latest.txt` if it
    /// pointed at the deleted session.
    pub fn delete(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("failed to remove session {session_id}"))?;
        }
        if self.latest_session_id().as_deref() == Some(session_id) {
            let _ = fs::remove_file(self.root.join("latest.txt"));
        }
        Ok(())
    }

    /// Enumerate completed sessions sorted oldest-first and remove the
    /// excess until at most `retention_limit` remain (0 means unlimited).
    /// Active/incomplete sessions are never pruned.
    pub fn prune(&self, retention_limit: usize) -> Result<Vec<String>> {
        if retention_limit == 0 {
            return Ok(Vec::new());
        }
        let dir = self.sessions_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut completed: Vec<(String, chrono::DateTime<Utc>)> = Vec::new();
        for entry in fs::read_dir(&dir)?.filter_map(|e| e.ok()) {
            let Some(session_id) = entry.file_name().into_string().ok() else {
                continue;
            };
            if let Ok(Some(state)) = self.load_state(&session_id) {
                if state.is_complete {
                    completed.push((session_id, state.updated_at));
                }
            }
        }
        completed.sort_by_key(|(_, updated_at)| *updated_at);

        let excess = completed.len().saturating_sub(retention_limit);
        let mut removed = Vec::new();
        for (session_id, _) in completed.into_iter().take(excess) {
            fs::remove_dir_all(self.session_dir(&session_id))
                .with_context(|| format!("failed to remove pruned session {session_id}"))?;
            removed.push(session_id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use tempfile::tempdir;

    fn store() -> (SessionStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (SessionStore::new(dir.path()), dir)
    }

    #[test]
    fn save_and_load_round_trips_state() {
        let (store, _dir) = store();
        let state = SessionState::new("auth-20260801-1", "auth", Utc::now());
        store.save_state(&state).unwrap();

        let loaded = store.load_state("auth-20260801-1").unwrap().unwrap();
        assert_eq!(loaded.session_id, "auth-20260801-1");
        assert_eq!(store.latest_session_id().as_deref(), Some("auth-20260801-1"));
    }

    #[test]
    fn corrupted_state_is_quarantined_and_read_as_none() {
        let (store, dir) = store();
        let session_dir = dir.path().join("sessions").join("auth-20260801-1");
        fs::create_dir_all(&session_dir).unwrap();
        fs::write(session_dir.join("state.json"), "not json").unwrap();

        let loaded = store.load_state("auth-20260801-1").unwrap();
        assert!(loaded.is_none());
        assert!(!session_dir.join("state.json").exists());
        let quarantined: Vec<_> = fs::read_dir(dir.path().join("corrupted")).unwrap().collect();
        assert_eq!(quarantined.len(), 1);
    }

    #[test]
    fn missing_session_is_none_not_error() {
        let (store, _dir) = store();
        assert!(store.load_state("nonexistent").unwrap().is_none());
    }

    #[test]
    fn allocate_session_id_uses_the_injected_clock() {
        let (store, _dir) = store();
        let clock = SystemClock;
        let id = store.allocate_session_id("auth", &clock).unwrap();
        assert!(id.starts_with("auth-"));
    }

    #[test]
    fn prune_removes_only_excess_completed_sessions() {
        let (store, _dir) = store();
        for i in 1..=3 {
            let mut state = SessionState::new(format!("auth-20260801-{i}"), "auth", Utc::now());
            state.is_complete = true;
            store.save_state(&state).unwrap();
        }
        let mut active = SessionState::new("auth-20260801-4", "auth", Utc::now());
        active.is_complete = false;
        store.save_state(&active).unwrap();

        let removed = store.prune(1).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(store.load_state("auth-20260801-3").unwrap().is_some());
        assert!(store.load_state("auth-20260801-4").unwrap().is_some());
    }

    #[test]
    fn list_session_ids_is_newest_first() {
        let (store, _dir) = store();
        for i in 1..=3 {
            let state = SessionState::new(format!("auth-20260801-{i}"), "auth", Utc::now());
            store.save_state(&state).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let ids = store.list_session_ids().unwrap();
        assert_eq!(ids, vec!["auth-20260801-3", "auth-20260801-2", "auth-20260801-1"]);
    }

    #[test]
    fn delete_removes_session_and_clears_latest_pointer() {
        let (store, _dir) = store();
        let state = SessionState::new("auth-20260801-1", "auth", Utc::now());
        store.save_state(&state).unwrap();

        store.delete("auth-20260801-1").unwrap();
        assert!(store.load_state("auth-20260801-1").unwrap().is_none());
        assert!(store.latest_session_id().is_none());
    }
}
