use super::{AuditRun, IterationSummary, RunConfig, RunOutcome};
use crate::util::atomic_write;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct AuditLogger {
    audit_dir: PathBuf,
    current_run: Option<AuditRun>,
    current_run_file: PathBuf,
}

impl AuditLogger {
    pub fn new(audit_dir: &Path) -> Self {
        let current_run_file = audit_dir.join("current.json");
        Self {
            audit_dir: audit_dir.to_path_buf(),
            current_run: None,
            current_run_file,
        }
    }

    pub fn start_run(&mut self, config: RunConfig) -> Result<()> {
        self.current_run = Some(AuditRun::new(config));
        self.save_current()
    }

    pub fn add_iteration(&mut self, iteration: IterationSummary) -> Result<()> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("add_iteration called with no active run"))?;
        run.iterations.push(iteration);
        self.save_current()
    }

    pub fn finish_run(&mut self, outcome: RunOutcome) -> Result<PathBuf> {
        let run = self
            .current_run
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("no current run to finish"))?;
        run.finish(outcome);

        let filename = format!(
            "{}_{}.json",
            run.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &run.run_id.to_string()[..8]
        );
        let runs_dir = self.audit_dir.join("runs");
        fs::create_dir_all(&runs_dir).context("failed to create audit runs directory")?;
        let run_file = runs_dir.join(&filename);

        let json = serde_json::to_string_pretty(&run).context("failed to serialize audit run")?;
        atomic_write(&run_file, &json)?;

        if self.current_run_file.exists() {
            fs::remove_file(&self.current_run_file)
                .context("failed to remove current.json after finishing run")?;
        }

        self.current_run = None;
        Ok(run_file)
    }

    pub fn save_current(&self) -> Result<()> {
        let Some(ref run) = self.current_run else {
            return Ok(());
        };
        fs::create_dir_all(&self.audit_dir).context("failed to create audit directory")?;
        let json = serde_json::to_string_pretty(&run).context("failed to serialize current run")?;
        atomic_write(&self.current_run_file, &json)
    }

    pub fn load_current(&mut self) -> Result<bool> {
        if !self.current_run_file.exists() {
            return Ok(false);
        }
        let content = fs::read_to_string(&self.current_run_file)
            .context("failed to read current run file")?;
        let run: AuditRun =
            serde_json::from_str(&content).context("failed to parse current run file")?;
        self.current_run = Some(run);
        Ok(true)
    }

    pub fn current_run(&self) -> Option<&AuditRun> {
        self.current_run.as_ref()
    }

    pub fn list_runs(&self) -> Result<Vec<PathBuf>> {
        let runs_dir = self.audit_dir.join("runs");
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }
        let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "json"))
            .collect();
        runs.sort();
        runs.reverse();
        Ok(runs)
    }
}
