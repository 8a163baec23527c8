//! Config (§4.M): a frozen record loaded once at process startup and
//! passed by reference to every collaborator. Layered `<root>/orchestrator.toml`
//! (or `.lopen/orchestrator.toml`) → environment variables → CLI flags,
//! each layer overriding only the fields it sets. Validation happens once
//! at load time and produces warnings, never panics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// What's read from `orchestrator.toml`. Every field is optional: an absent
/// field simply means "let the next layer decide".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub session_retention: Option<usize>,
    pub token_budget_per_module: Option<i64>,
    pub premium_request_budget: Option<i64>,
    pub budget_warning_threshold: Option<f64>,
    pub budget_confirmation_threshold: Option<f64>,
    pub churn_threshold: Option<u32>,
    pub circular_threshold: Option<u32>,
    pub shotgun_file_threshold: Option<u32>,
    pub max_same_file_reads: Option<u32>,
    pub max_consecutive_failures: Option<u32>,
    pub oracle_timeout_secs: Option<u64>,
    pub llm_timeout_secs: Option<u64>,
    pub save_iteration_history: Option<bool>,
    pub llm_cmd: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl ConfigFile {
    fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    fn find(project_dir: &Path) -> Option<Self> {
        for candidate in [
            project_dir.join("orchestrator.toml"),
            project_dir.join(".lopen/orchestrator.toml"),
        ] {
            if candidate.exists()
                && let Ok(parsed) = Self::load(&candidate)
            {
                return Some(parsed);
            }
        }
        None
    }
}

/// CLI-supplied overrides, the topmost layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub llm_cmd: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
    pub auto_confirm: bool,
    /// An explicit `--config <path>` override, checked before the
    /// project-directory search `ConfigFile::find` otherwise performs.
    pub config_path: Option<PathBuf>,
}

/// Frozen runtime settings. Constructed once via [`Config::load`]; every
/// collaborator receives it by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub session_retention: usize,
    pub token_budget_per_module: i64,
    pub premium_request_budget: i64,
    pub budget_warning_threshold: f64,
    pub budget_confirmation_threshold: f64,
    pub churn_threshold: u32,
    pub circular_threshold: u32,
    pub shotgun_file_threshold: u32,
    pub max_same_file_reads: u32,
    pub max_consecutive_failures: u32,
    pub oracle_timeout: Duration,
    pub llm_timeout: Duration,
    pub save_iteration_history: bool,
    pub llm_cmd: String,
    pub log_dir: Option<PathBuf>,
    pub verbose: bool,
    pub auto_confirm: bool,
    pub warnings: Vec<String>,
}

const DEFAULT_SESSION_RETENTION: usize = 20;
const DEFAULT_BUDGET_WARNING: f64 = 0.8;
const DEFAULT_BUDGET_CONFIRMATION: f64 = 0.9;
const DEFAULT_CHURN_THRESHOLD: u32 = 3;
const DEFAULT_CIRCULAR_THRESHOLD: u32 = 3;
const DEFAULT_SHOTGUN_THRESHOLD: u32 = 5;
const DEFAULT_TOOL_DISCIPLINE_THRESHOLD: u32 = 3;
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 600;

impl Config {
    pub fn load(project_dir: &Path, cli: CliOverrides) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("failed to resolve project dir {}", project_dir.display()))?;

        let file = match &cli.config_path {
            Some(path) => ConfigFile::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => ConfigFile::find(&project_dir).unwrap_or_default(),
        };
        let mut warnings = Vec::new();

        let budget_warning_threshold = clamp_unit_interval(
            file.budget_warning_threshold.unwrap_or(DEFAULT_BUDGET_WARNING),
            DEFAULT_BUDGET_WARNING,
            "budget_warning_threshold",
            &mut warnings,
        );
        let budget_confirmation_threshold = clamp_unit_interval(
            file.budget_confirmation_threshold.unwrap_or(DEFAULT_BUDGET_CONFIRMATION),
            DEFAULT_BUDGET_CONFIRMATION,
            "budget_confirmation_threshold",
            &mut warnings,
        );

        let llm_cmd = cli
            .llm_cmd
            .or(file.llm_cmd)
            .or_else(|| std::env::var("LLM_CMD").ok())
            .unwrap_or_else(|| "claude".to_string());

        let log_dir = cli
            .log_dir
            .or(file.log_dir)
            .or_else(|| std::env::var("LOG_DIR").ok().map(PathBuf::from));

        Ok(Self {
            project_dir,
            session_retention: env_override("SESSION_RETENTION")
                .unwrap_or_else(|| file.session_retention.unwrap_or(DEFAULT_SESSION_RETENTION)),
            token_budget_per_module: env_override("TOKEN_BUDGET_PER_MODULE")
                .unwrap_or_else(|| file.token_budget_per_module.unwrap_or(0)),
            premium_request_budget: env_override("PREMIUM_REQUEST_BUDGET")
                .unwrap_or_else(|| file.premium_request_budget.unwrap_or(0)),
            budget_warning_threshold,
            budget_confirmation_threshold,
            churn_threshold: env_override("CHURN_THRESHOLD")
                .unwrap_or_else(|| file.churn_threshold.unwrap_or(DEFAULT_CHURN_THRESHOLD)),
            circular_threshold: env_override("CIRCULAR_THRESHOLD")
                .unwrap_or_else(|| file.circular_threshold.unwrap_or(DEFAULT_CIRCULAR_THRESHOLD)),
            shotgun_file_threshold: env_override("SHOTGUN_FILE_THRESHOLD")
                .unwrap_or_else(|| file.shotgun_file_threshold.unwrap_or(DEFAULT_SHOTGUN_THRESHOLD)),
            max_same_file_reads: env_override("MAX_SAME_FILE_READS")
                .unwrap_or_else(|| file.max_same_file_reads.unwrap_or(DEFAULT_TOOL_DISCIPLINE_THRESHOLD)),
            max_consecutive_failures: env_override("MAX_CONSECUTIVE_FAILURES")
                .unwrap_or_else(|| file.max_consecutive_failures.unwrap_or(DEFAULT_TOOL_DISCIPLINE_THRESHOLD)),
            oracle_timeout: Duration::from_secs(
                env_override("ORACLE_TIMEOUT_SECS")
                    .unwrap_or_else(|| file.oracle_timeout_secs.unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS)),
            ),
            llm_timeout: Duration::from_secs(
                env_override("LLM_TIMEOUT_SECS")
                    .unwrap_or_else(|| file.llm_timeout_secs.unwrap_or(DEFAULT_LLM_TIMEOUT_SECS)),
            ),
            save_iteration_history: file.save_iteration_history.unwrap_or(false),
            llm_cmd,
            log_dir,
            verbose: cli.verbose,
            auto_confirm: cli.auto_confirm,
            warnings,
        })
    }

    /// The `<root>/` the layout in §4.H is rooted at. Passed to
    /// `SessionStore`, which derives `sessions/`, `corrupted/`, etc. from it.
    pub fn lopen_root(&self) -> PathBuf {
        self.project_dir.join(".lopen")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.lopen_root().join("sessions")
    }

    pub fn audit_dir(&self) -> PathBuf {
        self.lopen_root().join("audit")
    }

    pub fn section_cache_dir(&self) -> PathBuf {
        self.lopen_root().join("cache/sections")
    }

    pub fn history_dir(&self, session_id: &str) -> PathBuf {
        self.lopen_root().join("history").join(session_id)
    }

    pub fn modules_dir(&self) -> PathBuf {
        self.lopen_root().join("modules")
    }

    pub fn plan_path(&self, module: &str) -> PathBuf {
        self.modules_dir().join(module).join("plan.md")
    }

    /// Where the module's own spec document lives, separate from `.lopen/`:
    /// `<project_dir>/<module>/SPECIFICATION.md`.
    pub fn spec_path(&self, module: &str) -> PathBuf {
        self.project_dir.join(module).join("SPECIFICATION.md")
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(self.sessions_dir()).context("failed to create sessions dir")?;
        std::fs::create_dir_all(self.audit_dir()).context("failed to create audit dir")?;
        std::fs::create_dir_all(self.section_cache_dir()).context("failed to create section cache dir")?;
        std::fs::create_dir_all(self.modules_dir()).context("failed to create modules dir")?;
        if let Some(log_dir) = &self.log_dir {
            std::fs::create_dir_all(log_dir).context("failed to create log dir")?;
        }
        Ok(())
    }
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn clamp_unit_interval(value: f64, default: f64, field: &str, warnings: &mut Vec<String>) -> f64 {
    if (0.0..=1.0).contains(&value) {
        value
    } else {
        warnings.push(format!(
            "{field} = {value} is outside 0..=1, falling back to default {default}"
        ));
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_apply_when_no_file_or_env_present() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert_eq!(config.llm_cmd, "claude");
        assert_eq!(config.budget_warning_threshold, DEFAULT_BUDGET_WARNING);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn file_layer_is_overridden_by_cli() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("orchestrator.toml"),
            "llm_cmd = \"file-claude\"\n",
        )
        .unwrap();

        let config = Config::load(
            dir.path(),
            CliOverrides {
                llm_cmd: Some("cli-claude".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(config.llm_cmd, "cli-claude");
    }

    #[test]
    fn file_layer_wins_over_default_when_cli_silent() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("orchestrator.toml"),
            "llm_cmd = \"file-claude\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert_eq!(config.llm_cmd, "file-claude");
    }

    #[test]
    fn out_of_range_threshold_falls_back_with_a_warning() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("orchestrator.toml"),
            "budget_warning_threshold = 1.5\n",
        )
        .unwrap();

        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert_eq!(config.budget_warning_threshold, DEFAULT_BUDGET_WARNING);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn ensure_directories_creates_the_on_disk_layout() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        config.ensure_directories().unwrap();
        assert!(config.sessions_dir().exists());
        assert!(config.audit_dir().exists());
        assert!(config.section_cache_dir().exists());
        assert!(config.modules_dir().exists());
    }

    #[test]
    fn explicit_config_path_overrides_the_project_dir_search() {
        let dir = tempdir().unwrap();
        let elsewhere = tempdir().unwrap();
        std::fs::write(dir.path().join("orchestrator.toml"), "llm_cmd = \"project-claude\"\n").unwrap();
        let explicit_path = elsewhere.path().join("custom.toml");
        std::fs::write(&explicit_path, "llm_cmd = \"explicit-claude\"\n").unwrap();

        let config = Config::load(
            dir.path(),
            CliOverrides { config_path: Some(explicit_path), ..Default::default() },
        )
        .unwrap();
        assert_eq!(config.llm_cmd, "explicit-claude");
    }

    #[test]
    fn sessions_dir_nests_under_lopen_root() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path(), CliOverrides::default()).unwrap();
        assert_eq!(config.sessions_dir(), config.lopen_root().join("sessions"));
        assert_eq!(config.plan_path("auth"), config.modules_dir().join("auth/plan.md"));
        assert_eq!(config.spec_path("auth"), config.project_dir.join("auth/SPECIFICATION.md"));
    }
}
