//! Integration tests driving the compiled `forge` binary end to end.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn forge() -> Command {
    cargo_bin_cmd!("forge")
}

fn init_repo(dir: &TempDir) {
    git2::Repository::init(dir.path()).unwrap();
    let repo = git2::Repository::open(dir.path()).unwrap();
    let mut cfg = repo.config().unwrap();
    cfg.set_str("user.name", "test").unwrap();
    cfg.set_str("user.email", "test@test.com").unwrap();
    fs::create_dir_all(dir.path().join("auth")).unwrap();
    fs::write(
        dir.path().join("auth/SPECIFICATION.md"),
        "# OVERVIEW\n\nA test module.\n",
    )
    .unwrap();
}

mod cli_basics {
    use super::*;

    #[test]
    fn test_forge_help() {
        forge().arg("--help").assert().success();
    }

    #[test]
    fn test_forge_version() {
        forge().arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_a_module_argument() {
        forge().arg("run").assert().failure();
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        forge().arg("bogus").assert().failure();
    }
}

mod session_commands {
    use super::*;

    #[test]
    fn test_session_list_with_no_sessions() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        forge()
            .current_dir(dir.path())
            .arg("session")
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("no sessions found"));
    }

    #[test]
    fn test_session_show_unknown_session_fails() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        forge()
            .current_dir(dir.path())
            .arg("session")
            .arg("show")
            .arg("nope-1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("nope-1"));
    }

    #[test]
    fn test_session_delete_unknown_session_succeeds() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        // Deleting a session that was never created is a no-op, not an error.
        forge()
            .current_dir(dir.path())
            .arg("session")
            .arg("delete")
            .arg("nope-1")
            .assert()
            .success();
    }

    #[test]
    fn test_session_prune_with_nothing_to_prune() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        forge()
            .current_dir(dir.path())
            .arg("session")
            .arg("prune")
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to prune"));
    }
}

mod revert_command {
    use super::*;

    #[test]
    fn test_revert_unknown_session_fails() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        forge()
            .current_dir(dir.path())
            .arg("revert")
            .arg("nope-1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("nope-1"));
    }
}

mod global_flags {
    use super::*;

    #[test]
    fn test_project_dir_flag_is_honored() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let elsewhere = TempDir::new().unwrap();

        forge()
            .current_dir(elsewhere.path())
            .arg("--project-dir")
            .arg(dir.path())
            .arg("session")
            .arg("list")
            .assert()
            .success()
            .stdout(predicate::str::contains("no sessions found"));
    }

    #[test]
    fn test_verbose_flag_is_accepted() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);

        forge()
            .current_dir(dir.path())
            .arg("--verbose")
            .arg("session")
            .arg("list")
            .assert()
            .success();
    }

    #[test]
    fn test_explicit_config_flag_is_honored() {
        let dir = TempDir::new().unwrap();
        init_repo(&dir);
        let config_path = dir.path().join("custom.toml");
        fs::write(&config_path, "session_retention = 3\n").unwrap();

        forge()
            .current_dir(dir.path())
            .arg("--config")
            .arg(&config_path)
            .arg("session")
            .arg("list")
            .assert()
            .success();
    }
}
