//! Integration tests for the benchbox CLI.
//!
//! These tests verify the CLI binary behavior by running the actual executable
//! and checking output, exit codes, and file system effects.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

// -----------------------------------------------------------------------------
// Test helpers
// -----------------------------------------------------------------------------

/// Creates a Command for the benchbox binary.
#[allow(deprecated)]
fn benchbox() -> Command {
    let mut cmd = Command::cargo_bin("benchbox").expect("failed to find benchbox binary");
    cmd.env_remove("RUST_LOG").env_remove("TOOLS");
    cmd
}

/// Creates a Command for benchbox running in a specific directory.
fn benchbox_in(dir: &TempDir) -> Command {
    let mut cmd = benchbox();
    cmd.current_dir(dir.path());
    cmd
}

// -----------------------------------------------------------------------------
// Help and version tests
// -----------------------------------------------------------------------------

#[test]
fn test_help_shows_all_commands() {
    benchbox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("benchbox"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_shows_version() {
    benchbox()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("benchbox"));
}

#[test]
fn test_run_help_shows_all_options() {
    benchbox()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--backend"))
        .stdout(predicate::str::contains("--timeout-ms"))
        .stdout(predicate::str::contains("--env"))
        .stdout(predicate::str::contains("--tool"))
        .stdout(predicate::str::contains("--shell"))
        .stdout(predicate::str::contains("--json"));
}

#[test]
fn test_run_requires_a_command() {
    benchbox().arg("run").assert().failure();
}

// -----------------------------------------------------------------------------
// Run command tests
// -----------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn test_run_echo_prints_merged_log() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args(["run", "--", "echo", "Hello, World!"])
        .assert()
        .success()
        .stdout("Hello, World!\n")
        .stderr(predicate::str::contains("exit 0"));
}

#[cfg(unix)]
#[test]
fn test_run_propagates_exit_code() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args(["run", "--shell", "exit 7"])
        .assert()
        .code(7)
        .stderr(predicate::str::contains("exit 7"));
}

#[cfg(unix)]
#[test]
fn test_run_timeout_exits_124() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args(["run", "--timeout-ms", "100", "--", "sleep", "3"])
        .assert()
        .code(124)
        .stderr(predicate::str::contains("timed out after 100ms"));
}

#[cfg(unix)]
#[test]
fn test_run_json_output() {
    let dir = TempDir::new().unwrap();

    let output = benchbox_in(&dir)
        .args(["run", "--json", "--", "echo", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(value["exit_code"], 0);
    assert_eq!(value["merged_log"], "json\n");
    assert!(value["duration_ms"].is_u64());
}

#[cfg(unix)]
#[test]
fn test_run_env_and_tools() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args([
            "run",
            "-e",
            "GREETING=hi",
            "--tool",
            "brave",
            "--tool",
            "filesystem",
            "--shell",
            "echo \"$GREETING $TOOLS\"",
        ])
        .assert()
        .success()
        .stdout("hi brave,filesystem\n");
}

#[cfg(unix)]
#[test]
fn test_run_tool_flag_injection() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args([
            "run",
            "--tool",
            "brave",
            "--tool-flag",
            "echo:--tools",
            "--",
            "echo",
            "agent",
        ])
        .assert()
        .success()
        .stdout("agent --tools=brave\n");
}

#[cfg(unix)]
#[test]
fn test_run_in_explicit_workdir_keeps_files() {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");

    benchbox_in(&dir)
        .args(["run", "-C"])
        .arg(&work)
        .args(["--shell", "echo kept > out.txt"])
        .assert()
        .success();

    assert_eq!(fs::read_to_string(work.join("out.txt")).unwrap(), "kept\n");
}

#[test]
fn test_run_rejects_malformed_env() {
    benchbox()
        .args(["run", "-e", "NOEQUALS", "--", "true"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("KEY=VALUE"));
}

#[test]
fn test_run_missing_binary_fails() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .args(["run", "--", "benchbox-no-such-binary"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Failed to launch"));
}

// -----------------------------------------------------------------------------
// Config tests
// -----------------------------------------------------------------------------

#[test]
fn test_config_shows_defaults() {
    let dir = TempDir::new().unwrap();

    benchbox_in(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("# source: defaults"))
        .stdout(predicate::str::contains("[sandbox]"));
}

#[test]
fn test_config_reads_project_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("benchbox.toml"),
        r#"
[sandbox]
default_timeout_secs = 30

[sandbox.container]
image = "alpine:3.20"
"#,
    )
    .unwrap();

    benchbox_in(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("# source: benchbox.toml"))
        .stdout(predicate::str::contains("default_timeout_secs = 30"))
        .stdout(predicate::str::contains("alpine:3.20"));
}

#[cfg(unix)]
#[test]
fn test_config_default_timeout_applies_to_run() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("benchbox.toml"),
        "[sandbox]\ndefault_timeout_secs = 1\n",
    )
    .unwrap();

    benchbox_in(&dir)
        .args(["run", "--", "sleep", "5"])
        .assert()
        .code(124);
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("benchbox.toml"), "[sandbox\n").unwrap();

    benchbox_in(&dir)
        .arg("config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}
