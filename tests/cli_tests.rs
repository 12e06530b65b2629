//! Smoke tests for the `golem-build` binary

use std::process::Command;
use tempfile::TempDir;

fn golem_build() -> Command {
    Command::new(env!("CARGO_BIN_EXE_golem-build"))
}

#[test]
fn test_help_lists_subcommands() {
    let output = golem_build().arg("--help").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["build", "peers", "hub-info", "serve"] {
        assert!(stdout.contains(command), "missing {command} in:\n{stdout}");
    }
}

#[test]
fn test_serve_help() {
    let output = golem_build().args(["serve", "--help"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--port"));
}

#[test]
fn test_missing_config_is_startup_error() {
    let dir = TempDir::new().unwrap();
    let output = golem_build()
        .arg("--config")
        .arg(dir.path().join("absent.toml"))
        .arg("serve")
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Configuration error"));
}

#[test]
fn test_missing_task_list_is_startup_error() {
    let dir = TempDir::new().unwrap();
    let output = golem_build()
        .args(["--advertise-host", "127.0.0.1", "build", "--tasks"])
        .arg(dir.path().join("tasks.json"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error loading task list"));
}
