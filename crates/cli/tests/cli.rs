// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI integration tests that run without a daemon

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A project directory plus isolated state and socket directories
struct Project {
    root: TempDir,
    state: TempDir,
    sockets: TempDir,
}

impl Project {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        std::fs::create_dir_all(root.path().join(".wfm/processes")).unwrap();
        Self {
            root,
            state: TempDir::new().unwrap(),
            sockets: TempDir::new().unwrap(),
        }
    }

    fn wfm(&self) -> Command {
        let mut cmd = Command::cargo_bin("wfm").unwrap();
        cmd.current_dir(self.root.path())
            .env("WFM_STATE_DIR", self.state.path())
            .env("WFM_SOCKET_DIR", self.sockets.path())
            .env("WFM_TIMEOUT_CONNECT_MS", "500")
            .env("WFM_TIMEOUT_EXIT_MS", "200")
            .env_remove("WFM_PROJECT_ROOT");
        cmd
    }
}

#[test]
fn help_lists_command_groups() {
    let project = Project::new();
    project
        .wfm()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tasks"))
        .stdout(predicate::str::contains("period"))
        .stdout(predicate::str::contains("archive"))
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn tasks_help_lists_operations() {
    let project = Project::new();
    project
        .wfm()
        .args(["tasks", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("move"))
        .stdout(predicate::str::contains("carry"))
        .stdout(predicate::str::contains("link-email"));
}

#[test]
fn completions_for_bash() {
    let project = Project::new();
    project
        .wfm()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wfm"));
}

#[test]
fn malformed_period_is_rejected_before_connecting() {
    let project = Project::new();
    project
        .wfm()
        .args(["period", "close", "2026-13"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("2026-13"));
}

#[test]
fn month_requires_year() {
    let project = Project::new();
    project
        .wfm()
        .args(["archive", "browse", "--month", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--year"));
}

#[test]
fn daemon_status_when_not_running() {
    let project = Project::new();
    project
        .wfm()
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon not running"));
}

#[test]
fn daemon_status_json_when_not_running() {
    let project = Project::new();
    project
        .wfm()
        .args(["--output", "json", "daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"running\": false"));
}

#[test]
fn daemon_stop_when_not_running() {
    let project = Project::new();
    project
        .wfm()
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon not running"));
}

#[test]
fn missing_daemon_binary_reports_start_failure() {
    let project = Project::new();
    project
        .wfm()
        .env("WFM_DAEMON_BINARY", project.root.path().join("no-such-wfmd"))
        .args(["tasks", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to start daemon"))
        .stderr(predicate::str::contains("wfm daemon logs"));
}
