// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

struct Dirs {
    project: TempDir,
    state: TempDir,
    sockets: TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            project: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
            sockets: TempDir::new().unwrap(),
        }
    }

    fn config(&self) -> Config {
        Config::with_dirs(self.project.path(), self.state.path(), self.sockets.path()).unwrap()
    }

    fn write_project_file(&self, relative: &str, content: &str) {
        let path = self.project.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

#[test]
fn config_paths_are_keyed_by_project_hash() {
    let dirs = Dirs::new();
    let config = dirs.config();

    let hash = project_hash(&dirs.project.path().canonicalize().unwrap());
    assert_eq!(hash.len(), 16);
    assert_eq!(
        config.socket_path,
        dirs.sockets.path().join(format!("{}.sock", hash))
    );
    assert!(config.lock_path.starts_with(dirs.state.path().join("projects").join(&hash)));
    assert!(config.data_path.ends_with("data"));
}

#[test]
fn missing_project_is_reported() {
    let dirs = Dirs::new();
    let err = Config::with_dirs(
        &dirs.project.path().join("nope"),
        dirs.state.path(),
        dirs.sockets.path(),
    )
    .unwrap_err();
    assert!(matches!(err, LifecycleError::ProjectNotFound(..)));
}

#[tokio::test]
async fn startup_seeds_statuses_and_syncs_definitions() {
    let dirs = Dirs::new();
    dirs.write_project_file(
        ".wfm/processes/payroll.toml",
        "id = \"payroll\"\nname = \"Payroll\"\n[[templates]]\ntitle = \"Run payroll\"\n",
    );
    let config = dirs.config();

    let daemon = startup(&config).await.unwrap();
    assert!(config.socket_path.exists());
    assert!(config.version_path.exists());

    let stats = daemon.engine.stats();
    assert_eq!(stats.statuses, 4);
    assert_eq!(stats.process_types, 1);
    assert_eq!(daemon.engine.get_process_type("payroll").unwrap().name(), "Payroll");

    daemon.shutdown();
    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
}

#[tokio::test]
async fn second_startup_fails_while_locked() {
    let dirs = Dirs::new();
    let config = dirs.config();

    let first = startup(&config).await.unwrap();
    let err = match startup(&config).await {
        Ok(_) => panic!("second daemon started"),
        Err(e) => e,
    };
    assert!(matches!(err, LifecycleError::LockFailed(_)));

    // The running daemon keeps its files
    assert!(config.socket_path.exists());
    assert!(config.lock_path.exists());
    first.shutdown();
}

#[tokio::test]
async fn invalid_settings_abort_startup_before_binding() {
    let dirs = Dirs::new();
    dirs.write_project_file(".wfm/settings.toml", "[notify]\nbuffer = 0\n");
    let config = dirs.config();

    let err = match startup(&config).await {
        Ok(_) => panic!("started with invalid settings"),
        Err(e) => e,
    };
    assert!(matches!(err, LifecycleError::Settings(_)));
    assert!(!config.socket_path.exists());
    assert!(!config.lock_path.exists());
}

#[tokio::test]
async fn restart_replays_state_without_reseeding() {
    let dirs = Dirs::new();
    let config = dirs.config();

    let daemon = startup(&config).await.unwrap();
    let first = daemon.engine.stats();
    daemon.shutdown();
    drop(daemon);

    let daemon = startup(&config).await.unwrap();
    let second = daemon.engine.stats();
    assert_eq!(second.statuses, first.statuses);
    assert_eq!(second.audit_entries, first.audit_entries);
    daemon.shutdown();
}
