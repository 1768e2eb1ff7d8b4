// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, shutdown, recovery.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::Notify;
use tracing::{info, warn};
use wfm_core::settings::load_process_definitions;
use wfm_core::{Actor, Settings, SettingsError, SystemClock, UuidIdGen};
use wfm_engine::{Engine, EngineError, SyncOutcome};

/// Engine with the production clock and id generator
pub type DaemonEngine = Engine<SystemClock, UuidIdGen>;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Project root directory
    pub project_root: PathBuf,
    /// Path to Unix socket
    pub socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to version file
    pub version_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Directory holding the state WAL and audit log
    pub data_path: PathBuf,
}

impl Config {
    /// Create config for a project
    pub fn for_project(project_root: &Path) -> Result<Self, LifecycleError> {
        Self::with_dirs(project_root, &state_dir()?, &socket_dir())
    }

    /// Create config rooted at explicit state and socket directories
    pub fn with_dirs(
        project_root: &Path,
        state_root: &Path,
        socket_dir: &Path,
    ) -> Result<Self, LifecycleError> {
        let canonical = project_root
            .canonicalize()
            .map_err(|e| LifecycleError::ProjectNotFound(project_root.to_path_buf(), e))?;

        let hash = project_hash(&canonical);
        let state_dir = state_root.join("projects").join(&hash);

        Ok(Self {
            project_root: canonical,
            socket_path: socket_dir.join(format!("{}.sock", hash)),
            lock_path: state_dir.join("daemon.pid"),
            version_path: state_dir.join("daemon.version"),
            log_path: state_dir.join("daemon.log"),
            data_path: state_dir.join("data"),
        })
    }
}

/// Daemon state during operation
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub engine: DaemonEngine,
    pub start_time: Instant,
    /// Signalled by a `Shutdown` request
    pub shutdown_signal: Arc<Notify>,
}

impl DaemonState {
    /// Shutdown the daemon gracefully
    pub fn shutdown(&self) {
        info!("Shutting down daemon...");

        for path in [
            &self.config.socket_path,
            &self.config.lock_path,
            &self.config.version_path,
        ] {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(path) {
                    warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }

        info!("Daemon shutdown complete");
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Project not found at {0}: {1}")]
    ProjectNotFound(PathBuf, std::io::Error),

    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Process definition {path}: {source}")]
    Definition {
        path: PathBuf,
        #[source]
        source: EngineError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Start the daemon
pub async fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    match startup_inner(config).await {
        Ok(state) => Ok(state),
        // The files belong to the daemon that holds the lock
        Err(e @ LifecycleError::LockFailed(_)) => Err(e),
        Err(e) => {
            cleanup_on_failure(config);
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.data_path)?;
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Lock before touching any state
    let mut lock_file = File::create(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    {
        use std::io::Write;
        writeln!(lock_file, "{}", std::process::id())?;
    }

    std::fs::write(&config.version_path, env!("CARGO_PKG_VERSION"))?;

    // Settings and definitions are parsed before the socket is bound
    let settings = Settings::load(&config.project_root)?;
    let definitions = load_process_definitions(&config.project_root)?;

    let engine = Engine::open(&config.data_path, settings, SystemClock, UuidIdGen)?;
    let actor = Actor::system();

    let seeded = engine.seed_default_statuses(&actor).await?;
    if seeded > 0 {
        info!(statuses = seeded, "seeded default status workflow");
    }

    for (path, definition) in definitions {
        let id = definition.id.clone();
        let outcome = engine
            .sync_definition(definition, &actor)
            .await
            .map_err(|source| LifecycleError::Definition {
                path: path.clone(),
                source,
            })?;
        match outcome {
            SyncOutcome::Unchanged => {}
            SyncOutcome::Defined | SyncOutcome::Revised => {
                info!(process_type = %id, ?outcome, "synchronized process definition");
            }
        }
    }

    let stats = engine.stats();
    info!(
        instances = stats.instances,
        open_instances = stats.open_instances,
        process_types = stats.process_types,
        "Loaded state"
    );

    // Bind LAST, once everything above has been validated
    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(
        "Daemon started for project: {}",
        config.project_root.display()
    );

    Ok(DaemonState {
        config: config.clone(),
        lock_file,
        listener,
        engine,
        start_time: Instant::now(),
        shutdown_signal: Arc::new(Notify::new()),
    })
}

fn cleanup_on_failure(config: &Config) {
    for path in [
        &config.socket_path,
        &config.version_path,
        &config.lock_path,
    ] {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// `WFM_STATE_DIR`, else `$XDG_STATE_HOME/wfm`, else `~/.local/state/wfm`
fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("WFM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("wfm"));
    }

    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/wfm"))
}

/// Kept short for the platform socket path limit (SUN_LEN is 104 on macOS)
fn socket_dir() -> PathBuf {
    std::env::var("WFM_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp/wfm"))
}

fn project_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    hex_encode(&digest[..8])
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
