// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon client for CLI commands

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::unix::OwnedReadHalf;
use tokio::net::UnixStream;
use wfm_core::{Event, EventPattern};
use wfm_daemon::protocol::{self, ProtocolError};
use wfm_daemon::{Request, Response};
use wfm_engine::{EngineStats, ErrorKind};

fn parse_duration_ms(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Timeout for IPC requests
pub fn timeout_ipc() -> Duration {
    parse_duration_ms("WFM_TIMEOUT_IPC_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for daemon to start
pub fn timeout_connect() -> Duration {
    parse_duration_ms("WFM_TIMEOUT_CONNECT_MS").unwrap_or(Duration::from_secs(5))
}

/// Timeout for waiting for process to exit
pub fn timeout_exit() -> Duration {
    parse_duration_ms("WFM_TIMEOUT_EXIT_MS").unwrap_or(Duration::from_secs(2))
}

pub fn poll_interval() -> Duration {
    parse_duration_ms("WFM_POLL_INTERVAL_MS").unwrap_or(Duration::from_millis(50))
}

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("Failed to start daemon: {0}")]
    DaemonStartFailed(String),

    #[error("Connection timeout waiting for daemon to start")]
    DaemonStartTimeout,

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The daemon refused the request
    #[error("{message}")]
    Rejected { kind: ErrorKind, message: String },

    #[error("Unexpected response from daemon")]
    UnexpectedResponse,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine project root")]
    NoProjectRoot,

    #[error("Could not determine state directory")]
    NoStateDir,
}

/// Daemon client
pub struct DaemonClient {
    socket_path: PathBuf,
}

impl DaemonClient {
    /// Connect to daemon, auto-starting if not running
    pub async fn connect_or_start(project_root: PathBuf) -> Result<Self, ClientError> {
        // Restart a daemon left over from a different build
        if let Ok(daemon_dir) = get_daemon_dir(&project_root) {
            let version_path = daemon_dir.join("daemon.version");
            if let Ok(daemon_version) = std::fs::read_to_string(&version_path) {
                if daemon_version.trim() != env!("CARGO_PKG_VERSION") {
                    let _ = daemon_stop(&project_root).await;
                }
            }
        }

        match Self::connect(project_root.clone()) {
            Ok(client) => Ok(client),
            Err(ClientError::DaemonNotRunning) => {
                let child = start_daemon_background(&project_root)?;
                Self::connect_with_retry(project_root, timeout_connect(), child).await
            }
            Err(e) => Err(wrap_with_startup_error(e, &project_root)),
        }
    }

    /// Connect to existing daemon (no auto-start)
    pub fn connect(project_root: PathBuf) -> Result<Self, ClientError> {
        let socket_path = get_socket_path(&project_root)?;

        if !socket_path.exists() {
            return Err(ClientError::DaemonNotRunning);
        }

        Ok(Self { socket_path })
    }

    async fn connect_with_retry(
        project_root: PathBuf,
        timeout: Duration,
        mut child: std::process::Child,
    ) -> Result<Self, ClientError> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            // An early exit means startup failed; the reason is in the log
            if let Ok(Some(status)) = child.try_wait() {
                let poll_start = Instant::now();
                while poll_start.elapsed() < timeout_exit() {
                    if let Some(err) = read_startup_error(&project_root) {
                        return Err(ClientError::DaemonStartFailed(err));
                    }
                    tokio::time::sleep(poll_interval()).await;
                }
                return Err(ClientError::DaemonStartFailed(format!(
                    "exited with {}",
                    status
                )));
            }

            match Self::connect(project_root.clone()) {
                Ok(client) => return Ok(client),
                Err(ClientError::DaemonNotRunning) => {
                    tokio::time::sleep(poll_interval()).await;
                }
                Err(e) => return Err(wrap_with_startup_error(e, &project_root)),
            }
        }

        Err(wrap_with_startup_error(
            ClientError::DaemonStartTimeout,
            &project_root,
        ))
    }

    async fn send_with_timeout(
        &self,
        request: Request,
        read_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Response, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&request)?;
        tokio::time::timeout(write_timeout, protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let response_bytes =
            tokio::time::timeout(read_timeout, protocol::read_message(&mut reader))
                .await
                .map_err(|_| ProtocolError::Timeout)??;

        Ok(protocol::decode(&response_bytes)?)
    }

    /// Send a request; an error response becomes `ClientError::Rejected`
    pub async fn send(&self, request: Request) -> Result<Response, ClientError> {
        match self
            .send_with_timeout(request, timeout_ipc(), timeout_ipc())
            .await?
        {
            Response::Error { kind, message } => Err(ClientError::Rejected { kind, message }),
            response => Ok(response),
        }
    }

    /// Get daemon status
    pub async fn status(&self) -> Result<(u64, EngineStats), ClientError> {
        match self.send(Request::Status).await? {
            Response::Status { uptime_secs, stats } => Ok((uptime_secs, stats)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Request daemon shutdown
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        match self.send(Request::Shutdown).await? {
            Response::Ok | Response::ShuttingDown => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Get daemon protocol version via Hello handshake
    pub async fn hello(&self) -> Result<String, ClientError> {
        match self
            .send(Request::Hello {
                version: wfm_daemon::PROTOCOL_VERSION.to_string(),
            })
            .await?
        {
            Response::Hello { version } => Ok(version),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Open a long-lived subscription
    pub async fn subscribe(&self, patterns: Vec<EventPattern>) -> Result<EventStream, ClientError> {
        let stream = UnixStream::connect(&self.socket_path).await?;
        let (mut reader, mut writer) = stream.into_split();

        let data = protocol::encode(&Request::Subscribe { patterns })?;
        tokio::time::timeout(timeout_ipc(), protocol::write_message(&mut writer, &data))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        let bytes = tokio::time::timeout(timeout_ipc(), protocol::read_message(&mut reader))
            .await
            .map_err(|_| ProtocolError::Timeout)??;
        match protocol::decode(&bytes)? {
            Response::Subscribed => Ok(EventStream {
                reader,
                _writer: writer,
            }),
            Response::Error { kind, message } => Err(ClientError::Rejected { kind, message }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

/// Events pushed by the daemon on a subscription
pub struct EventStream {
    reader: OwnedReadHalf,
    // Dropping the write half tells the daemon we are gone
    _writer: tokio::net::unix::OwnedWriteHalf,
}

impl EventStream {
    /// Next event; `None` once the daemon closes the stream
    pub async fn next(&mut self) -> Result<Option<Event>, ClientError> {
        let bytes = match protocol::read_message(&mut self.reader).await {
            Ok(bytes) => bytes,
            Err(ProtocolError::ConnectionClosed) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match protocol::decode(&bytes)? {
            Response::Notification { event } => Ok(Some(event)),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

fn start_daemon_background(project_root: &Path) -> Result<std::process::Child, ClientError> {
    let wfmd_path = find_wfmd_binary();

    Command::new(&wfmd_path)
        .arg(project_root)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| ClientError::DaemonStartFailed(e.to_string()))
}

/// Stop the daemon (graceful first, then forceful)
/// Returns true if daemon was stopped, false if it wasn't running
pub async fn daemon_stop(project_root: &Path) -> Result<bool, ClientError> {
    let client = match DaemonClient::connect(project_root.to_path_buf()) {
        Ok(c) => c,
        Err(ClientError::DaemonNotRunning) => {
            if let Ok(daemon_dir) = get_daemon_dir(project_root) {
                cleanup_stale_pid(&daemon_dir);
            }
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    let shutdown_result = client.shutdown().await;

    if let Some(pid) = read_daemon_pid(project_root)? {
        if shutdown_result.is_ok() {
            wait_for_exit(pid, timeout_exit()).await;
        }

        if process_exists(pid) {
            force_kill_daemon(pid);
            wait_for_exit(pid, timeout_exit()).await;
        }
    }

    let daemon_dir = get_daemon_dir(project_root)?;
    cleanup_stale_pid(&daemon_dir);

    Ok(true)
}

async fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if !process_exists(pid) {
            return true;
        }
        tokio::time::sleep(poll_interval()).await;
    }
    false
}

/// Locate `wfmd`: explicit override, dev build, sibling binary, then PATH
fn find_wfmd_binary() -> PathBuf {
    if let Ok(path) = std::env::var("WFM_DAEMON_BINARY") {
        return PathBuf::from(path);
    }

    if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
        let dev_path = PathBuf::from(manifest_dir)
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.join("target/debug/wfmd"));
        if let Some(path) = dev_path {
            if path.exists() {
                return path;
            }
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("wfmd");
            if sibling.exists() {
                return sibling;
            }
        }
    }

    PathBuf::from("wfmd")
}

/// Socket lives under a short directory to stay within SUN_LEN
fn get_socket_path(project_root: &Path) -> Result<PathBuf, ClientError> {
    let canonical = project_root
        .canonicalize()
        .map_err(|_| ClientError::NoProjectRoot)?;

    Ok(socket_dir().join(format!("{}.sock", project_hash(&canonical))))
}

fn socket_dir() -> PathBuf {
    std::env::var("WFM_SOCKET_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp/wfm"))
}

fn state_dir() -> Result<PathBuf, ClientError> {
    if let Ok(dir) = std::env::var("WFM_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("wfm"));
    }

    let home = std::env::var("HOME").map_err(|_| ClientError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/wfm"))
}

/// Must match the daemon's hashing so both agree on paths
fn project_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Find the project root by walking up from the current directory
///
/// `WFM_PROJECT_ROOT` wins; otherwise the nearest ancestor holding a `.wfm`
/// directory, falling back to the current directory.
pub fn find_project_root() -> Result<PathBuf, ClientError> {
    if let Ok(root) = std::env::var("WFM_PROJECT_ROOT") {
        return Ok(PathBuf::from(root));
    }

    let cwd = std::env::current_dir().map_err(|_| ClientError::NoProjectRoot)?;
    let mut current = cwd.clone();

    loop {
        if current.join(wfm_core::settings::SETTINGS_DIR).is_dir() {
            return Ok(current);
        }
        if !current.pop() {
            return Ok(cwd);
        }
    }
}

fn cleanup_stale_pid(daemon_dir: &Path) {
    let pid_path = daemon_dir.join("daemon.pid");
    if pid_path.exists() {
        let _ = std::fs::remove_file(&pid_path);
    }
}

/// Get the PID from the daemon PID file, if it exists
pub fn read_daemon_pid(project_root: &Path) -> Result<Option<u32>, ClientError> {
    let pid_path = get_daemon_dir(project_root)?.join("daemon.pid");

    match std::fs::read_to_string(&pid_path) {
        Ok(content) => Ok(content.trim().parse::<u32>().ok()),
        Err(_) => Ok(None),
    }
}

/// Check if a process with the given PID exists (`kill -0`)
pub fn process_exists(pid: u32) -> bool {
    send_signal(pid, "-0")
}

pub fn force_kill_daemon(pid: u32) -> bool {
    send_signal(pid, "-9")
}

fn send_signal(pid: u32, signal: &str) -> bool {
    Command::new("kill")
        .args([signal, &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

/// Where the daemon keeps logs, pid and version files for a project
pub fn get_daemon_dir(project_root: &Path) -> Result<PathBuf, ClientError> {
    let canonical = project_root
        .canonicalize()
        .map_err(|_| ClientError::NoProjectRoot)?;

    Ok(state_dir()?.join("projects").join(project_hash(&canonical)))
}

/// Written by the daemon before anything else.
/// Full format: "--- wfmd: starting (pid: 12345) ---"
const STARTUP_MARKER_PREFIX: &str = "--- wfmd: starting (pid: ";

/// Errors logged since the most recent startup marker
pub fn read_startup_error(project_root: &Path) -> Option<String> {
    let log_path = get_daemon_dir(project_root).ok()?.join("daemon.log");
    let content = std::fs::read_to_string(&log_path).ok()?;
    startup_errors(&content)
}

fn startup_errors(log: &str) -> Option<String> {
    let start_pos = log.rfind(STARTUP_MARKER_PREFIX)?;
    let errors: Vec<&str> = log[start_pos..]
        .lines()
        .filter(|line| line.contains(" ERROR ") || line.contains("Failed to start"))
        .collect();

    if errors.is_empty() {
        return None;
    }

    // "timestamp LEVEL target: message" keeps only the message
    let messages: Vec<String> = errors
        .iter()
        .filter_map(|line| line.split_once(": ").map(|(_, msg)| msg.to_string()))
        .collect();

    if messages.is_empty() {
        Some(errors.join("\n"))
    } else {
        Some(messages.join("\n"))
    }
}

fn wrap_with_startup_error(err: ClientError, project_root: &Path) -> ClientError {
    if matches!(err, ClientError::DaemonStartFailed(_)) {
        return err;
    }

    match read_startup_error(project_root) {
        Some(startup_error) => ClientError::DaemonStartFailed(startup_error),
        None => err,
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
