// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow Manager Daemon (wfmd)
//!
//! Background process that owns the engine, serves the CLI over a Unix
//! socket and drives timer-based generation and audit retention.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod server;

use std::path::PathBuf;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use wfm_core::Actor;

use crate::lifecycle::{Config, LifecycleError};
use crate::server::ServerContext;

const RETENTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let project_root = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        std::env::current_dir()?
    };

    let config = Config::for_project(&project_root)?;

    // Before tracing setup, so the CLI can find it
    write_startup_marker(&config)?;

    let log_guard = setup_logging(&config)?;

    info!("Starting wfmd for project: {}", project_root.display());

    let daemon = match lifecycle::startup(&config).await {
        Ok(d) => d,
        Err(e) => {
            // Tracing is non-blocking and may not flush before exit
            write_startup_error(&config, &e);
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let ctx = ServerContext {
        engine: daemon.engine.clone(),
        start_time: daemon.start_time,
        shutdown: daemon.shutdown_signal.clone(),
    };

    let settings = daemon.engine.settings().clone();
    let mut generation_tick = tokio::time::interval(settings.scheduler.check_interval);
    generation_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut retention_tick = tokio::time::interval(RETENTION_INTERVAL);
    retention_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Daemon ready, listening on {}",
        config.socket_path.display()
    );

    // Signal ready for a parent process waiting on startup
    println!("READY");

    loop {
        tokio::select! {
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server::handle_connection(ctx, stream).await {
                                error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                    }
                }
            }

            // First tick fires immediately, covering anything missed while down
            _ = generation_tick.tick(), if settings.scheduler.auto_generate => {
                let engine = daemon.engine.clone();
                tokio::spawn(async move {
                    match engine.run_due().await {
                        Ok(report) => {
                            for failure in report.failures() {
                                warn!(
                                    process_type = %failure.process_type_id,
                                    period = %report.period,
                                    "generation failed: {:?}",
                                    failure.outcome
                                );
                            }
                            debug!(period = %report.period, created = report.created(), "generation check");
                        }
                        Err(e) => error!("Generation check failed: {}", e),
                    }
                });
            }

            _ = retention_tick.tick() => {
                match daemon.engine.prune_audit(&Actor::system()) {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "pruned audit entries past retention"),
                    Err(e) => error!("Audit retention pass failed: {}", e),
                }
            }

            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }

            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }

            _ = daemon.shutdown_signal.notified() => {
                info!("Shutdown requested via IPC, shutting down...");
                break;
            }
        }
    }

    daemon.shutdown();
    info!("Daemon stopped");
    Ok(())
}

/// Startup marker prefix written to log before anything else.
/// CLI uses this to find where the current startup attempt begins.
/// Full format: "--- wfmd: starting (pid: 12345) ---"
pub const STARTUP_MARKER_PREFIX: &str = "--- wfmd: starting (pid: ";

fn write_startup_marker(config: &Config) -> Result<(), LifecycleError> {
    use std::io::Write;

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    writeln!(file, "{}{}) ---", STARTUP_MARKER_PREFIX, std::process::id())?;

    Ok(())
}

/// Write startup error synchronously so the CLI sees it even on a fast exit
fn write_startup_error(config: &Config, error: &LifecycleError) {
    use std::io::Write;

    let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
    else {
        return;
    };
    let _ = writeln!(file, "ERROR Failed to start daemon: {}", error);
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_appender = tracing_appender::rolling::never(
        config.log_path.parent().ok_or(LifecycleError::NoStateDir)?,
        config
            .log_path
            .file_name()
            .ok_or(LifecycleError::NoStateDir)?,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
