// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm daemon`: control the background daemon

use std::path::Path;

use anyhow::Result;
use clap::{Args, Subcommand};

use super::Context;
use crate::client::{self, ClientError, DaemonClient};
use crate::output::{emit, OutputFormat};

#[derive(Args)]
pub struct DaemonArgs {
    #[command(subcommand)]
    pub command: DaemonCommand,
}

#[derive(Subcommand)]
pub enum DaemonCommand {
    /// Start the daemon if it is not running
    Start,
    /// Stop the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Show the daemon log
    Logs {
        /// Number of trailing lines
        #[arg(short = 'n', long, default_value_t = 50)]
        lines: usize,
    },
}

pub async fn handle(command: DaemonCommand, project_root: &Path, ctx: &Context) -> Result<()> {
    match command {
        DaemonCommand::Start => {
            let client = DaemonClient::connect_or_start(project_root.to_path_buf()).await?;
            let version = client.hello().await?;
            if matches!(ctx.format, OutputFormat::Text) {
                println!("Daemon running (protocol {})", version);
            }
        }

        DaemonCommand::Stop => {
            let stopped = client::daemon_stop(project_root).await?;
            if matches!(ctx.format, OutputFormat::Text) {
                if stopped {
                    println!("Daemon stopped");
                } else {
                    println!("Daemon not running");
                }
            }
        }

        DaemonCommand::Status => status(project_root, ctx).await?,

        DaemonCommand::Logs { lines } => {
            let log_path = client::get_daemon_dir(project_root)?.join("daemon.log");
            let content = match std::fs::read_to_string(&log_path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No daemon log at {}", log_path.display());
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            for line in tail(&content, lines) {
                println!("{}", line);
            }
        }
    }
    Ok(())
}

async fn status(project_root: &Path, ctx: &Context) -> Result<()> {
    let client = match DaemonClient::connect(project_root.to_path_buf()) {
        Ok(client) => client,
        Err(ClientError::DaemonNotRunning) => {
            emit(&serde_json::json!({ "running": false }), ctx.format, |_| {
                println!("Daemon not running")
            });
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let version = client.hello().await?;
    let (uptime_secs, stats) = client.status().await?;
    let pid = client::read_daemon_pid(project_root)?;

    let report = serde_json::json!({
        "running": true,
        "pid": pid,
        "protocol": version,
        "uptime_secs": uptime_secs,
        "stats": stats,
    });
    emit(&report, ctx.format, |_| {
        println!("Daemon running");
        if let Some(pid) = pid {
            println!("  PID: {}", pid);
        }
        println!("  Protocol: {}", version);
        println!("  Uptime: {}", format_uptime(uptime_secs));
        println!("  Current period: {}", stats.current_period);
        println!("  Statuses: {}", stats.statuses);
        println!("  Process types: {}", stats.process_types);
        println!(
            "  Instances: {} ({} open)",
            stats.instances, stats.open_instances
        );
        println!("  Closed periods: {}", stats.closed_periods);
        println!("  Audit entries: {}", stats.audit_entries);
        println!("  Subscribers: {}", stats.subscribers);
    });
    Ok(())
}

fn tail(content: &str, lines: usize) -> impl Iterator<Item = &str> {
    let total = content.lines().count();
    content.lines().skip(total.saturating_sub(lines))
}

fn format_uptime(secs: u64) -> String {
    let (hours, rest) = (secs / 3600, secs % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
