// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wfm - Workflow Manager CLI

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod commands;
mod completions;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{archive, audit, daemon, period, process, status, tasks, watch, Context};
use wfm_core::Actor;

use crate::client::{find_project_root, DaemonClient};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "wfm",
    version,
    about = "Workflow Manager - recurring monthly processes and their tasks"
)]
struct Cli {
    /// Project root directory (the one holding `.wfm/`)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value_t)]
    output: OutputFormat,

    /// Name recorded in the audit trail (defaults to $WFM_ACTOR, then $USER)
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Work with task instances
    Tasks(tasks::TasksArgs),
    /// Manage workflow statuses
    Status(status::StatusArgs),
    /// Manage process types
    Process(process::ProcessArgs),
    /// Generate and close periods
    Period(period::PeriodArgs),
    /// Browse and search the archive
    Archive(archive::ArchiveArgs),
    /// Inspect the audit trail
    Audit(audit::AuditArgs),
    /// Stream live events
    Watch(watch::WatchArgs),
    /// Daemon management
    Daemon(daemon::DaemonArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_logging();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprint!("{}", error::render(&e));
            ExitCode::FAILURE
        }
    }
}

fn setup_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("WFM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn resolve_actor(flag: Option<String>) -> Actor {
    let name = flag
        .or_else(|| std::env::var("WFM_ACTOR").ok())
        .or_else(|| std::env::var("USER").ok())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "cli".to_string());
    Actor::new(name)
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context {
        actor: resolve_actor(cli.actor),
        format: cli.output,
    };

    if let Commands::Completions(args) = cli.command {
        completions::generate_completions::<Cli>(args.shell);
        return Ok(());
    }

    let project_root = cli.repo.map_or_else(find_project_root, Ok)?;
    tracing::debug!(project = %project_root.display(), actor = %ctx.actor, "resolved project");

    // Daemon control does not auto-start
    if let Commands::Daemon(args) = cli.command {
        return daemon::handle(args.command, &project_root, &ctx).await;
    }

    let client = DaemonClient::connect_or_start(project_root).await?;

    match cli.command {
        Commands::Tasks(args) => tasks::handle(args.command, &client, &ctx).await,
        Commands::Status(args) => status::handle(args.command, &client, &ctx).await,
        Commands::Process(args) => process::handle(args.command, &client, &ctx).await,
        Commands::Period(args) => period::handle(args.command, &client, &ctx).await,
        Commands::Archive(args) => archive::handle(args.command, &client, &ctx).await,
        Commands::Audit(args) => audit::handle(args.command, &client, &ctx).await,
        Commands::Watch(args) => watch::handle(args, &client, &ctx).await,
        Commands::Daemon(_) | Commands::Completions(_) => Ok(()),
    }
}
