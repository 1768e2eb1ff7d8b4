// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm status`: manage the workflow status catalog

use anyhow::Result;
use clap::{Args, Subcommand};
use wfm_core::{Status, StatusPatch, StatusSpec};
use wfm_daemon::Request;

use super::{expect_response, Context};
use crate::client::DaemonClient;
use crate::output::emit;

#[derive(Args)]
pub struct StatusArgs {
    #[command(subcommand)]
    pub command: StatusCommand,
}

#[derive(Subcommand)]
pub enum StatusCommand {
    /// List statuses in display order
    List,
    /// Add a status
    Create {
        name: String,
        /// Color as #rrggbb
        #[arg(long)]
        color: Option<String>,
        /// Position in display order (appended when omitted)
        #[arg(long)]
        order: Option<u32>,
        /// Moving a task here completes it
        #[arg(long)]
        terminal: bool,
    },
    /// Change name, color or terminal flag
    Update {
        /// Status id or name
        status: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        color: Option<String>,
        #[arg(long)]
        terminal: Option<bool>,
    },
    /// Set display order; lists every active status by id or name
    Reorder {
        #[arg(required = true, num_args = 1..)]
        order: Vec<String>,
    },
    /// Retire a status so it can no longer be assigned
    Retire { status: String },
    /// Delete a status that no instance has ever used
    Delete { status: String },
}

pub async fn handle(command: StatusCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    let actor = ctx.actor.clone();
    match command {
        StatusCommand::List => {
            let statuses = expect_response!(
                client.send(Request::ListStatuses).await?,
                Statuses { statuses }
            );
            emit(&statuses, ctx.format, |s| print_statuses(s));
        }

        StatusCommand::Create {
            name,
            color,
            order,
            terminal,
        } => {
            let spec = StatusSpec {
                name,
                color,
                order,
                terminal,
            };
            let status = expect_response!(
                client.send(Request::CreateStatus { spec, actor }).await?,
                WorkflowStatus { status }
            );
            emit(&status, ctx.format, |s| {
                println!("Created status {} ({})", s.name, s.id)
            });
        }

        StatusCommand::Update {
            status,
            name,
            color,
            terminal,
        } => {
            let patch = StatusPatch {
                name,
                color,
                terminal,
            };
            if patch.is_empty() {
                anyhow::bail!("nothing to update: pass --name, --color or --terminal");
            }
            let status = expect_response!(
                client
                    .send(Request::UpdateStatus {
                        status,
                        patch,
                        actor,
                    })
                    .await?,
                WorkflowStatus { status }
            );
            emit(&status, ctx.format, |s| println!("Updated status {}", s.name));
        }

        StatusCommand::Reorder { order } => {
            let statuses = expect_response!(
                client.send(Request::ReorderStatuses { order, actor }).await?,
                Statuses { statuses }
            );
            emit(&statuses, ctx.format, |s| print_statuses(s));
        }

        StatusCommand::Retire { status } => {
            let status = expect_response!(
                client.send(Request::RetireStatus { status, actor }).await?,
                WorkflowStatus { status }
            );
            emit(&status, ctx.format, |s| println!("Retired status {}", s.name));
        }

        StatusCommand::Delete { status } => {
            let status = expect_response!(
                client.send(Request::DeleteStatus { status, actor }).await?,
                WorkflowStatus { status }
            );
            emit(&status, ctx.format, |s| println!("Deleted status {}", s.name));
        }
    }
    Ok(())
}

fn print_statuses(statuses: &[Status]) {
    println!("{:<5} {:<14} {:<20} {:<8} FLAGS", "ORDER", "ID", "NAME", "COLOR");
    for status in statuses {
        let mut flags = Vec::new();
        if status.terminal {
            flags.push("terminal");
        }
        if !status.active {
            flags.push("retired");
        }
        println!(
            "{:<5} {:<14} {:<20} {:<8} {}",
            status.order,
            status.id.as_str(),
            status.name,
            status.color,
            flags.join(",")
        );
    }
}
