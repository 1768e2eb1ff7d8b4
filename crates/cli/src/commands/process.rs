// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm process`: define and revise recurring process types

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use wfm_core::{ProcessSpec, ProcessType};
use wfm_daemon::Request;

use super::{expect_response, Context};
use crate::client::DaemonClient;
use crate::output::{emit, timestamp};

#[derive(Args)]
pub struct ProcessArgs {
    #[command(subcommand)]
    pub command: ProcessCommand,
}

#[derive(Subcommand)]
pub enum ProcessCommand {
    /// List process types
    List {
        /// Include retired process types
        #[arg(long)]
        all: bool,
    },
    /// Show a process type with its current templates
    Show {
        /// Process type id or name
        id: String,
        /// Show a specific version instead of the current one
        #[arg(long)]
        version: Option<u32>,
    },
    /// Define a new process type from a TOML file
    Define { file: PathBuf },
    /// Publish a new version of a process type from a TOML file
    Revise { id: String, file: PathBuf },
    /// Retire a process type; existing instances are kept
    Retire { id: String },
}

pub async fn handle(command: ProcessCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    let actor = ctx.actor.clone();
    match command {
        ProcessCommand::List { all } => {
            let mut process_types = expect_response!(
                client.send(Request::ListProcessTypes).await?,
                ProcessTypes { process_types }
            );
            if !all {
                process_types.retain(|p| p.retired_at.is_none());
            }
            emit(&process_types, ctx.format, |types| {
                if types.is_empty() {
                    println!("No process types");
                    return;
                }
                println!("{:<24} {:<28} {:>7} {:>9}", "ID", "NAME", "VERSION", "TEMPLATES");
                for process_type in types {
                    let (version, templates) = process_type
                        .current()
                        .map(|v| (v.version, v.active_templates().count()))
                        .unwrap_or_default();
                    let mut name = process_type.name().to_string();
                    if process_type.retired_at.is_some() {
                        name.push_str(" (retired)");
                    }
                    println!(
                        "{:<24} {:<28} {:>7} {:>9}",
                        process_type.id.as_str(),
                        name,
                        version,
                        templates
                    );
                }
            });
        }

        ProcessCommand::Show { id, version } => {
            let process_type = expect_response!(
                client.send(Request::GetProcessType { id }).await?,
                ProcessType { process_type }
            );
            if let Some(v) = version {
                if process_type.version(v).is_none() {
                    anyhow::bail!("{} has no version {}", process_type.id, v);
                }
            }
            emit(&process_type, ctx.format, |p| print_process_type(p, version));
        }

        ProcessCommand::Define { file } => {
            let spec = read_spec(&file)?;
            let process_type = expect_response!(
                client.send(Request::DefineProcessType { spec, actor }).await?,
                ProcessType { process_type }
            );
            emit(&process_type, ctx.format, |p| {
                println!("Defined {} ({})", p.name(), p.id)
            });
        }

        ProcessCommand::Revise { id, file } => {
            let spec = read_spec(&file)?;
            let process_type = expect_response!(
                client
                    .send(Request::ReviseProcessType { id, spec, actor })
                    .await?,
                ProcessType { process_type }
            );
            emit(&process_type, ctx.format, |p| {
                let version = p.current().map(|v| v.version).unwrap_or_default();
                println!("Revised {} to version {}", p.name(), version)
            });
        }

        ProcessCommand::Retire { id } => {
            let process_type = expect_response!(
                client.send(Request::RetireProcessType { id, actor }).await?,
                ProcessType { process_type }
            );
            emit(&process_type, ctx.format, |p| println!("Retired {}", p.name()));
        }
    }
    Ok(())
}

fn read_spec(path: &Path) -> Result<ProcessSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid process file {}", path.display()))
}

fn print_process_type(process_type: &ProcessType, version: Option<u32>) {
    let shown = match version {
        Some(v) => process_type.version(v),
        None => process_type.current(),
    };
    let Some(shown) = shown else {
        println!("{} has no versions", process_type.id);
        return;
    };

    println!("Process: {} ({})", shown.name, process_type.id);
    println!(
        "  Version: {} of {}",
        shown.version,
        process_type.versions.len()
    );
    println!("  Created: {}", timestamp(&process_type.created_at));
    if let Some(retired) = &process_type.retired_at {
        println!("  Retired: {}", timestamp(retired));
    }
    if let Some(description) = &shown.description {
        println!("  Description: {}", description);
    }
    let recurrence = &shown.recurrence;
    println!("  Anchor day: {}", recurrence.anchor_day.unwrap_or(1));
    if let Some(starts) = recurrence.starts {
        println!("  Starts: {}", starts);
    }
    if let Some(until) = recurrence.until {
        println!("  Until: {}", until);
    }
    if !shown.scripts.is_empty() {
        let scripts: Vec<&str> = shown.scripts.iter().map(|s| s.0.as_str()).collect();
        println!("  Scripts: {}", scripts.join(", "));
    }

    println!("  Templates:");
    for (position, template) in shown.templates.iter().enumerate() {
        let mut flags = Vec::new();
        if !template.required {
            flags.push("optional".to_string());
        }
        if !template.active {
            flags.push("inactive".to_string());
        }
        if let Some(status) = &template.default_status {
            flags.push(format!("starts in {}", status));
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "    {}. {} ({}){}",
            position + 1,
            template.title,
            template.id,
            flags
        );
    }
}
