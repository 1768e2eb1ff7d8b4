// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm audit`: query and verify the audit trail

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use wfm_core::{ActionKind, AuditFilter, AuditPage, EntityKind};
use wfm_daemon::Request;

use super::{expect_response, Context};
use crate::client::DaemonClient;
use crate::output::{emit, timestamp};

#[derive(Args)]
pub struct AuditArgs {
    #[command(subcommand)]
    pub command: AuditCommand,
}

#[derive(Subcommand)]
pub enum AuditCommand {
    /// List audit entries, newest first
    List {
        #[arg(long)]
        actor: Option<String>,
        /// Entity id (instance, status, process type or period)
        #[arg(long)]
        entity: Option<String>,
        /// Entity kind, e.g. instance or status
        #[arg(long, value_parser = parse_entity_kind)]
        kind: Option<EntityKind>,
        /// Action, e.g. status_changed
        #[arg(long, value_parser = parse_action_kind)]
        action: Option<ActionKind>,
        /// RFC 3339 lower bound
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Action and entity kinds present in the trail
    Kinds,
    /// Check the hash chain
    Verify,
    /// Remove entries older than the retention window
    Prune,
}

fn parse_entity_kind(s: &str) -> Result<EntityKind, String> {
    s.parse()
}

fn parse_action_kind(s: &str) -> Result<ActionKind, String> {
    s.parse()
}

pub async fn handle(command: AuditCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    match command {
        AuditCommand::List {
            actor,
            entity,
            kind,
            action,
            since,
            until,
            offset,
            limit,
        } => {
            let filter = AuditFilter {
                actor,
                entity_id: entity,
                entity_kind: kind,
                action,
                since,
                until,
                offset,
                limit,
            };
            let page = expect_response!(
                client.send(Request::QueryAudit { filter }).await?,
                Audit { page }
            );
            emit(&page, ctx.format, print_entries);
        }

        AuditCommand::Kinds => {
            let (actions, entities) = expect_response!(
                client.send(Request::AuditKinds).await?,
                AuditKinds { actions, entities }
            );
            let kinds = serde_json::json!({ "actions": actions, "entities": entities });
            emit(&kinds, ctx.format, |_| {
                println!("Actions:");
                for action in &actions {
                    println!("  {}", action);
                }
                println!("Entities:");
                for entity in &entities {
                    println!("  {}", entity);
                }
            });
        }

        AuditCommand::Verify => {
            let report = expect_response!(
                client.send(Request::VerifyAudit).await?,
                AuditVerified { report }
            );
            emit(&report, ctx.format, |r| match r.first_broken {
                None => println!("Audit chain intact ({} entries)", r.entries),
                Some(sequence) => println!(
                    "Audit chain broken at entry {} ({} entries)",
                    sequence, r.entries
                ),
            });
            if !report.is_intact() {
                anyhow::bail!("audit chain verification failed");
            }
        }

        AuditCommand::Prune => {
            let removed = expect_response!(
                client
                    .send(Request::PruneAudit {
                        actor: ctx.actor.clone(),
                    })
                    .await?,
                Pruned { removed }
            );
            emit(&removed, ctx.format, |n| println!("Pruned {} entries", n));
        }
    }
    Ok(())
}

/// Text rendering of one page of entries
pub fn print_entries(page: &AuditPage) {
    if page.entries.is_empty() {
        println!("No audit entries");
        return;
    }
    for entry in &page.entries {
        println!(
            "{:>6} {} {:<12} {:<20} {}",
            entry.sequence,
            timestamp(&entry.at),
            entry.actor.0,
            entry.action.as_str(),
            entry.entity
        );
    }
    let shown = page.offset + page.entries.len();
    if shown < page.total {
        println!(
            "... {} of {} shown (use --offset {} for more)",
            shown, page.total, shown
        );
    }
}
