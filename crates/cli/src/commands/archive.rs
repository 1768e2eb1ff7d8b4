// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm archive`: browse and search closed periods

use anyhow::Result;
use clap::{Args, Subcommand};
use wfm_core::Period;
use wfm_daemon::Request;
use wfm_engine::{ArchiveTree, SearchHit, SearchScope, Totals, YearSummary};

use super::{expect_response, Context};
use crate::client::{ClientError, DaemonClient};
use crate::output::{emit, truncate};

#[derive(Args)]
pub struct ArchiveArgs {
    #[command(subcommand)]
    pub command: ArchiveCommand,
}

#[derive(Subcommand)]
pub enum ArchiveCommand {
    /// Year > month > process tree of archived tasks
    Browse {
        #[arg(long)]
        year: Option<i32>,
        /// Month number, 1-12 (requires --year)
        #[arg(long, requires = "year", value_parser = clap::value_parser!(u32).range(1..=12))]
        month: Option<u32>,
        /// Process type id or name
        #[arg(long)]
        process: Option<String>,
    },
    /// Per-year and per-month totals
    Summary,
    /// Full-text search over archived tasks
    Search {
        query: String,
        /// Also search the current period
        #[arg(long)]
        include_open: bool,
        #[arg(long)]
        year: Option<i32>,
        /// Process type id or name
        #[arg(long)]
        process: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Drop cached archive data for a period
    Invalidate { period: Period },
}

pub async fn handle(command: ArchiveCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    match command {
        ArchiveCommand::Browse {
            year,
            month,
            process,
        } => {
            let tree = expect_response!(
                client
                    .send(Request::Browse {
                        year,
                        month,
                        process_type: process,
                    })
                    .await?,
                Archive { tree }
            );
            emit(&tree, ctx.format, print_tree);
        }

        ArchiveCommand::Summary => {
            let years = expect_response!(
                client.send(Request::ArchiveSummaries).await?,
                Summaries { years }
            );
            emit(&years, ctx.format, |y| print_summaries(y));
        }

        ArchiveCommand::Search {
            query,
            include_open,
            year,
            process,
            limit,
        } => {
            let scope = SearchScope {
                include_open: include_open.then_some(true),
                year,
                process_type: process,
                limit,
            };
            let hits = expect_response!(
                client.send(Request::Search { query, scope }).await?,
                SearchResults { hits }
            );
            emit(&hits, ctx.format, |h| print_hits(h));
        }

        ArchiveCommand::Invalidate { period } => {
            match client.send(Request::InvalidateArchive { period }).await? {
                wfm_daemon::Response::Ok => {}
                _ => return Err(ClientError::UnexpectedResponse.into()),
            }
            emit(&period, ctx.format, |p| {
                println!("Invalidated archive cache for {}", p)
            });
        }
    }
    Ok(())
}

fn totals_label(totals: &Totals) -> String {
    let mut label = format!("{}/{} done", totals.total_completed, totals.total_tasks);
    if totals.carried_over > 0 {
        label.push_str(&format!(", {} carried", totals.carried_over));
    }
    label
}

fn print_tree(tree: &ArchiveTree) {
    if tree.years.is_empty() {
        println!("Archive is empty");
        return;
    }
    for year in &tree.years {
        println!("{} ({})", year.year, totals_label(&year.totals));
        for month in &year.months {
            println!("  {} ({})", month.period, totals_label(&month.totals));
            for process in &month.processes {
                println!("    {} ({})", process.name, totals_label(&process.totals));
                for instance in &process.instances {
                    let mark = if instance.is_completed() { "x" } else { " " };
                    println!("      [{}] {} {}", mark, instance.id, instance.title);
                }
            }
        }
    }
}

fn print_summaries(years: &[YearSummary]) {
    if years.is_empty() {
        println!("Archive is empty");
        return;
    }
    for year in years {
        println!("{}: {}", year.year, totals_label(&year.totals));
        for month in &year.months {
            println!("  {}: {}", month.period, totals_label(&month.totals));
        }
    }
}

fn print_hits(hits: &[SearchHit]) {
    if hits.is_empty() {
        println!("No matches");
        return;
    }
    println!("{:>5} {:<12} {:<8} {:<24} TITLE", "SCORE", "ID", "PERIOD", "PROCESS");
    for hit in hits {
        println!(
            "{:>5} {:<12} {:<8} {:<24} {}",
            hit.score,
            truncate(hit.instance.id.as_str(), 12),
            hit.instance.period().to_string(),
            truncate(&hit.process_name, 24),
            hit.instance.title
        );
    }
}
