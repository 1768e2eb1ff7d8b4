// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm period`: generation and closing of monthly periods

use anyhow::Result;
use clap::{Args, Subcommand};
use wfm_core::{Period, PeriodState};
use wfm_daemon::Request;
use wfm_engine::{GenerationOutcome, GenerationReport};

use super::{expect_response, Context};
use crate::client::DaemonClient;
use crate::output::{emit, optional_timestamp};

#[derive(Args)]
pub struct PeriodArgs {
    #[command(subcommand)]
    pub command: PeriodCommand,
}

#[derive(Subcommand)]
pub enum PeriodCommand {
    /// List known periods
    List,
    /// Generate task instances for a period (defaults to the current one)
    Generate { period: Option<Period> },
    /// Close a period, archiving its instances
    Close { period: Period },
}

pub async fn handle(command: PeriodCommand, client: &DaemonClient, ctx: &Context) -> Result<()> {
    match command {
        PeriodCommand::List => {
            let periods = expect_response!(
                client.send(Request::ListPeriods).await?,
                Periods { periods }
            );
            emit(&periods, ctx.format, |periods| {
                if periods.is_empty() {
                    println!("No periods");
                    return;
                }
                println!(
                    "{:<8} {:<9} {:>6} {:>10} {:<16} CLOSED",
                    "PERIOD", "STATE", "TASKS", "UNFINISHED", "GENERATED"
                );
                for info in periods {
                    println!(
                        "{:<8} {:<9} {:>6} {:>10} {:<16} {}",
                        info.period.to_string(),
                        state_label(info.state),
                        info.instances,
                        info.unfinished,
                        optional_timestamp(info.generated_at.as_ref()),
                        optional_timestamp(info.closed_at.as_ref())
                    );
                }
            });
        }

        PeriodCommand::Generate { period } => {
            let report = expect_response!(
                client
                    .send(Request::Generate {
                        period,
                        actor: ctx.actor.clone(),
                    })
                    .await?,
                Generation { report }
            );
            emit(&report, ctx.format, print_generation);
            let failed = report.failures().count();
            if failed > 0 {
                anyhow::bail!("{} process type(s) failed to generate", failed);
            }
        }

        PeriodCommand::Close { period } => {
            let report = expect_response!(
                client
                    .send(Request::ClosePeriod {
                        period,
                        actor: ctx.actor.clone(),
                    })
                    .await?,
                Closed { report }
            );
            emit(&report, ctx.format, |r| {
                println!("Closed {}: {} task(s) archived", r.period, r.archived);
                if !r.carried_over.is_empty() {
                    println!("Carried over {} unfinished task(s):", r.carried_over.len());
                    for id in &r.carried_over {
                        println!("  {}", id);
                    }
                }
            });
        }
    }
    Ok(())
}

fn state_label(state: PeriodState) -> &'static str {
    match state {
        PeriodState::Open => "open",
        PeriodState::Eligible => "eligible",
        PeriodState::Closed => "closed",
    }
}

fn print_generation(report: &GenerationReport) {
    println!("Period {}: {} task(s) created", report.period, report.created());
    for result in &report.results {
        match &result.outcome {
            GenerationOutcome::Generated { created, existing } => println!(
                "  {:<24} created {}, existing {}",
                result.name, created, existing
            ),
            GenerationOutcome::Failed { kind, message } => {
                println!("  {:<24} failed ({:?}): {}", result.name, kind, message)
            }
        }
    }
    if let Some(previous) = report.marked_eligible {
        println!("Period {} is now eligible for closing", previous);
    }
}
