// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `wfm watch`: follow engine events as they happen

use anyhow::Result;
use clap::Args;
use wfm_core::EventPattern;

use super::Context;
use crate::client::DaemonClient;
use crate::output::OutputFormat;

#[derive(Args)]
pub struct WatchArgs {
    /// Event patterns, e.g. `task:status` or `task:**` (default: everything)
    pub patterns: Vec<String>,
}

pub async fn handle(args: WatchArgs, client: &DaemonClient, ctx: &Context) -> Result<()> {
    let patterns: Vec<EventPattern> = if args.patterns.is_empty() {
        vec![EventPattern::new("task:**"), EventPattern::new("period:**")]
    } else {
        args.patterns.iter().map(|p| EventPattern::new(p)).collect()
    };

    let mut stream = client.subscribe(patterns).await?;
    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event? else {
                    eprintln!("Daemon closed the stream");
                    break;
                };
                match ctx.format {
                    OutputFormat::Text => println!("{:<20} {}", event.name(), event.summary()),
                    OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
