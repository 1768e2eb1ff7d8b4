// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for CLI commands

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use wfm_core::TaskInstance;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Print `value` as pretty JSON, or hand it to `text` for the human format
pub fn emit<T: Serialize>(value: &T, format: OutputFormat, text: impl FnOnce(&T)) {
    match format {
        OutputFormat::Text => text(value),
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(value) {
                println!("{}", json);
            }
        }
    }
}

/// Cut `text` to `width` characters, marking the cut with `~`
pub fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('~');
    cut
}

pub fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn optional_timestamp(at: Option<&DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), timestamp)
}

/// One row per instance, with a header
pub fn instance_table(instances: &[TaskInstance]) {
    if instances.is_empty() {
        println!("No tasks");
        return;
    }
    println!(
        "{:<12} {:<8} {:<12} {:<24} TITLE",
        "ID", "PERIOD", "STATUS", "PROCESS"
    );
    for instance in instances {
        let mut title = instance.title.clone();
        if !instance.required {
            title.push_str(" (optional)");
        }
        if instance.carried_over_to.is_some() {
            title.push_str(" [carried]");
        }
        println!(
            "{:<12} {:<8} {:<12} {:<24} {}",
            truncate(instance.id.as_str(), 12),
            instance.period(),
            truncate(instance.status.as_str(), 12),
            truncate(instance.key.process_type_id.as_str(), 24),
            title
        );
    }
}

/// Full detail view of one instance
pub fn instance_detail(instance: &TaskInstance) {
    println!("Task: {}", instance.id);
    println!("  Title: {}", instance.title);
    println!("  Process: {} (v{})", instance.key.process_type_id, instance.process_version);
    println!("  Period: {}", instance.period());
    println!("  Status: {}", instance.status);
    println!("  Required: {}", if instance.required { "yes" } else { "no" });
    println!("  Created: {}", timestamp(&instance.created_at));
    println!("  Started: {}", optional_timestamp(instance.started_at.as_ref()));
    println!("  Completed: {}", optional_timestamp(instance.completed_at.as_ref()));
    if let Some(script) = &instance.script {
        println!("  Script: {}", script.0);
    }
    if let Some(from) = &instance.carried_from {
        println!("  Carried from: {}", from);
    }
    if let Some(to) = &instance.carried_over_to {
        println!("  Carried to: {}", to);
    }
    if !instance.guide.is_empty() {
        println!("  Guide:");
        for line in instance.guide.lines() {
            println!("    {}", line);
        }
    }

    let comments: Vec<_> = instance.live_comments().collect();
    if !comments.is_empty() {
        println!("  Comments:");
        for comment in comments {
            println!(
                "    [{}] {} {}: {}",
                comment.id,
                timestamp(&comment.created_at),
                comment.author,
                comment.body
            );
        }
    }
    if !instance.attachments.is_empty() {
        println!("  Attachments:");
        for attachment in &instance.attachments {
            println!(
                "    [{}] {} ({} bytes)",
                attachment.id, attachment.filename, attachment.size
            );
        }
    }
    if !instance.emails.is_empty() {
        println!("  Emails:");
        for email in &instance.emails {
            println!(
                "    [{}] {}",
                email.id,
                email.subject.as_deref().unwrap_or("(no subject)")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("Payroll", 12), "Payroll");
    }

    #[test]
    fn truncate_marks_the_cut() {
        assert_eq!(truncate("Monthly Report", 8), "Monthly~");
        assert_eq!(truncate("Monthly Report", 8).chars().count(), 8);
    }

    #[test]
    fn missing_timestamps_render_as_dash() {
        assert_eq!(optional_timestamp(None), "-");
    }
}
