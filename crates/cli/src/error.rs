// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! User-facing error display with context and suggestions

use std::fmt;

use wfm_engine::ErrorKind;

use crate::client::ClientError;

/// Error with context and recovery suggestions
#[derive(Debug)]
pub struct WfmError {
    pub message: String,
    pub context: Vec<String>,
    pub suggestions: Vec<String>,
}

impl WfmError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context.push(ctx.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Attach hints for the failures users can act on
    pub fn from_client(err: &ClientError) -> Self {
        let base = WfmError::new(err.to_string());
        match err {
            ClientError::DaemonNotRunning => {
                base.with_suggestion("Start it with: wfm daemon start")
            }
            ClientError::DaemonStartFailed(_) | ClientError::DaemonStartTimeout => base
                .with_suggestion("Check the daemon log: wfm daemon logs")
                .with_suggestion("Validate .wfm/settings.toml and .wfm/processes/*.toml"),
            ClientError::NoProjectRoot => base
                .with_context("No .wfm directory was found above the current directory")
                .with_suggestion("Run from a project directory or pass --repo <path>"),
            ClientError::Rejected { kind, .. } => match kind {
                ErrorKind::NotFound => base
                    .with_suggestion("List tasks: wfm tasks list")
                    .with_suggestion("List statuses: wfm status list"),
                ErrorKind::Conflict => base
                    .with_context("Another change got there first or the target is closed")
                    .with_suggestion("Reload the item and try again"),
                ErrorKind::AuditWrite | ErrorKind::Storage => base
                    .with_context("The change was not applied")
                    .with_suggestion("Check disk space and the daemon log: wfm daemon logs"),
                ErrorKind::Validation | ErrorKind::Internal => base,
            },
            _ => base,
        }
    }
}

impl fmt::Display for WfmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error: {}", self.message)?;

        if !self.context.is_empty() {
            writeln!(f)?;
            for ctx in &self.context {
                writeln!(f, "  -> {}", ctx)?;
            }
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            writeln!(f, "suggestions:")?;
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for WfmError {}

/// Render any command error, enriching daemon errors with suggestions
pub fn render(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ClientError>() {
        Some(client_err) => WfmError::from_client(client_err).to_string(),
        None => {
            let mut out = WfmError::new(err.to_string());
            for cause in err.chain().skip(1) {
                out = out.with_context(cause.to_string());
            }
            out.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_context_and_suggestions() {
        let err = WfmError::new("Something went wrong")
            .with_context("First context")
            .with_suggestion("Try this")
            .with_suggestion("Or this");

        let output = err.to_string();
        assert!(output.contains("error: Something went wrong"));
        assert!(output.contains("-> First context"));
        assert!(output.contains("1. Try this"));
        assert!(output.contains("2. Or this"));
    }

    #[test]
    fn not_running_suggests_start() {
        let output = WfmError::from_client(&ClientError::DaemonNotRunning).to_string();
        assert!(output.contains("wfm daemon start"));
    }

    #[test]
    fn rejected_conflict_keeps_daemon_message() {
        let err = ClientError::Rejected {
            kind: ErrorKind::Conflict,
            message: "period 2026-02 is closed".to_string(),
        };
        let output = WfmError::from_client(&err).to_string();
        assert!(output.contains("error: period 2026-02 is closed"));
        assert!(output.contains("try again"));
    }

    #[test]
    fn render_walks_anyhow_chain() {
        let err = anyhow::anyhow!("bad toml").context("invalid process file payroll.toml");
        let output = render(&err);
        assert!(output.contains("error: invalid process file payroll.toml"));
        assert!(output.contains("-> bad toml"));
    }
}
