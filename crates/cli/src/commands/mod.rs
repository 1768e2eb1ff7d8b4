// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod archive;
pub mod audit;
pub mod daemon;
pub mod period;
pub mod process;
pub mod status;
pub mod tasks;
pub mod watch;

use wfm_core::Actor;

use crate::output::OutputFormat;

/// Settings shared by every daemon-backed command
pub struct Context {
    pub actor: Actor,
    pub format: OutputFormat,
}

/// Unwrap the one response variant a request can produce
macro_rules! expect_response {
    ($response:expr, $variant:ident { $($field:ident),+ }) => {
        match $response {
            wfm_daemon::Response::$variant { $($field),+ } => ($($field),+),
            _ => return Err(crate::client::ClientError::UnexpectedResponse.into()),
        }
    };
}

pub(crate) use expect_response;
