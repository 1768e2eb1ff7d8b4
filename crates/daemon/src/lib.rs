// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfm-daemon: wire protocol shared by `wfmd` and the `wfm` CLI

pub mod protocol;

pub use protocol::{ProtocolError, Request, Response, DEFAULT_TIMEOUT, PROTOCOL_VERSION};
