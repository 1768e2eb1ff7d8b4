// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfm-storage: Durable state for the workflow manager
//!
//! - [`Wal`]: checksummed JSONL write-ahead log of [`wfm_core::Operation`]s
//! - [`MaterializedState`]: in-memory state rebuilt by replaying the WAL
//! - [`AuditLog`]: append-only, hash-chained audit trail

mod audit_log;
mod state;
mod wal;

pub use audit_log::{AuditLog, AuditLogError, ChainReport};
pub use state::{MaterializedState, Resolve};
pub use wal::{Wal, WalError};
