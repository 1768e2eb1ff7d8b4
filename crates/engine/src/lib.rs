// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Recurring process instantiation engine

mod archive;
mod audit;
mod catalog;
mod engine;
mod error;
mod journal;
mod lifecycle;
mod locks;
mod notify;
mod registry;
mod scheduler;

#[cfg(test)]
mod test_helpers;

pub use archive::{
    ArchiveTree, CloseReport, MonthNode, MonthSummary, PeriodInfo, ProcessNode, SearchHit,
    SearchScope, Totals, YearNode, YearSummary,
};
pub use catalog::DEFAULT_WORKFLOW;
pub use engine::{Engine, EngineStats, AUDIT_FILE, WAL_FILE};
pub use error::{EngineError, ErrorKind};
pub use lifecycle::InstanceQuery;
pub use locks::KeyedLocks;
pub use notify::{NotificationHub, Subscriber};
pub use registry::SyncOutcome;
pub use scheduler::{GenerationOutcome, GenerationReport, ProcessGeneration};
pub use wfm_storage::ChainReport;
