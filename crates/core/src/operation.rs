// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operations for the write-ahead log
//!
//! Each committed mutation is exactly one operation. Operations carry full
//! records rather than deltas so replay never re-derives timestamps or ids.

use crate::id::{ProcessTypeId, StatusId};
use crate::instance::TaskInstance;
use crate::period::Period;
use crate::process::ProcessVersion;
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operations that can be persisted to the WAL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create or replace a catalog status
    StatusUpsert { status: Status },

    /// Assign order indexes from an ordered id list
    StatusesReordered { order: Vec<StatusId> },

    StatusDeleted { id: StatusId },

    /// Append a version to a process type, creating it when absent
    ProcessTypeVersioned {
        process_type_id: ProcessTypeId,
        created_at: DateTime<Utc>,
        version: ProcessVersion,
    },

    ProcessTypeRetired {
        id: ProcessTypeId,
        at: DateTime<Utc>,
    },

    /// Missing instances created for one (process type, period)
    InstancesGenerated {
        period: Period,
        process_type_id: ProcessTypeId,
        at: DateTime<Utc>,
        instances: Vec<TaskInstance>,
    },

    /// Full snapshot of an instance after a lifecycle mutation
    InstanceUpdated { instance: TaskInstance },

    /// Link an unfinished instance to its successor in the next period.
    /// `to` is inserted when its key is new, otherwise it replaces the
    /// existing successor.
    CarriedOver { from: TaskInstance, to: TaskInstance },

    PeriodMarkedEligible { period: Period },

    PeriodClosed {
        period: Period,
        at: DateTime<Utc>,
    },
}

impl Operation {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Operation::StatusUpsert { .. } => "status_upsert",
            Operation::StatusesReordered { .. } => "statuses_reordered",
            Operation::StatusDeleted { .. } => "status_deleted",
            Operation::ProcessTypeVersioned { .. } => "process_type_versioned",
            Operation::ProcessTypeRetired { .. } => "process_type_retired",
            Operation::InstancesGenerated { .. } => "instances_generated",
            Operation::InstanceUpdated { .. } => "instance_updated",
            Operation::CarriedOver { .. } => "carried_over",
            Operation::PeriodMarkedEligible { .. } => "period_marked_eligible",
            Operation::PeriodClosed { .. } => "period_closed",
        }
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
