// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wfm-core: Domain model for the recurring workflow manager
//!
//! This crate provides:
//! - Calendar periods, statuses, process types and task templates
//! - Task instances with pure status-transition rules
//! - Lifecycle events, audit entry types and WAL operations
//! - Settings and process definition files

pub mod clock;
pub mod id;

pub mod audit;
pub mod event;
pub mod instance;
pub mod operation;
pub mod period;
pub mod process;
pub mod settings;
pub mod status;

pub use audit::{
    ActionKind, Actor, AuditDraft, AuditEntry, AuditFilter, AuditPage, EntityKind, EntityRef,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use event::{Event, EventPattern};
pub use id::{
    CommentId, IdGen, InstanceId, ProcessTypeId, SequentialIdGen, StatusId, TemplateId, UuidIdGen,
};
pub use instance::{
    AttachmentRef, Comment, EmailRef, InstanceError, InstanceKey, StatusChange, TaskInstance,
};
pub use operation::Operation;
pub use period::{Period, PeriodError, PeriodRecord, PeriodState};
pub use process::{
    ProcessDefinition, ProcessSpec, ProcessSpecError, ProcessType, ProcessVersion, Recurrence,
    ScriptRef, TaskTemplate, TemplateSpec,
};
pub use settings::{CarryOverPolicy, Settings, SettingsError};
pub use status::{Status, StatusPatch, StatusSpec};

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
