// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine facade
//!
//! [`Engine`] is a cheap, cloneable handle. Its operations are split across
//! modules by component (scheduler, lifecycle, archive, catalog, registry);
//! this module holds the shared state and the read-only queries.
//!
//! Lock order, outermost first: admin, period gate, instance, next-period
//! gate, generation lock. The period gate is taken shared by mutations on a
//! period and exclusively by `close_period`.

use crate::archive::ArchiveCache;
use crate::audit::AuditRecorder;
use crate::error::EngineError;
use crate::journal::Journal;
use crate::locks::KeyedLocks;
use crate::notify::{NotificationHub, Subscriber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use wfm_core::{
    ActionKind, Actor, AuditFilter, AuditPage, Clock, EntityKind, Event, EventPattern, IdGen,
    InstanceId, Period, ProcessTypeId, Settings,
};
use wfm_storage::{AuditLog, ChainReport, MaterializedState, Resolve, Wal};

pub const WAL_FILE: &str = "state.wal";
pub const AUDIT_FILE: &str = "audit.jsonl";

pub(crate) struct Inner<C, I> {
    pub(crate) journal: Journal,
    pub(crate) clock: C,
    pub(crate) ids: I,
    pub(crate) settings: Settings,
    pub(crate) hub: NotificationHub,
    /// Held exclusively by catalog and registry edits
    pub(crate) admin: tokio::sync::RwLock<()>,
    pub(crate) period_gates: KeyedLocks<Period>,
    pub(crate) instance_locks: KeyedLocks<InstanceId>,
    pub(crate) gen_locks: KeyedLocks<(ProcessTypeId, Period)>,
    pub(crate) archive: ArchiveCache,
}

/// Counts for the daemon status endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub current_period: Period,
    pub statuses: usize,
    pub process_types: usize,
    pub instances: usize,
    pub open_instances: usize,
    pub closed_periods: usize,
    pub audit_entries: usize,
    pub subscribers: usize,
}

pub struct Engine<C: Clock, I: IdGen> {
    pub(crate) inner: Arc<Inner<C, I>>,
}

impl<C: Clock, I: IdGen> Clone for Engine<C, I> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Open the engine over `state_dir`, replaying the WAL
    pub fn open(state_dir: &Path, settings: Settings, clock: C, ids: I) -> Result<Self, EngineError> {
        let wal_path = state_dir.join(WAL_FILE);
        let ops = Wal::replay(&wal_path)?;
        let state = MaterializedState::from_ops(&ops);
        let wal = Wal::open(&wal_path)?;
        let log = AuditLog::open(&state_dir.join(AUDIT_FILE)).map_err(EngineError::AuditWrite)?;

        tracing::info!(
            operations = ops.len(),
            instances = state.instances.len(),
            audit_entries = log.len(),
            "engine state recovered"
        );

        let audit = AuditRecorder::new(log, settings.audit.clone());
        let hub = NotificationHub::new(settings.notify.buffer);
        Ok(Self {
            inner: Arc::new(Inner {
                journal: Journal::new(wal, state, audit),
                clock,
                ids,
                settings,
                hub,
                admin: tokio::sync::RwLock::new(()),
                period_gates: KeyedLocks::new(),
                instance_locks: KeyedLocks::new(),
                gen_locks: KeyedLocks::new(),
                archive: ArchiveCache::new(),
            }),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// The period containing the clock's current time
    pub fn current_period(&self) -> Period {
        Period::containing(self.now())
    }

    pub(crate) fn next_id(&self) -> String {
        self.inner.ids.next()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        self.inner.journal.read(f)
    }

    pub(crate) fn publish(&self, event: Event) {
        self.inner.hub.publish(event);
    }

    /// Subscribe to live events matching `patterns` (all when empty)
    pub fn subscribe(&self, patterns: Vec<EventPattern>) -> Subscriber {
        self.inner.hub.subscribe(patterns)
    }

    pub fn stats(&self) -> EngineStats {
        let current_period = self.current_period();
        let mut stats = self.read(|state| EngineStats {
            current_period,
            statuses: state.statuses.len(),
            process_types: state.process_types.len(),
            instances: state.instances.len(),
            open_instances: state.instances.values().filter(|i| !i.is_settled()).count(),
            closed_periods: state.closed_periods().count(),
            audit_entries: 0,
            subscribers: 0,
        });
        stats.audit_entries = self.inner.journal.audit().len();
        stats.subscribers = self.inner.hub.subscriber_count();
        stats
    }

    pub fn query_audit(&self, filter: &AuditFilter) -> AuditPage {
        self.inner.journal.audit().query(filter)
    }

    pub fn audit_action_kinds(&self) -> Vec<ActionKind> {
        self.inner.journal.audit().action_kinds()
    }

    pub fn audit_entity_kinds(&self) -> Vec<EntityKind> {
        self.inner.journal.audit().entity_kinds()
    }

    /// Number of audit entries targeting an entity
    pub fn audit_count_for(&self, entity_id: &str) -> usize {
        self.inner.journal.audit().count_for(entity_id)
    }

    pub fn verify_audit(&self) -> Result<ChainReport, EngineError> {
        self.inner.journal.audit().verify()
    }

    /// Drop audit entries past the retention window
    pub fn prune_audit(&self, actor: &Actor) -> Result<usize, EngineError> {
        self.inner.journal.audit().prune(actor, self.now())
    }
}

/// Turn a resolution into a found value or a caller-facing error
pub(crate) fn resolved<T>(
    resolution: Resolve<T>,
    kind: &'static str,
    reference: &str,
) -> Result<T, EngineError> {
    match resolution {
        Resolve::Found(value) => Ok(value),
        Resolve::Missing => Err(EngineError::not_found(kind, reference)),
        Resolve::Ambiguous(n) => Err(EngineError::Validation(format!(
            "ambiguous {} reference '{}' matches {} entries",
            kind, reference, n
        ))),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
