// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Commit path shared by every mutation
//!
//! A commit writes the audit entries first (fsync'd), then the WAL
//! operation (fsync'd), then applies the operation to the in-memory state.
//! An audit failure aborts before anything else is touched. When entries
//! were already written (a WAL failure, or a batch that failed partway)
//! a compensating `mutation_aborted` entry is recorded so the trail never
//! claims an uncommitted change.

use crate::audit::AuditRecorder;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, RwLock};
use wfm_core::{ActionKind, Actor, AuditDraft, AuditEntry, EntityKind, EntityRef, Operation};
use wfm_storage::{MaterializedState, Wal};

pub struct Journal {
    wal: Mutex<Wal>,
    state: RwLock<MaterializedState>,
    audit: AuditRecorder,
}

impl Journal {
    pub fn new(wal: Wal, state: MaterializedState, audit: AuditRecorder) -> Self {
        Self {
            wal: Mutex::new(wal),
            state: RwLock::new(state),
            audit,
        }
    }

    pub fn audit(&self) -> &AuditRecorder {
        &self.audit
    }

    /// Run `f` against a consistent view of the state
    pub fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    pub fn commit(
        &self,
        drafts: Vec<AuditDraft>,
        op: Operation,
        at: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        let mut wal = self.wal.lock().unwrap_or_else(|e| e.into_inner());
        self.commit_locked(&mut wal, drafts, op, at)
    }

    /// Commit only if `plan` (evaluated under the commit lock) returns a
    /// mutation. Used for check-then-act transitions that must happen once.
    pub fn commit_if(
        &self,
        at: DateTime<Utc>,
        plan: impl FnOnce(&MaterializedState) -> Option<(Vec<AuditDraft>, Operation)>,
    ) -> Result<Option<Vec<AuditEntry>>, EngineError> {
        let mut wal = self.wal.lock().unwrap_or_else(|e| e.into_inner());
        let Some((drafts, op)) = self.read(plan) else {
            return Ok(None);
        };
        self.commit_locked(&mut wal, drafts, op, at).map(Some)
    }

    fn commit_locked(
        &self,
        wal: &mut Wal,
        drafts: Vec<AuditDraft>,
        op: Operation,
        at: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        let entries = match self.audit.record_all(drafts, at) {
            Ok(entries) => entries,
            Err(partial) => {
                tracing::error!(
                    op = op.name(),
                    error = %partial.error,
                    written = partial.written.len(),
                    "audit write failed"
                );
                if !partial.written.is_empty() {
                    self.record_abort(&partial.written, &op, &partial.error, at);
                }
                return Err(partial.error);
            }
        };

        if let Err(e) = wal.append(&op) {
            tracing::error!(op = op.name(), error = %e, "WAL append failed after audit write");
            self.record_abort(&entries, &op, &e, at);
            return Err(e.into());
        }

        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .apply(&op);
        tracing::debug!(op = op.name(), audit_entries = entries.len(), "committed");
        Ok(entries)
    }

    /// Mark `written` as belonging to a mutation that never committed
    fn record_abort(
        &self,
        written: &[AuditEntry],
        op: &Operation,
        error: &dyn std::fmt::Display,
        at: DateTime<Utc>,
    ) {
        let first = written.first().map(|entry| entry.sequence);
        let last = written.last().map(|entry| entry.sequence);
        let mut abort = AuditDraft::new(
            &Actor::system(),
            ActionKind::MutationAborted,
            EntityRef::new(
                EntityKind::Audit,
                first.map(|s| s.to_string()).unwrap_or_default(),
            ),
        );
        abort.after = Some(serde_json::json!({
            "aborted_sequence": first,
            "through_sequence": last,
            "operation": op.name(),
            "error": error.to_string(),
        }));
        if let Err(audit_err) = self.audit.record(abort, at) {
            tracing::error!(error = %audit_err, "failed to record aborted mutation");
        }
    }

    #[cfg(test)]
    pub(crate) fn fail_next_wal_append(&self) {
        self.wal
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_next_append();
    }
}
