// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit recorder
//!
//! Thin synchronized wrapper over [`AuditLog`]. Every write is fsync'd
//! before returning, so callers can treat a successful `record` as durable.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use wfm_core::settings::AuditSettings;
use wfm_core::{ActionKind, Actor, AuditDraft, AuditEntry, AuditFilter, AuditPage, EntityKind};
use wfm_storage::{AuditLog, ChainReport};

/// A batch that failed after some of its entries were durably written
pub struct PartialBatch {
    pub written: Vec<AuditEntry>,
    pub error: EngineError,
}

pub struct AuditRecorder {
    log: Mutex<AuditLog>,
    settings: AuditSettings,
}

impl AuditRecorder {
    pub fn new(log: AuditLog, settings: AuditSettings) -> Self {
        Self {
            log: Mutex::new(log),
            settings,
        }
    }

    pub fn record(&self, draft: AuditDraft, at: DateTime<Utc>) -> Result<AuditEntry, EngineError> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.append(draft, at).map_err(EngineError::AuditWrite)
    }

    /// Record several drafts in order; stops at the first failure and
    /// hands back whatever was already written
    pub fn record_all(
        &self,
        drafts: Vec<AuditDraft>,
        at: DateTime<Utc>,
    ) -> Result<Vec<AuditEntry>, PartialBatch> {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let mut written = Vec::with_capacity(drafts.len());
        for draft in drafts {
            match log.append(draft, at) {
                Ok(entry) => written.push(entry),
                Err(e) => {
                    return Err(PartialBatch {
                        written,
                        error: EngineError::AuditWrite(e),
                    })
                }
            }
        }
        Ok(written)
    }

    #[cfg(test)]
    pub(crate) fn fail_writes_after(&self, n: usize) {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .fail_writes_after(n);
    }

    /// Newest-first page; the page size is clamped to the configured maximum
    pub fn query(&self, filter: &AuditFilter) -> AuditPage {
        let limit = self.settings.page_limit(filter.limit);
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .query(filter, limit)
    }

    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .action_kinds()
    }

    pub fn entity_kinds(&self) -> Vec<EntityKind> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entity_kinds()
    }

    pub fn count_for(&self, entity_id: &str) -> usize {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries_for(entity_id)
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn verify(&self) -> Result<ChainReport, EngineError> {
        self.log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .verify()
            .map_err(EngineError::AuditWrite)
    }

    /// Apply the retention policy; returns the number of entries removed
    pub fn prune(&self, actor: &Actor, now: DateTime<Utc>) -> Result<usize, EngineError> {
        if self.settings.retention_days == 0 {
            return Ok(0);
        }
        // A window reaching past the start of representable time keeps everything
        let Some(cutoff) = chrono::Duration::try_days(i64::from(self.settings.retention_days))
            .and_then(|window| now.checked_sub_signed(window))
        else {
            return Ok(0);
        };
        let removed = self
            .log
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .prune(cutoff, actor, now)
            .map_err(EngineError::AuditWrite)?;
        if removed > 0 {
            tracing::info!(removed, %cutoff, "pruned audit entries");
        }
        Ok(removed)
    }
}
