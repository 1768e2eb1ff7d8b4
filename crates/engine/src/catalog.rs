// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status workflow catalog administration

use crate::engine::{resolved, Engine};
use crate::error::EngineError;
use std::collections::HashSet;
use wfm_core::status::{is_valid_color, DEFAULT_COLOR};
use wfm_core::{
    ActionKind, Actor, AuditDraft, Clock, EntityKind, EntityRef, IdGen, Operation, Status,
    StatusId, StatusPatch, StatusSpec,
};

/// Workflow seeded into an empty catalog: (name, color, terminal)
pub const DEFAULT_WORKFLOW: &[(&str, &str, bool)] = &[
    ("Pending", "#6b7280", false),
    ("In Progress", "#3b82f6", false),
    ("Review", "#f59e0b", false),
    ("Done", "#22c55e", true),
];

/// Lowercase, dash-separated identifier derived from free text
pub(crate) fn slug(text: &str) -> String {
    let mut out = String::new();
    for c in text.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// `base`, or `base-2`, `base-3`... whichever is not taken
pub(crate) fn unique_slug(base: &str, taken: impl Fn(&str) -> bool) -> String {
    if !base.is_empty() && !taken(base) {
        return base.to_string();
    }
    let base = if base.is_empty() { "item" } else { base };
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

fn check_name(statuses: &[&Status], name: &str, except: Option<&StatusId>) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("status name must not be empty".to_string()));
    }
    let clash = statuses
        .iter()
        .any(|s| Some(&s.id) != except && s.name.eq_ignore_ascii_case(name.trim()));
    if clash {
        return Err(EngineError::Validation(format!(
            "status name already exists: {}",
            name.trim()
        )));
    }
    Ok(())
}

fn check_color(color: &str) -> Result<(), EngineError> {
    if is_valid_color(color) {
        Ok(())
    } else {
        Err(EngineError::Validation(format!("invalid color: {}", color)))
    }
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Statuses in catalog order
    pub fn list_statuses(&self) -> Vec<Status> {
        self.read(|state| state.sorted_statuses().into_iter().cloned().collect())
    }

    pub fn get_status(&self, reference: &str) -> Result<Status, EngineError> {
        self.read(|state| resolved(state.resolve_status(reference), "status", reference).cloned())
    }

    pub async fn create_status(&self, spec: StatusSpec, actor: &Actor) -> Result<Status, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();
        let color = spec.color.unwrap_or_else(|| DEFAULT_COLOR.to_string());
        check_color(&color)?;

        let status = self.read(|state| -> Result<Status, EngineError> {
            let statuses = state.sorted_statuses();
            check_name(&statuses, &spec.name, None)?;
            let order = spec
                .order
                .unwrap_or_else(|| statuses.iter().map(|s| s.order + 1).max().unwrap_or(0));
            let id = unique_slug(&slug(&spec.name), |c| {
                state.statuses.contains_key(&StatusId::new(c))
            });
            Ok(Status {
                id: StatusId::new(id),
                name: spec.name.trim().to_string(),
                color,
                order,
                terminal: spec.terminal,
                active: true,
                created_at: now,
            })
        })?;

        let draft = AuditDraft::new(
            actor,
            ActionKind::StatusCreated,
            EntityRef::new(EntityKind::Status, &status.id),
        )
        .after(&status);
        self.inner.journal.commit(
            vec![draft],
            Operation::StatusUpsert {
                status: status.clone(),
            },
            now,
        )?;
        tracing::info!(status = %status.id, name = %status.name, "status created");
        Ok(status)
    }

    /// Rename, recolor or change the terminal flag. The terminal flag is
    /// frozen while any instance is in the status, since flipping it would
    /// invalidate their completion timestamps.
    pub async fn update_status(
        &self,
        reference: &str,
        patch: StatusPatch,
        actor: &Actor,
    ) -> Result<Status, EngineError> {
        if patch.is_empty() {
            return Err(EngineError::Validation("nothing to update".to_string()));
        }
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let (before, after) = self.read(|state| -> Result<(Status, Status), EngineError> {
            let before = resolved(state.resolve_status(reference), "status", reference)?.clone();
            let mut after = before.clone();
            if let Some(name) = &patch.name {
                check_name(&state.sorted_statuses(), name, Some(&before.id))?;
                after.name = name.trim().to_string();
            }
            if let Some(color) = &patch.color {
                check_color(color)?;
                after.color = color.clone();
            }
            if let Some(terminal) = patch.terminal {
                if terminal != before.terminal {
                    let usage = state.status_usage(&before.id);
                    if usage > 0 {
                        return Err(EngineError::Conflict(format!(
                            "cannot change terminal flag of {}: {} instance(s) are in this status",
                            before.name, usage
                        )));
                    }
                }
                after.terminal = terminal;
            }
            Ok((before, after))
        })?;

        let draft = AuditDraft::new(
            actor,
            ActionKind::StatusUpdated,
            EntityRef::new(EntityKind::Status, &after.id),
        )
        .before(&before)
        .after(&after);
        self.inner.journal.commit(
            vec![draft],
            Operation::StatusUpsert {
                status: after.clone(),
            },
            now,
        )?;
        Ok(after)
    }

    /// Reorder the catalog; `order` must name every status exactly once
    pub async fn reorder_statuses(
        &self,
        order: &[String],
        actor: &Actor,
    ) -> Result<Vec<Status>, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let (before, ids) = self.read(|state| -> Result<(Vec<StatusId>, Vec<StatusId>), EngineError> {
            let mut ids = Vec::with_capacity(order.len());
            let mut seen = HashSet::new();
            for reference in order {
                let status = resolved(state.resolve_status(reference), "status", reference)?;
                if !seen.insert(status.id.clone()) {
                    return Err(EngineError::Validation(format!(
                        "status listed twice: {}",
                        status.name
                    )));
                }
                ids.push(status.id.clone());
            }
            if ids.len() != state.statuses.len() {
                return Err(EngineError::Validation(format!(
                    "order must list all {} statuses, got {}",
                    state.statuses.len(),
                    ids.len()
                )));
            }
            let before = state.sorted_statuses().iter().map(|s| s.id.clone()).collect();
            Ok((before, ids))
        })?;

        let draft = AuditDraft::new(
            actor,
            ActionKind::StatusReordered,
            EntityRef::new(EntityKind::Status, "*"),
        )
        .before(&before)
        .after(&ids);
        self.inner
            .journal
            .commit(vec![draft], Operation::StatusesReordered { order: ids }, now)?;
        Ok(self.list_statuses())
    }

    /// Soft-retire: the status stays on existing instances but can no longer
    /// be assigned or used for generation
    pub async fn retire_status(&self, reference: &str, actor: &Actor) -> Result<Status, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let before = self.read(|state| {
            resolved(state.resolve_status(reference), "status", reference).cloned()
        })?;
        if !before.active {
            return Err(EngineError::Conflict(format!(
                "status {} is already retired",
                before.name
            )));
        }
        let mut after = before.clone();
        after.active = false;

        let draft = AuditDraft::new(
            actor,
            ActionKind::StatusRetired,
            EntityRef::new(EntityKind::Status, &after.id),
        )
        .before(&before)
        .after(&after);
        self.inner.journal.commit(
            vec![draft],
            Operation::StatusUpsert {
                status: after.clone(),
            },
            now,
        )?;
        tracing::info!(status = %after.id, "status retired");
        Ok(after)
    }

    /// Delete a status nothing references
    pub async fn delete_status(&self, reference: &str, actor: &Actor) -> Result<Status, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let status = self.read(|state| -> Result<Status, EngineError> {
            let status = resolved(state.resolve_status(reference), "status", reference)?.clone();
            let usage = state
                .instances
                .values()
                .filter(|i| i.status == status.id || i.initial_status == status.id)
                .count();
            if usage > 0 {
                return Err(EngineError::Conflict(format!(
                    "status {} is referenced by {} instance(s)",
                    status.name, usage
                )));
            }
            let templates = state.templates_using(&status.id);
            if let Some((process, template)) = templates.first() {
                return Err(EngineError::Conflict(format!(
                    "status {} is the default of template {}/{}",
                    status.name, process, template
                )));
            }
            Ok(status)
        })?;

        let draft = AuditDraft::new(
            actor,
            ActionKind::StatusDeleted,
            EntityRef::new(EntityKind::Status, &status.id),
        )
        .before(&status);
        self.inner.journal.commit(
            vec![draft],
            Operation::StatusDeleted {
                id: status.id.clone(),
            },
            now,
        )?;
        Ok(status)
    }

    /// Seed the default workflow when the catalog is empty; returns how many
    /// statuses were created
    pub async fn seed_default_statuses(&self, actor: &Actor) -> Result<usize, EngineError> {
        if self.read(|state| !state.statuses.is_empty()) {
            return Ok(0);
        }
        for (order, (name, color, terminal)) in DEFAULT_WORKFLOW.iter().enumerate() {
            self.create_status(
                StatusSpec {
                    name: name.to_string(),
                    color: Some(color.to_string()),
                    order: Some(order as u32),
                    terminal: *terminal,
                },
                actor,
            )
            .await?;
        }
        Ok(DEFAULT_WORKFLOW.len())
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
