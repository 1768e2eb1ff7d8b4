// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Template registry administration
//!
//! Process types are versioned, never edited in place: a revision appends a
//! new [`ProcessVersion`] and instances already generated keep pointing at
//! the version (and guide text) they were created from.

use crate::catalog::{slug, unique_slug};
use crate::engine::{resolved, Engine};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use wfm_core::{
    ActionKind, Actor, AuditDraft, Clock, EntityKind, EntityRef, IdGen, Operation,
    ProcessDefinition, ProcessSpec, ProcessType, ProcessTypeId, ProcessVersion, TaskTemplate,
    TemplateId,
};
use wfm_storage::MaterializedState;

/// What `sync_definition` did with a definition file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Defined,
    Revised,
    Unchanged,
}

/// Resolve template ids and status references into an immutable version
fn build_version(
    state: &MaterializedState,
    spec: &ProcessSpec,
    previous: Option<&ProcessVersion>,
    number: u32,
    now: DateTime<Utc>,
) -> Result<ProcessVersion, EngineError> {
    spec.validate()?;

    let mut taken: HashSet<String> = spec
        .templates
        .iter()
        .filter_map(|t| t.id.as_ref().map(|id| id.to_string()))
        .collect();
    let mut resolved_spec = spec.clone();
    let mut templates = Vec::with_capacity(spec.templates.len());

    for (template, resolved_template) in spec.templates.iter().zip(resolved_spec.templates.iter_mut()) {
        let id = match &template.id {
            Some(id) => id.clone(),
            None => {
                // Keep the id of a same-titled template from the previous version
                let inherited = previous.and_then(|prev| {
                    prev.templates
                        .iter()
                        .find(|t| {
                            t.title.eq_ignore_ascii_case(template.title.trim())
                                && !taken.contains(t.id.as_str())
                        })
                        .map(|t| t.id.clone())
                });
                let id = inherited.unwrap_or_else(|| {
                    TemplateId::new(unique_slug(&slug(&template.title), |c| taken.contains(c)))
                });
                taken.insert(id.to_string());
                id
            }
        };
        resolved_template.id = Some(id.clone());

        let default_status = match &template.default_status {
            Some(reference) => {
                let status = resolved(state.resolve_status(reference), "status", reference)
                    .map_err(|e| {
                        EngineError::Validation(format!("template {}: {}", template.title, e))
                    })?;
                if !status.active {
                    return Err(EngineError::Validation(format!(
                        "template {}: status {} is retired",
                        template.title, status.name
                    )));
                }
                Some(status.id.clone())
            }
            None => None,
        };

        templates.push(TaskTemplate {
            id,
            title: template.title.trim().to_string(),
            guide: template.guide.clone(),
            required: template.required,
            default_status,
            script: template.script.clone(),
            active: template.active,
        });
    }

    if let Some(prev) = previous {
        resolved_spec.check_revision_of(prev)?;
    }

    Ok(ProcessVersion {
        version: number,
        name: spec.name.trim().to_string(),
        description: spec.description.clone(),
        guide: spec.guide.clone(),
        recurrence: spec.recurrence.clone(),
        templates,
        scripts: spec.scripts.clone(),
        created_at: now,
    })
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Process types ordered by name
    pub fn list_process_types(&self) -> Vec<ProcessType> {
        let mut processes: Vec<ProcessType> =
            self.read(|state| state.process_types.values().cloned().collect());
        processes.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id.cmp(&b.id)));
        processes
    }

    pub fn get_process_type(&self, reference: &str) -> Result<ProcessType, EngineError> {
        self.read(|state| {
            resolved(state.resolve_process_type(reference), "process type", reference).cloned()
        })
    }

    pub async fn define_process_type(
        &self,
        id: Option<ProcessTypeId>,
        spec: ProcessSpec,
        actor: &Actor,
    ) -> Result<ProcessType, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let (id, version) = self.read(|state| -> Result<_, EngineError> {
            let id = match id {
                Some(id) if state.process_types.contains_key(&id) => {
                    return Err(EngineError::Conflict(format!(
                        "process type already exists: {}",
                        id
                    )));
                }
                Some(id) => id,
                None => ProcessTypeId::new(unique_slug(&slug(&spec.name), |c| {
                    state.process_types.contains_key(&ProcessTypeId::new(c))
                })),
            };
            let duplicate_name = state
                .process_types
                .values()
                .any(|p| p.name().eq_ignore_ascii_case(spec.name.trim()));
            if duplicate_name {
                return Err(EngineError::Conflict(format!(
                    "process type name already in use: {}",
                    spec.name.trim()
                )));
            }
            Ok((id, build_version(state, &spec, None, 1, now)?))
        })?;

        let draft = AuditDraft::new(
            actor,
            ActionKind::ProcessTypeDefined,
            EntityRef::new(EntityKind::ProcessType, &id),
        )
        .after(&version);
        self.inner.journal.commit(
            vec![draft],
            Operation::ProcessTypeVersioned {
                process_type_id: id.clone(),
                created_at: now,
                version,
            },
            now,
        )?;
        tracing::info!(process_type = %id, "process type defined");
        self.get_process_type(id.as_str())
    }

    /// Append a new version; earlier instances are unaffected
    pub async fn revise_process_type(
        &self,
        reference: &str,
        spec: ProcessSpec,
        actor: &Actor,
    ) -> Result<ProcessType, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let (id, previous, version) = self.read(|state| -> Result<_, EngineError> {
            let process = resolved(
                state.resolve_process_type(reference),
                "process type",
                reference,
            )?;
            if !process.is_active() {
                return Err(EngineError::Conflict(format!(
                    "process type {} is retired",
                    process.id
                )));
            }
            let previous = process.current().cloned();
            let number = previous.as_ref().map(|v| v.version + 1).unwrap_or(1);
            let version = build_version(state, &spec, previous.as_ref(), number, now)?;
            Ok((process.id.clone(), previous, version))
        })?;

        let mut draft = AuditDraft::new(
            actor,
            ActionKind::ProcessTypeRevised,
            EntityRef::new(EntityKind::ProcessType, &id),
        )
        .after(&version);
        if let Some(previous) = &previous {
            draft = draft.before(previous);
        }
        self.inner.journal.commit(
            vec![draft],
            Operation::ProcessTypeVersioned {
                process_type_id: id.clone(),
                created_at: now,
                version,
            },
            now,
        )?;
        tracing::info!(process_type = %id, "process type revised");
        self.get_process_type(id.as_str())
    }

    /// Soft-retire; no further generation, history kept
    pub async fn retire_process_type(
        &self,
        reference: &str,
        actor: &Actor,
    ) -> Result<ProcessType, EngineError> {
        let _admin = self.inner.admin.write().await;
        let now = self.now();

        let process = self.get_process_type(reference)?;
        if !process.is_active() {
            return Err(EngineError::Conflict(format!(
                "process type {} is already retired",
                process.id
            )));
        }

        let draft = AuditDraft::new(
            actor,
            ActionKind::ProcessTypeRetired,
            EntityRef::new(EntityKind::ProcessType, &process.id),
        )
        .after(&now);
        self.inner.journal.commit(
            vec![draft],
            Operation::ProcessTypeRetired {
                id: process.id.clone(),
                at: now,
            },
            now,
        )?;
        tracing::info!(process_type = %process.id, "process type retired");
        self.get_process_type(process.id.as_str())
    }

    /// Bring the registry in line with a definition file: define it if
    /// unknown, revise it if its content differs, otherwise leave it alone
    pub async fn sync_definition(
        &self,
        definition: ProcessDefinition,
        actor: &Actor,
    ) -> Result<SyncOutcome, EngineError> {
        let existing = self.read(|state| state.process_types.get(&definition.id).cloned());
        let Some(existing) = existing else {
            self.define_process_type(Some(definition.id), definition.spec, actor)
                .await?;
            return Ok(SyncOutcome::Defined);
        };
        if !existing.is_active() {
            tracing::warn!(process_type = %existing.id, "definition file for retired process type ignored");
            return Ok(SyncOutcome::Unchanged);
        }

        let now = self.now();
        let unchanged = self.read(|state| -> Result<bool, EngineError> {
            let current = existing.current();
            let number = current.map(|v| v.version + 1).unwrap_or(1);
            let candidate = build_version(state, &definition.spec, current, number, now)?;
            Ok(current.is_some_and(|v| v.same_content(&candidate)))
        })?;
        if unchanged {
            return Ok(SyncOutcome::Unchanged);
        }
        self.revise_process_type(existing.id.as_str(), definition.spec, actor)
            .await?;
        Ok(SyncOutcome::Revised)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
