// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instantiation scheduler
//!
//! `ensure_generated(period)` creates whatever instances are missing for
//! every active process type that recurs in the period. It is idempotent:
//! "already generated" is a success with `created == 0`. Each
//! (process type, period) pair is generated under its own lock, and each
//! process type succeeds or fails on its own.

use crate::engine::Engine;
use crate::error::{EngineError, ErrorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wfm_core::{
    ActionKind, Actor, AuditDraft, Clock, EntityKind, EntityRef, Event, IdGen, InstanceId,
    InstanceKey, Operation, Period, PeriodState, ProcessType, ProcessTypeId, TaskInstance,
};
use wfm_storage::MaterializedState;

/// Per process type result of a generation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Generated { created: usize, existing: usize },
    Failed { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessGeneration {
    pub process_type_id: ProcessTypeId,
    pub name: String,
    #[serde(flatten)]
    pub outcome: GenerationOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub period: Period,
    pub results: Vec<ProcessGeneration>,
    /// Previous period that became eligible for closing during this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marked_eligible: Option<Period>,
}

impl GenerationReport {
    pub fn created(&self) -> usize {
        self.results
            .iter()
            .map(|r| match r.outcome {
                GenerationOutcome::Generated { created, .. } => created,
                GenerationOutcome::Failed { .. } => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProcessGeneration> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, GenerationOutcome::Failed { .. }))
    }
}

/// Instances to create for one process type, or why generation is impossible
fn plan_generation(
    state: &MaterializedState,
    process: &ProcessType,
    period: Period,
    now: DateTime<Utc>,
    mut next_id: impl FnMut() -> InstanceId,
) -> Result<(Vec<TaskInstance>, usize), EngineError> {
    let version = process.current().ok_or_else(|| {
        EngineError::Validation(format!("process type {} has no versions", process.id))
    })?;

    // Validate the whole template set before creating anything
    let mut missing = Vec::new();
    let mut existing = 0;
    for (position, template) in version.active_templates() {
        let initial = match &template.default_status {
            Some(id) => match state.statuses.get(id) {
                Some(status) if status.active => status,
                Some(status) => {
                    return Err(EngineError::Validation(format!(
                        "template {} references retired status {}",
                        template.id, status.name
                    )))
                }
                None => {
                    return Err(EngineError::Validation(format!(
                        "template {} references unknown status {}",
                        template.id, id
                    )))
                }
            },
            None => state.default_status().ok_or_else(|| {
                EngineError::Validation("status catalog has no active status".to_string())
            })?,
        };

        let key = InstanceKey {
            process_type_id: process.id.clone(),
            period,
            template_id: template.id.clone(),
        };
        if state.by_key.contains_key(&key) {
            existing += 1;
        } else {
            missing.push((position, template, key, initial.id.clone(), initial.terminal));
        }
    }

    let instances = missing
        .into_iter()
        .map(|(position, template, key, status, terminal)| TaskInstance {
            id: next_id(),
            key,
            process_version: version.version,
            position,
            title: template.title.clone(),
            guide: version.guide_for(template),
            required: template.required,
            script: template.script.clone(),
            status: status.clone(),
            initial_status: status,
            created_at: now,
            started_at: None,
            completed_at: terminal.then_some(now),
            updated_at: now,
            comments: Vec::new(),
            attachments: Vec::new(),
            emails: Vec::new(),
            carried_from: None,
            carried_over_to: None,
        })
        .collect();
    Ok((instances, existing))
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Ensure every recurring process type has its full instance set for
    /// `period`
    pub async fn ensure_generated(
        &self,
        period: Period,
        actor: &Actor,
    ) -> Result<GenerationReport, EngineError> {
        self.generate_where(period, actor, |_| true).await
    }

    /// Timer entry point: generate the current period for process types
    /// whose anchor day has been reached
    pub async fn run_due(&self) -> Result<GenerationReport, EngineError> {
        let now = self.now();
        let period = Period::containing(now);
        self.generate_where(period, &Actor::system(), |process| {
            process
                .current()
                .is_some_and(|v| v.recurrence.is_due(now))
        })
        .await
    }

    async fn generate_where(
        &self,
        period: Period,
        actor: &Actor,
        filter: impl Fn(&ProcessType) -> bool,
    ) -> Result<GenerationReport, EngineError> {
        let _admin = self.inner.admin.read().await;
        let _gate = self.inner.period_gates.shared(&period).await;

        let mut processes = self.read(|state| -> Result<Vec<ProcessType>, EngineError> {
            if state.is_closed(period) {
                return Err(EngineError::Conflict(format!("period {} is closed", period)));
            }
            Ok(state
                .process_types
                .values()
                .filter(|p| p.recurs_in(period) && filter(p))
                .cloned()
                .collect())
        })?;
        processes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut results = Vec::with_capacity(processes.len());
        for process in &processes {
            let outcome = match self.generate_one(process, period, actor).await {
                Ok((created, existing)) => GenerationOutcome::Generated { created, existing },
                Err(e) => {
                    tracing::warn!(process_type = %process.id, %period, error = %e, "generation failed");
                    GenerationOutcome::Failed {
                        kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            };
            results.push(ProcessGeneration {
                process_type_id: process.id.clone(),
                name: process.name().to_string(),
                outcome,
            });
        }

        let marked_eligible = self.mark_previous_eligible(period, actor)?;
        let report = GenerationReport {
            period,
            results,
            marked_eligible,
        };
        tracing::info!(
            %period,
            process_types = report.results.len(),
            created = report.created(),
            failed = report.failures().count(),
            "generation finished"
        );
        Ok(report)
    }

    async fn generate_one(
        &self,
        process: &ProcessType,
        period: Period,
        actor: &Actor,
    ) -> Result<(usize, usize), EngineError> {
        let key = (process.id.clone(), period);
        let timeout = self.inner.settings.scheduler.lock_timeout;
        let Some(_lock) = self.inner.gen_locks.exclusive_timeout(&key, timeout).await else {
            return Err(EngineError::Conflict(format!(
                "generation of {} for {} is held by another caller",
                process.id, period
            )));
        };

        let now = self.now();
        let (instances, existing) = self.read(|state| {
            plan_generation(state, process, period, now, || InstanceId::new(self.next_id()))
        })?;
        if instances.is_empty() {
            return Ok((0, existing));
        }

        let drafts = instances
            .iter()
            .map(|instance| {
                AuditDraft::new(
                    actor,
                    ActionKind::TasksGenerated,
                    EntityRef::new(EntityKind::Instance, &instance.id),
                )
                .after(instance)
            })
            .collect();
        self.inner.journal.commit(
            drafts,
            Operation::InstancesGenerated {
                period,
                process_type_id: process.id.clone(),
                at: now,
                instances: instances.clone(),
            },
            now,
        )?;

        for instance in &instances {
            self.publish(Event::TaskCreated {
                instance_id: instance.id.clone(),
                process_type_id: process.id.clone(),
                period,
                title: instance.title.clone(),
                status: instance.status.clone(),
            });
        }
        tracing::info!(process_type = %process.id, %period, created = instances.len(), existing, "instances generated");
        Ok((instances.len(), existing))
    }

    /// Once a period is generated, the one before it becomes eligible for
    /// closing if it is fully in the past. Happens at most once.
    fn mark_previous_eligible(&self, period: Period, actor: &Actor) -> Result<Option<Period>, EngineError> {
        let previous = period.prev();
        if previous >= self.current_period() {
            return Ok(None);
        }
        let committed = self.inner.journal.commit_if(self.now(), |state| {
            let record = state.periods.get(&previous)?;
            if record.state != PeriodState::Open {
                return None;
            }
            let draft = AuditDraft::new(
                actor,
                ActionKind::PeriodMarkedEligible,
                EntityRef::new(EntityKind::Period, previous),
            );
            Some((vec![draft], Operation::PeriodMarkedEligible { period: previous }))
        })?;
        Ok(committed.map(|_| previous))
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
