// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task lifecycle manager
//!
//! Every mutation on an instance runs under that instance's lock (and a
//! shared gate on its period so a concurrent close cannot interleave),
//! produces exactly one audit entry and one event, and is rejected once the
//! period is closed.

use crate::engine::{resolved, Engine};
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use wfm_core::{
    ActionKind, Actor, AttachmentRef, AuditDraft, AuditFilter, AuditPage, Clock, Comment,
    CommentId, EmailRef, EntityKind, EntityRef, Event, IdGen, InstanceId, InstanceKey, Operation,
    Period, StatusId, TaskInstance,
};
use wfm_storage::MaterializedState;

/// Filters for listing instances; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceQuery {
    #[serde(default)]
    pub period: Option<Period>,
    /// Status id or name
    #[serde(default)]
    pub status: Option<String>,
    /// Process type id or name
    #[serde(default)]
    pub process_type: Option<String>,
    /// Only instances neither completed nor carried over
    #[serde(default)]
    pub unfinished: bool,
}

/// Audit entry, event and return value of one instance mutation
struct Mutation<R> {
    draft: AuditDraft,
    event: Event,
    result: R,
}

fn entity(instance: &TaskInstance) -> EntityRef {
    EntityRef::new(EntityKind::Instance, &instance.id)
}

/// Status-related fields recorded before and after a transition
fn status_snapshot(instance: &TaskInstance) -> serde_json::Value {
    serde_json::json!({
        "status": instance.status,
        "started_at": instance.started_at,
        "completed_at": instance.completed_at,
    })
}

/// Initial status of a carried-over successor: the source's initial status
/// while it is still active, else the catalog default
fn successor_status(state: &MaterializedState, source: &TaskInstance) -> Option<(StatusId, bool)> {
    state
        .statuses
        .get(&source.initial_status)
        .filter(|s| s.active)
        .or_else(|| state.default_status())
        .map(|s| (s.id.clone(), s.terminal))
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    pub fn get_instance(&self, reference: &str) -> Result<TaskInstance, EngineError> {
        self.read(|state| {
            resolved(state.resolve_instance(reference), "instance", reference).cloned()
        })
    }

    /// Instances ordered by period, process type and template position
    pub fn list_instances(&self, query: &InstanceQuery) -> Result<Vec<TaskInstance>, EngineError> {
        self.read(|state| {
            let status = match &query.status {
                Some(reference) => Some(
                    resolved(state.resolve_status(reference), "status", reference)?
                        .id
                        .clone(),
                ),
                None => None,
            };
            let process_type = match &query.process_type {
                Some(reference) => Some(
                    resolved(
                        state.resolve_process_type(reference),
                        "process type",
                        reference,
                    )?
                    .id
                    .clone(),
                ),
                None => None,
            };

            let mut instances: Vec<TaskInstance> = state
                .instances
                .values()
                .filter(|i| query.period.map_or(true, |p| i.period() == p))
                .filter(|i| status.as_ref().map_or(true, |s| &i.status == s))
                .filter(|i| process_type.as_ref().map_or(true, |p| i.process_type_id() == p))
                .filter(|i| !query.unfinished || !i.is_settled())
                .cloned()
                .collect();
            instances.sort_by(|a, b| {
                a.period()
                    .cmp(&b.period())
                    .then_with(|| a.key.process_type_id.cmp(&b.key.process_type_id))
                    .then_with(|| a.position.cmp(&b.position))
                    .then_with(|| a.id.cmp(&b.id))
            });
            Ok(instances)
        })
    }

    /// Audit entries for one instance, newest first
    pub fn instance_history(
        &self,
        reference: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<AuditPage, EngineError> {
        let instance = self.get_instance(reference)?;
        Ok(self.query_audit(&AuditFilter {
            entity_id: Some(instance.id.to_string()),
            entity_kind: Some(EntityKind::Instance),
            offset,
            limit,
            ..AuditFilter::default()
        }))
    }

    /// Lock, re-read and update one instance, then commit and publish
    async fn mutate<R>(
        &self,
        reference: &str,
        apply: impl FnOnce(&mut TaskInstance, &MaterializedState, DateTime<Utc>) -> Result<Mutation<R>, EngineError>,
    ) -> Result<(TaskInstance, R), EngineError> {
        let (id, period) = self.read(|state| {
            resolved(state.resolve_instance(reference), "instance", reference)
                .map(|i| (i.id.clone(), i.period()))
        })?;

        let _admin = self.inner.admin.read().await;
        let _gate = self.inner.period_gates.shared(&period).await;
        let _lock = self.inner.instance_locks.exclusive(&id).await;

        let now = self.now();
        let (instance, mutation) = self.read(|state| -> Result<_, EngineError> {
            let current = state
                .instances
                .get(&id)
                .ok_or_else(|| EngineError::not_found("instance", &id))?;
            if state.is_closed(current.period()) {
                return Err(EngineError::Conflict(format!(
                    "period {} is closed; instance {} is read-only",
                    current.period(),
                    id
                )));
            }
            let mut updated = current.clone();
            let mutation = apply(&mut updated, state, now)?;
            Ok((updated, mutation))
        })?;

        self.inner.journal.commit(
            vec![mutation.draft],
            Operation::InstanceUpdated {
                instance: instance.clone(),
            },
            now,
        )?;
        self.publish(mutation.event);
        Ok((instance, mutation.result))
    }

    /// Move an instance to another status. Any status may follow any other;
    /// the destination's terminal flag decides `completed_at`.
    pub async fn transition(
        &self,
        reference: &str,
        status: &str,
        actor: &Actor,
    ) -> Result<TaskInstance, EngineError> {
        let (instance, ()) = self
            .mutate(reference, |instance, state, now| {
                let target = resolved(state.resolve_status(status), "status", status)
                    .map_err(|e| EngineError::Validation(format!("invalid status reference: {}", e)))?;
                let before = status_snapshot(instance);
                let change = instance.apply_status(target, now)?;
                let action = if change.reopened {
                    ActionKind::Reopened
                } else {
                    ActionKind::StatusChanged
                };
                let mut draft = AuditDraft::new(actor, action, entity(instance));
                draft.before = Some(before);
                draft.after = Some(status_snapshot(instance));
                Ok(Mutation {
                    draft,
                    event: Event::StatusChanged {
                        instance_id: instance.id.clone(),
                        period: instance.period(),
                        from: change.from,
                        to: change.to,
                        terminal: change.terminal,
                        actor: actor.to_string(),
                    },
                    result: (),
                })
            })
            .await?;
        tracing::info!(instance_id = %instance.id, status = %instance.status, %actor, "transitioned");
        Ok(instance)
    }

    pub async fn add_comment(
        &self,
        reference: &str,
        body: &str,
        actor: &Actor,
    ) -> Result<Comment, EngineError> {
        let comment_id = CommentId::new(self.next_id());
        let (_, comment) = self
            .mutate(reference, |instance, _, now| {
                let comment = Comment {
                    id: comment_id,
                    author: actor.to_string(),
                    body: body.to_string(),
                    created_at: now,
                    deleted_at: None,
                };
                instance.add_comment(comment.clone())?;
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::CommentAdded, entity(instance))
                        .after(&comment),
                    event: Event::CommentAdded {
                        instance_id: instance.id.clone(),
                        comment_id: comment.id.clone(),
                        author: comment.author.clone(),
                    },
                    result: comment,
                })
            })
            .await?;
        Ok(comment)
    }

    /// Soft-delete: the comment stays in history but leaves search
    pub async fn delete_comment(
        &self,
        reference: &str,
        comment_id: &str,
        actor: &Actor,
    ) -> Result<Comment, EngineError> {
        let comment_id = CommentId::new(comment_id);
        let (_, comment) = self
            .mutate(reference, |instance, _, now| {
                let before = instance.delete_comment(&comment_id, now)?;
                let deleted = Comment {
                    deleted_at: Some(now),
                    ..before.clone()
                };
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::CommentDeleted, entity(instance))
                        .before(&before)
                        .after(&deleted),
                    event: Event::CommentDeleted {
                        instance_id: instance.id.clone(),
                        comment_id: before.id,
                    },
                    result: deleted,
                })
            })
            .await?;
        Ok(comment)
    }

    pub async fn attach_file(
        &self,
        reference: &str,
        attachment: AttachmentRef,
        actor: &Actor,
    ) -> Result<TaskInstance, EngineError> {
        if attachment.id.trim().is_empty() || attachment.filename.trim().is_empty() {
            return Err(EngineError::Validation(
                "attachment reference needs an id and a filename".to_string(),
            ));
        }
        let (instance, ()) = self
            .mutate(reference, |instance, _, now| {
                instance.attach(attachment.clone(), now)?;
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::AttachmentAdded, entity(instance))
                        .after(&attachment),
                    event: Event::AttachmentAdded {
                        instance_id: instance.id.clone(),
                        attachment_id: attachment.id.clone(),
                        filename: attachment.filename.clone(),
                    },
                    result: (),
                })
            })
            .await?;
        Ok(instance)
    }

    pub async fn detach_file(
        &self,
        reference: &str,
        attachment_id: &str,
        actor: &Actor,
    ) -> Result<AttachmentRef, EngineError> {
        let (_, removed) = self
            .mutate(reference, |instance, _, now| {
                let removed = instance.detach(attachment_id, now)?;
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::AttachmentRemoved, entity(instance))
                        .before(&removed),
                    event: Event::AttachmentRemoved {
                        instance_id: instance.id.clone(),
                        attachment_id: removed.id.clone(),
                    },
                    result: removed,
                })
            })
            .await?;
        Ok(removed)
    }

    pub async fn link_email(
        &self,
        reference: &str,
        email: EmailRef,
        actor: &Actor,
    ) -> Result<TaskInstance, EngineError> {
        if email.id.trim().is_empty() {
            return Err(EngineError::Validation(
                "email reference needs an id".to_string(),
            ));
        }
        let (instance, ()) = self
            .mutate(reference, |instance, _, now| {
                instance.link_email(email.clone(), now)?;
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::EmailLinked, entity(instance))
                        .after(&email),
                    event: Event::EmailLinked {
                        instance_id: instance.id.clone(),
                        email_id: email.id.clone(),
                    },
                    result: (),
                })
            })
            .await?;
        Ok(instance)
    }

    pub async fn unlink_email(
        &self,
        reference: &str,
        email_id: &str,
        actor: &Actor,
    ) -> Result<EmailRef, EngineError> {
        let (_, removed) = self
            .mutate(reference, |instance, _, now| {
                let removed = instance.unlink_email(email_id, now)?;
                Ok(Mutation {
                    draft: AuditDraft::new(actor, ActionKind::EmailUnlinked, entity(instance))
                        .before(&removed),
                    event: Event::EmailUnlinked {
                        instance_id: instance.id.clone(),
                        email_id: removed.id.clone(),
                    },
                    result: removed,
                })
            })
            .await?;
        Ok(removed)
    }

    /// Roll an unfinished instance into the next period as a linked
    /// instance. Returns the successor.
    pub async fn carry_over(&self, reference: &str, actor: &Actor) -> Result<TaskInstance, EngineError> {
        let (id, period) = self.read(|state| {
            resolved(state.resolve_instance(reference), "instance", reference)
                .map(|i| (i.id.clone(), i.period()))
        })?;

        let _admin = self.inner.admin.read().await;
        let _gate = self.inner.period_gates.shared(&period).await;
        let _lock = self.inner.instance_locks.exclusive(&id).await;

        let source = self.read(|state| -> Result<TaskInstance, EngineError> {
            let source = state
                .instances
                .get(&id)
                .ok_or_else(|| EngineError::not_found("instance", &id))?;
            if state.is_closed(source.period()) {
                return Err(EngineError::Conflict(format!(
                    "period {} is closed",
                    source.period()
                )));
            }
            Ok(source.clone())
        })?;
        self.carry_over_locked(source, actor).await
    }

    /// Carry over with the source's period gate and instance lock (or an
    /// exclusive period gate) already held by the caller
    pub(crate) async fn carry_over_locked(
        &self,
        source: TaskInstance,
        actor: &Actor,
    ) -> Result<TaskInstance, EngineError> {
        if source.is_completed() {
            return Err(EngineError::Conflict(format!(
                "instance {} is already complete",
                source.id
            )));
        }
        if let Some(successor) = &source.carried_over_to {
            return Err(EngineError::Conflict(format!(
                "instance {} was already carried over to {}",
                source.id, successor
            )));
        }

        let next = source.period().next();
        let key = InstanceKey {
            period: next,
            ..source.key.clone()
        };
        let _next_gate = self.inner.period_gates.shared(&next).await;
        let timeout = self.inner.settings.scheduler.lock_timeout;
        let gen_key = (key.process_type_id.clone(), next);
        let Some(_gen) = self.inner.gen_locks.exclusive_timeout(&gen_key, timeout).await else {
            return Err(EngineError::Conflict(format!(
                "generation of {} for {} is held by another caller",
                key.process_type_id, next
            )));
        };

        let existing_id = self.read(|state| state.by_key.get(&key).cloned());
        let _successor_lock = match &existing_id {
            Some(existing) => Some(self.inner.instance_locks.exclusive(existing).await),
            None => None,
        };

        let now = self.now();
        let (from, to, created) = self.read(|state| -> Result<_, EngineError> {
            if state.is_closed(next) {
                return Err(EngineError::Conflict(format!(
                    "cannot carry over into closed period {}",
                    next
                )));
            }
            let (to, created) = match state.instance_by_key(&key) {
                Some(existing) => {
                    if existing
                        .carried_from
                        .as_ref()
                        .is_some_and(|from| from != &source.id)
                    {
                        return Err(EngineError::Conflict(format!(
                            "instance {} already continues another instance",
                            existing.id
                        )));
                    }
                    let mut to = existing.clone();
                    to.carried_from = Some(source.id.clone());
                    to.updated_at = now;
                    (to, false)
                }
                None => {
                    let (status, terminal) = successor_status(state, &source).ok_or_else(|| {
                        EngineError::Validation("status catalog has no active status".to_string())
                    })?;
                    let to = TaskInstance {
                        id: InstanceId::new(self.next_id()),
                        key: key.clone(),
                        process_version: source.process_version,
                        position: source.position,
                        title: source.title.clone(),
                        guide: source.guide.clone(),
                        required: source.required,
                        script: source.script.clone(),
                        status: status.clone(),
                        initial_status: status,
                        created_at: now,
                        started_at: None,
                        completed_at: terminal.then_some(now),
                        updated_at: now,
                        comments: Vec::new(),
                        attachments: Vec::new(),
                        emails: Vec::new(),
                        carried_from: Some(source.id.clone()),
                        carried_over_to: None,
                    };
                    (to, true)
                }
            };
            let mut from = source.clone();
            from.carried_over_to = Some(to.id.clone());
            from.updated_at = now;
            Ok((from, to, created))
        })?;

        let mut drafts = vec![AuditDraft::new(actor, ActionKind::CarriedOver, entity(&from))
            .before(&serde_json::json!({ "carried_over_to": null }))
            .after(&serde_json::json!({
                "carried_over_to": to.id,
                "period": next,
                "created": created,
            }))];
        if created {
            drafts.push(AuditDraft::new(actor, ActionKind::TasksGenerated, entity(&to)).after(&to));
        }
        self.inner.journal.commit(
            drafts,
            Operation::CarriedOver {
                from: from.clone(),
                to: to.clone(),
            },
            now,
        )?;

        self.publish(Event::CarriedOver {
            instance_id: from.id.clone(),
            successor_id: to.id.clone(),
            period: next,
        });
        if created {
            self.publish(Event::TaskCreated {
                instance_id: to.id.clone(),
                process_type_id: to.key.process_type_id.clone(),
                period: next,
                title: to.title.clone(),
                status: to.status.clone(),
            });
        }
        tracing::info!(instance_id = %from.id, successor = %to.id, %next, created, "carried over");
        Ok(to)
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
