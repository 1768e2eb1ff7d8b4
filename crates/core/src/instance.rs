// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task instances
//!
//! A task instance is one period-scoped occurrence of a task template. The
//! `(process type, period, template)` key is unique across the whole store.
//! Status bookkeeping (`started_at`, `completed_at`) is driven purely by the
//! destination status's `terminal` flag, so the rules here are plain
//! functions over the instance and the catalog entry it moves to.

use crate::id::{CommentId, InstanceId, ProcessTypeId, StatusId, TemplateId};
use crate::period::Period;
use crate::process::ScriptRef;
use crate::status::Status;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Idempotency key of a generated instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceKey {
    pub process_type_id: ProcessTypeId,
    pub period: Period,
    pub template_id: TemplateId,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.process_type_id, self.period, self.template_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    /// Soft-deleted comments stay in history but are hidden from search
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Opaque reference into the attachment store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub id: String,
    pub filename: String,
    pub size: u64,
}

/// Opaque reference into the email collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("instance is already in status {0}")]
    SameStatus(StatusId),
    #[error("status {0} is retired")]
    RetiredStatus(StatusId),
    #[error("comment body must not be empty")]
    EmptyComment,
    #[error("comment not found: {0}")]
    CommentNotFound(CommentId),
    #[error("comment {0} is already deleted")]
    CommentDeleted(CommentId),
    #[error("attachment already attached: {0}")]
    DuplicateAttachment(String),
    #[error("attachment not found: {0}")]
    AttachmentNotFound(String),
    #[error("email already linked: {0}")]
    DuplicateEmail(String),
    #[error("email not found: {0}")]
    EmailNotFound(String),
}

/// A generated task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: InstanceId,
    pub key: InstanceKey,
    /// Process version the instance was generated from
    pub process_version: u32,
    /// Template position within the process, for stable listing order
    pub position: usize,
    pub title: String,
    /// Guide text copied at generation time
    pub guide: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptRef>,
    pub status: StatusId,
    pub initial_status: StatusId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    #[serde(default)]
    pub emails: Vec<EmailRef>,
    /// Instance in the previous period this one continues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried_from: Option<InstanceId>,
    /// Instance in the next period that continues this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carried_over_to: Option<InstanceId>,
}

/// Outcome of a status transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: StatusId,
    pub to: StatusId,
    /// completed_at was cleared by moving to a non-terminal status
    pub reopened: bool,
    pub terminal: bool,
}

impl TaskInstance {
    pub fn period(&self) -> Period {
        self.key.period
    }

    pub fn process_type_id(&self) -> &ProcessTypeId {
        &self.key.process_type_id
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn is_carried_over(&self) -> bool {
        self.carried_over_to.is_some()
    }

    /// Terminal, or handed over to the next period
    pub fn is_settled(&self) -> bool {
        self.is_completed() || self.is_carried_over()
    }

    pub fn live_comments(&self) -> impl Iterator<Item = &Comment> {
        self.comments.iter().filter(|c| !c.is_deleted())
    }

    /// Move to `to`, maintaining the timestamp invariants:
    /// - `started_at` is set on the first move out of the initial status
    /// - `completed_at` is set iff the destination is terminal; moving
    ///   between terminal statuses keeps the original completion time
    pub fn apply_status(
        &mut self,
        to: &Status,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, InstanceError> {
        if to.id == self.status {
            return Err(InstanceError::SameStatus(to.id.clone()));
        }
        if !to.active {
            return Err(InstanceError::RetiredStatus(to.id.clone()));
        }

        let from = std::mem::replace(&mut self.status, to.id.clone());
        if self.started_at.is_none() && from == self.initial_status {
            self.started_at = Some(now);
        }

        let mut reopened = false;
        if to.terminal {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else if self.completed_at.take().is_some() {
            reopened = true;
        }
        self.updated_at = now;

        Ok(StatusChange {
            from,
            to: to.id.clone(),
            reopened,
            terminal: to.terminal,
        })
    }

    pub fn add_comment(&mut self, comment: Comment) -> Result<(), InstanceError> {
        if comment.body.trim().is_empty() {
            return Err(InstanceError::EmptyComment);
        }
        self.updated_at = comment.created_at;
        self.comments.push(comment);
        Ok(())
    }

    pub fn delete_comment(
        &mut self,
        id: &CommentId,
        now: DateTime<Utc>,
    ) -> Result<Comment, InstanceError> {
        let comment = self
            .comments
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| InstanceError::CommentNotFound(id.clone()))?;
        if comment.is_deleted() {
            return Err(InstanceError::CommentDeleted(id.clone()));
        }
        let before = comment.clone();
        comment.deleted_at = Some(now);
        self.updated_at = now;
        Ok(before)
    }

    pub fn attach(
        &mut self,
        attachment: AttachmentRef,
        now: DateTime<Utc>,
    ) -> Result<(), InstanceError> {
        if self.attachments.iter().any(|a| a.id == attachment.id) {
            return Err(InstanceError::DuplicateAttachment(attachment.id));
        }
        self.attachments.push(attachment);
        self.updated_at = now;
        Ok(())
    }

    pub fn detach(&mut self, id: &str, now: DateTime<Utc>) -> Result<AttachmentRef, InstanceError> {
        let index = self
            .attachments
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| InstanceError::AttachmentNotFound(id.to_string()))?;
        self.updated_at = now;
        Ok(self.attachments.remove(index))
    }

    pub fn link_email(&mut self, email: EmailRef, now: DateTime<Utc>) -> Result<(), InstanceError> {
        if self.emails.iter().any(|e| e.id == email.id) {
            return Err(InstanceError::DuplicateEmail(email.id));
        }
        self.emails.push(email);
        self.updated_at = now;
        Ok(())
    }

    pub fn unlink_email(&mut self, id: &str, now: DateTime<Utc>) -> Result<EmailRef, InstanceError> {
        let index = self
            .emails
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| InstanceError::EmailNotFound(id.to_string()))?;
        self.updated_at = now;
        Ok(self.emails.remove(index))
    }

    /// Case-insensitive occurrences of `needle` across the searchable text:
    /// title, guide, live comment bodies and attachment filenames.
    /// `needle` must already be lowercase.
    pub fn count_matches(&self, needle: &str) -> usize {
        if needle.is_empty() {
            return 0;
        }
        let count = |text: &str| text.to_lowercase().matches(needle).count();
        count(&self.title)
            + count(&self.guide)
            + self.live_comments().map(|c| count(&c.body)).sum::<usize>()
            + self
                .attachments
                .iter()
                .map(|a| count(&a.filename))
                .sum::<usize>()
    }
}

#[cfg(test)]
#[path = "instance_tests.rs"]
mod tests;
