// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events published to live observers

use crate::id::{CommentId, InstanceId, ProcessTypeId, StatusId};
use crate::period::Period;
use serde::{Deserialize, Serialize};

/// Events emitted by the engine after a mutation commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskCreated {
        instance_id: InstanceId,
        process_type_id: ProcessTypeId,
        period: Period,
        title: String,
        status: StatusId,
    },

    StatusChanged {
        instance_id: InstanceId,
        period: Period,
        from: StatusId,
        to: StatusId,
        terminal: bool,
        actor: String,
    },

    CommentAdded {
        instance_id: InstanceId,
        comment_id: CommentId,
        author: String,
    },

    CommentDeleted {
        instance_id: InstanceId,
        comment_id: CommentId,
    },

    AttachmentAdded {
        instance_id: InstanceId,
        attachment_id: String,
        filename: String,
    },

    AttachmentRemoved {
        instance_id: InstanceId,
        attachment_id: String,
    },

    EmailLinked {
        instance_id: InstanceId,
        email_id: String,
    },

    EmailUnlinked {
        instance_id: InstanceId,
        email_id: String,
    },

    /// An unfinished instance was linked into the following period
    CarriedOver {
        instance_id: InstanceId,
        successor_id: InstanceId,
        period: Period,
    },

    PeriodClosed { period: Period },
}

impl Event {
    /// Event name used for pattern matching (`task:status`, `period:closed`)
    pub fn name(&self) -> String {
        match self {
            Event::TaskCreated { .. } => "task:created",
            Event::StatusChanged { .. } => "task:status",
            Event::CommentAdded { .. } => "task:comment:added",
            Event::CommentDeleted { .. } => "task:comment:deleted",
            Event::AttachmentAdded { .. } => "task:attachment:added",
            Event::AttachmentRemoved { .. } => "task:attachment:removed",
            Event::EmailLinked { .. } => "task:email:linked",
            Event::EmailUnlinked { .. } => "task:email:unlinked",
            Event::CarriedOver { .. } => "task:carried",
            Event::PeriodClosed { .. } => "period:closed",
        }
        .to_string()
    }

    /// The instance this event concerns, if any
    pub fn instance_id(&self) -> Option<&InstanceId> {
        match self {
            Event::TaskCreated { instance_id, .. }
            | Event::StatusChanged { instance_id, .. }
            | Event::CommentAdded { instance_id, .. }
            | Event::CommentDeleted { instance_id, .. }
            | Event::AttachmentAdded { instance_id, .. }
            | Event::AttachmentRemoved { instance_id, .. }
            | Event::EmailLinked { instance_id, .. }
            | Event::EmailUnlinked { instance_id, .. }
            | Event::CarriedOver { instance_id, .. } => Some(instance_id),
            Event::PeriodClosed { .. } => None,
        }
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        match self {
            Event::TaskCreated {
                instance_id,
                period,
                title,
                ..
            } => format!("{} created {} ({})", period, instance_id, title),
            Event::StatusChanged {
                instance_id,
                from,
                to,
                actor,
                ..
            } => format!("{} {} -> {} by {}", instance_id, from, to, actor),
            Event::CommentAdded {
                instance_id,
                author,
                ..
            } => format!("{} comment by {}", instance_id, author),
            Event::CommentDeleted {
                instance_id,
                comment_id,
            } => format!("{} comment {} deleted", instance_id, comment_id),
            Event::AttachmentAdded {
                instance_id,
                filename,
                ..
            } => format!("{} attached {}", instance_id, filename),
            Event::AttachmentRemoved {
                instance_id,
                attachment_id,
            } => format!("{} detached {}", instance_id, attachment_id),
            Event::EmailLinked {
                instance_id,
                email_id,
            } => format!("{} linked email {}", instance_id, email_id),
            Event::EmailUnlinked {
                instance_id,
                email_id,
            } => format!("{} unlinked email {}", instance_id, email_id),
            Event::CarriedOver {
                instance_id,
                successor_id,
                period,
            } => format!("{} carried into {} as {}", instance_id, period, successor_id),
            Event::PeriodClosed { period } => format!("{} closed", period),
        }
    }
}

/// Pattern for matching event names
///
/// Supports:
///   - Exact: "task:status"
///   - Single wildcard: "task:*" matches "task:status", "task:created"
///   - Category: "task:**" matches all task events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPattern(String);

impl EventPattern {
    pub fn new(pattern: &str) -> Self {
        Self(pattern.to_string())
    }

    pub fn matches(&self, event_name: &str) -> bool {
        if self.0.is_empty() {
            return false;
        }
        if self.0 == "*" || self.0 == "**" {
            return true;
        }

        let pattern_parts: Vec<&str> = self.0.split(':').collect();
        let event_parts: Vec<&str> = event_name.split(':').collect();
        Self::match_segments(&pattern_parts, &event_parts)
    }

    fn match_segments(pattern: &[&str], event: &[&str]) -> bool {
        match (pattern.first(), event.first()) {
            (None, None) => true,
            (Some(&"**"), _) => true,
            (Some(&"*"), Some(_)) => Self::match_segments(&pattern[1..], &event[1..]),
            (Some(p), Some(e)) if *p == *e => Self::match_segments(&pattern[1..], &event[1..]),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Whether any of `patterns` matches the event; an empty list matches all
pub fn matches_any(patterns: &[EventPattern], event: &Event) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let name = event.name();
    patterns.iter().any(|p| p.matches(&name))
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
