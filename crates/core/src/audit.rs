// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit trail entry types and query filters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who performed an action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Actor(pub String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Actor for timer-driven and startup actions
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! kinds {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }
    };
}

kinds!(
    /// Kind of mutating action
    ActionKind {
        ProcessTypeDefined => "process_type_defined",
        ProcessTypeRevised => "process_type_revised",
        ProcessTypeRetired => "process_type_retired",
        StatusCreated => "status_created",
        StatusUpdated => "status_updated",
        StatusReordered => "status_reordered",
        StatusRetired => "status_retired",
        StatusDeleted => "status_deleted",
        TasksGenerated => "tasks_generated",
        StatusChanged => "status_changed",
        Reopened => "reopened",
        CommentAdded => "comment_added",
        CommentDeleted => "comment_deleted",
        AttachmentAdded => "attachment_added",
        AttachmentRemoved => "attachment_removed",
        EmailLinked => "email_linked",
        EmailUnlinked => "email_unlinked",
        CarriedOver => "carried_over",
        PeriodMarkedEligible => "period_marked_eligible",
        PeriodClosed => "period_closed",
        AuditPruned => "audit_pruned",
        MutationAborted => "mutation_aborted",
    }
);

kinds!(
    /// Kind of entity an audit entry targets
    EntityKind {
        ProcessType => "process_type",
        Status => "status",
        Instance => "instance",
        Period => "period",
        Audit => "audit",
    }
);

/// Target of an audited action
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// An audit entry before it is sequenced and chained
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDraft {
    pub actor: Actor,
    pub action: ActionKind,
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
}

impl AuditDraft {
    pub fn new(actor: &Actor, action: ActionKind, entity: EntityRef) -> Self {
        Self {
            actor: actor.clone(),
            action,
            entity,
            before: None,
            after: None,
        }
    }

    /// Attach a snapshot of the entity before the mutation. Values that fail
    /// to serialize are recorded as absent.
    pub fn before(mut self, value: &impl Serialize) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after(mut self, value: &impl Serialize) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

/// An immutable, sequenced, hash-chained audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub actor: Actor,
    pub action: ActionKind,
    pub entity: EntityRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,
    /// Hash of the preceding entry
    pub prev_hash: String,
    /// sha256 over `prev_hash` and this entry's body
    pub hash: String,
}

/// Query filters; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_kind: Option<EntityKind>,
    #[serde(default)]
    pub action: Option<ActionKind>,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub offset: usize,
    /// Page size; the recorder's default applies when unset
    #[serde(default)]
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.actor.as_deref().map_or(true, |a| entry.actor.0 == a)
            && self
                .entity_id
                .as_deref()
                .map_or(true, |id| entry.entity.id == id)
            && self.entity_kind.map_or(true, |k| entry.entity.kind == k)
            && self.action.map_or(true, |a| entry.action == a)
            && self.since.map_or(true, |t| entry.at >= t)
            && self.until.map_or(true, |t| entry.at < t)
    }
}

/// One page of query results, newest first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub entries: Vec<AuditEntry>,
    /// Number of entries matching the filter across all pages
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

#[cfg(test)]
#[path = "audit_tests.rs"]
mod tests;
