// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Status workflow catalog entries
//!
//! Statuses are a flat, administrator-defined list. There is no workflow
//! graph: any status may follow any other, and whether a status ends a
//! task's active lifecycle is carried by the `terminal` flag.

use crate::id::StatusId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_COLOR: &str = "#6b7280";

/// A named, colored, ordered entry in the workflow catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
    /// `#rrggbb`
    pub color: String,
    pub order: u32,
    pub terminal: bool,
    /// Retired statuses stay referenced by history but cannot be assigned
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Status {
    /// Whether `reference` names this status by id or (case-insensitive) name
    pub fn is_referenced_by(&self, reference: &str) -> bool {
        self.id.as_str() == reference || self.name.eq_ignore_ascii_case(reference.trim())
    }
}

/// Administrator input for creating a status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSpec {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub terminal: bool,
}

/// Partial update for an existing status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub terminal: Option<bool>,
}

impl StatusPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none() && self.terminal.is_none()
    }
}

/// Check a `#rgb` / `#rrggbb` color string
pub fn is_valid_color(color: &str) -> bool {
    let Some(hex) = color.strip_prefix('#') else {
        return false;
    };
    matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// Pick the catalog default: lowest-ordered active status
pub fn default_status<'a>(statuses: impl IntoIterator<Item = &'a Status>) -> Option<&'a Status> {
    statuses
        .into_iter()
        .filter(|s| s.active)
        .min_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)))
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
