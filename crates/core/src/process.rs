// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process types and their task templates
//!
//! A process type is an administrator-edited template for a recurring set of
//! monthly tasks. Every edit appends a new immutable [`ProcessVersion`], so
//! instances generated from an earlier version are unaffected. Template ids
//! stay stable across versions; they form part of the idempotency key of a
//! generated instance.

use crate::id::{ProcessTypeId, StatusId, TemplateId};
use crate::period::Period;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Opaque reference to an automation script owned by the script collaborator
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptRef(pub String);

impl std::fmt::Display for ScriptRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessSpecError {
    #[error("process name must not be empty")]
    EmptyName,
    #[error("process must define at least one task template")]
    NoTemplates,
    #[error("template title must not be empty (template {0})")]
    EmptyTitle(usize),
    #[error("duplicate template id: {0}")]
    DuplicateTemplate(String),
    #[error("anchor day must be between 1 and 31, got {0}")]
    AnchorOutOfRange(u32),
    #[error("recurrence starts ({starts}) after it ends ({until})")]
    EmptyRange { starts: Period, until: Period },
    #[error("template {template} was removed; mark it inactive instead")]
    TemplateRemoved { template: String },
}

/// Monthly recurrence with an optional day-of-month anchor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recurrence {
    /// Day of month on which scheduled generation becomes due (clamped to the
    /// month's length). Defaults to the 1st.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_day: Option<u32>,
    /// First period the process recurs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts: Option<Period>,
    /// Last period the process recurs in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Period>,
}

impl Recurrence {
    pub fn validate(&self) -> Result<(), ProcessSpecError> {
        if let Some(day) = self.anchor_day {
            if !(1..=31).contains(&day) {
                return Err(ProcessSpecError::AnchorOutOfRange(day));
            }
        }
        if let (Some(starts), Some(until)) = (self.starts, self.until) {
            if starts > until {
                return Err(ProcessSpecError::EmptyRange { starts, until });
            }
        }
        Ok(())
    }

    /// Whether the process recurs in `period`
    pub fn covers(&self, period: Period) -> bool {
        self.starts.map_or(true, |s| period >= s) && self.until.map_or(true, |u| period <= u)
    }

    /// Day of `period` on which generation becomes due
    pub fn due_day(&self, period: Period) -> u32 {
        period.clamp_day(self.anchor_day.unwrap_or(1))
    }

    /// Whether scheduled generation for the period containing `now` is due
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let period = Period::containing(now);
        self.covers(period) && now.day() >= self.due_day(period)
    }
}

/// A task blueprint inside a process version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: TemplateId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide: Option<String>,
    pub required: bool,
    /// Initial status for generated instances; catalog default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_status: Option<StatusId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptRef>,
    /// Inactive templates are kept for history but no longer generated
    pub active: bool,
}

/// One immutable revision of a process type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessVersion {
    pub version: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default guide text, used by templates that carry none
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub recurrence: Recurrence,
    pub templates: Vec<TaskTemplate>,
    #[serde(default)]
    pub scripts: Vec<ScriptRef>,
    pub created_at: DateTime<Utc>,
}

impl ProcessVersion {
    pub fn active_templates(&self) -> impl Iterator<Item = (usize, &TaskTemplate)> {
        self.templates.iter().enumerate().filter(|(_, t)| t.active)
    }

    pub fn template(&self, id: &TemplateId) -> Option<&TaskTemplate> {
        self.templates.iter().find(|t| &t.id == id)
    }

    /// Guide text snapshotted into instances of `template`
    pub fn guide_for(&self, template: &TaskTemplate) -> String {
        match &template.guide {
            Some(guide) if !guide.trim().is_empty() => guide.clone(),
            _ => self.guide.clone(),
        }
    }

    /// Compare definitions, ignoring version number and timestamp
    pub fn same_content(&self, other: &ProcessVersion) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.guide == other.guide
            && self.recurrence == other.recurrence
            && self.templates == other.templates
            && self.scripts == other.scripts
    }
}

/// A recurring process definition with its version history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessType {
    pub id: ProcessTypeId,
    pub created_at: DateTime<Utc>,
    /// Soft retirement; process types are never deleted
    #[serde(default)]
    pub retired_at: Option<DateTime<Utc>>,
    pub versions: Vec<ProcessVersion>,
}

impl ProcessType {
    /// The effective (latest) version
    pub fn current(&self) -> Option<&ProcessVersion> {
        self.versions.last()
    }

    pub fn version(&self, version: u32) -> Option<&ProcessVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub fn name(&self) -> &str {
        self.current().map(|v| v.name.as_str()).unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.retired_at.is_none()
    }

    /// Whether an active process recurs in `period`
    pub fn recurs_in(&self, period: Period) -> bool {
        self.is_active()
            && self
                .current()
                .is_some_and(|v| v.recurrence.covers(period))
    }
}

fn default_true() -> bool {
    true
}

/// Administrator input for one task template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Stable id; generated when omitted
    #[serde(default)]
    pub id: Option<TemplateId>,
    pub title: String,
    #[serde(default)]
    pub guide: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Status id or name
    #[serde(default)]
    pub default_status: Option<String>,
    #[serde(default)]
    pub script: Option<ScriptRef>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl TemplateSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            guide: None,
            required: true,
            default_status: None,
            script: None,
            active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<TemplateId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = Some(guide.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default_status(mut self, status: impl Into<String>) -> Self {
        self.default_status = Some(status.into());
        self
    }
}

/// Administrator input for defining or revising a process type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub guide: String,
    #[serde(default)]
    pub recurrence: Recurrence,
    #[serde(default)]
    pub templates: Vec<TemplateSpec>,
    #[serde(default)]
    pub scripts: Vec<ScriptRef>,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            guide: String::new(),
            recurrence: Recurrence::default(),
            templates: Vec::new(),
            scripts: Vec::new(),
        }
    }

    pub fn with_guide(mut self, guide: impl Into<String>) -> Self {
        self.guide = guide.into();
        self
    }

    pub fn with_template(mut self, template: TemplateSpec) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_recurrence(mut self, recurrence: Recurrence) -> Self {
        self.recurrence = recurrence;
        self
    }

    /// Structural checks that need no catalog lookups
    pub fn validate(&self) -> Result<(), ProcessSpecError> {
        if self.name.trim().is_empty() {
            return Err(ProcessSpecError::EmptyName);
        }
        if self.templates.is_empty() {
            return Err(ProcessSpecError::NoTemplates);
        }
        self.recurrence.validate()?;

        let mut seen = HashSet::new();
        for (index, template) in self.templates.iter().enumerate() {
            if template.title.trim().is_empty() {
                return Err(ProcessSpecError::EmptyTitle(index));
            }
            if let Some(id) = &template.id {
                if !seen.insert(id.clone()) {
                    return Err(ProcessSpecError::DuplicateTemplate(id.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Every template of `previous` must survive a revision (possibly
    /// inactive) so existing instances keep a resolvable template.
    pub fn check_revision_of(&self, previous: &ProcessVersion) -> Result<(), ProcessSpecError> {
        for template in &previous.templates {
            let kept = self
                .templates
                .iter()
                .any(|t| t.id.as_ref() == Some(&template.id));
            if !kept {
                return Err(ProcessSpecError::TemplateRemoved {
                    template: template.id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A process definition file: `.wfm/processes/<name>.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: ProcessTypeId,
    #[serde(flatten)]
    pub spec: ProcessSpec,
}

impl ProcessDefinition {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
