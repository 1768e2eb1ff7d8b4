// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine settings and administrator-edited definition files
//!
//! Layout under a project directory:
//!
//! ```text
//! .wfm/
//!   settings.toml
//!   processes/
//!     monthly-report.toml
//! ```

use crate::instance::TaskInstance;
use crate::process::ProcessDefinition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_DIR: &str = ".wfm";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const PROCESSES_DIR: &str = "processes";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid TOML in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scheduler: SchedulerSettings,
    pub audit: AuditSettings,
    pub archive: ArchiveSettings,
    pub notify: NotifySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Run the periodic generation check
    pub auto_generate: bool,
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// How long a caller waits for a contended generation lock
    #[serde(with = "humantime_serde")]
    pub lock_timeout: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            auto_generate: true,
            check_interval: Duration::from_secs(60 * 60),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    /// Entries older than this are pruned wholesale; 0 keeps everything
    pub retention_days: u32,
    pub page_size: usize,
    pub max_page_size: usize,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            retention_days: 365,
            page_size: 50,
            max_page_size: 500,
        }
    }
}

impl AuditSettings {
    /// Clamp a requested page size
    pub fn page_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.page_size)
            .clamp(1, self.max_page_size.max(1))
    }
}

/// Which unfinished instances are carried over automatically at close
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarryOverPolicy {
    /// Only instances carried explicitly beforehand
    #[default]
    None,
    /// Unfinished required instances
    Required,
    /// Every unfinished instance
    All,
}

impl CarryOverPolicy {
    pub fn carries(&self, instance: &TaskInstance) -> bool {
        if instance.is_settled() {
            return false;
        }
        match self {
            CarryOverPolicy::None => false,
            CarryOverPolicy::Required => instance.required,
            CarryOverPolicy::All => true,
        }
    }
}

impl std::str::FromStr for CarryOverPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CarryOverPolicy::None),
            "required" => Ok(CarryOverPolicy::Required),
            "all" => Ok(CarryOverPolicy::All),
            other => Err(format!("unknown carry-over policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub search_limit: usize,
    /// Include the current open period in searches by default
    pub search_include_open: bool,
    pub carry_over: CarryOverPolicy,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            search_limit: 50,
            search_include_open: false,
            carry_over: CarryOverPolicy::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Per-subscriber buffer; the oldest events drop on overflow
    pub buffer: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { buffer: 256 }
    }
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `<project>/.wfm/settings.toml`; a missing file yields defaults
    pub fn load(project: &Path) -> Result<Self, SettingsError> {
        let path = project.join(SETTINGS_DIR).join(SETTINGS_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(SettingsError::Io { path, source }),
        };
        let settings = Self::from_toml(&content).map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.scheduler.check_interval.is_zero() {
            return Err(SettingsError::Invalid(
                "scheduler.check_interval must be positive".to_string(),
            ));
        }
        if self.notify.buffer == 0 {
            return Err(SettingsError::Invalid(
                "notify.buffer must be positive".to_string(),
            ));
        }
        if self.audit.page_size > self.audit.max_page_size {
            return Err(SettingsError::Invalid(
                "audit.page_size exceeds audit.max_page_size".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read every `*.toml` under `<project>/.wfm/processes`, sorted by file name
pub fn load_process_definitions(
    project: &Path,
) -> Result<Vec<(PathBuf, ProcessDefinition)>, SettingsError> {
    let dir = project.join(SETTINGS_DIR).join(PROCESSES_DIR);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(SettingsError::Io { path: dir, source }),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    let mut definitions = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
            path: path.clone(),
            source,
        })?;
        let definition =
            ProcessDefinition::from_toml(&content).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        definitions.push((path, definition));
    }
    Ok(definitions)
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
