// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use wfm_core::{InstanceError, ProcessSpecError};
use wfm_storage::{AuditLogError, WalError};

/// Coarse error category exposed to callers and over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    AuditWrite,
    Storage,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AuditWrite => "audit_write",
            ErrorKind::Storage => "storage",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input; nothing was mutated
    #[error("{0}")]
    Validation(String),
    /// The request conflicts with current state; the caller may retry
    #[error("{0}")]
    Conflict(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    /// The audit trail could not be written; the mutation did not commit
    #[error("audit write failed: {0}")]
    AuditWrite(#[source] AuditLogError),
    #[error("storage error: {0}")]
    Storage(#[from] WalError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::AuditWrite(_) => ErrorKind::AuditWrite,
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<ProcessSpecError> for EngineError {
    fn from(e: ProcessSpecError) -> Self {
        EngineError::Validation(e.to_string())
    }
}

impl From<InstanceError> for EngineError {
    fn from(e: InstanceError) -> Self {
        match e {
            InstanceError::CommentNotFound(id) => EngineError::not_found("comment", id),
            InstanceError::AttachmentNotFound(id) => EngineError::not_found("attachment", id),
            InstanceError::EmailNotFound(id) => EngineError::not_found("email", id),
            InstanceError::CommentDeleted(_) => EngineError::Conflict(e.to_string()),
            InstanceError::SameStatus(_)
            | InstanceError::RetiredStatus(_)
            | InstanceError::EmptyComment
            | InstanceError::DuplicateAttachment(_)
            | InstanceError::DuplicateEmail(_) => EngineError::Validation(e.to_string()),
        }
    }
}
