// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol between the `wfm` CLI and `wfmd`.
//!
//! Every message is a JSON document preceded by its length as a 4-byte
//! big-endian integer. A connection carries one request and one response,
//! except `Subscribe`, which keeps the connection open and streams
//! `Notification` responses until either side hangs up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use wfm_core::{
    ActionKind, Actor, AttachmentRef, AuditFilter, AuditPage, Comment, EmailRef, EntityKind,
    Event, EventPattern, Period, ProcessSpec, ProcessType, Status, StatusPatch, StatusSpec,
    TaskInstance,
};
use wfm_engine::{
    ArchiveTree, ChainReport, CloseReport, EngineStats, ErrorKind, GenerationReport,
    InstanceQuery, PeriodInfo, SearchHit, SearchScope, YearSummary,
};

/// Bumped whenever a request or response shape changes incompatibly
pub const PROTOCOL_VERSION: &str = "1";

/// Upper bound for reading a request or writing a response
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Messages larger than this are rejected before allocation
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Requests from CLI to daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Ping,
    Hello {
        version: String,
    },
    Status,
    Shutdown,

    ListInstances {
        #[serde(default)]
        query: InstanceQuery,
    },
    GetInstance {
        id: String,
    },
    InstanceHistory {
        id: String,
        #[serde(default)]
        offset: usize,
        #[serde(default)]
        limit: Option<usize>,
    },
    Transition {
        id: String,
        status: String,
        actor: Actor,
    },
    AddComment {
        id: String,
        body: String,
        actor: Actor,
    },
    DeleteComment {
        id: String,
        comment_id: String,
        actor: Actor,
    },
    AttachFile {
        id: String,
        attachment: AttachmentRef,
        actor: Actor,
    },
    DetachFile {
        id: String,
        attachment_id: String,
        actor: Actor,
    },
    LinkEmail {
        id: String,
        email: EmailRef,
        actor: Actor,
    },
    UnlinkEmail {
        id: String,
        email_id: String,
        actor: Actor,
    },
    CarryOver {
        id: String,
        actor: Actor,
    },

    /// Generate a period; `None` means the current one
    Generate {
        #[serde(default)]
        period: Option<Period>,
        actor: Actor,
    },
    ListPeriods,
    ClosePeriod {
        period: Period,
        actor: Actor,
    },

    ListStatuses,
    CreateStatus {
        spec: StatusSpec,
        actor: Actor,
    },
    UpdateStatus {
        status: String,
        patch: StatusPatch,
        actor: Actor,
    },
    ReorderStatuses {
        order: Vec<String>,
        actor: Actor,
    },
    RetireStatus {
        status: String,
        actor: Actor,
    },
    DeleteStatus {
        status: String,
        actor: Actor,
    },

    ListProcessTypes,
    GetProcessType {
        id: String,
    },
    DefineProcessType {
        spec: ProcessSpec,
        actor: Actor,
    },
    ReviseProcessType {
        id: String,
        spec: ProcessSpec,
        actor: Actor,
    },
    RetireProcessType {
        id: String,
        actor: Actor,
    },

    Browse {
        #[serde(default)]
        year: Option<i32>,
        #[serde(default)]
        month: Option<u32>,
        #[serde(default)]
        process_type: Option<String>,
    },
    ArchiveSummaries,
    Search {
        query: String,
        #[serde(default)]
        scope: SearchScope,
    },
    InvalidateArchive {
        period: Period,
    },

    QueryAudit {
        #[serde(default)]
        filter: AuditFilter,
    },
    AuditKinds,
    VerifyAudit,
    PruneAudit {
        actor: Actor,
    },

    /// Keep the connection open and stream matching events
    Subscribe {
        patterns: Vec<EventPattern>,
    },
}

/// Responses from daemon to CLI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello {
        version: String,
    },
    Status {
        uptime_secs: u64,
        stats: EngineStats,
    },
    ShuttingDown,

    Instances {
        instances: Vec<TaskInstance>,
    },
    Instance {
        instance: Box<TaskInstance>,
    },
    Comment {
        comment: Comment,
    },
    Attachment {
        attachment: AttachmentRef,
    },
    Email {
        email: EmailRef,
    },

    Generation {
        report: GenerationReport,
    },
    Periods {
        periods: Vec<PeriodInfo>,
    },
    Closed {
        report: CloseReport,
    },

    Statuses {
        statuses: Vec<Status>,
    },
    WorkflowStatus {
        status: Status,
    },

    ProcessTypes {
        process_types: Vec<ProcessType>,
    },
    ProcessType {
        process_type: Box<ProcessType>,
    },

    Archive {
        tree: ArchiveTree,
    },
    Summaries {
        years: Vec<YearSummary>,
    },
    SearchResults {
        hits: Vec<SearchHit>,
    },

    Audit {
        page: AuditPage,
    },
    AuditKinds {
        actions: Vec<ActionKind>,
        entities: Vec<EntityKind>,
    },
    AuditVerified {
        report: ChainReport,
    },
    Pruned {
        removed: usize,
    },

    Subscribed,
    Notification {
        event: Event,
    },

    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }
}

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message of {0} bytes exceeds the size limit")]
    MessageTooLarge(usize),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timed out")]
    Timeout,
}

/// Serialize a message to JSON (no length prefix)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(message)?)
}

/// Deserialize a message from JSON (no length prefix)
pub fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write `data` preceded by its 4-byte big-endian length
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), ProtocolError> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(data.len()));
    }
    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(ProtocolError::ConnectionClosed);
        }
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::MessageTooLarge(len));
    }

    let mut buffer = vec![0u8; len];
    reader.read_exact(&mut buffer).await?;
    Ok(buffer)
}

/// Read and decode a request within `timeout`
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Request, ProtocolError> {
    let bytes = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| ProtocolError::Timeout)??;
    decode(&bytes)
}

/// Encode and write a response within `timeout`
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let bytes = encode(response)?;
    tokio::time::timeout(timeout, write_message(writer, &bytes))
        .await
        .map_err(|_| ProtocolError::Timeout)?
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
