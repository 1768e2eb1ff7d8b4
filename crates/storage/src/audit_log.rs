// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hash-chained audit log
//!
//! JSONL file of [`AuditEntry`] records. Each entry stores the hash of its
//! predecessor and a sha256 over that hash plus its own body, so edits or
//! deletions inside the file break the chain. Entries are never rewritten
//! individually; retention drops a whole prefix of old entries at once and
//! records an `audit_pruned` entry naming the last sequence it removed.
//! That entry is the only thing that lets the log start past sequence 1.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wfm_core::{
    ActionKind, Actor, AuditDraft, AuditEntry, AuditFilter, AuditPage, EntityKind, EntityRef,
};

/// `prev_hash` of the first entry ever written
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Hashed portion of an entry
#[derive(Serialize)]
struct Body<'a> {
    sequence: u64,
    at: &'a DateTime<Utc>,
    actor: &'a Actor,
    action: ActionKind,
    entity: &'a EntityRef,
    before: &'a Option<serde_json::Value>,
    after: &'a Option<serde_json::Value>,
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn entry_hash(entry: &AuditEntry) -> Result<String, AuditLogError> {
    let body = serde_json::to_string(&Body {
        sequence: entry.sequence,
        at: &entry.at,
        actor: &entry.actor,
        action: entry.action,
        entity: &entry.entity,
        before: &entry.before,
        after: &entry.after,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(entry.prev_hash.as_bytes());
    hasher.update(body.as_bytes());
    Ok(hex_encode(&hasher.finalize()))
}

/// Result of walking the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub entries: usize,
    /// Sequence of the first entry whose link or hash does not verify
    pub first_broken: Option<u64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.first_broken.is_none()
    }
}

/// Append-only audit trail
///
/// Entries are also held in memory for querying. Sequence order is also
/// time order: an entry's `at` is never earlier than its predecessor's.
pub struct AuditLog {
    path: PathBuf,
    file: File,
    entries: Vec<AuditEntry>,
    last_sequence: u64,
    last_hash: String,
    /// Bytes of the file holding complete entries
    valid_len: u64,
    #[cfg(any(test, feature = "test-support"))]
    fail_after: Option<usize>,
}

impl AuditLog {
    /// Open or create the log; a torn final line is truncated
    pub fn open(path: &Path) -> Result<Self, AuditLogError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let (entries, valid_len, torn) = read_entries(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;
        if torn {
            tracing::warn!(
                path = %path.display(),
                entries = entries.len(),
                "truncating torn audit log tail"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        let last_sequence = entries.last().map(|e| e.sequence).unwrap_or(0);
        let last_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            entries,
            last_sequence,
            last_hash,
            valid_len,
            #[cfg(any(test, feature = "test-support"))]
            fail_after: None,
        })
    }

    /// Let `n` more appends succeed, then fail the next one partway
    /// through its write
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_writes_after(&mut self, n: usize) {
        self.fail_after = Some(n);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Sequence, chain and durably persist an entry
    pub fn append(&mut self, draft: AuditDraft, at: DateTime<Utc>) -> Result<AuditEntry, AuditLogError> {
        let at = match self.entries.last() {
            Some(last) if last.at > at => last.at,
            _ => at,
        };
        let mut entry = AuditEntry {
            sequence: self.last_sequence + 1,
            at,
            actor: draft.actor,
            action: draft.action,
            entity: draft.entity,
            before: draft.before,
            after: draft.after,
            prev_hash: self.last_hash.clone(),
            hash: String::new(),
        };
        entry.hash = entry_hash(&entry)?;

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        self.write_line(line.as_bytes())?;

        self.last_sequence = entry.sequence;
        self.last_hash = entry.hash.clone();
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Write and fsync one line. On failure the file is cut back to its
    /// last complete entry so the next append does not follow a fragment.
    fn write_line(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.file.metadata()?.len() != self.valid_len {
            self.file.set_len(self.valid_len)?;
        }
        match self.write_and_sync(bytes) {
            Ok(()) => {
                self.valid_len += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(trunc) = self.file.set_len(self.valid_len) {
                    tracing::error!(
                        path = %self.path.display(),
                        error = %trunc,
                        "failed to roll back partial audit write"
                    );
                }
                Err(e)
            }
        }
    }

    fn write_and_sync(&mut self, bytes: &[u8]) -> io::Result<()> {
        #[cfg(any(test, feature = "test-support"))]
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                self.file.write_all(&bytes[..bytes.len() / 2])?;
                return Err(io::Error::other("injected audit write failure"));
            }
            Some(n) => self.fail_after = Some(n - 1),
            None => {}
        }
        self.file.write_all(bytes)?;
        self.file.sync_all()
    }

    /// Matching entries, newest first by sequence, one page at a time
    pub fn query(&self, filter: &AuditFilter, limit: usize) -> AuditPage {
        let matching: Vec<&AuditEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .collect();
        let total = matching.len();
        let entries = matching
            .into_iter()
            .skip(filter.offset)
            .take(limit)
            .cloned()
            .collect();
        AuditPage {
            entries,
            total,
            offset: filter.offset,
            limit,
        }
    }

    /// Distinct action kinds present in the log
    pub fn action_kinds(&self) -> Vec<ActionKind> {
        let kinds: BTreeSet<ActionKind> = self.entries.iter().map(|e| e.action).collect();
        kinds.into_iter().collect()
    }

    /// Distinct entity kinds present in the log
    pub fn entity_kinds(&self) -> Vec<EntityKind> {
        let kinds: BTreeSet<EntityKind> = self.entries.iter().map(|e| e.entity.kind).collect();
        kinds.into_iter().collect()
    }

    pub fn entries_for(&self, entity_id: &str) -> usize {
        self.entries.iter().filter(|e| e.entity.id == entity_id).count()
    }

    /// Re-read the file and check every link and hash
    pub fn verify(&self) -> Result<ChainReport, AuditLogError> {
        let (entries, _, _) = read_entries(&self.path)?;
        Ok(verify_chain(&entries))
    }

    /// Drop every entry older than `cutoff` and record the pruning.
    ///
    /// The remaining entries are written to a temporary file which then
    /// replaces the log, so a crash leaves either the old or the new file.
    /// Returns the number of entries removed.
    pub fn prune(
        &mut self,
        cutoff: DateTime<Utc>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<usize, AuditLogError> {
        let removed = self.entries.iter().take_while(|e| e.at < cutoff).count();
        if removed == 0 {
            return Ok(0);
        }
        let last_removed = self.entries[removed - 1].sequence;

        let tmp = self.path.with_extension("jsonl.tmp");
        let mut written = 0u64;
        {
            let mut out = File::create(&tmp)?;
            for entry in &self.entries[removed..] {
                let mut line = serde_json::to_string(entry)?;
                line.push('\n');
                out.write_all(line.as_bytes())?;
                written += line.len() as u64;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        self.file = OpenOptions::new().append(true).read(true).open(&self.path)?;
        self.valid_len = written;
        self.entries.drain(..removed);

        self.append(prune_draft(actor, removed, last_removed, cutoff), now)?;
        Ok(removed)
    }
}

fn prune_draft(actor: &Actor, removed: usize, through: u64, cutoff: DateTime<Utc>) -> AuditDraft {
    let mut draft = AuditDraft::new(
        actor,
        ActionKind::AuditPruned,
        EntityRef::new(EntityKind::Audit, "log"),
    );
    draft.after = Some(serde_json::json!({
        "removed": removed,
        "through_sequence": through,
        "cutoff": cutoff,
    }));
    draft
}

/// Sequence an `audit_pruned` entry says the log now starts at
fn pruned_anchor(entry: &AuditEntry) -> Option<u64> {
    if entry.action != ActionKind::AuditPruned {
        return None;
    }
    entry
        .after
        .as_ref()?
        .get("through_sequence")?
        .as_u64()
        .map(|through| through + 1)
}

/// Check links between consecutive entries.
///
/// The first entry must be the genesis entry, or the start of the log
/// recorded by a retained `audit_pruned` entry. A log missing its head
/// without such a record is broken at its first entry.
fn verify_chain(entries: &[AuditEntry]) -> ChainReport {
    let anchor = entries.first().map(|e| e.sequence);
    let pruned_to_anchor = entries
        .iter()
        .filter_map(pruned_anchor)
        .any(|start| Some(start) == anchor);

    let mut prev: Option<&AuditEntry> = None;
    for entry in entries {
        let linked = match prev {
            Some(p) => entry.prev_hash == p.hash && entry.sequence == p.sequence + 1,
            None if entry.sequence == 1 => entry.prev_hash == GENESIS_HASH,
            None => pruned_to_anchor,
        };
        let hashed = entry_hash(entry).is_ok_and(|h| h == entry.hash);
        if !linked || !hashed {
            return ChainReport {
                entries: entries.len(),
                first_broken: Some(entry.sequence),
            };
        }
        prev = Some(entry);
    }
    ChainReport {
        entries: entries.len(),
        first_broken: None,
    }
}

/// Parse entries up to the first unreadable line.
/// Returns the entries, the byte length of that valid prefix, and whether
/// anything followed it.
fn read_entries(path: &Path) -> Result<(Vec<AuditEntry>, u64, bool), AuditLogError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0, false)),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut valid_len = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(0) => return Ok((entries, valid_len, false)),
            Ok(n) => n as u64,
            Err(_) => return Ok((entries, valid_len, true)),
        };
        if !line.ends_with('\n') {
            return Ok((entries, valid_len, true));
        }
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            match serde_json::from_str::<AuditEntry>(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(_) => return Ok((entries, valid_len, true)),
            }
        }
        valid_len += read;
    }
}

#[cfg(test)]
#[path = "audit_log_tests.rs"]
mod tests;
