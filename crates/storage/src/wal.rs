// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage
//!
//! One JSON entry per line, each carrying a CRC32 of its serialized
//! operation. Every append is fsync'd before returning. On open, a torn or
//! corrupt tail (from a crash mid-write) is truncated at the last valid
//! entry so later appends never follow garbage.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wfm_core::Operation;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct WalEntry {
    seq: u64,
    op: Operation,
    checksum: u32,
}

impl WalEntry {
    fn new(seq: u64, op: Operation) -> Result<Self, WalError> {
        let checksum = checksum(&op)?;
        Ok(Self { seq, op, checksum })
    }

    fn verify(&self) -> bool {
        checksum(&self.op).is_ok_and(|c| c == self.checksum)
    }
}

fn checksum(op: &Operation) -> Result<u32, WalError> {
    let json = serde_json::to_string(op)?;
    Ok(crc32fast::hash(json.as_bytes()))
}

/// Valid prefix of a WAL file
struct Scan {
    ops: Vec<Operation>,
    last_seq: u64,
    /// Byte length of the valid prefix
    valid_len: u64,
    /// Whether anything followed the valid prefix
    torn: bool,
}

fn scan(path: &Path) -> Result<Scan, WalError> {
    let mut scan = Scan {
        ops: Vec::new(),
        last_seq: 0,
        valid_len: 0,
        torn: false,
    };
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(scan),
        Err(e) => return Err(e.into()),
    };

    let mut reader = BufReader::new(file);
    let mut line = String::new();
    loop {
        line.clear();
        let read = match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(n) => n as u64,
            Err(_) => {
                scan.torn = true;
                break;
            }
        };
        if !line.ends_with('\n') {
            scan.torn = true;
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            scan.valid_len += read;
            continue;
        }
        match serde_json::from_str::<WalEntry>(trimmed) {
            Ok(entry) if entry.verify() && entry.seq > scan.last_seq => {
                scan.last_seq = entry.seq;
                scan.ops.push(entry.op);
                scan.valid_len += read;
            }
            _ => {
                scan.torn = true;
                break;
            }
        }
    }
    Ok(scan)
}

/// Write-ahead log for durable operation storage
pub struct Wal {
    path: PathBuf,
    file: File,
    sequence: u64,
    /// Bytes of the file holding complete entries
    valid_len: u64,
    #[cfg(any(test, feature = "test-support"))]
    fail_next: bool,
}

impl Wal {
    /// Open or create a WAL at the given path, truncating any invalid tail
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let scan = scan(path)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        if scan.torn {
            tracing::warn!(
                path = %path.display(),
                valid_entries = scan.ops.len(),
                "truncating corrupt WAL tail"
            );
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let valid_len = if scan.torn {
            scan.valid_len
        } else {
            file.metadata()?.len()
        };
        Ok(Self {
            path: path.to_path_buf(),
            file,
            sequence: scan.last_seq,
            valid_len,
            #[cfg(any(test, feature = "test-support"))]
            fail_next: false,
        })
    }

    /// Make the next append fail without writing anything
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_next_append(&mut self) {
        self.fail_next = true;
    }

    /// Append an operation to the log; durable once this returns
    pub fn append(&mut self, op: &Operation) -> Result<u64, WalError> {
        let entry = WalEntry::new(self.sequence + 1, op.clone())?;
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        #[cfg(any(test, feature = "test-support"))]
        if std::mem::take(&mut self.fail_next) {
            return Err(io::Error::other("injected WAL write failure").into());
        }

        if self.file.metadata()?.len() != self.valid_len {
            self.file.set_len(self.valid_len)?;
        }
        let written = self
            .file
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_all());
        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(self.valid_len) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %trunc,
                    "failed to roll back partial WAL write"
                );
            }
            return Err(e.into());
        }
        self.valid_len += line.len() as u64;
        self.sequence = entry.seq;
        Ok(self.sequence)
    }

    /// Sequence number of the last appended entry
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replay all valid operations from the log, stopping at the first
    /// corrupt or torn entry
    pub fn replay(path: &Path) -> Result<Vec<Operation>, WalError> {
        Ok(scan(path)?.ops)
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
