// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::{TimeZone, Utc};
use wfm_core::{Period, ProcessTypeId, StatusId};

fn closed(month: u32) -> Operation {
    Operation::PeriodClosed {
        period: Period::new(2024, month).unwrap(),
        at: Utc.with_ymd_and_hms(2024, month + 1, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn wal_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&Operation::StatusDeleted {
            id: StatusId::new("old"),
        })
        .unwrap();
        wal.append(&Operation::ProcessTypeRetired {
            id: ProcessTypeId::new("report"),
            at: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
        })
        .unwrap();
    }

    let ops = Wal::replay(&path).unwrap();
    assert_eq!(ops.len(), 2);
    assert!(matches!(ops[0], Operation::StatusDeleted { .. }));
    assert!(matches!(ops[1], Operation::ProcessTypeRetired { .. }));
}

#[test]
fn wal_sequence_continues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.wal");

    {
        let mut wal = Wal::open(&path).unwrap();
        assert_eq!(wal.sequence(), 0);
        assert_eq!(wal.append(&closed(1)).unwrap(), 1);
    }

    {
        let mut wal = Wal::open(&path).unwrap();
        assert_eq!(wal.sequence(), 1);
        assert_eq!(wal.append(&closed(2)).unwrap(), 2);
    }
}

#[test]
fn wal_replay_nonexistent() {
    let path = Path::new("/nonexistent/path/wal");
    let ops = Wal::replay(path).unwrap();
    assert!(ops.is_empty());
}

#[test]
fn torn_tail_is_truncated_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.wal");
    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&closed(1)).unwrap();
    }
    let valid_len = std::fs::metadata(&path).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"seq\":2,\"op\":{\"op\":\"per").unwrap();
    }

    assert_eq!(Wal::replay(&path).unwrap().len(), 1);

    let mut wal = Wal::open(&path).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);
    assert_eq!(wal.append(&closed(2)).unwrap(), 2);
    assert_eq!(Wal::replay(&path).unwrap(), vec![closed(1), closed(2)]);
}

#[test]
fn checksum_mismatch_stops_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.wal");
    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&closed(1)).unwrap();
        wal.append(&closed(2)).unwrap();
        wal.append(&closed(3)).unwrap();
    }
    let content = std::fs::read_to_string(&path).unwrap();
    let tampered = content.replacen("2024-02", "2024-09", 1);
    std::fs::write(&path, tampered).unwrap();

    assert_eq!(Wal::replay(&path).unwrap(), vec![closed(1)]);
    let wal = Wal::open(&path).unwrap();
    assert_eq!(wal.sequence(), 1);
}

#[test]
fn failed_append_keeps_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.wal");
    let mut wal = Wal::open(&path).unwrap();
    wal.append(&closed(1)).unwrap();

    wal.fail_next_append();
    assert!(wal.append(&closed(2)).is_err());
    assert_eq!(wal.sequence(), 1);

    assert_eq!(wal.append(&closed(3)).unwrap(), 2);
    assert_eq!(Wal::replay(&path).unwrap(), vec![closed(1), closed(3)]);
}
