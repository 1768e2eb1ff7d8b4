// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use wfm_core::test_support::day;

fn draft(actor: &str, action: ActionKind, id: &str) -> AuditDraft {
    AuditDraft::new(
        &Actor::new(actor),
        action,
        EntityRef::new(EntityKind::Instance, id),
    )
}

fn populated(dir: &Path) -> AuditLog {
    let mut log = AuditLog::open(&dir.join("audit.jsonl")).unwrap();
    log.append(draft("alice", ActionKind::StatusChanged, "i-1"), day(2024, 3, 1))
        .unwrap();
    log.append(draft("bob", ActionKind::CommentAdded, "i-1"), day(2024, 3, 2))
        .unwrap();
    log.append(draft("alice", ActionKind::StatusChanged, "i-2"), day(2024, 3, 3))
        .unwrap();
    log
}

#[test]
fn entries_are_sequenced_and_chained() {
    let dir = tempfile::tempdir().unwrap();
    let log = populated(dir.path());
    let page = log.query(&AuditFilter::default(), 10);
    let sequences: Vec<u64> = page.entries.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![3, 2, 1]);
    assert_eq!(page.entries[2].prev_hash, GENESIS_HASH);
    assert_eq!(page.entries[1].prev_hash, page.entries[2].hash);
    assert_eq!(page.entries[0].hash.len(), 64);
    assert!(log.verify().unwrap().is_intact());
}

#[test]
fn reopen_continues_chain() {
    let dir = tempfile::tempdir().unwrap();
    let last_hash = {
        let log = populated(dir.path());
        log.query(&AuditFilter::default(), 1).entries[0].hash.clone()
    };
    let mut log = AuditLog::open(&dir.path().join("audit.jsonl")).unwrap();
    assert_eq!(log.len(), 3);
    let entry = log
        .append(draft("carol", ActionKind::Reopened, "i-1"), day(2024, 3, 4))
        .unwrap();
    assert_eq!(entry.sequence, 4);
    assert_eq!(entry.prev_hash, last_hash);
}

#[test]
fn query_filters_and_pages() {
    let dir = tempfile::tempdir().unwrap();
    let log = populated(dir.path());

    let alice = AuditFilter {
        actor: Some("alice".to_string()),
        ..AuditFilter::default()
    };
    let page = log.query(&alice, 1);
    assert_eq!(page.total, 2);
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].sequence, 3);

    let second = AuditFilter { offset: 1, ..alice };
    assert_eq!(log.query(&second, 1).entries[0].sequence, 1);

    assert_eq!(log.entries_for("i-1"), 2);
    assert_eq!(
        log.action_kinds(),
        vec![ActionKind::StatusChanged, ActionKind::CommentAdded]
    );
    assert_eq!(log.entity_kinds(), vec![EntityKind::Instance]);
}

#[test]
fn tampering_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let log = populated(dir.path());
    let path = log.path().to_path_buf();
    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replacen("\"bob\"", "\"mallory\"", 1)).unwrap();

    let report = log.verify().unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.first_broken, Some(2));
}

#[test]
fn torn_tail_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = {
        let log = populated(dir.path());
        log.path().to_path_buf()
    };
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{\"sequence\":4,\"at\":").unwrap();
    }
    let mut log = AuditLog::open(&path).unwrap();
    assert_eq!(log.len(), 3);
    let entry = log
        .append(draft("alice", ActionKind::StatusChanged, "i-3"), day(2024, 3, 5))
        .unwrap();
    assert_eq!(entry.sequence, 4);
    assert!(log.verify().unwrap().is_intact());
}

#[test]
fn prune_removes_old_prefix_and_records_it() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());

    let removed = log
        .prune(day(2024, 3, 3), &Actor::system(), day(2024, 3, 10))
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(log.len(), 2);

    let page = log.query(&AuditFilter::default(), 10);
    assert_eq!(page.entries[0].action, ActionKind::AuditPruned);
    assert_eq!(page.entries[0].sequence, 4);
    assert_eq!(page.entries[0].after.as_ref().unwrap()["removed"], 2);
    assert!(log.verify().unwrap().is_intact());

    // Nothing older than the cutoff remains
    assert_eq!(
        log.prune(day(2024, 3, 3), &Actor::system(), day(2024, 3, 11))
            .unwrap(),
        0
    );

    let reopened = AuditLog::open(log.path()).unwrap();
    assert_eq!(reopened.len(), 2);
    assert_eq!(reopened.last_sequence(), 4);
}

#[test]
fn pruning_everything_keeps_numbering() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());
    assert_eq!(
        log.prune(day(2024, 4, 1), &Actor::system(), day(2024, 4, 1))
            .unwrap(),
        3
    );
    assert_eq!(log.len(), 1);
    assert_eq!(log.last_sequence(), 4);
    assert!(log.verify().unwrap().is_intact());
}

fn drop_first_lines(path: &Path, n: usize) {
    let content = std::fs::read_to_string(path).unwrap();
    let kept: String = content.lines().skip(n).map(|l| format!("{}\n", l)).collect();
    std::fs::write(path, kept).unwrap();
}

#[test]
fn removing_the_head_breaks_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let log = populated(dir.path());
    drop_first_lines(log.path(), 1);

    let report = log.verify().unwrap();
    assert_eq!(report.entries, 2);
    assert_eq!(report.first_broken, Some(2));
}

#[test]
fn removing_the_head_after_a_prune_breaks_the_chain() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());
    log.prune(day(2024, 3, 3), &Actor::system(), day(2024, 3, 10))
        .unwrap();
    assert!(log.verify().unwrap().is_intact());

    // The prune record says the log starts at 3; dropping 3 leaves 4 first
    drop_first_lines(log.path(), 1);
    let report = log.verify().unwrap();
    assert_eq!(report.first_broken, Some(4));
}

#[test]
fn failed_append_leaves_no_fragment() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());
    let len_before = std::fs::metadata(log.path()).unwrap().len();

    log.fail_writes_after(0);
    assert!(log
        .append(draft("alice", ActionKind::StatusChanged, "i-3"), day(2024, 3, 4))
        .is_err());
    assert_eq!(std::fs::metadata(log.path()).unwrap().len(), len_before);
    assert_eq!(log.len(), 3);

    let entry = log
        .append(draft("alice", ActionKind::StatusChanged, "i-3"), day(2024, 3, 5))
        .unwrap();
    assert_eq!(entry.sequence, 4);

    let reopened = AuditLog::open(log.path()).unwrap();
    assert_eq!(reopened.len(), 4);
    assert!(reopened.verify().unwrap().is_intact());
}

#[test]
fn append_cuts_a_stray_fragment_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());
    {
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(b"{\"sequence\":4,\"at\":").unwrap();
    }

    log.append(draft("bob", ActionKind::CommentAdded, "i-2"), day(2024, 3, 4))
        .unwrap();

    let reopened = AuditLog::open(log.path()).unwrap();
    assert_eq!(reopened.len(), 4);
    assert_eq!(reopened.last_sequence(), 4);
    assert!(reopened.verify().unwrap().is_intact());
}

#[test]
fn timestamps_follow_sequence_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = populated(dir.path());
    let entry = log
        .append(draft("bob", ActionKind::CommentAdded, "i-2"), day(2024, 3, 1))
        .unwrap();
    assert_eq!(entry.at, day(2024, 3, 3));

    let page = log.query(&AuditFilter::default(), 10);
    assert!(page.entries.windows(2).all(|w| w[0].at >= w[1].at));
    assert!(log.verify().unwrap().is_intact());
}
