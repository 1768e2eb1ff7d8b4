// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{alice, march, Harness};
use chrono::Duration;
use similar_asserts::assert_eq;
use wfm_core::{ActionKind, AuditFilter, AuditPage, EntityKind};

#[tokio::test]
async fn open_on_empty_dir_starts_blank() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(
        dir.path(),
        Settings::default(),
        wfm_core::FakeClock::new(),
        wfm_core::SequentialIdGen::new("id"),
    )
    .unwrap();

    let stats = engine.stats();
    assert_eq!(stats.statuses, 0);
    assert_eq!(stats.instances, 0);
    assert_eq!(stats.audit_entries, 0);
}

#[tokio::test]
async fn reopen_replays_state_and_audit() {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let draft = h.instance(march(), "Draft");
    h.engine.transition(draft.id.as_str(), "Done", &alice()).await.unwrap();

    let before = h.engine.list_instances(&Default::default()).unwrap();
    let audit_before = h.engine.stats().audit_entries;

    let reopened = h.reopen();
    let after = reopened.list_instances(&Default::default()).unwrap();
    assert_eq!(before, after);
    assert_eq!(reopened.stats().audit_entries, audit_before);
    assert_eq!(reopened.list_statuses(), h.engine.list_statuses());
    assert!(reopened.verify_audit().unwrap().first_broken.is_none());
}

#[tokio::test]
async fn stats_count_open_instances_and_subscribers() {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let _sub = h.engine.subscribe(Vec::new());

    let draft = h.instance(march(), "Draft");
    h.engine.transition(draft.id.as_str(), "Done", &alice()).await.unwrap();

    let stats = h.engine.stats();
    assert_eq!(stats.current_period, march());
    assert_eq!(stats.statuses, 4);
    assert_eq!(stats.process_types, 1);
    assert_eq!(stats.instances, 2);
    assert_eq!(stats.open_instances, 1);
    assert_eq!(stats.subscribers, 1);
}

#[tokio::test]
async fn audit_query_filters_by_entity_kind() {
    let h = Harness::new().await;
    h.monthly_report().await;

    let page = h.engine.query_audit(&AuditFilter {
        entity_kind: Some(EntityKind::Status),
        ..AuditFilter::default()
    });
    assert_eq!(page.total, 4);
    assert!(page.entries.iter().all(|e| e.action == ActionKind::StatusCreated));

    let kinds = h.engine.audit_entity_kinds();
    assert!(kinds.contains(&EntityKind::Status));
    assert!(kinds.contains(&EntityKind::ProcessType));
}

#[tokio::test]
async fn prune_removes_entries_past_retention() {
    let mut settings = Settings::default();
    settings.audit.retention_days = 30;
    let h = Harness::with_settings(settings).await;
    let seeded = h.engine.stats().audit_entries;

    h.clock.advance(Duration::days(60));
    h.monthly_report().await;

    let removed = h.engine.prune_audit(&wfm_core::Actor::system()).unwrap();
    assert_eq!(removed, seeded);

    // remaining: the process definition plus the prune marker
    let page = h.engine.query_audit(&AuditFilter::default());
    assert_eq!(page.total, 2);
    assert_eq!(page.entries[0].action, ActionKind::AuditPruned);
    assert!(h.engine.verify_audit().unwrap().first_broken.is_none());
}

#[tokio::test]
async fn prune_keeps_everything_when_retention_is_zero() {
    let mut settings = Settings::default();
    settings.audit.retention_days = 0;
    let h = Harness::with_settings(settings).await;
    h.clock.advance(Duration::days(4000));

    assert_eq!(h.engine.prune_audit(&alice()).unwrap(), 0);
    assert_eq!(h.engine.stats().audit_entries, 4);
}

#[tokio::test]
async fn prune_with_unbounded_retention_keeps_everything() {
    let mut settings = Settings::default();
    settings.audit.retention_days = u32::MAX;
    let h = Harness::with_settings(settings).await;

    assert_eq!(h.engine.prune_audit(&alice()).unwrap(), 0);
    assert_eq!(h.engine.stats().audit_entries, 4);
}

fn aborted(engine: &crate::test_helpers::TestEngine) -> AuditPage {
    engine.query_audit(&AuditFilter {
        action: Some(ActionKind::MutationAborted),
        ..AuditFilter::default()
    })
}

#[tokio::test]
async fn failed_audit_write_applies_nothing() {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let draft = h.instance(march(), "Draft");
    let entries_before = h.engine.stats().audit_entries;

    h.engine.inner.journal.audit().fail_writes_after(0);
    let err = h
        .engine
        .transition(draft.id.as_str(), "Done", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::AuditWrite);

    assert_eq!(h.instance(march(), "Draft"), draft);
    assert_eq!(h.engine.stats().audit_entries, entries_before);
    assert_eq!(aborted(&h.engine).total, 0);

    let reopened = h.reopen();
    let replayed = reopened.get_instance(draft.id.as_str()).unwrap();
    assert_eq!(replayed, draft);
    assert_eq!(reopened.stats().audit_entries, entries_before);
    assert!(reopened.verify_audit().unwrap().is_intact());

    // The next mutation commits normally
    h.engine.transition(draft.id.as_str(), "Done", &alice()).await.unwrap();
    assert!(h.instance(march(), "Draft").is_completed());
}

#[tokio::test]
async fn generation_failing_partway_is_compensated() {
    let h = Harness::new().await;
    h.monthly_report().await;

    // Draft's entry is written, Review's fails
    h.engine.inner.journal.audit().fail_writes_after(1);
    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.created(), 0);
    let failure = report.failures().next().unwrap();
    assert!(matches!(
        failure.outcome,
        crate::GenerationOutcome::Failed {
            kind: crate::ErrorKind::AuditWrite,
            ..
        }
    ));
    assert!(h.engine.list_instances(&Default::default()).unwrap().is_empty());

    let generated = h.engine.query_audit(&AuditFilter {
        action: Some(ActionKind::TasksGenerated),
        ..AuditFilter::default()
    });
    assert_eq!(generated.total, 1);
    let page = aborted(&h.engine);
    assert_eq!(page.total, 1);
    let after = page.entries[0].after.as_ref().unwrap();
    assert_eq!(
        after["aborted_sequence"].as_u64(),
        Some(generated.entries[0].sequence)
    );
    assert!(h.engine.verify_audit().unwrap().is_intact());

    let reopened = h.reopen();
    assert!(reopened.list_instances(&Default::default()).unwrap().is_empty());
    assert_eq!(aborted(&reopened).total, 1);

    // A retry generates both instances
    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.created(), 2);
}

#[tokio::test]
async fn wal_failure_after_audit_is_compensated() {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let draft = h.instance(march(), "Draft");
    let audited_before = h.engine.audit_count_for(draft.id.as_str());

    h.engine.inner.journal.fail_next_wal_append();
    let err = h
        .engine
        .transition(draft.id.as_str(), "Done", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Storage);
    assert_eq!(h.instance(march(), "Draft"), draft);

    // The status change reached the trail, followed by its abort marker
    assert_eq!(h.engine.audit_count_for(draft.id.as_str()), audited_before + 1);
    let page = aborted(&h.engine);
    assert_eq!(page.total, 1);
    let latest = h.engine.query_audit(&AuditFilter::default());
    assert_eq!(latest.entries[0].action, ActionKind::MutationAborted);
    assert_eq!(
        page.entries[0].after.as_ref().unwrap()["aborted_sequence"].as_u64(),
        Some(latest.entries[1].sequence)
    );
    assert_eq!(latest.entries[1].entity.id, draft.id.to_string());

    let reopened = h.reopen();
    assert_eq!(reopened.get_instance(draft.id.as_str()).unwrap(), draft);
    assert!(reopened.verify_audit().unwrap().is_intact());
}

#[test]
fn resolved_maps_ambiguity_to_validation() {
    let err = resolved::<()>(Resolve::Ambiguous(2), "status", "p").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::Validation);

    let err = resolved::<()>(Resolve::Missing, "status", "p").unwrap_err();
    assert_eq!(err.kind(), crate::ErrorKind::NotFound);
}
