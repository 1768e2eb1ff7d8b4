// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{alice, march, Harness};
use crate::InstanceQuery;
use similar_asserts::assert_eq;
use std::time::Duration;
use wfm_core::test_support::period;
use wfm_core::{AuditFilter, ProcessSpec, Recurrence, Settings, TemplateSpec};

fn ids_in(h: &Harness, p: Period) -> Vec<InstanceId> {
    let mut ids: Vec<InstanceId> = h
        .engine
        .list_instances(&InstanceQuery {
            period: Some(p),
            ..Default::default()
        })
        .unwrap()
        .into_iter()
        .map(|i| i.id)
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn generates_one_pending_instance_per_template() {
    let h = Harness::new().await;
    h.monthly_report().await;

    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.created(), 2);
    assert_eq!(
        report.results[0].outcome,
        GenerationOutcome::Generated {
            created: 2,
            existing: 0
        }
    );

    let draft = h.instance(march(), "Draft");
    let review = h.instance(march(), "Review");
    assert_eq!(draft.status.as_str(), "pending");
    assert_eq!(review.status.as_str(), "pending");
    assert_eq!((draft.position, review.position), (0, 1));
    assert_eq!(draft.guide, "Compile the monthly numbers");
    assert!(draft.completed_at.is_none());

    assert_eq!(h.engine.audit_count_for(draft.id.as_str()), 1);
    let page = h.engine.query_audit(&AuditFilter {
        action: Some(ActionKind::TasksGenerated),
        ..AuditFilter::default()
    });
    assert_eq!(page.total, 2);
}

#[tokio::test]
async fn second_run_creates_nothing() {
    let h = Harness::new().await;
    h.monthly_report().await;

    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let first = ids_in(&h, march());
    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();

    assert_eq!(report.created(), 0);
    assert_eq!(
        report.results[0].outcome,
        GenerationOutcome::Generated {
            created: 0,
            existing: 2
        }
    );
    assert_eq!(ids_in(&h, march()), first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_never_duplicate() {
    let h = Harness::new().await;
    h.monthly_report().await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.ensure_generated(march(), &alice()).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        created += handle.await.unwrap().unwrap().created();
    }
    assert_eq!(created, 2);
    assert_eq!(ids_in(&h, march()).len(), 2);

    let reopened = h.reopen();
    let replayed = reopened
        .list_instances(&InstanceQuery {
            period: Some(march()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(replayed.len(), 2);
}

#[tokio::test]
async fn failures_are_isolated_per_process_type() {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine
        .define_process_type(
            None,
            ProcessSpec::new("Payroll")
                .with_template(TemplateSpec::new("Run payroll").with_default_status("Review")),
            &alice(),
        )
        .await
        .unwrap();
    h.engine.retire_status("review", &alice()).await.unwrap();

    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.created(), 2);

    let failures: Vec<&ProcessGeneration> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].process_type_id.as_str(), "payroll");
    assert!(matches!(
        failures[0].outcome,
        GenerationOutcome::Failed {
            kind: ErrorKind::Validation,
            ..
        }
    ));
}

#[tokio::test]
async fn held_generation_lock_reports_conflict() {
    let mut settings = Settings::default();
    settings.scheduler.lock_timeout = Duration::from_millis(20);
    let h = Harness::with_settings(settings).await;
    let process = h.monthly_report().await;

    let _held = h
        .engine
        .inner
        .gen_locks
        .exclusive(&(process.id.clone(), march()))
        .await;
    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();

    assert!(matches!(
        report.results[0].outcome,
        GenerationOutcome::Failed {
            kind: ErrorKind::Conflict,
            ..
        }
    ));
    assert!(ids_in(&h, march()).is_empty());
}

#[tokio::test]
async fn terminal_initial_status_starts_completed() {
    let h = Harness::new().await;
    h.engine
        .define_process_type(
            None,
            ProcessSpec::new("Archive Mail")
                .with_template(TemplateSpec::new("Nothing to do").with_default_status("Done")),
            &alice(),
        )
        .await
        .unwrap();

    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    let instance = h.instance(march(), "Nothing to do");
    assert_eq!(instance.completed_at, Some(instance.created_at));
}

#[tokio::test]
async fn inactive_templates_and_uncovered_periods_are_skipped() {
    let h = Harness::new().await;
    let mut inactive = TemplateSpec::new("Legacy step");
    inactive.active = false;
    h.engine
        .define_process_type(
            None,
            ProcessSpec::new("Quarter Prep")
                .with_template(TemplateSpec::new("Collect"))
                .with_template(inactive)
                .with_recurrence(Recurrence {
                    starts: Some(period("2024-04")),
                    ..Recurrence::default()
                }),
            &alice(),
        )
        .await
        .unwrap();

    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert!(report.results.is_empty());

    let april = period("2024-04");
    let report = h.engine.ensure_generated(april, &alice()).await.unwrap();
    assert_eq!(report.created(), 1);
    assert_eq!(ids_in(&h, april).len(), 1);
}

#[tokio::test]
async fn run_due_waits_for_anchor_day() {
    let h = Harness::new().await;
    h.engine
        .define_process_type(
            None,
            ProcessSpec::new("Close Books")
                .with_template(TemplateSpec::new("Reconcile"))
                .with_recurrence(Recurrence {
                    anchor_day: Some(10),
                    ..Recurrence::default()
                }),
            &alice(),
        )
        .await
        .unwrap();

    let report = h.engine.run_due().await.unwrap();
    assert!(report.results.is_empty());

    h.set_day(2024, 3, 10);
    let report = h.engine.run_due().await.unwrap();
    assert_eq!(report.created(), 1);
    let entries = h.engine.query_audit(&AuditFilter {
        action: Some(ActionKind::TasksGenerated),
        ..AuditFilter::default()
    });
    assert_eq!(entries.entries[0].actor, Actor::system());
}

#[tokio::test]
async fn generating_a_later_period_marks_the_previous_eligible_once() {
    let h = Harness::new().await;
    h.monthly_report().await;
    let february = period("2024-02");

    let report = h.engine.ensure_generated(february, &alice()).await.unwrap();
    assert_eq!(report.marked_eligible, None);

    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.marked_eligible, Some(february));
    let report = h.engine.ensure_generated(march(), &alice()).await.unwrap();
    assert_eq!(report.marked_eligible, None);

    let periods = h.engine.list_periods();
    assert_eq!(periods[0].period, february);
    assert_eq!(periods[0].state, PeriodState::Eligible);
    assert_eq!(periods[1].state, PeriodState::Open);
}

#[tokio::test]
async fn closed_period_cannot_be_generated() {
    let h = Harness::new().await;
    h.monthly_report().await;
    let february = period("2024-02");
    h.engine.ensure_generated(february, &alice()).await.unwrap();
    for instance in h
        .engine
        .list_instances(&InstanceQuery {
            period: Some(february),
            ..Default::default()
        })
        .unwrap()
    {
        h.engine
            .transition(instance.id.as_str(), "Done", &alice())
            .await
            .unwrap();
    }
    h.engine.close_period(february, &alice()).await.unwrap();

    let err = h
        .engine
        .ensure_generated(february, &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}
