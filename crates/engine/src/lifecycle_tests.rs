// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{alice, march, Harness};
use crate::ErrorKind;
use similar_asserts::assert_eq;
use wfm_core::test_support::period;
use wfm_core::Settings;

async fn generated() -> Harness {
    let h = Harness::new().await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    h
}

fn attachment(id: &str, filename: &str) -> AttachmentRef {
    AttachmentRef {
        id: id.to_string(),
        filename: filename.to_string(),
        size: 1024,
    }
}

#[tokio::test]
async fn terminal_transition_sets_completed_at_only_on_that_instance() {
    let h = generated().await;
    let draft = h.instance(march(), "Draft");

    h.clock.advance(chrono::Duration::hours(3));
    let done = h
        .engine
        .transition(draft.id.as_str(), "Done", &alice())
        .await
        .unwrap();

    assert_eq!(done.status.as_str(), "done");
    assert_eq!(done.completed_at, Some(h.engine.now()));
    assert_eq!(done.started_at, Some(h.engine.now()));
    assert!(h.instance(march(), "Review").completed_at.is_none());
}

#[tokio::test]
async fn every_transition_adds_exactly_one_audit_entry() {
    let h = generated().await;
    let draft = h.instance(march(), "Draft");
    let id = draft.id.as_str();

    for status in ["In Progress", "Review", "Done", "Pending", "Done"] {
        let before = h.engine.audit_count_for(id);
        h.engine.transition(id, status, &alice()).await.unwrap();
        assert_eq!(h.engine.audit_count_for(id), before + 1);
    }
}

#[tokio::test]
async fn reopening_clears_completion_and_is_audited_as_reopen() {
    let h = generated().await;
    let id = h.instance(march(), "Draft").id;

    h.engine.transition(id.as_str(), "Done", &alice()).await.unwrap();
    let reopened = h
        .engine
        .transition(id.as_str(), "In Progress", &alice())
        .await
        .unwrap();
    assert!(reopened.completed_at.is_none());

    let history = h.engine.instance_history(id.as_str(), 0, None).unwrap();
    assert_eq!(history.entries[0].action, ActionKind::Reopened);
    assert_eq!(history.entries[1].action, ActionKind::StatusChanged);
    assert_eq!(history.entries[2].action, ActionKind::TasksGenerated);
}

#[tokio::test]
async fn invalid_or_same_status_is_rejected_without_audit() {
    let h = generated().await;
    let id = h.instance(march(), "Draft").id;
    let before = h.engine.audit_count_for(id.as_str());

    let err = h
        .engine
        .transition(id.as_str(), "Shipped", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .transition(id.as_str(), "Pending", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .transition("nope", "Done", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    assert_eq!(h.engine.audit_count_for(id.as_str()), before);
}

#[tokio::test]
async fn transition_publishes_status_event() {
    let h = generated().await;
    let mut sub = h
        .engine
        .subscribe(vec![wfm_core::EventPattern::new("task:status")]);
    let id = h.instance(march(), "Draft").id;

    h.engine.transition(id.as_str(), "Done", &alice()).await.unwrap();

    let event = sub.try_recv().unwrap();
    assert_eq!(
        event,
        Event::StatusChanged {
            instance_id: id,
            period: march(),
            from: StatusId::new("pending"),
            to: StatusId::new("done"),
            terminal: true,
            actor: "alice".to_string(),
        }
    );
    assert!(sub.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_comments_are_all_kept() {
    let h = generated().await;
    let id = h.instance(march(), "Draft").id;

    let handles: Vec<_> = (0..10)
        .map(|n| {
            let engine = h.engine.clone();
            let id = id.clone();
            tokio::spawn(async move {
                engine
                    .add_comment(id.as_str(), &format!("note {}", n), &alice())
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let instance = h.engine.get_instance(id.as_str()).unwrap();
    assert_eq!(instance.comments.len(), 10);
    assert_eq!(h.engine.audit_count_for(id.as_str()), 11);
}

#[tokio::test]
async fn comments_soft_delete() {
    let h = generated().await;
    let id = h.instance(march(), "Draft").id;

    let comment = h
        .engine
        .add_comment(id.as_str(), "waiting on finance", &alice())
        .await
        .unwrap();
    assert_eq!(comment.author, "alice");

    let err = h
        .engine
        .add_comment(id.as_str(), "   ", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let deleted = h
        .engine
        .delete_comment(id.as_str(), comment.id.as_str(), &alice())
        .await
        .unwrap();
    assert!(deleted.is_deleted());

    let instance = h.engine.get_instance(id.as_str()).unwrap();
    assert_eq!(instance.comments.len(), 1);
    assert_eq!(instance.live_comments().count(), 0);

    let err = h
        .engine
        .delete_comment(id.as_str(), comment.id.as_str(), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn attachments_and_emails_link_and_unlink() {
    let h = generated().await;
    let id = h.instance(march(), "Draft").id;

    let instance = h
        .engine
        .attach_file(id.as_str(), attachment("att-1", "numbers.xlsx"), &alice())
        .await
        .unwrap();
    assert_eq!(instance.attachments.len(), 1);

    let err = h
        .engine
        .attach_file(id.as_str(), attachment("att-1", "numbers.xlsx"), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let removed = h.engine.detach_file(id.as_str(), "att-1", &alice()).await.unwrap();
    assert_eq!(removed.filename, "numbers.xlsx");
    let err = h
        .engine
        .detach_file(id.as_str(), "att-1", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let email = EmailRef {
        id: "msg-42".to_string(),
        subject: Some("March numbers".to_string()),
    };
    h.engine.link_email(id.as_str(), email, &alice()).await.unwrap();
    let removed = h.engine.unlink_email(id.as_str(), "msg-42", &alice()).await.unwrap();
    assert_eq!(removed.subject.as_deref(), Some("March numbers"));

    // generated + 4 mutations; rejected calls leave no trace
    assert_eq!(h.engine.audit_count_for(id.as_str()), 5);
}

#[tokio::test]
async fn list_filters_by_status_and_unfinished() {
    let h = generated().await;
    let draft = h.instance(march(), "Draft");
    h.engine.transition(draft.id.as_str(), "Done", &alice()).await.unwrap();

    let done = h
        .engine
        .list_instances(&InstanceQuery {
            status: Some("Done".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id, draft.id);

    let open = h
        .engine
        .list_instances(&InstanceQuery {
            process_type: Some("Monthly Report".to_string()),
            unfinished: true,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, "Review");
}

#[tokio::test]
async fn carry_over_creates_linked_successor() {
    let h = generated().await;
    let review = h.instance(march(), "Review");
    h.engine
        .transition(review.id.as_str(), "In Progress", &alice())
        .await
        .unwrap();

    let successor = h.engine.carry_over(review.id.as_str(), &alice()).await.unwrap();
    let april = period("2024-04");
    assert_eq!(successor.period(), april);
    assert_eq!(successor.carried_from.as_ref(), Some(&review.id));
    assert_eq!(successor.status.as_str(), "pending");
    assert_eq!(successor.title, "Review");

    let source = h.engine.get_instance(review.id.as_str()).unwrap();
    assert_eq!(source.carried_over_to.as_ref(), Some(&successor.id));
    assert!(source.is_settled());

    let err = h.engine.carry_over(review.id.as_str(), &alice()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // April generation adopts the carried instance instead of duplicating it
    let report = h.engine.ensure_generated(april, &alice()).await.unwrap();
    assert_eq!(report.created(), 1);
    assert_eq!(h.instance(april, "Review").id, successor.id);
}

#[tokio::test]
async fn carry_over_links_to_existing_successor() {
    let h = generated().await;
    let april = period("2024-04");
    h.engine.ensure_generated(april, &alice()).await.unwrap();
    let existing = h.instance(april, "Review");

    let review = h.instance(march(), "Review");
    let successor = h.engine.carry_over(review.id.as_str(), &alice()).await.unwrap();
    assert_eq!(successor.id, existing.id);
    assert_eq!(successor.carried_from.as_ref(), Some(&review.id));
    let in_april = h
        .engine
        .list_instances(&InstanceQuery {
            period: Some(april),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(in_april.len(), 2);
}

#[tokio::test]
async fn completed_instances_are_not_carried() {
    let h = generated().await;
    let draft = h.instance(march(), "Draft");
    h.engine.transition(draft.id.as_str(), "Done", &alice()).await.unwrap();

    let err = h.engine.carry_over(draft.id.as_str(), &alice()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn closed_period_instances_are_read_only() {
    let mut settings = Settings::default();
    settings.archive.carry_over = wfm_core::CarryOverPolicy::All;
    let h = Harness::with_settings(settings).await;
    h.monthly_report().await;
    h.engine.ensure_generated(march(), &alice()).await.unwrap();
    h.set_day(2024, 4, 2);
    h.engine.close_period(march(), &alice()).await.unwrap();

    let draft = h.instance(march(), "Draft");
    let before = h.engine.audit_count_for(draft.id.as_str());

    let err = h
        .engine
        .transition(draft.id.as_str(), "Done", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = h
        .engine
        .add_comment(draft.id.as_str(), "late note", &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = h
        .engine
        .attach_file(draft.id.as_str(), attachment("a", "late.pdf"), &alice())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(h.engine.audit_count_for(draft.id.as_str()), before);
}
