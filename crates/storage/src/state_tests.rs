// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::Wal;
use proptest::prelude::*;
use wfm_core::test_support::{day, instance, period, status};
use wfm_core::{ProcessVersion, Recurrence, TaskTemplate, TemplateId};

fn version(n: u32, name: &str, default_status: Option<&str>) -> ProcessVersion {
    ProcessVersion {
        version: n,
        name: name.to_string(),
        description: None,
        guide: String::new(),
        recurrence: Recurrence::default(),
        templates: vec![TaskTemplate {
            id: TemplateId::new("draft"),
            title: "Draft".to_string(),
            guide: None,
            required: true,
            default_status: default_status.map(StatusId::new),
            script: None,
            active: true,
        }],
        scripts: Vec::new(),
        created_at: day(2024, 1, 1),
    }
}

fn seeded() -> MaterializedState {
    MaterializedState::from_ops(&[
        Operation::StatusUpsert {
            status: status("pending", 0, false),
        },
        Operation::StatusUpsert {
            status: status("done", 1, true),
        },
        Operation::ProcessTypeVersioned {
            process_type_id: ProcessTypeId::new("report"),
            created_at: day(2024, 1, 1),
            version: version(1, "Monthly Report", None),
        },
    ])
}

#[test]
fn statuses_reorder_and_delete() {
    let mut state = seeded();
    assert_eq!(state.default_status().unwrap().id, StatusId::new("pending"));

    state.apply(&Operation::StatusesReordered {
        order: vec![StatusId::new("done"), StatusId::new("pending")],
    });
    let order: Vec<_> = state.sorted_statuses().iter().map(|s| s.id.to_string()).collect();
    assert_eq!(order, vec!["done", "pending"]);

    state.apply(&Operation::StatusDeleted {
        id: StatusId::new("done"),
    });
    assert_eq!(state.statuses.len(), 1);
}

#[test]
fn process_versions_accumulate() {
    let mut state = seeded();
    state.apply(&Operation::ProcessTypeVersioned {
        process_type_id: ProcessTypeId::new("report"),
        created_at: day(2024, 2, 1),
        version: version(2, "Monthly Summary", Some("pending")),
    });
    let process = &state.process_types[&ProcessTypeId::new("report")];
    assert_eq!(process.versions.len(), 2);
    assert_eq!(process.created_at, day(2024, 1, 1));
    assert_eq!(process.name(), "Monthly Summary");
    assert_eq!(
        state.templates_using(&StatusId::new("pending")),
        vec![(ProcessTypeId::new("report"), "draft".to_string())]
    );

    state.apply(&Operation::ProcessTypeRetired {
        id: ProcessTypeId::new("report"),
        at: day(2024, 3, 1),
    });
    assert!(!state.process_types[&ProcessTypeId::new("report")].is_active());
    assert!(state.templates_using(&StatusId::new("pending")).is_empty());
}

#[test]
fn generation_never_duplicates_keys() {
    let mut state = seeded();
    let first = instance("i-1", "report", "2024-03", "draft");
    let mut duplicate = instance("i-2", "report", "2024-03", "draft");
    duplicate.title = "Duplicate".to_string();

    state.apply(&Operation::InstancesGenerated {
        period: period("2024-03"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 3, 1),
        instances: vec![first.clone()],
    });
    state.apply(&Operation::InstancesGenerated {
        period: period("2024-03"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 3, 2),
        instances: vec![duplicate],
    });

    assert_eq!(state.instances.len(), 1);
    assert_eq!(state.instance_by_key(&first.key), Some(&first));
    assert_eq!(
        state.periods[&period("2024-03")].generated_at,
        Some(day(2024, 3, 1))
    );
}

#[test]
fn period_states_progress() {
    let mut state = seeded();
    let march = period("2024-03");
    assert_eq!(state.period_state(march), PeriodState::Open);

    state.apply(&Operation::PeriodMarkedEligible { period: march });
    assert_eq!(state.period_state(march), PeriodState::Eligible);

    state.apply(&Operation::PeriodClosed {
        period: march,
        at: day(2024, 4, 2),
    });
    assert!(state.is_closed(march));
    assert_eq!(state.closed_periods().collect::<Vec<_>>(), vec![march]);

    // Eligibility never reopens a closed period
    state.apply(&Operation::PeriodMarkedEligible { period: march });
    assert!(state.is_closed(march));
}

#[test]
fn carry_over_links_both_instances() {
    let mut state = seeded();
    let review = instance("i-1", "report", "2024-03", "review");
    state.apply(&Operation::InstancesGenerated {
        period: period("2024-03"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 3, 1),
        instances: vec![review.clone()],
    });

    let mut from = review.clone();
    from.carried_over_to = Some(InstanceId::new("i-2"));
    let mut successor = instance("i-2", "report", "2024-04", "review");
    successor.carried_from = Some(review.id.clone());
    state.apply(&Operation::CarriedOver {
        from,
        to: successor,
    });

    assert!(state.instances[&InstanceId::new("i-1")].is_carried_over());
    assert_eq!(
        state.instances[&InstanceId::new("i-2")].carried_from,
        Some(InstanceId::new("i-1"))
    );
    assert!(state.periods.contains_key(&period("2024-04")));
    assert_eq!(state.instances_in(period("2024-04")).len(), 1);
}

#[test]
fn resolve_by_id_name_and_prefix() {
    let mut state = seeded();
    state.apply(&Operation::InstancesGenerated {
        period: period("2024-03"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 3, 1),
        instances: vec![
            instance("abc-1", "report", "2024-03", "draft"),
            instance("abd-2", "report", "2024-03", "review"),
        ],
    });

    assert!(matches!(state.resolve_status("DONE"), Resolve::Found(s) if s.id.as_str() == "done"));
    assert!(matches!(state.resolve_status("pen"), Resolve::Found(_)));
    assert_eq!(state.resolve_status("nope"), Resolve::Missing);
    assert!(matches!(
        state.resolve_process_type("monthly report"),
        Resolve::Found(p) if p.id.as_str() == "report"
    ));
    assert!(matches!(state.resolve_instance("abc"), Resolve::Found(i) if i.id.as_str() == "abc-1"));
    assert_eq!(state.resolve_instance("ab"), Resolve::Ambiguous(2));
    assert_eq!(state.resolve_instance(""), Resolve::Missing);
}

#[test]
fn status_usage_counts_instances() {
    let mut state = seeded();
    state.apply(&Operation::InstancesGenerated {
        period: period("2024-03"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 3, 1),
        instances: vec![instance("i-1", "report", "2024-03", "draft")],
    });
    assert_eq!(state.status_usage(&StatusId::new("pending")), 1);
    assert_eq!(state.status_usage(&StatusId::new("done")), 0);
}

#[test]
fn carry_over_into_existing_successor_replaces_it() {
    let mut state = seeded();
    state.apply(&Operation::InstancesGenerated {
        period: period("2024-04"),
        process_type_id: ProcessTypeId::new("report"),
        at: day(2024, 4, 1),
        instances: vec![instance("i-9", "report", "2024-04", "review")],
    });

    let mut from = instance("i-1", "report", "2024-03", "review");
    from.carried_over_to = Some(InstanceId::new("i-9"));
    let mut existing = instance("i-9", "report", "2024-04", "review");
    existing.carried_from = Some(InstanceId::new("i-1"));
    state.apply(&Operation::CarriedOver { from, to: existing });

    assert_eq!(state.instances_in(period("2024-04")).len(), 1);
    assert_eq!(
        state.instances[&InstanceId::new("i-9")].carried_from,
        Some(InstanceId::new("i-1"))
    );
}

/// Generation and period bookkeeping for March to May 2024
fn period_op(index: usize, kind: u8, month: u32, template: u8) -> Operation {
    let p = period(&format!("2024-{:02}", month));
    match kind {
        0 => Operation::InstancesGenerated {
            period: p,
            process_type_id: ProcessTypeId::new("report"),
            at: day(2024, month, 1),
            instances: vec![instance(
                &format!("i-{}", index),
                "report",
                &p.to_string(),
                &format!("t{}", template),
            )],
        },
        1 => Operation::PeriodMarkedEligible { period: p },
        _ => Operation::PeriodClosed {
            period: p,
            at: day(2024, month + 1, 1),
        },
    }
}

proptest! {
    #[test]
    fn replayed_wal_matches_applied_state(
        steps in proptest::collection::vec((0u8..3, 3u32..=5, 0u8..3), 1..30)
    ) {
        let ops: Vec<Operation> = steps
            .iter()
            .enumerate()
            .map(|(i, &(kind, month, template))| period_op(i, kind, month, template))
            .collect();
        let applied = MaterializedState::from_ops(&ops);

        // One instance per key, and the index agrees with the instances
        prop_assert_eq!(applied.by_key.len(), applied.instances.len());
        for (key, id) in &applied.by_key {
            prop_assert_eq!(&applied.instances[id].key, key);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.wal");
        {
            let mut wal = Wal::open(&path).unwrap();
            for op in &ops {
                wal.append(op).unwrap();
            }
        }
        let replayed = MaterializedState::from_ops(&Wal::replay(&path).unwrap());
        prop_assert_eq!(&replayed.instances, &applied.instances);
        prop_assert_eq!(&replayed.periods, &applied.periods);

        for op in &ops {
            if let Operation::PeriodClosed { period, .. } = op {
                prop_assert!(applied.is_closed(*period));
            }
        }
    }
}
