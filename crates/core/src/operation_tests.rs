// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn operations_are_tagged() {
    let op = Operation::PeriodClosed {
        period: "2024-03".parse().unwrap(),
        at: Utc.with_ymd_and_hms(2024, 4, 2, 0, 0, 0).unwrap(),
    };
    let json = serde_json::to_value(&op).unwrap();
    assert_eq!(json["op"], "period_closed");
    assert_eq!(json["period"], "2024-03");
    assert_eq!(op.name(), "period_closed");

    let back: Operation = serde_json::from_value(json).unwrap();
    assert_eq!(back, op);
}

#[test]
fn reorder_keeps_id_order() {
    let op = Operation::StatusesReordered {
        order: vec![StatusId::new("b"), StatusId::new("a")],
    };
    let line = serde_json::to_string(&op).unwrap();
    assert_eq!(line, r#"{"op":"statuses_reordered","order":["b","a"]}"#);
}
