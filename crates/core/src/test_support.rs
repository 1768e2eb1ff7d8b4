// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixture builders shared by tests across the workspace

use crate::id::{InstanceId, ProcessTypeId, StatusId, TemplateId};
use crate::instance::{InstanceKey, TaskInstance};
use crate::period::Period;
use crate::status::{Status, DEFAULT_COLOR};
use chrono::{DateTime, TimeZone, Utc};

/// Midnight UTC on the given day, or the epoch when out of range
pub fn day(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Parse `YYYY-MM`; falls back to 2000-01 on bad input
pub fn period(text: &str) -> Period {
    text.parse()
        .unwrap_or_else(|_| Period::containing(day(2000, 1, 1)))
}

pub fn status(id: &str, order: u32, terminal: bool) -> Status {
    Status {
        id: StatusId::new(id),
        name: id.to_string(),
        color: DEFAULT_COLOR.to_string(),
        order,
        terminal,
        active: true,
        created_at: day(2024, 1, 1),
    }
}

/// A pending, untouched instance
pub fn instance(id: &str, process_type: &str, period_text: &str, template: &str) -> TaskInstance {
    let created_at = day(2024, 1, 1);
    TaskInstance {
        id: InstanceId::new(id),
        key: InstanceKey {
            process_type_id: ProcessTypeId::new(process_type),
            period: period(period_text),
            template_id: TemplateId::new(template),
        },
        process_version: 1,
        position: 0,
        title: template.to_string(),
        guide: String::new(),
        required: true,
        script: None,
        status: StatusId::new("pending"),
        initial_status: StatusId::new("pending"),
        created_at,
        started_at: None,
        completed_at: None,
        updated_at: created_at,
        comments: Vec::new(),
        attachments: Vec::new(),
        emails: Vec::new(),
        carried_from: None,
        carried_over_to: None,
    }
}
