// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Calendar periods
//!
//! A period is a (year, month) pair: the unit that task instances are
//! generated for and that the archive is organized around. Periods order
//! chronologically and render as `YYYY-MM`.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("month out of range: {0}")]
    MonthOutOfRange(u32),
    #[error("year out of range: {0}")]
    YearOutOfRange(i32),
    #[error("invalid period '{0}': expected YYYY-MM")]
    Parse(String),
}

/// A calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::MonthOutOfRange(month));
        }
        if !(1..=9999).contains(&year) {
            return Err(PeriodError::YearOutOfRange(year));
        }
        Ok(Self { year, month })
    }

    /// The period containing the given instant
    pub fn containing(instant: DateTime<Utc>) -> Self {
        Self {
            year: instant.year(),
            month: instant.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The following calendar month
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// The preceding calendar month
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Number of days in this month
    pub fn days(&self) -> u32 {
        let first = self.first_day();
        let next = self.next().first_day();
        (next - first).num_days() as u32
    }

    /// First calendar day of the month
    pub fn first_day(&self) -> NaiveDate {
        // Year and month are validated on construction.
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Clamp a day-of-month anchor to this month (e.g. 31 → 29 in Feb 2024)
    pub fn clamp_day(&self, day: u32) -> u32 {
        day.clamp(1, self.days())
    }

    /// Signed distance in months from `other` to `self`
    pub fn months_since(&self, other: &Period) -> i64 {
        (self.year as i64 - other.year as i64) * 12 + (self.month as i64 - other.month as i64)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    /// Accepts `YYYY-MM`, `YYYY/MM` and single-digit months
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (year, month) = trimmed
            .split_once(['-', '/'])
            .ok_or_else(|| PeriodError::Parse(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| PeriodError::Parse(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| PeriodError::Parse(s.to_string()))?;
        Period::new(year, month)
    }
}

impl TryFrom<String> for Period {
    type Error = PeriodError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}

/// Lifecycle state of a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodState {
    /// Current or future period, instances are mutable
    Open,
    /// A later period has been generated and this one is fully past
    Eligible,
    /// Archived; instances are immutable
    Closed,
}

/// Bookkeeping for a period the engine has seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub period: Period,
    pub state: PeriodState,
    /// When scheduled generation first ran for this period
    pub generated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl PeriodRecord {
    pub fn open(period: Period) -> Self {
        Self {
            period,
            state: PeriodState::Open,
            generated_at: None,
            closed_at: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == PeriodState::Closed
    }
}

#[cfg(test)]
#[path = "period_tests.rs"]
mod tests;
