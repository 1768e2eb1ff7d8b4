// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Archive index
//!
//! The archive tree is a projection over closed periods. Each month node is
//! built by a pure function of the materialized state and cached against a
//! per-period invalidation token; a closed month is never rebuilt unless its
//! token is bumped.

use crate::engine::{resolved, Engine};
use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use wfm_core::{
    ActionKind, Actor, AuditDraft, Clock, EntityKind, EntityRef, Event, IdGen, InstanceId,
    Operation, Period, PeriodState, ProcessTypeId, TaskInstance,
};
use wfm_storage::MaterializedState;

/// Task counts shown next to each node of the tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total_tasks: usize,
    pub total_completed: usize,
    pub carried_over: usize,
}

impl Totals {
    fn of<'a>(instances: impl IntoIterator<Item = &'a TaskInstance>) -> Self {
        instances.into_iter().fold(Self::default(), |mut t, i| {
            t.total_tasks += 1;
            t.total_completed += usize::from(i.is_completed());
            t.carried_over += usize::from(i.is_carried_over());
            t
        })
    }

    fn add(&mut self, other: &Totals) {
        self.total_tasks += other.total_tasks;
        self.total_completed += other.total_completed;
        self.carried_over += other.carried_over;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessNode {
    pub process_type_id: ProcessTypeId,
    pub name: String,
    #[serde(flatten)]
    pub totals: Totals,
    pub instances: Vec<TaskInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthNode {
    pub period: Period,
    #[serde(flatten)]
    pub totals: Totals,
    pub processes: Vec<ProcessNode>,
}

impl MonthNode {
    /// Copy restricted to one process type
    fn only(&self, process_type_id: &ProcessTypeId) -> MonthNode {
        let processes: Vec<ProcessNode> = self
            .processes
            .iter()
            .filter(|p| &p.process_type_id == process_type_id)
            .cloned()
            .collect();
        let mut totals = Totals::default();
        for process in &processes {
            totals.add(&process.totals);
        }
        MonthNode {
            period: self.period,
            totals,
            processes,
        }
    }

    pub fn instances(&self) -> impl Iterator<Item = &TaskInstance> {
        self.processes.iter().flat_map(|p| p.instances.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearNode {
    pub year: i32,
    #[serde(flatten)]
    pub totals: Totals,
    pub months: Vec<MonthNode>,
}

/// Result of `browse`: years ascending, months ascending within a year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveTree {
    pub years: Vec<YearNode>,
}

impl ArchiveTree {
    pub fn instances(&self) -> impl Iterator<Item = &TaskInstance> {
        self.years
            .iter()
            .flat_map(|y| y.months.iter())
            .flat_map(|m| m.instances())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSummary {
    pub period: Period,
    #[serde(flatten)]
    pub totals: Totals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSummary {
    pub year: i32,
    #[serde(flatten)]
    pub totals: Totals,
    pub months: Vec<MonthSummary>,
}

/// Narrowing for `search`; unset fields fall back to settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchScope {
    /// Also search the current (open) period
    #[serde(default)]
    pub include_open: Option<bool>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Process type id or name
    #[serde(default)]
    pub process_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: usize,
    pub process_name: String,
    pub instance: TaskInstance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReport {
    pub period: Period,
    /// Instances frozen into the archive
    pub archived: usize,
    /// Sources carried into the next period while closing
    pub carried_over: Vec<InstanceId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodInfo {
    pub period: Period,
    pub state: PeriodState,
    pub generated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub closed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub instances: usize,
    pub unfinished: usize,
}

struct CachedMonth {
    token: u64,
    node: Arc<MonthNode>,
}

/// Month nodes keyed by period, each valid for one invalidation token
pub(crate) struct ArchiveCache {
    months: RwLock<HashMap<Period, CachedMonth>>,
    tokens: Mutex<HashMap<Period, u64>>,
    builds: AtomicUsize,
}

impl ArchiveCache {
    pub(crate) fn new() -> Self {
        Self {
            months: RwLock::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            builds: AtomicUsize::new(0),
        }
    }

    fn token(&self, period: Period) -> u64 {
        let tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        tokens.get(&period).copied().unwrap_or(0)
    }

    fn get(&self, period: Period) -> Option<Arc<MonthNode>> {
        let token = self.token(period);
        let months = self.months.read().unwrap_or_else(|e| e.into_inner());
        months
            .get(&period)
            .filter(|cached| cached.token == token)
            .map(|cached| Arc::clone(&cached.node))
    }

    /// Store a node built under `token`; dropped if invalidated meanwhile
    fn store(&self, period: Period, token: u64, node: Arc<MonthNode>) {
        if self.token(period) != token {
            return;
        }
        let mut months = self.months.write().unwrap_or_else(|e| e.into_inner());
        months.insert(period, CachedMonth { token, node });
    }

    fn invalidate(&self, period: Period) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|e| e.into_inner());
        *tokens.entry(period).or_insert(0) += 1;
        drop(tokens);
        let mut months = self.months.write().unwrap_or_else(|e| e.into_inner());
        months.remove(&period);
    }

    /// Number of month builds so far
    pub(crate) fn builds(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }
}

/// Build the month node for `period` from the state
fn build_month(state: &MaterializedState, period: Period) -> MonthNode {
    let mut grouped: BTreeMap<&ProcessTypeId, Vec<TaskInstance>> = BTreeMap::new();
    for instance in state.instances_in(period) {
        grouped
            .entry(instance.process_type_id())
            .or_default()
            .push(instance.clone());
    }

    let processes: Vec<ProcessNode> = grouped
        .into_iter()
        .map(|(id, instances)| ProcessNode {
            process_type_id: id.clone(),
            name: state
                .process_types
                .get(id)
                .map(|p| p.name().to_string())
                .unwrap_or_else(|| id.to_string()),
            totals: Totals::of(&instances),
            instances,
        })
        .collect();
    let mut totals = Totals::default();
    for process in &processes {
        totals.add(&process.totals);
    }
    MonthNode {
        period,
        totals,
        processes,
    }
}

fn group_years(months: Vec<MonthNode>) -> Vec<YearNode> {
    let mut years: Vec<YearNode> = Vec::new();
    for month in months {
        match years.last_mut() {
            Some(year) if year.year == month.period.year() => {
                year.totals.add(&month.totals);
                year.months.push(month);
            }
            _ => years.push(YearNode {
                year: month.period.year(),
                totals: month.totals,
                months: vec![month],
            }),
        }
    }
    years
}

impl<C: Clock, I: IdGen> Engine<C, I> {
    /// Close `period`: carry over per policy, freeze its instances and
    /// build its archive node
    pub async fn close_period(&self, period: Period, actor: &Actor) -> Result<CloseReport, EngineError> {
        let current = self.current_period();
        if period >= current {
            return Err(EngineError::Validation(format!(
                "only periods before {} can be closed (got {})",
                current, period
            )));
        }

        let _admin = self.inner.admin.read().await;
        let _gate = self.inner.period_gates.exclusive(&period).await;

        let unfinished = self.read(|state| -> Result<Vec<TaskInstance>, EngineError> {
            let record = state
                .periods
                .get(&period)
                .ok_or_else(|| EngineError::not_found("period", period))?;
            if record.is_closed() {
                return Err(EngineError::Conflict(format!("period {} is already closed", period)));
            }
            Ok(state
                .instances_in(period)
                .into_iter()
                .filter(|i| !i.is_settled())
                .cloned()
                .collect())
        })?;

        let policy = self.inner.settings.archive.carry_over;
        let (to_carry, blocking): (Vec<_>, Vec<_>) =
            unfinished.into_iter().partition(|i| policy.carries(i));
        if !blocking.is_empty() {
            let ids: Vec<String> = blocking.iter().map(|i| i.id.to_string()).collect();
            return Err(EngineError::Conflict(format!(
                "period {} has {} unfinished instance(s) not carried over: {}",
                period,
                ids.len(),
                ids.join(", ")
            )));
        }

        let mut carried_over = Vec::with_capacity(to_carry.len());
        for instance in to_carry {
            let id = instance.id.clone();
            self.carry_over_locked(instance, actor).await?;
            carried_over.push(id);
        }

        let now = self.now();
        let committed = self.inner.journal.commit_if(now, |state| {
            if state.is_closed(period) {
                return None;
            }
            let instances = state.instances_in(period);
            if instances.iter().any(|i| !i.is_settled()) {
                return None;
            }
            let draft = AuditDraft::new(
                actor,
                ActionKind::PeriodClosed,
                EntityRef::new(EntityKind::Period, period),
            )
            .before(&serde_json::json!({ "state": state.period_state(period) }))
            .after(&serde_json::json!({
                "state": PeriodState::Closed,
                "archived": instances.len(),
                "carried_over": carried_over,
            }));
            Some((vec![draft], Operation::PeriodClosed { period, at: now }))
        })?;
        if committed.is_none() {
            return Err(EngineError::Conflict(format!(
                "period {} changed while closing",
                period
            )));
        }

        self.inner.archive.invalidate(period);
        let node = self.month_node(period);
        self.publish(Event::PeriodClosed { period });

        let report = CloseReport {
            period,
            archived: node.totals.total_tasks,
            carried_over,
        };
        tracing::info!(%period, archived = report.archived, carried = report.carried_over.len(), "period closed");
        Ok(report)
    }

    /// Cached month node for a closed period, built on first use
    fn month_node(&self, period: Period) -> Arc<MonthNode> {
        if let Some(node) = self.inner.archive.get(period) {
            return node;
        }
        let token = self.inner.archive.token(period);
        let node = Arc::new(self.read(|state| build_month(state, period)));
        self.inner.archive.builds.fetch_add(1, Ordering::Relaxed);
        self.inner.archive.store(period, token, Arc::clone(&node));
        tracing::debug!(%period, "archive month built");
        node
    }

    /// Browse the archive. `month` requires `year`; a specific month must
    /// be closed.
    pub fn browse(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        process_type: Option<&str>,
    ) -> Result<ArchiveTree, EngineError> {
        let specific = match (year, month) {
            (None, Some(_)) => {
                return Err(EngineError::Validation(
                    "browsing a month requires a year".to_string(),
                ))
            }
            (Some(year), Some(month)) => Some(
                Period::new(year, month).map_err(|e| EngineError::Validation(e.to_string()))?,
            ),
            _ => None,
        };

        let (closed, process_type_id) = self.read(|state| -> Result<_, EngineError> {
            let process_type_id = match process_type {
                Some(reference) => Some(
                    resolved(state.resolve_process_type(reference), "process type", reference)?
                        .id
                        .clone(),
                ),
                None => None,
            };
            let closed: Vec<Period> = state.closed_periods().collect();
            Ok((closed, process_type_id))
        })?;

        if let Some(period) = specific {
            if !closed.contains(&period) {
                return Err(EngineError::not_found("archived period", period));
            }
        }

        let months: Vec<MonthNode> = closed
            .into_iter()
            .filter(|p| year.map_or(true, |y| p.year() == y))
            .filter(|p| specific.map_or(true, |s| *p == s))
            .map(|p| {
                let node = self.month_node(p);
                match &process_type_id {
                    Some(id) => node.only(id),
                    None => node.as_ref().clone(),
                }
            })
            .filter(|m| process_type_id.is_none() || !m.processes.is_empty())
            .collect();

        Ok(ArchiveTree {
            years: group_years(months),
        })
    }

    /// Totals per archived year and month, for the tree view
    pub fn archive_summaries(&self) -> Vec<YearSummary> {
        let closed: Vec<Period> = self.read(|state| state.closed_periods().collect());
        let mut years: Vec<YearSummary> = Vec::new();
        for period in closed {
            let node = self.month_node(period);
            let month = MonthSummary {
                period,
                totals: node.totals,
            };
            match years.last_mut() {
                Some(year) if year.year == period.year() => {
                    year.totals.add(&month.totals);
                    year.months.push(month);
                }
                _ => years.push(YearSummary {
                    year: period.year(),
                    totals: month.totals,
                    months: vec![month],
                }),
            }
        }
        years
    }

    /// Drop the cached node for `period` so the next browse rebuilds it
    pub fn invalidate_archive(&self, period: Period) {
        self.inner.archive.invalidate(period);
        tracing::debug!(%period, "archive month invalidated");
    }

    /// Ranked case-insensitive token search over archived instances
    pub fn search(&self, query: &str, scope: &SearchScope) -> Result<Vec<SearchHit>, EngineError> {
        let tokens: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if tokens.is_empty() {
            return Err(EngineError::Validation("search query is empty".to_string()));
        }
        let settings = &self.inner.settings.archive;
        let limit = scope.limit.unwrap_or(settings.search_limit);
        let include_open = scope.include_open.unwrap_or(settings.search_include_open);
        let current = self.current_period();

        let mut hits = self.read(|state| -> Result<Vec<SearchHit>, EngineError> {
            let process_type_id = match &scope.process_type {
                Some(reference) => Some(
                    resolved(state.resolve_process_type(reference), "process type", reference)?
                        .id
                        .clone(),
                ),
                None => None,
            };

            let mut hits = Vec::new();
            for instance in state.instances.values() {
                let period = instance.period();
                if !(state.is_closed(period) || (include_open && period == current)) {
                    continue;
                }
                if scope.year.is_some_and(|y| period.year() != y) {
                    continue;
                }
                if process_type_id
                    .as_ref()
                    .is_some_and(|id| instance.process_type_id() != id)
                {
                    continue;
                }
                let process_name = state
                    .process_types
                    .get(instance.process_type_id())
                    .map(|p| p.name().to_string())
                    .unwrap_or_default();
                let lowered_name = process_name.to_lowercase();
                let score: usize = tokens
                    .iter()
                    .map(|t| instance.count_matches(t) + lowered_name.matches(t.as_str()).count())
                    .sum();
                if score > 0 {
                    hits.push(SearchHit {
                        score,
                        process_name,
                        instance: instance.clone(),
                    });
                }
            }
            Ok(hits)
        })?;

        hits.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| b.instance.period().cmp(&a.instance.period()))
                .then_with(|| b.instance.created_at.cmp(&a.instance.created_at))
                .then_with(|| a.instance.id.cmp(&b.instance.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Every period the engine has seen, oldest first
    pub fn list_periods(&self) -> Vec<PeriodInfo> {
        self.read(|state| {
            state
                .periods
                .values()
                .map(|record| {
                    let instances = state.instances_in(record.period);
                    PeriodInfo {
                        period: record.period,
                        state: record.state,
                        generated_at: record.generated_at,
                        closed_at: record.closed_at,
                        unfinished: instances.iter().filter(|i| !i.is_settled()).count(),
                        instances: instances.len(),
                    }
                })
                .collect()
        })
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
