// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized state from WAL replay

use std::collections::{BTreeMap, HashMap};
use wfm_core::{
    InstanceId, InstanceKey, Operation, Period, PeriodRecord, PeriodState, ProcessType,
    ProcessTypeId, Status, StatusId, TaskInstance,
};

/// Outcome of resolving a user-supplied reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolve<T> {
    Found(T),
    /// More than one candidate matched the prefix
    Ambiguous(usize),
    Missing,
}

impl<T> Resolve<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Resolve::Found(t) => Some(t),
            _ => None,
        }
    }
}

/// Exact id first, then `extra` (e.g. name), then an unambiguous id prefix
fn resolve<'a, K, V>(
    map: &'a HashMap<K, V>,
    reference: &str,
    key: impl Fn(&K) -> &str,
    extra: impl Fn(&V) -> bool,
) -> Resolve<&'a V> {
    if let Some(value) = map.iter().find(|(k, _)| key(k) == reference).map(|(_, v)| v) {
        return Resolve::Found(value);
    }
    let named: Vec<&V> = map.values().filter(|v| extra(v)).collect();
    if named.len() == 1 {
        return Resolve::Found(named[0]);
    }
    if reference.is_empty() {
        return Resolve::Missing;
    }
    let matches: Vec<&V> = map
        .iter()
        .filter(|(k, _)| key(k).starts_with(reference))
        .map(|(_, v)| v)
        .collect();
    match matches.len() {
        0 => Resolve::Missing,
        1 => Resolve::Found(matches[0]),
        n => Resolve::Ambiguous(n),
    }
}

/// Materialized state built from WAL operations
#[derive(Debug, Default, Clone)]
pub struct MaterializedState {
    pub statuses: HashMap<StatusId, Status>,
    pub process_types: HashMap<ProcessTypeId, ProcessType>,
    pub instances: HashMap<InstanceId, TaskInstance>,
    pub by_key: HashMap<InstanceKey, InstanceId>,
    pub periods: BTreeMap<Period, PeriodRecord>,
}

impl MaterializedState {
    pub fn from_ops<'a>(ops: impl IntoIterator<Item = &'a Operation>) -> Self {
        let mut state = Self::default();
        for op in ops {
            state.apply(op);
        }
        state
    }

    /// Apply an operation to update the state
    pub fn apply(&mut self, op: &Operation) {
        match op {
            Operation::StatusUpsert { status } => {
                self.statuses.insert(status.id.clone(), status.clone());
            }

            Operation::StatusesReordered { order } => {
                for (index, id) in order.iter().enumerate() {
                    if let Some(status) = self.statuses.get_mut(id) {
                        status.order = index as u32;
                    }
                }
            }

            Operation::StatusDeleted { id } => {
                self.statuses.remove(id);
            }

            Operation::ProcessTypeVersioned {
                process_type_id,
                created_at,
                version,
            } => {
                let process = self
                    .process_types
                    .entry(process_type_id.clone())
                    .or_insert_with(|| ProcessType {
                        id: process_type_id.clone(),
                        created_at: *created_at,
                        retired_at: None,
                        versions: Vec::new(),
                    });
                process.versions.push(version.clone());
            }

            Operation::ProcessTypeRetired { id, at } => {
                if let Some(process) = self.process_types.get_mut(id) {
                    process.retired_at = Some(*at);
                }
            }

            Operation::InstancesGenerated {
                period,
                at,
                instances,
                ..
            } => {
                let record = self
                    .periods
                    .entry(*period)
                    .or_insert_with(|| PeriodRecord::open(*period));
                if record.generated_at.is_none() {
                    record.generated_at = Some(*at);
                }
                for instance in instances {
                    self.insert_instance(instance);
                }
            }

            Operation::InstanceUpdated { instance } => {
                self.instances.insert(instance.id.clone(), instance.clone());
            }

            Operation::CarriedOver { from, to } => {
                self.instances.insert(from.id.clone(), from.clone());
                self.periods
                    .entry(to.period())
                    .or_insert_with(|| PeriodRecord::open(to.period()));
                let owner = self
                    .by_key
                    .entry(to.key.clone())
                    .or_insert_with(|| to.id.clone());
                if *owner == to.id {
                    self.instances.insert(to.id.clone(), to.clone());
                }
            }

            Operation::PeriodMarkedEligible { period } => {
                let record = self
                    .periods
                    .entry(*period)
                    .or_insert_with(|| PeriodRecord::open(*period));
                if record.state == PeriodState::Open {
                    record.state = PeriodState::Eligible;
                }
            }

            Operation::PeriodClosed { period, at } => {
                let record = self
                    .periods
                    .entry(*period)
                    .or_insert_with(|| PeriodRecord::open(*period));
                record.state = PeriodState::Closed;
                record.closed_at = Some(*at);
            }
        }
    }

    /// Insert unless the key is already taken
    fn insert_instance(&mut self, instance: &TaskInstance) {
        if self.by_key.contains_key(&instance.key) {
            return;
        }
        self.by_key.insert(instance.key.clone(), instance.id.clone());
        self.instances.insert(instance.id.clone(), instance.clone());
    }

    /// Resolve a status by id, case-insensitive name, or unique id prefix
    pub fn resolve_status(&self, reference: &str) -> Resolve<&Status> {
        resolve(
            &self.statuses,
            reference,
            |k| k.as_str(),
            |s| s.name.eq_ignore_ascii_case(reference.trim()),
        )
    }

    /// Resolve a process type by id, case-insensitive name, or unique id prefix
    pub fn resolve_process_type(&self, reference: &str) -> Resolve<&ProcessType> {
        resolve(
            &self.process_types,
            reference,
            |k| k.as_str(),
            |p| p.name().eq_ignore_ascii_case(reference.trim()),
        )
    }

    /// Resolve an instance by id or unique prefix (like git commit hashes)
    pub fn resolve_instance(&self, reference: &str) -> Resolve<&TaskInstance> {
        resolve(&self.instances, reference, |k| k.as_str(), |_| false)
    }

    pub fn instance_by_key(&self, key: &InstanceKey) -> Option<&TaskInstance> {
        self.by_key.get(key).and_then(|id| self.instances.get(id))
    }

    /// Statuses in catalog order
    pub fn sorted_statuses(&self) -> Vec<&Status> {
        let mut statuses: Vec<&Status> = self.statuses.values().collect();
        statuses.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        statuses
    }

    /// Lowest-ordered active status
    pub fn default_status(&self) -> Option<&Status> {
        wfm_core::status::default_status(self.statuses.values())
    }

    /// Instances of a period, ordered by process type then template position
    pub fn instances_in(&self, period: Period) -> Vec<&TaskInstance> {
        let mut instances: Vec<&TaskInstance> = self
            .instances
            .values()
            .filter(|i| i.period() == period)
            .collect();
        instances.sort_by(|a, b| {
            a.key
                .process_type_id
                .cmp(&b.key.process_type_id)
                .then_with(|| a.position.cmp(&b.position))
                .then_with(|| a.id.cmp(&b.id))
        });
        instances
    }

    pub fn instances_for(&self, process_type_id: &ProcessTypeId, period: Period) -> Vec<&TaskInstance> {
        self.instances_in(period)
            .into_iter()
            .filter(|i| &i.key.process_type_id == process_type_id)
            .collect()
    }

    /// State of a period; unseen periods are open
    pub fn period_state(&self, period: Period) -> PeriodState {
        self.periods
            .get(&period)
            .map(|r| r.state)
            .unwrap_or(PeriodState::Open)
    }

    pub fn is_closed(&self, period: Period) -> bool {
        self.period_state(period) == PeriodState::Closed
    }

    pub fn closed_periods(&self) -> impl Iterator<Item = Period> + '_ {
        self.periods
            .values()
            .filter(|r| r.is_closed())
            .map(|r| r.period)
    }

    /// Number of instances currently in the status
    pub fn status_usage(&self, id: &StatusId) -> usize {
        self.instances.values().filter(|i| &i.status == id).count()
    }

    /// Active templates (of active process types) defaulting to the status
    pub fn templates_using(&self, id: &StatusId) -> Vec<(ProcessTypeId, String)> {
        let mut users = Vec::new();
        for process in self.process_types.values().filter(|p| p.is_active()) {
            let Some(version) = process.current() else {
                continue;
            };
            for (_, template) in version.active_templates() {
                if template.default_status.as_ref() == Some(id) {
                    users.push((process.id.clone(), template.id.to_string()));
                }
            }
        }
        users.sort();
        users
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
