//! Fixture-backed Core used by the CLI and tests.

use super::events::UiEvent;
use super::{CoreBridge, CoreError, InstanceQuery};
use crate::domain::{Client, PeriodStats, TaskInstance, TimeEntry, TrackingState};
use crate::filter::{parse_start_time, DateRange};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

/// Recorded Core data plus the events it published
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    /// Date the recording was made; ranges are computed relative to it
    #[serde(default)]
    pub today: Option<NaiveDate>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub instances: Vec<TaskInstance>,
    #[serde(default)]
    pub entries: Vec<TimeEntry>,
    #[serde(default)]
    pub tracking: TrackingState,
    #[serde(default)]
    pub events: Vec<UiEvent>,
}

impl Fixture {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCore {
    projects: Vec<Project>,
    clients: Vec<Client>,
    instances: Vec<TaskInstance>,
    entries: Vec<TimeEntry>,
    tracking: TrackingState,
    unavailable: bool,
}

impl InMemoryCore {
    pub fn from_fixture(fixture: &Fixture) -> Self {
        Self {
            projects: fixture.projects.clone(),
            clients: fixture.clients.clone(),
            instances: fixture.instances.clone(),
            entries: fixture.entries.clone(),
            tracking: fixture.tracking.clone(),
            unavailable: false,
        }
    }

    pub fn entries(&self) -> &[TimeEntry] {
        &self.entries
    }

    fn check(&self) -> Result<(), CoreError> {
        if self.unavailable {
            return Err(CoreError::Unavailable("database is not reachable".to_string()));
        }
        Ok(())
    }

    fn instance_mut(&mut self, id: i64) -> Option<&mut TaskInstance> {
        self.instances.iter_mut().find(|i| i.id == id)
    }

    /// Rate and currency billed for an instance, preferring the clients table
    fn billing_of(&self, instance: &TaskInstance) -> (f64, String) {
        let client = instance
            .client_id
            .and_then(|id| self.clients.iter().find(|c| c.id == id));
        match client {
            Some(client) => (client.rate, client.currency.clone()),
            None => (
                instance.client_rate,
                instance
                    .client_currency
                    .clone()
                    .unwrap_or_else(crate::domain::task::default_currency),
            ),
        }
    }

    /// Apply what the Core itself persisted when it published `event`
    pub fn record(&mut self, event: &UiEvent) {
        match event {
            UiEvent::TrackingStarted(started) => {
                let last_used = started
                    .start_time
                    .as_deref()
                    .and_then(parse_start_time)
                    .unwrap_or_else(|| Local::now().naive_local());
                if let Some(instance) = self.instance_mut(started.task_instance_id) {
                    instance.last_used_at = Some(last_used);
                }
                self.tracking = TrackingState {
                    is_tracking: true,
                    current_task_id: started.task_id,
                    current_project_id: started.project_id,
                    current_client_id: started.client_id,
                    current_task_instance_id: Some(started.task_instance_id),
                    current_task_name: Some(started.task_name.clone()),
                    start_time: started.start_time.clone(),
                    ..TrackingState::default()
                };
            }
            UiEvent::TrackingUpdated(update) => {
                self.tracking.elapsed_seconds = update.elapsed_seconds;
                if let Some(remaining) = update.pomodoro_remaining {
                    self.tracking.pomodoro_mode = true;
                    self.tracking.pomodoro_remaining = remaining;
                }
                let Some(id) = self.tracking.current_task_instance_id else {
                    return;
                };
                if let Some(name) = &update.task_name {
                    self.tracking.current_task_name = Some(name.clone());
                    if let Some(instance) = self.instance_mut(id) {
                        instance.name = name.clone();
                    }
                }
                if let Some(project_id) = update.project_id {
                    self.tracking.current_project_id = project_id;
                    let project = project_id
                        .and_then(|pid| self.projects.iter().find(|p| p.id == pid))
                        .cloned();
                    if let Some(instance) = self.instance_mut(id) {
                        instance.project_id = project_id;
                        instance.project_name = project.as_ref().map(|p| p.name.clone());
                        instance.project_color = project.and_then(|p| p.color);
                    }
                }
                if let Some(client_id) = update.client_id {
                    self.tracking.current_client_id = client_id;
                    let client = client_id
                        .and_then(|cid| self.clients.iter().find(|c| c.id == cid))
                        .cloned();
                    if let Some(instance) = self.instance_mut(id) {
                        instance.client_id = client_id;
                        instance.client_name = client.as_ref().map(|c| c.name.clone());
                        instance.client_currency = client.as_ref().map(|c| c.currency.clone());
                        instance.client_rate = client.map_or(0.0, |c| c.rate);
                    }
                }
            }
            UiEvent::TrackingStopped {
                task_instance_id,
                duration,
            } => {
                let start_time = self
                    .tracking
                    .start_time
                    .as_deref()
                    .and_then(parse_start_time)
                    .unwrap_or_else(|| Local::now().naive_local());
                let next_id = self.entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
                self.entries.push(TimeEntry {
                    id: next_id,
                    task_instance_id: *task_instance_id,
                    start_time,
                    duration: *duration,
                });
                if let Some(instance) = self.instance_mut(*task_instance_id) {
                    instance.total_time += duration;
                }
                self.tracking = TrackingState::default();
            }
            UiEvent::TasksDeleted { ids } => {
                self.instances.retain(|i| !ids.contains(&i.id));
                self.entries.retain(|e| !ids.contains(&e.task_instance_id));
            }
            UiEvent::TaskCreated { .. }
            | UiEvent::TaskUpdated { .. }
            | UiEvent::ProjectUpdated { .. }
            | UiEvent::ClientUpdated { .. } => {}
        }
    }
}

impl CoreBridge for InMemoryCore {
    fn tracking_state(&self) -> Result<TrackingState, CoreError> {
        self.check()?;
        Ok(self.tracking.clone())
    }

    fn task_instance(&self, id: i64) -> Result<TaskInstance, CoreError> {
        self.check()?;
        self.instances
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(CoreError::NotFound {
                kind: "task instance",
                id,
            })
    }

    fn all_task_instances(&self, query: &InstanceQuery) -> Result<Vec<TaskInstance>, CoreError> {
        self.check()?;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        Ok(self
            .instances
            .iter()
            .filter(|i| query.project_id.map_or(true, |p| i.project_id == Some(p)))
            .filter(|i| query.client_id.map_or(true, |c| i.client_id == Some(c)))
            .filter(|i| {
                needle
                    .as_deref()
                    .map_or(true, |n| i.name.to_lowercase().contains(n))
            })
            .cloned()
            .collect())
    }

    fn stats_for_period(
        &self,
        range: &DateRange,
        task_instance_ids: Option<&[i64]>,
    ) -> Result<PeriodStats, CoreError> {
        self.check()?;
        let by_id: HashMap<i64, &TaskInstance> = self.instances.iter().map(|i| (i.id, i)).collect();

        let mut stats = PeriodStats::default();
        let mut projects = HashSet::new();
        let mut tasks = HashSet::new();

        for entry in &self.entries {
            if !range.contains(entry.start_time) {
                continue;
            }
            if let Some(ids) = task_instance_ids {
                if !ids.contains(&entry.task_instance_id) {
                    continue;
                }
            }
            stats.total_time += entry.duration;
            tasks.insert(entry.task_instance_id);

            let Some(instance) = by_id.get(&entry.task_instance_id) else {
                continue;
            };
            if let Some(project_id) = instance.project_id {
                projects.insert(project_id);
            }
            let (rate, currency) = self.billing_of(instance);
            if rate > 0.0 {
                *stats.earnings_by_currency.entry(currency).or_insert(0.0) +=
                    crate::domain::cost_for(entry.duration, rate);
            }
        }

        stats.active_projects = projects.len();
        stats.tracked_tasks = tasks.len();
        Ok(stats)
    }

    fn client(&self, id: i64) -> Result<Client, CoreError> {
        self.check()?;
        self.clients
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or(CoreError::NotFound { kind: "client", id })
    }
}

#[cfg(test)]
impl InMemoryCore {
    /// Make every call fail, as when the Core's database is unreachable
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    pub fn instances(&self) -> &[TaskInstance] {
        &self.instances
    }
}
