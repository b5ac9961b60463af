use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tracked task template as supplied by the Core.
///
/// The UI only ever holds read-only copies; they are replaced wholesale on
/// every list reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: i64,
    pub task_id: i64,
    pub name: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub project_color: Option<String>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_currency: Option<String>,
    #[serde(default)]
    pub client_rate: f64,
    /// Completed (persisted) seconds; not updated by the Core mid-session
    #[serde(default)]
    pub total_time: i64,
    #[serde(default)]
    pub last_used_at: Option<NaiveDateTime>,
}

impl TaskInstance {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            task_id: id,
            name: name.into(),
            project_id: None,
            project_name: None,
            project_color: None,
            client_id: None,
            client_name: None,
            client_currency: None,
            client_rate: 0.0,
            total_time: 0,
            last_used_at: None,
        }
    }

    pub fn with_project(mut self, id: i64, name: impl Into<String>) -> Self {
        self.project_id = Some(id);
        self.project_name = Some(name.into());
        self
    }

    pub fn with_client(mut self, client: &Client) -> Self {
        self.client_id = Some(client.id);
        self.client_name = Some(client.name.clone());
        self.client_currency = Some(client.currency.clone());
        self.client_rate = client.rate;
        self
    }

    pub fn with_total_time(mut self, seconds: i64) -> Self {
        self.total_time = seconds;
        self
    }

    pub fn with_last_used_at(mut self, at: NaiveDateTime) -> Self {
        self.last_used_at = Some(at);
        self
    }

    /// Earnings for `seconds` of work at this instance's client rate
    pub fn cost_of(&self, seconds: i64) -> f64 {
        cost_for(seconds, self.client_rate)
    }
}

/// Hourly earnings for a number of seconds
pub fn cost_for(seconds: i64, rate: f64) -> f64 {
    seconds as f64 / 3600.0 * rate
}

/// Client billing information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub rate: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

pub(crate) fn default_currency() -> String {
    "USD".to_string()
}

/// A completed stretch of tracked time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeEntry {
    pub id: i64,
    pub task_instance_id: i64,
    pub start_time: NaiveDateTime,
    /// Seconds
    pub duration: i64,
}

/// The Core's view of the single global tracking session
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingState {
    pub is_tracking: bool,
    #[serde(default)]
    pub current_task_id: Option<i64>,
    #[serde(default)]
    pub current_project_id: Option<i64>,
    #[serde(default)]
    pub current_client_id: Option<i64>,
    #[serde(default)]
    pub current_task_instance_id: Option<i64>,
    #[serde(default)]
    pub current_task_name: Option<String>,
    /// Raw start time as the Core reports it (epoch or local string)
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub elapsed_seconds: i64,
    #[serde(default)]
    pub pomodoro_mode: bool,
    #[serde(default)]
    pub pomodoro_remaining: i64,
}

/// Aggregates for a period as computed by the Core (completed entries only)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodStats {
    pub total_time: i64,
    pub active_projects: usize,
    pub tracked_tasks: usize,
    #[serde(default)]
    pub earnings_by_currency: HashMap<String, f64>,
}
