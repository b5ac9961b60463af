//! Boundary to the external Core service.

pub mod events;
pub mod memory;

use crate::domain::{Client, PeriodStats, TaskInstance, TrackingState};
use crate::filter::DateRange;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

pub use events::{EventBus, EventKind, SubscriptionId, TrackingStarted, TrackingUpdate, UiEvent};
pub use memory::{Fixture, InMemoryCore};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },
    #[error("core unavailable: {0}")]
    Unavailable(String),
    #[error("invalid fixture: {0}")]
    Fixture(#[from] serde_json::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options for listing task instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceQuery {
    pub project_id: Option<i64>,
    pub client_id: Option<i64>,
    /// Case-insensitive substring of the task name
    pub search: Option<String>,
}

/// Read side of the Core consumed by the tracking page
pub trait CoreBridge {
    fn tracking_state(&self) -> Result<TrackingState, CoreError>;

    fn task_instance(&self, id: i64) -> Result<TaskInstance, CoreError>;

    fn all_task_instances(&self, query: &InstanceQuery) -> Result<Vec<TaskInstance>, CoreError>;

    /// Completed-entry statistics for `range`, optionally limited to some instances
    fn stats_for_period(
        &self,
        range: &DateRange,
        task_instance_ids: Option<&[i64]>,
    ) -> Result<PeriodStats, CoreError>;

    fn client(&self, id: i64) -> Result<Client, CoreError>;
}

/// Shared handle, for when the event source and the page both need the Core
impl<T: CoreBridge> CoreBridge for Rc<RefCell<T>> {
    fn tracking_state(&self) -> Result<TrackingState, CoreError> {
        self.borrow().tracking_state()
    }

    fn task_instance(&self, id: i64) -> Result<TaskInstance, CoreError> {
        self.borrow().task_instance(id)
    }

    fn all_task_instances(&self, query: &InstanceQuery) -> Result<Vec<TaskInstance>, CoreError> {
        self.borrow().all_task_instances(query)
    }

    fn stats_for_period(
        &self,
        range: &DateRange,
        task_instance_ids: Option<&[i64]>,
    ) -> Result<PeriodStats, CoreError> {
        self.borrow().stats_for_period(range, task_instance_ids)
    }

    fn client(&self, id: i64) -> Result<Client, CoreError> {
        self.borrow().client(id)
    }
}
