use serde::{Deserialize, Deserializer, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

/// Payload of `tracking-started`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingStarted {
    pub task_instance_id: i64,
    #[serde(default)]
    pub task_id: Option<i64>,
    pub task_name: String,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub client_id: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
}

/// Payload of `tracking-updated`. Absent fields mean "unchanged"; an explicit
/// `null` project or client means it was removed from the session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackingUpdate {
    pub elapsed_seconds: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<Option<i64>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_id: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pomodoro_remaining: Option<i64>,
}

/// Distinguish a present `null` from an absent field
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Events published by the Core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UiEvent {
    TrackingStarted(TrackingStarted),
    TrackingStopped { task_instance_id: i64, duration: i64 },
    TrackingUpdated(TrackingUpdate),
    TaskCreated { id: i64 },
    TaskUpdated { id: i64 },
    ProjectUpdated { id: i64 },
    ClientUpdated { id: i64 },
    TasksDeleted { ids: Vec<i64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TrackingStarted,
    TrackingStopped,
    TrackingUpdated,
    TaskCreated,
    TaskUpdated,
    ProjectUpdated,
    ClientUpdated,
    TasksDeleted,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[
            EventKind::TrackingStarted,
            EventKind::TrackingStopped,
            EventKind::TrackingUpdated,
            EventKind::TaskCreated,
            EventKind::TaskUpdated,
            EventKind::ProjectUpdated,
            EventKind::ClientUpdated,
            EventKind::TasksDeleted,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TrackingStarted => "tracking-started",
            EventKind::TrackingStopped => "tracking-stopped",
            EventKind::TrackingUpdated => "tracking-updated",
            EventKind::TaskCreated => "task-created",
            EventKind::TaskUpdated => "task-updated",
            EventKind::ProjectUpdated => "project-updated",
            EventKind::ClientUpdated => "client-updated",
            EventKind::TasksDeleted => "tasks-deleted",
        }
    }
}

impl UiEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            UiEvent::TrackingStarted(_) => EventKind::TrackingStarted,
            UiEvent::TrackingStopped { .. } => EventKind::TrackingStopped,
            UiEvent::TrackingUpdated(_) => EventKind::TrackingUpdated,
            UiEvent::TaskCreated { .. } => EventKind::TaskCreated,
            UiEvent::TaskUpdated { .. } => EventKind::TaskUpdated,
            UiEvent::ProjectUpdated { .. } => EventKind::ProjectUpdated,
            UiEvent::ClientUpdated { .. } => EventKind::ClientUpdated,
            UiEvent::TasksDeleted { .. } => EventKind::TasksDeleted,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&UiEvent)>;
type Queue = Rc<RefCell<VecDeque<UiEvent>>>;

/// Cloneable handle for emitting from inside handlers
#[cfg(test)]
#[derive(Clone)]
pub struct Emitter {
    queue: Queue,
}

#[cfg(test)]
impl Emitter {
    pub fn emit(&self, event: UiEvent) {
        self.queue.borrow_mut().push_back(event);
    }
}

/// Single-threaded publish/subscribe bus.
///
/// Emitting only queues; `dispatch_pending` runs each handler to completion
/// before the next event, so handlers may emit without re-entering each other.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    handlers: Vec<(SubscriptionId, EventKind, Handler)>,
    queue: Queue,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, kind: EventKind, handler: impl FnMut(&UiEvent) + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers.push((id, kind, Box::new(handler)));
        id
    }

    pub fn off(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _, _)| *sub != id);
        self.handlers.len() != before
    }

    pub fn emit(&self, event: UiEvent) {
        self.queue.borrow_mut().push_back(event);
    }

    #[cfg(test)]
    pub fn emitter(&self) -> Emitter {
        Emitter {
            queue: Rc::clone(&self.queue),
        }
    }

    /// Deliver queued events in order. Returns how many events were delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        loop {
            let Some(event) = self.queue.borrow_mut().pop_front() else {
                break;
            };
            let kind = event.kind();
            tracing::trace!(event = kind.name(), "dispatching");
            for (_, _, handler) in self.handlers.iter_mut().filter(|(_, k, _)| *k == kind) {
                handler(&event);
            }
            delivered += 1;
        }
        delivered
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}
