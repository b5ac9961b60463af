use super::registry::ViewModel;
use crate::domain::EntityKey;
use std::collections::HashMap;

/// What the tracking clock label should show
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLabel {
    /// Seconds since the session started
    Elapsed(i64),
    /// Pomodoro seconds remaining
    Countdown(i64),
}

/// Summary statistics as displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsView {
    pub total_time: i64,
    pub active_projects: usize,
    pub tracked_tasks: usize,
}

/// Display adapter driven by the reconciler. Calls are fire-and-forget.
pub trait Presenter {
    fn update_time_label(&mut self, label: TimeLabel);

    fn update_task_time(&mut self, entity: &EntityKey, total_seconds: i64, cost: f64);

    /// `Some` marks the entity as live, `None` clears every live marker
    fn update_tracking_state(&mut self, tracking: Option<&EntityKey>);

    fn update_stats(&mut self, stats: &StatsView, earnings: &HashMap<String, f64>);

    fn list_reloaded(&mut self, views: &[ViewModel]);
}
