pub mod enums;
pub mod format;
pub mod stack;
pub mod task;

pub use enums::{EntityKey, Lifecycle, PeriodKind};
pub use format::{format_clock, format_hms, format_hours_minutes, format_money, TimeStyle};
pub use stack::{group, TaskGroup};
pub use task::{cost_for, Client, PeriodStats, TaskInstance, TimeEntry, TrackingState};
