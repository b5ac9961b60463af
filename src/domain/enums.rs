use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies what a view-model displays
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// A single task instance shown as a standalone row
    Task(i64),
    /// A stack aggregate, by stack key
    Stack(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Task(id) => write!(f, "task#{}", id),
            EntityKey::Stack(key) => write!(f, "stack[{}]", super::stack::display_key(key)),
        }
    }
}

/// Lifecycle of a view-model; disposed views never receive updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Live,
    Disposed,
}

/// Reporting period selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    #[default]
    Week,
    Month,
    Year,
    Custom,
}

impl PeriodKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Week => "This week",
            Self::Month => "This month",
            Self::Year => "This year",
            Self::Custom => "Custom range",
        }
    }
}
