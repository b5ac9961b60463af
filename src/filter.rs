//! Period ranges, list filtering and the live-session filter match.

use crate::domain::{PeriodKind, TaskInstance};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};

/// Inclusive local date-time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    /// Whole-day range from `from` 00:00:00 to `to` 23:59:59; reversed bounds are swapped
    pub fn days(from: NaiveDate, to: NaiveDate) -> Self {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        Self {
            start: from.and_time(NaiveTime::MIN),
            end: to.and_time(end_of_day()),
        }
    }

    /// Range covered by `period` as seen from `today`
    pub fn for_period(period: Period, today: NaiveDate) -> Self {
        match period {
            Period::Week => {
                let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
                Self::days(monday, monday + Duration::days(6))
            }
            Period::Month => {
                let first = today.with_day(1).unwrap_or(today);
                Self::days(first, last_day_of_month(first))
            }
            Period::Year => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today);
                let last = NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today);
                Self::days(first, last)
            }
            Period::Custom { from, to } => Self::days(from, to),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }

    pub fn first_day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn last_day(&self) -> NaiveDate {
        self.end.date()
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| next - Duration::days(1))
        .unwrap_or(first)
}

/// Selected reporting period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Week,
    Month,
    Year,
    Custom { from: NaiveDate, to: NaiveDate },
}

impl Period {
    pub fn kind(&self) -> PeriodKind {
        match self {
            Period::Week => PeriodKind::Week,
            Period::Month => PeriodKind::Month,
            Period::Year => PeriodKind::Year,
            Period::Custom { .. } => PeriodKind::Custom,
        }
    }

    /// Build a non-custom period from its kind; custom periods need explicit bounds
    pub fn from_kind(kind: PeriodKind) -> Option<Self> {
        match kind {
            PeriodKind::Week => Some(Period::Week),
            PeriodKind::Month => Some(Period::Month),
            PeriodKind::Year => Some(Period::Year),
            PeriodKind::Custom => None,
        }
    }
}

/// The active UI filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    pub period: Period,
    /// `None` until the page has established its range
    pub range: Option<DateRange>,
    pub project_id: Option<i64>,
    pub client_id: Option<i64>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            period: Period::Week,
            range: None,
            project_id: None,
            client_id: None,
        }
    }
}

impl FilterState {
    /// Filter for `period` with its range established relative to `today`
    pub fn for_period(period: Period, today: NaiveDate) -> Self {
        Self {
            period,
            range: Some(DateRange::for_period(period, today)),
            project_id: None,
            client_id: None,
        }
    }

    pub fn with_project(mut self, project_id: Option<i64>) -> Self {
        self.project_id = project_id;
        self
    }

    pub fn with_client(mut self, client_id: Option<i64>) -> Self {
        self.client_id = client_id;
        self
    }

    fn owner_matches(&self, project_id: Option<i64>, client_id: Option<i64>) -> bool {
        let project_ok = self.project_id.map_or(true, |p| project_id == Some(p));
        let client_ok = self.client_id.map_or(true, |c| client_id == Some(c));
        project_ok && client_ok
    }

    /// Whether an instance belongs in the visible task list
    pub fn shows(&self, instance: &TaskInstance) -> bool {
        if !self.owner_matches(instance.project_id, instance.client_id) {
            return false;
        }
        match (self.range, instance.last_used_at) {
            (None, _) => true,
            (Some(range), Some(at)) => range.contains(at),
            (Some(_), None) => false,
        }
    }
}

/// The parts of a live session that decide whether it counts toward aggregates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSession {
    /// Raw start time: epoch seconds/milliseconds or a local date-time string
    pub start_time: Option<String>,
    pub project_id: Option<i64>,
    pub client_id: Option<i64>,
}

/// Decide whether a live session's elapsed time belongs in the filtered aggregates.
///
/// Fails closed: an unparseable start time or an unestablished range yields `false`.
pub fn matches(session: &TrackedSession, filter: &FilterState) -> bool {
    let Some(range) = filter.range else {
        return false;
    };
    let Some(raw) = session.start_time.as_deref() else {
        return false;
    };
    let Some(start) = parse_start_time(raw) else {
        tracing::trace!(start_time = raw, "unparseable session start, not matching");
        return false;
    };

    range.contains(start) && filter.owner_matches(session.project_id, session.client_id)
}

/// Epoch values above this are treated as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Normalize a Core start time to local wall-clock time
pub fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(epoch) = raw.parse::<i64>() {
        let secs = if epoch.abs() >= EPOCH_MILLIS_THRESHOLD {
            epoch / 1000
        } else {
            epoch
        };
        return DateTime::from_timestamp(secs, 0).map(|utc| utc.with_timezone(&Local).naive_local());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}
