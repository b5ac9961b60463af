use crate::domain::{TaskInstance, TimeEntry};
use crate::filter::DateRange;
use chrono::Duration;
use std::collections::HashMap;

/// Session statistics over the completed entries of a period
#[derive(Debug)]
pub struct SessionStats {
    pub session_count: usize,
    pub avg_session: Duration,
    /// Task name and duration of the longest single entry
    pub longest_session: Option<(String, Duration)>,
    pub busiest_day: Option<(chrono::NaiveDate, Duration)>,
}

/// Per-project totals
#[derive(Debug, PartialEq)]
pub struct ProjectStats {
    pub elapsed: Duration,
    pub task_count: usize,
    /// Earnings per currency
    pub earnings: HashMap<String, f64>,
}

fn in_range<'a>(entries: &'a [TimeEntry], range: &'a DateRange) -> impl Iterator<Item = &'a TimeEntry> {
    entries.iter().filter(move |e| range.contains(e.start_time))
}

/// Calculate session statistics for entries inside `range`
pub fn calculate_session_stats(
    entries: &[TimeEntry],
    instances: &[TaskInstance],
    range: &DateRange,
) -> SessionStats {
    let names: HashMap<i64, &str> = instances.iter().map(|i| (i.id, i.name.as_str())).collect();

    let mut session_count = 0;
    let mut total = Duration::zero();
    let mut longest: Option<(String, Duration)> = None;
    let mut per_day: HashMap<chrono::NaiveDate, Duration> = HashMap::new();

    for entry in in_range(entries, range) {
        let duration = Duration::seconds(entry.duration);
        session_count += 1;
        total = total + duration;
        let day = per_day.entry(entry.start_time.date()).or_insert_with(Duration::zero);
        *day = *day + duration;

        let longer = longest.as_ref().map_or(true, |(_, best)| duration > *best);
        if longer {
            let name = names
                .get(&entry.task_instance_id)
                .copied()
                .unwrap_or("(deleted task)");
            longest = Some((name.to_string(), duration));
        }
    }

    let avg_session = if session_count > 0 {
        Duration::seconds(total.num_seconds() / session_count as i64)
    } else {
        Duration::zero()
    };

    // Earliest day wins ties
    let busiest_day = per_day
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)));

    SessionStats {
        session_count,
        avg_session,
        longest_session: longest,
        busiest_day,
    }
}

/// Calculate per-project totals for entries inside `range`.
///
/// Instances without a project are collected under "No project".
pub fn calculate_project_stats(
    entries: &[TimeEntry],
    instances: &[TaskInstance],
    range: &DateRange,
) -> HashMap<String, ProjectStats> {
    let by_id: HashMap<i64, &TaskInstance> = instances.iter().map(|i| (i.id, i)).collect();
    let mut project_map: HashMap<String, ProjectStats> = HashMap::new();
    let mut seen: HashMap<String, Vec<i64>> = HashMap::new();

    for entry in in_range(entries, range) {
        let Some(instance) = by_id.get(&entry.task_instance_id) else {
            continue;
        };
        let project = instance
            .project_name
            .clone()
            .unwrap_or_else(|| "No project".to_string());

        let stats = project_map.entry(project.clone()).or_insert(ProjectStats {
            elapsed: Duration::zero(),
            task_count: 0,
            earnings: HashMap::new(),
        });
        stats.elapsed = stats.elapsed + Duration::seconds(entry.duration);

        let tasks = seen.entry(project).or_default();
        if !tasks.contains(&instance.id) {
            tasks.push(instance.id);
            stats.task_count += 1;
        }

        if instance.client_rate > 0.0 {
            let currency = instance
                .client_currency
                .clone()
                .unwrap_or_else(crate::domain::task::default_currency);
            *stats.earnings.entry(currency).or_insert(0.0) += instance.cost_of(entry.duration);
        }
    }

    project_map
}
