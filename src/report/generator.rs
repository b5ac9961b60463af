use super::chart::{bucket_entries, render_bars};
use super::stats::{calculate_project_stats, calculate_session_stats};
use crate::domain::stack::display_key;
use crate::domain::{format_hours_minutes, format_money, group, PeriodKind, PeriodStats, TaskInstance, TimeEntry};
use crate::filter::DateRange;
use anyhow::{Context, Result};
use chrono::Duration;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

const CHART_WIDTH: usize = 30;

/// Everything a period report is built from
pub struct ReportInput<'a> {
    pub period: PeriodKind,
    pub range: DateRange,
    /// Aggregates as computed by the Core
    pub stats: &'a PeriodStats,
    /// Instances visible in the period
    pub instances: &'a [TaskInstance],
    pub entries: &'a [TimeEntry],
}

fn format_duration(duration: Duration) -> String {
    format_hours_minutes(duration.num_seconds())
}

fn earnings_line(earnings: &HashMap<String, f64>) -> String {
    if earnings.is_empty() {
        return "none".to_string();
    }
    let mut currencies: Vec<_> = earnings.iter().collect();
    currencies.sort_by(|a, b| a.0.cmp(b.0));
    currencies
        .into_iter()
        .map(|(currency, amount)| format_money(*amount, currency))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a markdown report for a period
pub fn render_report(input: &ReportInput<'_>) -> String {
    let range = &input.range;
    let sessions = calculate_session_stats(input.entries, input.instances, range);
    let projects = calculate_project_stats(input.entries, input.instances, range);
    let groups = group(input.instances);
    let buckets = bucket_entries(input.entries, input.period, range);

    let mut report = String::new();

    report.push_str(&format!(
        "# {} - {} to {}\n\n",
        input.period.name(),
        range.first_day(),
        range.last_day()
    ));

    // Summary
    report.push_str("## Summary\n\n");
    report.push_str(&format!(
        "- **Total Time:** {}\n",
        format_hours_minutes(input.stats.total_time)
    ));
    report.push_str(&format!("- **Active Projects:** {}\n", input.stats.active_projects));
    report.push_str(&format!("- **Tracked Tasks:** {}\n", input.stats.tracked_tasks));
    report.push_str(&format!(
        "- **Earnings:** {}\n",
        earnings_line(&input.stats.earnings_by_currency)
    ));
    report.push_str(&format!("- **Sessions:** {}\n", sessions.session_count));
    if sessions.session_count > 0 {
        report.push_str(&format!(
            "- **Average Session:** {}\n",
            format_duration(sessions.avg_session)
        ));
    }
    if let Some((name, time)) = &sessions.longest_session {
        report.push_str(&format!(
            "- **Longest Session:** \"{}\" ({})\n",
            name,
            format_duration(*time)
        ));
    }
    if let Some((day, time)) = &sessions.busiest_day {
        report.push_str(&format!(
            "- **Busiest Day:** {} ({})\n",
            day,
            format_duration(*time)
        ));
    }
    report.push('\n');

    // Projects, most time first
    if !projects.is_empty() {
        report.push_str("## Projects\n\n");
        let mut rows: Vec<_> = projects.iter().collect();
        rows.sort_by(|a, b| b.1.elapsed.cmp(&a.1.elapsed).then(a.0.cmp(b.0)));
        for (name, stats) in rows {
            report.push_str(&format!(
                "- **{}:** {} across {} task(s)",
                name,
                format_duration(stats.elapsed),
                stats.task_count
            ));
            if !stats.earnings.is_empty() {
                report.push_str(&format!(" ({})", earnings_line(&stats.earnings)));
            }
            report.push('\n');
        }
        report.push('\n');
    }

    // Tasks, grouped into stacks
    if !groups.is_empty() {
        report.push_str("## Tasks\n\n");
        for task_group in &groups {
            let latest = task_group.latest_task();
            let title = if task_group.is_stack() {
                format!("{} (x{})", display_key(&task_group.key), task_group.members.len())
            } else {
                display_key(&task_group.key)
            };
            report.push_str(&format!(
                "- **{}:** {}",
                title,
                format_hours_minutes(task_group.total_duration)
            ));
            if task_group.total_cost > 0.0 {
                let currency = latest
                    .client_currency
                    .clone()
                    .unwrap_or_else(crate::domain::task::default_currency);
                report.push_str(&format!(" ({})", format_money(task_group.total_cost, &currency)));
            }
            if let Some(at) = latest.last_used_at {
                report.push_str(&format!(", last used {}", at.format("%Y-%m-%d %H:%M")));
            }
            report.push('\n');
        }
        report.push('\n');
    }

    // Chart
    report.push_str("## Activity\n\n```\n");
    for line in render_bars(&buckets, CHART_WIDTH) {
        report.push_str(&line);
        report.push('\n');
    }
    report.push_str("```\n");

    report
}

/// Atomically write `content` to `path`: temp file in the same directory, then rename
pub fn write_report<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp_file =
        NamedTempFile::new_in(dir).context("Failed to create temporary file")?;
    temp_file
        .write_all(content.as_bytes())
        .context("Failed to write to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to sync temporary file")?;
    temp_file
        .persist(path)
        .with_context(|| format!("Failed to persist report: {}", path.display()))?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Client;
    use chrono::{NaiveDate, NaiveDateTime};
    use tempfile::tempdir;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn week() -> DateRange {
        DateRange::days(
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            NaiveDate::from_ymd_opt(2026, 10, 25).unwrap(),
        )
    }

    fn sample() -> (Vec<TaskInstance>, Vec<TimeEntry>, PeriodStats) {
        let acme = Client {
            id: 1,
            name: "Acme".to_string(),
            rate: 60.0,
            currency: "EUR".to_string(),
        };
        let instances = vec![
            TaskInstance::new(1, "Design")
                .with_project(1, "Site")
                .with_client(&acme)
                .with_total_time(3600)
                .with_last_used_at(at("2026-10-19 09:00:00")),
            TaskInstance::new(2, "Design")
                .with_project(1, "Site")
                .with_client(&acme)
                .with_total_time(1800)
                .with_last_used_at(at("2026-10-20 09:00:00")),
        ];
        let entries = vec![
            TimeEntry { id: 1, task_instance_id: 1, start_time: at("2026-10-19 09:00:00"), duration: 3600 },
            TimeEntry { id: 2, task_instance_id: 2, start_time: at("2026-10-20 09:00:00"), duration: 1800 },
        ];
        let stats = PeriodStats {
            total_time: 5400,
            active_projects: 1,
            tracked_tasks: 2,
            earnings_by_currency: HashMap::from([("EUR".to_string(), 90.0)]),
        };
        (instances, entries, stats)
    }

    #[test]
    fn test_render_report_sections() {
        let (instances, entries, stats) = sample();
        let report = render_report(&ReportInput {
            period: PeriodKind::Week,
            range: week(),
            stats: &stats,
            instances: &instances,
            entries: &entries,
        });

        assert!(report.starts_with("# This week - 2026-10-19 to 2026-10-25\n"));
        assert!(report.contains("- **Total Time:** 1h 30m\n"));
        assert!(report.contains("- **Earnings:** 90.00 EUR\n"));
        assert!(report.contains("- **Longest Session:** \"Design\" (1h)\n"));
        assert!(report.contains("- **Site:** 1h 30m across 2 task(s) (90.00 EUR)\n"));
        assert!(report.contains("- **Design · Site · Acme (x2):** 1h 30m (90.00 EUR), last used 2026-10-20 09:00\n"));
        assert!(report.contains("Mon |"));
        assert!(report.trim_end().ends_with("```"));
    }

    #[test]
    fn test_empty_period_report() {
        let stats = PeriodStats::default();
        let report = render_report(&ReportInput {
            period: PeriodKind::Week,
            range: week(),
            stats: &stats,
            instances: &[],
            entries: &[],
        });
        assert!(report.contains("- **Earnings:** none\n"));
        assert!(!report.contains("## Projects"));
        assert!(!report.contains("## Tasks"));
    }

    #[test]
    fn test_write_report_replaces_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.md");
        std::fs::write(&path, "old").unwrap();

        write_report(&path, "# new\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# new\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
