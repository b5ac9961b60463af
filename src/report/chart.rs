use crate::domain::{PeriodKind, TimeEntry};
use crate::filter::DateRange;
use chrono::{Datelike, NaiveDate};

/// Longest custom range still charted day by day
const MAX_DAY_BUCKETS: i64 = 62;
/// Longest custom range still charted month by month
const MAX_MONTH_BUCKETS: i64 = 36;
/// Longer ranges are charted in spans of whole years, at most this many
const MAX_YEAR_BUCKETS: i64 = 40;

/// One bar of the period chart
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub label: String,
    /// First day covered by the bucket
    pub start: NaiveDate,
    pub seconds: i64,
}

/// Sum entry durations into per-day buckets, or per-month buckets for a year.
///
/// Every day (or month) of `range` gets a bucket, including empty ones.
/// Custom ranges coarsen to months, then to year spans, as they grow, so the
/// bucket count stays bounded. Entries outside `range` are ignored.
pub fn bucket_entries(entries: &[TimeEntry], period: PeriodKind, range: &DateRange) -> Vec<Bucket> {
    let mut buckets = match period {
        PeriodKind::Year => month_buckets(range, "%b"),
        PeriodKind::Week => day_buckets(range, "%a"),
        PeriodKind::Month | PeriodKind::Custom => custom_buckets(range),
    };

    for entry in entries.iter().filter(|e| range.contains(e.start_time)) {
        let day = entry.start_time.date();
        // Buckets are sorted by start; the last one starting on or before `day` owns it
        let idx = buckets.partition_point(|b| b.start <= day);
        if idx > 0 {
            buckets[idx - 1].seconds += entry.duration;
        }
    }
    buckets
}

fn custom_buckets(range: &DateRange) -> Vec<Bucket> {
    let (first, last) = (range.first_day(), range.last_day());
    let days = (last - first).num_days() + 1;
    if days <= MAX_DAY_BUCKETS {
        return day_buckets(range, "%d");
    }
    let years = i64::from(last.year() - first.year()) + 1;
    let months = (years - 1) * 12 + i64::from(last.month()) - i64::from(first.month()) + 1;
    if months <= MAX_MONTH_BUCKETS {
        return month_buckets(range, "%Y-%m");
    }
    let span = (years + MAX_YEAR_BUCKETS - 1) / MAX_YEAR_BUCKETS;
    year_buckets(range, span as i32)
}

fn day_buckets(range: &DateRange, label_format: &str) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let last = range.last_day();
    let mut day = Some(range.first_day());
    while let Some(current) = day.filter(|d| *d <= last) {
        buckets.push(Bucket {
            label: current.format(label_format).to_string(),
            start: current,
            seconds: 0,
        });
        day = current.succ_opt();
    }
    buckets
}

/// One bucket per `span` years, labelled with the span's first year
fn year_buckets(range: &DateRange, span: i32) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let last = range.last_day().year();
    let mut year = range.first_day().year();
    while year <= last {
        let Some(first) = NaiveDate::from_ymd_opt(year, 1, 1) else {
            break;
        };
        buckets.push(Bucket {
            label: year.to_string(),
            start: first.max(range.first_day()),
            seconds: 0,
        });
        year += span;
    }
    buckets
}

fn month_buckets(range: &DateRange, label_format: &str) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let last = range.last_day();
    let mut month = range.first_day().with_day(1);
    while let Some(first) = month {
        if first > last {
            break;
        }
        buckets.push(Bucket {
            label: first.format(label_format).to_string(),
            start: first.max(range.first_day()),
            seconds: 0,
        });
        month = next_month(first);
    }
    buckets
}

fn next_month(first: NaiveDate) -> Option<NaiveDate> {
    if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    }
}

/// Render buckets as ASCII bars scaled to `width` characters
pub fn render_bars(buckets: &[Bucket], width: usize) -> Vec<String> {
    let max = buckets.iter().map(|b| b.seconds).max().unwrap_or(0);
    let label_width = buckets.iter().map(|b| b.label.len()).max().unwrap_or(0);

    buckets
        .iter()
        .map(|bucket| {
            let filled = if max > 0 {
                ((bucket.seconds as f64 / max as f64) * width as f64).round() as usize
            } else {
                0
            };
            format!(
                "{:<lw$} |{}{}| {}",
                bucket.label,
                "#".repeat(filled),
                " ".repeat(width - filled.min(width)),
                crate::domain::format_hours_minutes(bucket.seconds),
                lw = label_width
            )
        })
        .collect()
}
