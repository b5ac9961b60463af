use serde::{Deserialize, Serialize};

/// How running clocks are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeStyle {
    /// Always "HH:MM:SS"
    #[default]
    Long,
    /// "MM:SS" under an hour, "H:MM:SS" above
    Short,
}

/// Format seconds as "HH:MM:SS" (hours are not capped at 99)
pub fn format_hms(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, secs)
}

/// Format seconds as "MM:SS", switching to "H:MM:SS" once an hour has passed
pub fn format_short(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

pub fn format_clock(seconds: i64, style: TimeStyle) -> String {
    match style {
        TimeStyle::Long => format_hms(seconds),
        TimeStyle::Short => format_short(seconds),
    }
}

/// Format seconds as "Xh Ym" (omits zero parts, minutes-only below an hour)
pub fn format_hours_minutes(seconds: i64) -> String {
    let total_minutes = seconds.max(0) / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours > 0 && minutes > 0 {
        format!("{}h {}m", hours, minutes)
    } else if hours > 0 {
        format!("{}h", hours)
    } else {
        format!("{}m", minutes)
    }
}

/// Format an amount with two decimals followed by its currency code
pub fn format_money(amount: f64, currency: &str) -> String {
    format!("{:.2} {}", amount, currency)
}
