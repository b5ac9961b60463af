use crate::domain::{format_clock, format_money, EntityKey, TimeStyle};
use crate::tracking::{Presenter, StatsView, TimeLabel, ViewModel};
use std::collections::HashMap;
use std::fmt::Arguments;
use std::io::Write;

/// Presenter that prints one line per update
pub struct ConsolePresenter<W: Write> {
    out: W,
    style: TimeStyle,
    default_currency: String,
    /// Suppress per-second clock lines
    quiet_clock: bool,
}

impl<W: Write> ConsolePresenter<W> {
    pub fn new(out: W, style: TimeStyle, default_currency: impl Into<String>) -> Self {
        Self {
            out,
            style,
            default_currency: default_currency.into(),
            quiet_clock: false,
        }
    }

    pub fn quiet_clock(mut self, quiet: bool) -> Self {
        self.quiet_clock = quiet;
        self
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, args: Arguments<'_>) {
        if let Err(err) = writeln!(self.out, "{}", args) {
            tracing::warn!(error = %err, "could not write presenter output");
        }
    }

    fn earnings_text(&self, earnings: &HashMap<String, f64>) -> String {
        if earnings.is_empty() {
            return format_money(0.0, &self.default_currency);
        }
        let mut currencies: Vec<_> = earnings.iter().collect();
        currencies.sort_by(|a, b| a.0.cmp(b.0));
        currencies
            .into_iter()
            .map(|(currency, amount)| format_money(*amount, currency))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl<W: Write> Presenter for ConsolePresenter<W> {
    fn update_time_label(&mut self, label: TimeLabel) {
        if self.quiet_clock {
            return;
        }
        let text = match label {
            TimeLabel::Elapsed(secs) => format_clock(secs, self.style),
            TimeLabel::Countdown(secs) => format!("-{}", format_clock(secs, self.style)),
        };
        self.line(format_args!("clock    {}", text));
    }

    fn update_task_time(&mut self, entity: &EntityKey, total_seconds: i64, cost: f64) {
        let total = format_clock(total_seconds, self.style);
        if cost > 0.0 {
            self.line(format_args!("row      {} {} ({:.2})", entity, total, cost));
        } else {
            self.line(format_args!("row      {} {}", entity, total));
        }
    }

    fn update_tracking_state(&mut self, tracking: Option<&EntityKey>) {
        match tracking {
            Some(entity) => self.line(format_args!("live     {}", entity)),
            None => self.line(format_args!("live     -")),
        }
    }

    fn update_stats(&mut self, stats: &StatsView, earnings: &HashMap<String, f64>) {
        let earned = self.earnings_text(earnings);
        let total = format_clock(stats.total_time, self.style);
        self.line(format_args!(
            "stats    {} | {} projects | {} tasks | {}",
            total,
            stats.active_projects,
            stats.tracked_tasks,
            earned
        ));
    }

    fn list_reloaded(&mut self, views: &[ViewModel]) {
        self.line(format_args!("list     {} views", views.len()));
        for view in views {
            let marker = if view.live { "*" } else { " " };
            let members = if view.member_ids.len() > 1 {
                format!(" x{}", view.member_ids.len())
            } else {
                String::new()
            };
            let total = format_clock(view.total, self.style);
            self.line(format_args!("  {} {}{} {}", marker, view.title, members, total));
        }
    }
}
