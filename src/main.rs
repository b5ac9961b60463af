mod app;
mod config;
mod console;
mod core;
mod domain;
mod filter;
mod report;
mod ticker;
mod tracking;

use crate::core::{CoreBridge, EventBus, Fixture, InMemoryCore, InstanceQuery};
use anyhow::{bail, Context, Result};
use app::TasksPage;
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use config::Settings;
use console::ConsolePresenter;
use domain::{format_hms, format_money, PeriodKind};
use filter::{FilterState, Period};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ticktally")]
#[command(about = "Replay and report on time-tracking sessions recorded from a Core", long_about = None)]
struct Cli {
    /// Settings file. Defaults to <config dir>/ticktally/settings.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a fixture's recorded events through the task page
    Replay {
        fixture: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        /// Deliver tracking ticks at the Core's one-second rate
        #[arg(long)]
        realtime: bool,
        /// Do not print the clock label on every tick
        #[arg(long)]
        quiet_clock: bool,
        /// Only list tasks whose name contains TEXT
        #[arg(long, value_name = "TEXT")]
        search: Option<String>,
    },
    /// Print the stacks the task list would show
    Stacks {
        fixture: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Generate a period report
    Report {
        fixture: PathBuf,
        #[command(flatten)]
        filter: FilterArgs,
        /// Output file path. Prints to stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// week, month, year or custom
    #[arg(long)]
    period: Option<String>,
    /// First day of a custom period (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day of a custom period (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    #[arg(long)]
    project: Option<i64>,
    #[arg(long)]
    client: Option<i64>,
    /// Reference date for the period (YYYY-MM-DD). Defaults to the fixture's date, then today.
    #[arg(long)]
    today: Option<NaiveDate>,
}

impl FilterArgs {
    fn to_filter(&self, settings: &Settings, fixture: &Fixture) -> Result<FilterState> {
        let kind = match &self.period {
            Some(tag) => PeriodKind::from_tag(tag)
                .with_context(|| format!("Unknown period '{}'. Use week, month, year or custom", tag))?,
            None => settings.default_period,
        };
        let period = match (kind, self.from, self.to) {
            (PeriodKind::Custom, Some(from), Some(to)) => Period::Custom { from, to },
            (PeriodKind::Custom, _, _) if self.period.is_some() => {
                bail!("A custom period needs both --from and --to")
            }
            (PeriodKind::Custom, _, _) => {
                tracing::warn!("default period is custom but no range was given, using week");
                Period::Week
            }
            (kind, _, _) => Period::from_kind(kind).unwrap_or(Period::Week),
        };

        let today = self
            .today
            .or(fixture.today)
            .unwrap_or_else(|| Local::now().date_naive());

        Ok(FilterState::for_period(period, today)
            .with_project(self.project)
            .with_client(self.client))
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_fixture(path: &Path) -> Result<Fixture> {
    Fixture::load(path).with_context(|| format!("Failed to load fixture {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    init_tracing(&settings.log_filter);

    match cli.command {
        Commands::Replay {
            fixture,
            filter,
            realtime,
            quiet_clock,
            search,
        } => {
            let fixture = load_fixture(&fixture)?;
            let filter = filter.to_filter(&settings, &fixture)?;
            let options = ReplayOptions {
                realtime,
                quiet_clock,
                search,
            };
            run_replay(&fixture, filter, &settings, options)
        }
        Commands::Stacks { fixture, filter } => {
            let fixture = load_fixture(&fixture)?;
            let filter = filter.to_filter(&settings, &fixture)?;
            print_stacks(&fixture, &filter, &settings.default_currency)
        }
        Commands::Report {
            fixture,
            filter,
            output,
        } => {
            let fixture = load_fixture(&fixture)?;
            let filter = filter.to_filter(&settings, &fixture)?;
            let report = build_report(&fixture, &filter)?;
            match output {
                Some(path) => {
                    report::write_report(&path, &report)?;
                    println!("Report generated: {}", path.display());
                }
                None => print!("{}", report),
            }
            Ok(())
        }
    }
}

struct ReplayOptions {
    realtime: bool,
    quiet_clock: bool,
    search: Option<String>,
}

fn run_replay(
    fixture: &Fixture,
    filter: FilterState,
    settings: &Settings,
    options: ReplayOptions,
) -> Result<()> {
    let core = Rc::new(RefCell::new(InMemoryCore::from_fixture(fixture)));
    let presenter = ConsolePresenter::new(
        std::io::stdout(),
        settings.time_style,
        settings.default_currency.clone(),
    )
    .quiet_clock(options.quiet_clock);
    let page = Rc::new(RefCell::new(TasksPage::new(
        Rc::clone(&core),
        presenter,
        FilterState::default(),
    )));

    let mut bus = EventBus::new();
    TasksPage::attach(&page, &mut bus);
    {
        let mut page = page.borrow_mut();
        page.set_filter(filter);
        if options.search.is_some() {
            page.set_search(options.search);
        }
        page.resume();
    }

    let mut ticker = ticker::Ticker::new(ticker::tick_duration());
    for event in &fixture.events {
        if options.realtime {
            ticker.pace(event);
        }
        // The Core persists before it publishes
        core.borrow_mut().record(event);
        bus.emit(event.clone());
        bus.dispatch_pending();
    }
    TasksPage::detach(&page, &mut bus);

    let page = page.borrow();
    let reconciler = page.reconciler();
    tracing::info!(
        events = fixture.events.len(),
        tracking = reconciler.is_tracking(),
        session = ?reconciler.session_id(),
        total_time = reconciler.displayed_stats().total_time,
        "replay finished"
    );
    Ok(())
}

fn print_stacks(fixture: &Fixture, filter: &FilterState, default_currency: &str) -> Result<()> {
    let visible: Vec<_> = fixture
        .instances
        .iter()
        .filter(|i| filter.shows(i))
        .cloned()
        .collect();

    for task_group in domain::group(&visible) {
        let latest = task_group.latest_task();
        let label = domain::stack::display_key(&task_group.key);
        let currency = latest.client_currency.as_deref().unwrap_or(default_currency);
        println!(
            "{} [{} member(s)] {} {}",
            label,
            task_group.members.len(),
            format_hms(task_group.total_duration),
            format_money(task_group.total_cost, currency)
        );
        let ids: Vec<String> = task_group.members.iter().map(|m| m.id.to_string()).collect();
        let last_used = latest
            .last_used_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!("    members {} | latest #{} ({})", ids.join(", "), latest.id, last_used);
    }
    Ok(())
}

/// Render a report of the fixture's state after its recorded events
fn build_report(fixture: &Fixture, filter: &FilterState) -> Result<String> {
    let mut core = InMemoryCore::from_fixture(fixture);
    for event in &fixture.events {
        core.record(event);
    }

    let Some(range) = filter.range else {
        bail!("No date range for the selected period");
    };
    let query = InstanceQuery {
        project_id: filter.project_id,
        client_id: filter.client_id,
        search: None,
    };
    let instances: Vec<_> = core
        .all_task_instances(&query)?
        .into_iter()
        .filter(|i| filter.shows(i))
        .collect();

    let narrowed = filter.project_id.is_some() || filter.client_id.is_some();
    let ids: Vec<i64> = instances.iter().map(|i| i.id).collect();
    let stats = core.stats_for_period(&range, narrowed.then_some(ids.as_slice()))?;
    let entries: Vec<_> = core
        .entries()
        .iter()
        .filter(|e| !narrowed || ids.contains(&e.task_instance_id))
        .cloned()
        .collect();

    Ok(report::render_report(&report::ReportInput {
        period: filter.period.kind(),
        range,
        stats: &stats,
        instances: &instances,
        entries: &entries,
    }))
}
