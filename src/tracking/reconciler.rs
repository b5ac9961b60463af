//! Per-tick reconciliation of the live tracking session against the loaded views.
//!
//! One session at a time moves `Idle -> Tracking -> Idle`. Ticks only touch the
//! view showing the tracked instance (its row, or its stack) and, when the
//! session matches the active filter, the statistics and earnings caches.
//! Anything structural (rename, project or client change) goes through a full
//! reload instead.

use super::earnings::CurrencyEarningsCache;
use super::presenter::{Presenter, StatsView, TimeLabel};
use super::registry::{ViewHandle, ViewRegistry};
use super::snapshot::BaseTimeSnapshot;
use crate::core::events::TrackingUpdate;
use crate::domain::{cost_for, group, Client, EntityKey, Lifecycle, PeriodStats, TaskInstance};
use crate::filter::{self, FilterState, TrackedSession};
use std::collections::HashMap;
use uuid::Uuid;

/// Name, owner and start of the tracked session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub task_name: String,
    pub project_id: Option<i64>,
    pub client_id: Option<i64>,
    /// Raw start time as reported by the Core
    pub start_time: Option<String>,
}

impl SessionIdentity {
    fn as_tracked(&self) -> TrackedSession {
        TrackedSession {
            start_time: self.start_time.clone(),
            project_id: self.project_id,
            client_id: self.client_id,
        }
    }
}

/// Billing for the tracked client
#[derive(Debug, Clone, PartialEq)]
pub struct ClientRate {
    pub rate: f64,
    pub currency: String,
}

impl From<&Client> for ClientRate {
    fn from(client: &Client) -> Self {
        Self {
            rate: client.rate,
            currency: client.currency.clone(),
        }
    }
}

/// Everything needed to begin a session
#[derive(Debug, Clone)]
pub struct SessionStart {
    pub task_instance_id: i64,
    pub identity: SessionIdentity,
    pub client: Option<ClientRate>,
    /// Persisted total to use when the instance is not in the loaded list
    pub persisted_total: Option<i64>,
}

/// Clock part of a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clock {
    pub elapsed: i64,
    pub pomodoro_remaining: Option<i64>,
}

impl Clock {
    fn label(&self) -> TimeLabel {
        match self.pomodoro_remaining {
            Some(remaining) => TimeLabel::Countdown(remaining),
            None => TimeLabel::Elapsed(self.elapsed),
        }
    }
}

/// A `tracking-updated` event, classified once at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    PureTick { clock: Clock },
    NameChanged { clock: Clock, identity: SessionIdentity },
    ProjectChanged { clock: Clock, identity: SessionIdentity },
    ClientChanged { clock: Clock, identity: SessionIdentity },
}

impl TickEvent {
    pub fn clock(&self) -> Clock {
        match self {
            TickEvent::PureTick { clock }
            | TickEvent::NameChanged { clock, .. }
            | TickEvent::ProjectChanged { clock, .. }
            | TickEvent::ClientChanged { clock, .. } => *clock,
        }
    }
}

/// Result of applying a tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// `view` is the view that was updated, if the tracked instance is displayed
    Applied { view: Option<EntityKey>, stats: bool },
    /// No session is active
    Dropped,
    /// The session's identity changed; re-cache the client, call `restructure`, reload
    Restructure(SessionIdentity),
}

/// Issued when a full reload begins; only the newest ticket may complete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket {
    generation: u64,
}

/// Fresh data for a full reload
#[derive(Debug, Clone, Default)]
pub struct RefreshData {
    pub instances: Vec<TaskInstance>,
    pub stats: PeriodStats,
}

#[derive(Debug)]
struct ActiveSession {
    id: Uuid,
    instance_id: i64,
    identity: SessionIdentity,
    matches_filter: bool,
    client: Option<ClientRate>,
    /// Last elapsed value seen from the Core
    elapsed: i64,
}

pub struct RealtimeReconciler {
    filter: FilterState,
    session: Option<ActiveSession>,
    snapshot: BaseTimeSnapshot,
    earnings: CurrencyEarningsCache,
    registry: ViewRegistry,
    base_stats: PeriodStats,
    displayed: StatsView,
    refresh_generation: u64,
}

impl RealtimeReconciler {
    pub fn new(filter: FilterState) -> Self {
        Self {
            filter,
            session: None,
            snapshot: BaseTimeSnapshot::new(),
            earnings: CurrencyEarningsCache::new(),
            registry: ViewRegistry::new(),
            base_stats: PeriodStats::default(),
            displayed: StatsView::default(),
            refresh_generation: 0,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn registry(&self) -> &ViewRegistry {
        &self.registry
    }

    /// Dispose every view, as when the page's widgets are torn down.
    /// The next reload rebuilds them live.
    pub fn dispose_views(&mut self) {
        let entities: Vec<EntityKey> =
            self.registry.views().iter().map(|v| v.entity.clone()).collect();
        for entity in &entities {
            self.registry.dispose(entity);
        }
    }

    pub fn displayed_stats(&self) -> StatsView {
        self.displayed
    }

    pub fn earnings(&self) -> &HashMap<String, f64> {
        self.earnings.realtime()
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn tracked_instance(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.instance_id)
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// Latched filter match of the active session
    pub fn matches_filter(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.matches_filter)
    }

    pub fn start(&mut self, start: SessionStart, presenter: &mut impl Presenter) {
        if let Some(previous) = self.session.take() {
            tracing::debug!(session = %previous.id, "start without stop, discarding previous session");
            self.mark_live(previous.instance_id, false);
        }

        let id = start.task_instance_id;
        let base = self
            .registry
            .instance(id)
            .map(|i| i.total_time)
            .or(start.persisted_total);
        match base {
            Some(base) => {
                self.snapshot.on_session_start(id, base);
                self.mirror_siblings(id);
            }
            None => self.snapshot.clear(),
        }

        let matches_filter = filter::matches(&start.identity.as_tracked(), &self.filter);
        let session = ActiveSession {
            id: Uuid::new_v4(),
            instance_id: id,
            identity: start.identity,
            matches_filter,
            client: start.client,
            elapsed: 0,
        };
        tracing::info!(session = %session.id, instance = id, matches_filter, "tracking started");
        self.session = Some(session);
        self.earnings.clear_live();

        let entity = self.mark_live(id, true);
        presenter.update_tracking_state(entity.as_ref());
    }

    /// Decide which kind of tick an update is, relative to the latched identity
    pub fn classify(&self, update: &TrackingUpdate) -> TickEvent {
        let clock = Clock {
            elapsed: update.elapsed_seconds,
            pomodoro_remaining: update.pomodoro_remaining,
        };
        let Some(session) = &self.session else {
            return TickEvent::PureTick { clock };
        };

        let current = &session.identity;
        let mut identity = current.clone();
        if let Some(name) = &update.task_name {
            identity.task_name = name.clone();
        }
        if let Some(project_id) = update.project_id {
            identity.project_id = project_id;
        }
        if let Some(client_id) = update.client_id {
            identity.client_id = client_id;
        }

        if identity.task_name != current.task_name {
            TickEvent::NameChanged { clock, identity }
        } else if identity.project_id != current.project_id {
            TickEvent::ProjectChanged { clock, identity }
        } else if identity.client_id != current.client_id {
            TickEvent::ClientChanged { clock, identity }
        } else {
            TickEvent::PureTick { clock }
        }
    }

    pub fn tick(&mut self, event: TickEvent, presenter: &mut impl Presenter) -> TickOutcome {
        let clock = event.clock();
        let Some(session) = self.session.as_mut() else {
            tracing::debug!(elapsed = clock.elapsed, "tick while idle, dropping");
            return TickOutcome::Dropped;
        };
        session.elapsed = clock.elapsed;
        presenter.update_time_label(clock.label());

        match event {
            TickEvent::PureTick { .. } => {}
            TickEvent::NameChanged { identity, .. }
            | TickEvent::ProjectChanged { identity, .. }
            | TickEvent::ClientChanged { identity, .. } => {
                return TickOutcome::Restructure(identity);
            }
        }

        let view = self.push_live_total(presenter);
        let stats = self.push_live_stats(presenter);
        TickOutcome::Applied { view, stats }
    }

    /// Apply a changed identity: re-match the filter and re-cache the client.
    ///
    /// Statistics include the live time from this call onward. Returns the new
    /// filter match. The caller is expected to reload the list afterwards.
    pub fn restructure(
        &mut self,
        identity: SessionIdentity,
        client: Option<ClientRate>,
        presenter: &mut impl Presenter,
    ) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let matches_filter = filter::matches(&identity.as_tracked(), &self.filter);
        tracing::info!(
            session = %session.id,
            was = session.matches_filter,
            now = matches_filter,
            "tracked session changed"
        );
        session.identity = identity;
        session.client = client;
        session.matches_filter = matches_filter;

        if !self.push_live_stats(presenter) {
            self.reset_stats(presenter);
        }
        matches_filter
    }

    /// Replace the active filter, re-latching the session's match.
    ///
    /// Statistics are re-pushed at once and carry live time only while the
    /// session matches.
    pub fn set_filter(&mut self, filter: FilterState, presenter: &mut impl Presenter) -> bool {
        self.filter = filter;
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let matches_filter = filter::matches(&session.identity.as_tracked(), &self.filter);
        session.matches_filter = matches_filter;

        if !self.push_live_stats(presenter) {
            self.reset_stats(presenter);
        }
        matches_filter
    }

    /// Replace the cached client rate (e.g. the client was edited mid-session)
    pub fn update_client(&mut self, client: Option<ClientRate>) {
        if let Some(session) = self.session.as_mut() {
            session.client = client;
            self.earnings.clear_live();
        }
    }

    /// End the session, folding `final_duration` into the persisted total.
    ///
    /// Returns the new total of the tracked instance, or `None` when no session
    /// was active.
    pub fn stop(&mut self, final_duration: i64, presenter: &mut impl Presenter) -> Option<i64> {
        let Some(session) = self.session.take() else {
            tracing::debug!("stop without an active session");
            return None;
        };
        let id = session.instance_id;

        let total = self
            .snapshot
            .on_session_stop(id, final_duration)
            .or_else(|| self.registry.instance(id).map(|i| i.total_time + final_duration));
        self.snapshot.clear();
        if let (Some(total), Some(instance)) = (total, self.registry.instance_mut(id)) {
            instance.total_time = total;
        }

        if session.matches_filter {
            self.base_stats.total_time += final_duration;
            if let Some(client) = &session.client {
                self.earnings
                    .fold_into_base(&client.currency, cost_for(final_duration, client.rate));
            }
        }
        self.earnings.clear_live();
        self.displayed.total_time = self.base_stats.total_time;

        self.refresh_view_of(id, presenter);
        presenter.update_stats(&self.displayed, self.earnings.realtime());
        presenter.update_tracking_state(None);
        tracing::info!(session = %session.id, instance = id, final_duration, ?total, "tracking stopped");
        total
    }

    /// Drop the session without folding anything (the Core reports it already ended)
    pub fn abandon(&mut self, presenter: &mut impl Presenter) {
        let Some(session) = self.session.take() else {
            return;
        };
        tracing::debug!(session = %session.id, "abandoning session");
        self.snapshot.clear();
        self.earnings.clear_live();
        self.displayed.total_time = self.base_stats.total_time;
        self.mark_live(session.instance_id, false);
        presenter.update_stats(&self.displayed, self.earnings.realtime());
        presenter.update_tracking_state(None);
    }

    pub fn begin_refresh(&mut self) -> RefreshTicket {
        self.refresh_generation += 1;
        RefreshTicket {
            generation: self.refresh_generation,
        }
    }

    /// Apply a full reload. Superseded tickets are discarded.
    ///
    /// Live state is derived from the session active *now*, not from whatever
    /// was active when the ticket was issued.
    pub fn complete_refresh(
        &mut self,
        ticket: RefreshTicket,
        data: RefreshData,
        presenter: &mut impl Presenter,
    ) -> bool {
        if ticket.generation != self.refresh_generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.refresh_generation,
                "discarding superseded refresh"
            );
            return false;
        }

        self.registry.rebuild(&group(&data.instances));
        self.earnings.set_base(data.stats.earnings_by_currency.clone());
        self.displayed = StatsView {
            total_time: data.stats.total_time,
            active_projects: data.stats.active_projects,
            tracked_tasks: data.stats.tracked_tasks,
        };
        self.base_stats = data.stats;

        let live_entity = match self.tracked_instance() {
            Some(id) => {
                self.mirror_siblings(id);
                self.live_view_totals().and_then(|(handle, total, cost)| {
                    let view = self.registry.get_mut(handle)?;
                    view.total = total;
                    view.cost = cost;
                    view.live = true;
                    Some(view.entity.clone())
                })
            }
            None => None,
        };

        presenter.list_reloaded(self.registry.views());
        if !self.push_live_stats(presenter) {
            presenter.update_stats(&self.displayed, self.earnings.realtime());
        }
        presenter.update_tracking_state(live_entity.as_ref());
        true
    }

    /// Snapshot the bases of the tracked instance's current stack siblings,
    /// forgetting instances that have left the stack
    fn mirror_siblings(&mut self, id: i64) {
        let Some(view) = self.registry.locate(id).and_then(|h| self.registry.get(h)) else {
            self.snapshot.retain_members(&[]);
            return;
        };
        self.snapshot.retain_members(&view.member_ids);
        for &member in view.member_ids.iter().filter(|&&m| m != id) {
            if let Some(instance) = self.registry.instance(member) {
                self.snapshot.mirror_member(member, instance.total_time);
            }
        }
    }

    fn mark_live(&mut self, id: i64, live: bool) -> Option<EntityKey> {
        let handle = self.registry.locate(id)?;
        let view = self.registry.get_mut(handle)?;
        view.live = live;
        Some(view.entity.clone())
    }

    /// Live total and cost of the view showing the tracked instance
    fn live_view_totals(&mut self) -> Option<(ViewHandle, i64, f64)> {
        let (id, elapsed) = self.session.as_ref().map(|s| (s.instance_id, s.elapsed))?;
        let Some(handle) = self.registry.locate(id) else {
            tracing::debug!(instance = id, "tracked instance not loaded, no visible update");
            return None;
        };
        let view = self.registry.get(handle)?;
        if view.lifecycle == Lifecycle::Disposed {
            return None;
        }

        let last_known = self.registry.instance(id)?.total_time;
        let tracked_total = self.snapshot.live_total_or_synthesize(id, last_known, elapsed);

        let mut total = 0;
        let mut cost = 0.0;
        for &member in &view.member_ids {
            let Some(instance) = self.registry.instance(member) else {
                continue;
            };
            let member_total = if member == id {
                tracked_total
            } else {
                self.snapshot.base_of(member).unwrap_or(instance.total_time)
            };
            total += member_total;
            cost += instance.cost_of(member_total);
        }
        Some((handle, total, cost))
    }

    fn push_live_total(&mut self, presenter: &mut impl Presenter) -> Option<EntityKey> {
        let (handle, total, cost) = self.live_view_totals()?;
        let view = self.registry.get_mut(handle)?;
        view.total = total;
        view.cost = cost;
        presenter.update_task_time(&view.entity, total, cost);
        Some(view.entity.clone())
    }

    fn push_live_stats(&mut self, presenter: &mut impl Presenter) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        if !session.matches_filter {
            return false;
        }
        self.displayed.total_time = self.base_stats.total_time + session.elapsed;
        let earnings = match &session.client {
            Some(client) => self
                .earnings
                .with_live(session.elapsed, client.rate, &client.currency),
            None => self.earnings.realtime(),
        };
        presenter.update_stats(&self.displayed, earnings);
        true
    }

    fn reset_stats(&mut self, presenter: &mut impl Presenter) {
        self.displayed.total_time = self.base_stats.total_time;
        presenter.update_stats(&self.displayed, self.earnings.clear_live());
    }

    /// Recompute a view from persisted totals and clear its live marker
    fn refresh_view_of(&mut self, id: i64, presenter: &mut impl Presenter) {
        let Some(handle) = self.registry.locate(id) else {
            return;
        };
        let Some(members) = self.registry.get(handle).map(|v| v.member_ids.clone()) else {
            return;
        };
        let (total, cost) = members
            .iter()
            .filter_map(|m| self.registry.instance(*m))
            .fold((0, 0.0), |(t, c), i| (t + i.total_time, c + i.cost_of(i.total_time)));

        let Some(view) = self.registry.get_mut(handle) else {
            return;
        };
        view.total = total;
        view.cost = cost;
        view.live = false;
        if view.lifecycle == Lifecycle::Live {
            presenter.update_task_time(&view.entity, total, cost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::format_hms;
    use crate::filter::Period;
    use crate::tracking::presenter::recording::{Call, RecordingPresenter};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const ACME: i64 = 1;
    const GLOBEX: i64 = 2;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
    }

    fn instance(id: i64, name: &str, project: i64, total: i64) -> TaskInstance {
        let project_name = if project == ACME { "Acme" } else { "Globex" };
        let mut instance = TaskInstance::new(id, name)
            .with_project(project, project_name)
            .with_total_time(total)
            .with_last_used_at(day(20).and_hms_opt(9, 0, 0).unwrap());
        instance.client_id = Some(project);
        instance.client_name = Some(project_name.to_string());
        instance.client_currency = Some("EUR".to_string());
        instance.client_rate = 36.0;
        instance
    }

    fn week() -> FilterState {
        FilterState::for_period(Period::Week, day(21))
    }

    fn stats(total: i64) -> PeriodStats {
        PeriodStats {
            total_time: total,
            active_projects: 1,
            tracked_tasks: 2,
            earnings_by_currency: HashMap::from([("EUR".to_string(), 10.0)]),
        }
    }

    fn load(
        reconciler: &mut RealtimeReconciler,
        presenter: &mut RecordingPresenter,
        instances: Vec<TaskInstance>,
        stats_total: i64,
    ) {
        let ticket = reconciler.begin_refresh();
        let data = RefreshData {
            instances,
            stats: stats(stats_total),
        };
        assert!(reconciler.complete_refresh(ticket, data, presenter));
    }

    fn session_start(id: i64, name: &str, project: i64) -> SessionStart {
        SessionStart {
            task_instance_id: id,
            identity: SessionIdentity {
                task_name: name.to_string(),
                project_id: Some(project),
                client_id: Some(project),
                start_time: Some("2026-10-21 10:00:00".to_string()),
            },
            client: Some(ClientRate {
                rate: 36.0,
                currency: "EUR".to_string(),
            }),
            persisted_total: None,
        }
    }

    fn update(elapsed: i64) -> TrackingUpdate {
        TrackingUpdate {
            elapsed_seconds: elapsed,
            ..Default::default()
        }
    }

    fn tick(
        reconciler: &mut RealtimeReconciler,
        presenter: &mut RecordingPresenter,
        update: TrackingUpdate,
    ) -> TickOutcome {
        let event = reconciler.classify(&update);
        reconciler.tick(event, presenter)
    }

    #[test]
    fn test_tick_shows_base_plus_elapsed() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 3600)], 5000);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        presenter.take();

        let outcome = tick(&mut reconciler, &mut presenter, update(10));
        assert_eq!(
            outcome,
            TickOutcome::Applied { view: Some(EntityKey::Task(1)), stats: true }
        );
        assert_eq!(presenter.task_times(), vec![(EntityKey::Task(1), 3610)]);
        assert_eq!(format_hms(3610), "01:00:10");
        assert_eq!(presenter.calls[0], Call::TimeLabel(TimeLabel::Elapsed(10)));
    }

    #[test]
    fn test_repeated_ticks_do_not_drift() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 3600)], 0);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);

        for elapsed in [1, 3, 3, 4, 6, 5, 30] {
            presenter.take();
            tick(&mut reconciler, &mut presenter, update(elapsed));
            assert_eq!(presenter.task_times(), vec![(EntityKey::Task(1), 3600 + elapsed)]);
        }
    }

    #[test]
    fn test_stack_aggregate_updates_once_per_tick() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        let members = vec![instance(1, "Design", ACME, 100), instance(2, "Design", ACME, 200)];
        load(&mut reconciler, &mut presenter, members, 300);
        let stack = reconciler.registry().views()[0].entity.clone();
        assert!(matches!(stack, EntityKey::Stack(_)));

        reconciler.start(session_start(2, "Design", ACME), &mut presenter);
        assert_eq!(presenter.last_tracking_state(), Some(Some(stack.clone())));
        presenter.take();

        tick(&mut reconciler, &mut presenter, update(5));
        assert_eq!(presenter.task_times(), vec![(stack, 305)]);
    }

    #[test]
    fn test_stop_folds_once_and_ignores_stray_ticks() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 3600)], 3600);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        tick(&mut reconciler, &mut presenter, update(20));
        presenter.take();

        assert_eq!(reconciler.stop(25, &mut presenter), Some(3625));
        assert_eq!(reconciler.registry().instance(1).unwrap().total_time, 3625);
        assert_eq!(presenter.task_times(), vec![(EntityKey::Task(1), 3625)]);
        assert_eq!(presenter.last_tracking_state(), Some(None));
        assert!(!reconciler.registry().views()[0].live);
        // Folded into the base statistics until the next reload
        assert_eq!(reconciler.displayed_stats().total_time, 3625);

        assert_eq!(reconciler.stop(25, &mut presenter), None);
        presenter.take();
        assert_eq!(tick(&mut reconciler, &mut presenter, update(26)), TickOutcome::Dropped);
        assert!(presenter.calls.is_empty());
        assert_eq!(reconciler.registry().instance(1).unwrap().total_time, 3625);
    }

    #[test]
    fn test_non_matching_session_leaves_stats_alone() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week().with_project(Some(ACME)));
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 100)], 900);
        reconciler.start(session_start(7, "B", GLOBEX), &mut presenter);
        assert!(!reconciler.matches_filter());
        presenter.take();

        let outcome = tick(&mut reconciler, &mut presenter, update(60));
        assert_eq!(outcome, TickOutcome::Applied { view: None, stats: false });
        assert_eq!(presenter.last_stats(), None);
        assert_eq!(reconciler.displayed_stats().total_time, 900);
        assert_eq!(reconciler.earnings().get("EUR"), Some(&10.0));
    }

    #[test]
    fn test_project_change_starts_folding_from_that_tick() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week().with_project(Some(ACME)));
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 100)], 900);

        let mut start = session_start(1, "A", GLOBEX);
        start.identity.client_id = Some(ACME);
        reconciler.start(start, &mut presenter);
        assert!(!reconciler.matches_filter());

        tick(&mut reconciler, &mut presenter, update(5));
        assert_eq!(presenter.last_stats().map(|s| s.0.total_time), Some(900));
        presenter.take();

        let moved = TrackingUpdate {
            elapsed_seconds: 6,
            project_id: Some(Some(ACME)),
            ..Default::default()
        };
        let event = reconciler.classify(&moved);
        assert!(matches!(event, TickEvent::ProjectChanged { .. }));
        let TickOutcome::Restructure(identity) = reconciler.tick(event, &mut presenter) else {
            panic!("project change must restructure");
        };
        assert_eq!(identity.project_id, Some(ACME));
        assert!(presenter.task_times().is_empty());

        let rate = ClientRate { rate: 36.0, currency: "EUR".to_string() };
        assert!(reconciler.restructure(identity, Some(rate), &mut presenter));
        assert_eq!(reconciler.displayed_stats().total_time, 906);

        tick(&mut reconciler, &mut presenter, update(7));
        let (shown, earnings) = presenter.last_stats().unwrap();
        assert_eq!(shown.total_time, 907);
        let eur = earnings.iter().find(|(c, _)| c == "EUR").map(|(_, a)| *a).unwrap();
        assert!((eur - (10.0 + 7.0 / 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_matching_session_merges_live_earnings() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 0)], 1000);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);

        tick(&mut reconciler, &mut presenter, update(100));
        assert_eq!(reconciler.displayed_stats().total_time, 1100);
        // 100s at 36/h is 1.0
        let eur = reconciler.earnings().get("EUR").copied().unwrap();
        assert!((eur - 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_unloaded_instance_degrades_to_no_visible_update() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 10)], 0);
        reconciler.start(session_start(42, "Hidden", ACME), &mut presenter);
        presenter.take();

        let outcome = tick(&mut reconciler, &mut presenter, update(3));
        assert_eq!(outcome, TickOutcome::Applied { view: None, stats: true });
        assert!(presenter.task_times().is_empty());
    }

    #[test]
    fn test_disposed_view_gets_no_updates() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 10)], 0);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        reconciler.registry.dispose(&EntityKey::Task(1));
        presenter.take();

        tick(&mut reconciler, &mut presenter, update(3));
        assert!(presenter.task_times().is_empty());
    }

    #[test]
    fn test_refresh_finishing_after_stop_shows_no_live_marker() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 10)], 0);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);

        let ticket = reconciler.begin_refresh();
        tick(&mut reconciler, &mut presenter, update(4));
        reconciler.stop(4, &mut presenter);
        presenter.take();

        let data = RefreshData {
            instances: vec![instance(1, "A", ACME, 14)],
            stats: stats(14),
        };
        assert!(reconciler.complete_refresh(ticket, data, &mut presenter));
        assert_eq!(
            presenter.calls[0],
            Call::ListReloaded(vec![(EntityKey::Task(1), 14, false)])
        );
        assert_eq!(presenter.last_tracking_state(), Some(None));
    }

    #[test]
    fn test_superseded_refresh_is_discarded() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        let stale = reconciler.begin_refresh();
        let fresh = reconciler.begin_refresh();

        let data = RefreshData {
            instances: vec![instance(1, "A", ACME, 10)],
            stats: stats(10),
        };
        assert!(!reconciler.complete_refresh(stale, data.clone(), &mut presenter));
        assert!(presenter.calls.is_empty());
        assert!(reconciler.complete_refresh(fresh, data, &mut presenter));
        assert_eq!(reconciler.registry().views().len(), 1);
    }

    #[test]
    fn test_refresh_mid_session_keeps_base_snapshot() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 3600)], 0);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        tick(&mut reconciler, &mut presenter, update(30));
        presenter.take();

        // A reload mid-session carries a total the Core has not changed yet
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 3600)], 0);
        assert_eq!(
            presenter.calls[0],
            Call::ListReloaded(vec![(EntityKey::Task(1), 3630, true)])
        );
        assert_eq!(presenter.last_tracking_state(), Some(Some(EntityKey::Task(1))));

        presenter.take();
        tick(&mut reconciler, &mut presenter, update(31));
        assert_eq!(presenter.task_times(), vec![(EntityKey::Task(1), 3631)]);
    }

    #[test]
    fn test_refresh_forgets_siblings_that_left_the_stack() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        let stacked = vec![instance(1, "A", ACME, 3600), instance(2, "A", ACME, 1800)];
        load(&mut reconciler, &mut presenter, stacked, 0);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        assert_eq!(reconciler.snapshot.base_of(2), Some(1800));

        // Renamed away from the stack
        let split = vec![instance(1, "A", ACME, 3600), instance(2, "B", ACME, 1800)];
        load(&mut reconciler, &mut presenter, split, 0);
        assert_eq!(reconciler.snapshot.base_of(2), None);
        assert_eq!(reconciler.snapshot.base_of(1), Some(3600));

        // Back in the stack with time removed meanwhile
        let rejoined = vec![instance(1, "A", ACME, 3600), instance(2, "A", ACME, 1200)];
        load(&mut reconciler, &mut presenter, rejoined, 0);
        let stack = reconciler.registry().views()[0].entity.clone();
        presenter.take();

        tick(&mut reconciler, &mut presenter, update(10));
        assert_eq!(presenter.task_times(), vec![(stack, 4810)]);
    }

    #[test]
    fn test_missing_snapshot_is_synthesized_from_loaded_total() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        // Session began before the list was loaded
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 500)], 0);
        presenter.take();

        tick(&mut reconciler, &mut presenter, update(9));
        assert_eq!(presenter.task_times(), vec![(EntityKey::Task(1), 509)]);
    }

    #[test]
    fn test_set_filter_relatches_match() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        assert!(reconciler.matches_filter());
        assert!(!reconciler.set_filter(week().with_project(Some(GLOBEX)), &mut presenter));
        assert!(!reconciler.matches_filter());
        assert!(reconciler.set_filter(week().with_client(Some(ACME)), &mut presenter));
    }

    #[test]
    fn test_set_filter_drops_live_time_from_stats() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 100)], 900);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        tick(&mut reconciler, &mut presenter, update(50));
        assert_eq!(reconciler.displayed_stats().total_time, 950);
        presenter.take();

        // No reload follows, the stats must already exclude the session
        assert!(!reconciler.set_filter(week().with_project(Some(GLOBEX)), &mut presenter));
        assert_eq!(reconciler.displayed_stats().total_time, 900);
        assert_eq!(reconciler.earnings().get("EUR"), Some(&10.0));
        let (shown, earnings) = presenter.last_stats().unwrap();
        assert_eq!(shown.total_time, 900);
        assert_eq!(earnings, vec![("EUR".to_string(), 10.0)]);

        tick(&mut reconciler, &mut presenter, update(51));
        assert_eq!(reconciler.displayed_stats().total_time, 900);

        // 51s at 36/h is 0.51
        assert!(reconciler.set_filter(week(), &mut presenter));
        assert_eq!(reconciler.displayed_stats().total_time, 951);
        let eur = reconciler.earnings().get("EUR").copied().unwrap();
        assert!((eur - 10.51).abs() < 1e-9);
    }

    #[test]
    fn test_classify_name_change() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        reconciler.start(session_start(1, "A", ACME), &mut presenter);

        let same_name = TrackingUpdate {
            elapsed_seconds: 2,
            task_name: Some("A".to_string()),
            ..Default::default()
        };
        assert!(matches!(reconciler.classify(&same_name), TickEvent::PureTick { .. }));

        let renamed = TrackingUpdate {
            elapsed_seconds: 3,
            task_name: Some("B".to_string()),
            ..Default::default()
        };
        match reconciler.classify(&renamed) {
            TickEvent::NameChanged { identity, clock } => {
                assert_eq!(identity.task_name, "B");
                assert_eq!(identity.project_id, Some(ACME));
                assert_eq!(clock.elapsed, 3);
            }
            other => panic!("unexpected {:?}", other),
        }

        let unassigned = TrackingUpdate {
            elapsed_seconds: 4,
            client_id: Some(None),
            ..Default::default()
        };
        assert!(matches!(reconciler.classify(&unassigned), TickEvent::ClientChanged { .. }));
    }

    #[test]
    fn test_pomodoro_ticks_show_countdown() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        presenter.take();

        let update = TrackingUpdate {
            elapsed_seconds: 60,
            pomodoro_remaining: Some(1440),
            ..Default::default()
        };
        tick(&mut reconciler, &mut presenter, update);
        assert_eq!(presenter.calls[0], Call::TimeLabel(TimeLabel::Countdown(1440)));
    }

    #[test]
    fn test_second_start_replaces_session() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(
            &mut reconciler,
            &mut presenter,
            vec![instance(1, "A", ACME, 100), instance(2, "B", ACME, 200)],
            0,
        );
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        let first = reconciler.session_id();
        reconciler.start(session_start(2, "B", ACME), &mut presenter);
        assert_ne!(reconciler.session_id(), first);
        assert_eq!(reconciler.tracked_instance(), Some(2));
        assert!(!reconciler.registry().views()[0].live);
        assert!(reconciler.registry().views()[1].live);
    }

    #[test]
    fn test_abandon_clears_without_folding() {
        let mut presenter = RecordingPresenter::default();
        let mut reconciler = RealtimeReconciler::new(week());
        load(&mut reconciler, &mut presenter, vec![instance(1, "A", ACME, 100)], 100);
        reconciler.start(session_start(1, "A", ACME), &mut presenter);
        tick(&mut reconciler, &mut presenter, update(50));
        reconciler.abandon(&mut presenter);

        assert!(!reconciler.is_tracking());
        assert_eq!(reconciler.registry().instance(1).unwrap().total_time, 100);
        assert_eq!(reconciler.displayed_stats().total_time, 100);
        assert_eq!(presenter.last_tracking_state(), Some(None));
    }
}
