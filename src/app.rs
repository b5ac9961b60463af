use crate::core::{
    CoreBridge, CoreError, EventBus, EventKind, InstanceQuery, SubscriptionId, TrackingStarted,
    TrackingUpdate, UiEvent,
};
use crate::domain::PeriodStats;
use crate::filter::FilterState;
use crate::tracking::{
    ClientRate, Presenter, RealtimeReconciler, RefreshData, SessionIdentity, SessionStart,
    TickOutcome,
};
use std::cell::RefCell;
use std::rc::Rc;

/// The task list page: owns the reconciler and routes Core events into it
pub struct TasksPage<C, P> {
    core: C,
    presenter: P,
    reconciler: RealtimeReconciler,
    search: Option<String>,
    subscriptions: Vec<SubscriptionId>,
}

impl<C: CoreBridge, P: Presenter> TasksPage<C, P> {
    pub fn new(core: C, presenter: P, filter: FilterState) -> Self {
        Self {
            core,
            presenter,
            reconciler: RealtimeReconciler::new(filter),
            search: None,
            subscriptions: Vec::new(),
        }
    }

    pub fn reconciler(&self) -> &RealtimeReconciler {
        &self.reconciler
    }

    /// Route a Core event
    pub fn handle(&mut self, event: &UiEvent) {
        match event {
            UiEvent::TrackingStarted(started) => {
                self.begin_session(started);
                self.reload();
            }
            UiEvent::TrackingUpdated(update) => self.on_tick(update),
            UiEvent::TrackingStopped {
                task_instance_id,
                duration,
            } => {
                if self.reconciler.tracked_instance() == Some(*task_instance_id) {
                    self.reconciler.stop(*duration, &mut self.presenter);
                } else {
                    tracing::debug!(
                        instance = task_instance_id,
                        tracked = ?self.reconciler.tracked_instance(),
                        "stop for a session this page was not tracking"
                    );
                    self.reconciler.abandon(&mut self.presenter);
                }
                self.reload();
            }
            UiEvent::ClientUpdated { id } => {
                let tracked_client = self.reconciler.identity().and_then(|i| i.client_id);
                if tracked_client == Some(*id) {
                    let client = self.fetch_client(Some(*id));
                    self.reconciler.update_client(client);
                }
                self.reload();
            }
            UiEvent::TaskCreated { .. }
            | UiEvent::TaskUpdated { .. }
            | UiEvent::ProjectUpdated { .. }
            | UiEvent::TasksDeleted { .. } => {
                self.reload();
            }
        }
    }

    fn on_tick(&mut self, update: &TrackingUpdate) {
        let event = self.reconciler.classify(update);
        match self.reconciler.tick(event, &mut self.presenter) {
            TickOutcome::Restructure(identity) => {
                let client = self.fetch_client(identity.client_id);
                self.reconciler
                    .restructure(identity, client, &mut self.presenter);
                self.reload();
            }
            TickOutcome::Applied { .. } | TickOutcome::Dropped => {}
        }
    }

    fn begin_session(&mut self, started: &TrackingStarted) {
        let id = started.task_instance_id;
        let persisted_total = if self.reconciler.registry().contains_instance(id) {
            None
        } else {
            match self.core.task_instance(id) {
                Ok(instance) => Some(instance.total_time),
                Err(err) => {
                    tracing::warn!(instance = id, error = %err, "could not fetch tracked instance");
                    None
                }
            }
        };
        let client = self.fetch_client(started.client_id);

        let start = SessionStart {
            task_instance_id: id,
            identity: SessionIdentity {
                task_name: started.task_name.clone(),
                project_id: started.project_id,
                client_id: started.client_id,
                start_time: started.start_time.clone(),
            },
            client,
            persisted_total,
        };
        self.reconciler.start(start, &mut self.presenter);
    }

    fn fetch_client(&self, client_id: Option<i64>) -> Option<ClientRate> {
        let id = client_id?;
        match self.core.client(id) {
            Ok(client) => Some(ClientRate::from(&client)),
            Err(err) => {
                tracing::warn!(client = id, error = %err, "could not fetch client, earnings paused");
                None
            }
        }
    }

    /// Reload the list and statistics from the Core.
    ///
    /// Returns `false` if the Core failed; nothing is applied in that case.
    pub fn reload(&mut self) -> bool {
        let ticket = self.reconciler.begin_refresh();
        match self.fetch_refresh() {
            Ok(data) => self
                .reconciler
                .complete_refresh(ticket, data, &mut self.presenter),
            Err(err) => {
                tracing::warn!(error = %err, "reload failed, keeping current view");
                false
            }
        }
    }

    fn fetch_refresh(&self) -> Result<RefreshData, CoreError> {
        let filter = self.reconciler.filter();
        let query = InstanceQuery {
            project_id: filter.project_id,
            client_id: filter.client_id,
            search: self.search.clone(),
        };
        let instances: Vec<_> = self
            .core
            .all_task_instances(&query)?
            .into_iter()
            .filter(|i| filter.shows(i))
            .collect();

        let stats = match filter.range {
            Some(range) => {
                let narrowed = filter.project_id.is_some()
                    || filter.client_id.is_some()
                    || self.search.is_some();
                let ids: Vec<i64> = instances.iter().map(|i| i.id).collect();
                self.core
                    .stats_for_period(&range, narrowed.then_some(ids.as_slice()))?
            }
            None => PeriodStats::default(),
        };

        Ok(RefreshData { instances, stats })
    }

    pub fn set_filter(&mut self, filter: FilterState) {
        self.reconciler.set_filter(filter, &mut self.presenter);
        self.reload();
    }

    pub fn set_search(&mut self, search: Option<String>) {
        self.search = search.filter(|s| !s.trim().is_empty());
        self.reload();
    }

    /// Re-derive everything from the Core, e.g. when the page becomes visible again
    pub fn resume(&mut self) {
        match self.core.tracking_state() {
            Ok(state) if state.is_tracking => {
                let Some(id) = state.current_task_instance_id else {
                    tracing::warn!("core is tracking without an instance id");
                    return;
                };
                if self.reconciler.tracked_instance() != Some(id) {
                    let started = TrackingStarted {
                        task_instance_id: id,
                        task_id: state.current_task_id,
                        task_name: state.current_task_name.clone().unwrap_or_default(),
                        project_id: state.current_project_id,
                        client_id: state.current_client_id,
                        start_time: state.start_time.clone(),
                    };
                    self.begin_session(&started);
                }
                self.reload();
                let update = TrackingUpdate {
                    elapsed_seconds: state.elapsed_seconds,
                    pomodoro_remaining: state.pomodoro_mode.then_some(state.pomodoro_remaining),
                    ..Default::default()
                };
                self.on_tick(&update);
            }
            Ok(_) => {
                if self.reconciler.is_tracking() {
                    self.reconciler.abandon(&mut self.presenter);
                }
                self.reload();
            }
            Err(err) => {
                tracing::warn!(error = %err, "could not read tracking state");
            }
        }
    }
}

#[cfg(test)]
impl<C, P> TasksPage<C, P> {
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }
}

impl<C: CoreBridge + 'static, P: Presenter + 'static> TasksPage<C, P> {
    /// Subscribe the page to every Core event
    pub fn attach(page: &Rc<RefCell<Self>>, bus: &mut EventBus) -> Vec<SubscriptionId> {
        let ids: Vec<SubscriptionId> = EventKind::all()
            .iter()
            .map(|kind| {
                let weak = Rc::downgrade(page);
                bus.on(*kind, move |event| {
                    if let Some(page) = weak.upgrade() {
                        page.borrow_mut().handle(event);
                    }
                })
            })
            .collect();
        page.borrow_mut().subscriptions.extend(ids.iter().copied());
        ids
    }

    /// Unsubscribe and dispose the page's views
    pub fn detach(page: &Rc<RefCell<Self>>, bus: &mut EventBus) {
        let mut page = page.borrow_mut();
        for id in page.subscriptions.drain(..) {
            bus.off(id);
        }
        page.reconciler.dispose_views();
    }
}
