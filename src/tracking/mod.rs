pub mod earnings;
pub mod presenter;
pub mod reconciler;
pub mod registry;
pub mod snapshot;

pub use presenter::{Presenter, StatsView, TimeLabel};
pub use reconciler::{
    ClientRate, RealtimeReconciler, RefreshData, SessionIdentity, SessionStart, TickOutcome,
};
pub use registry::ViewModel;
