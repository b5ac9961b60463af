use crate::core::UiEvent;
use std::time::{Duration, Instant};

/// Interval between `tracking-updated` events from the Core
pub const CORE_TICK_MS: u64 = 1000;

pub fn tick_duration() -> Duration {
    Duration::from_millis(CORE_TICK_MS)
}

/// Paces a replay so tracking ticks arrive at the Core's rate
pub struct Ticker {
    interval: Duration,
    last_tick: Option<Instant>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: None,
        }
    }

    /// How long to wait before delivering `event`; only ticks are paced
    pub fn delay_before(&self, event: &UiEvent, now: Instant) -> Duration {
        if !matches!(event, UiEvent::TrackingUpdated(_)) {
            return Duration::ZERO;
        }
        match self.last_tick {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Sleep as needed, then note the delivery time of a tick
    pub fn pace(&mut self, event: &UiEvent) {
        let delay = self.delay_before(event, Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if matches!(event, UiEvent::TrackingUpdated(_)) {
            self.last_tick = Some(Instant::now());
        }
    }
}
