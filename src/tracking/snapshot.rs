use std::collections::HashMap;

/// Persisted totals captured when a tracking session starts.
///
/// Live totals are always `base + elapsed`; the base is never re-read from the
/// instance mid-session because the Core only updates `total_time` on stop.
#[derive(Debug, Default)]
pub struct BaseTimeSnapshot {
    /// Entity being tracked, if a session is live
    tracked: Option<i64>,
    /// Base totals for the tracked entity and its stack siblings
    bases: HashMap<i64, i64>,
}

impl BaseTimeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the tracked entity's base. Any previous session's snapshot is discarded.
    pub fn on_session_start(&mut self, entity_id: i64, persisted_total: i64) {
        if let Some(previous) = self.tracked {
            if previous != entity_id {
                tracing::debug!(previous, entity_id, "discarding snapshot of unstopped session");
            }
        }
        self.bases.clear();
        self.tracked = Some(entity_id);
        self.bases.insert(entity_id, persisted_total);
    }

    /// Mirror a stack sibling's total at session start. Ignored while idle.
    pub fn mirror_member(&mut self, entity_id: i64, persisted_total: i64) {
        if self.tracked.is_some() {
            self.bases.entry(entity_id).or_insert(persisted_total);
        }
    }

    /// Drop sibling bases outside `members`; the tracked entity's base is kept
    pub fn retain_members(&mut self, members: &[i64]) {
        let tracked = self.tracked;
        self.bases.retain(|id, _| Some(*id) == tracked || members.contains(id));
    }

    #[cfg(test)]
    pub fn tracked(&self) -> Option<i64> {
        self.tracked
    }

    #[cfg(test)]
    pub fn is_live(&self) -> bool {
        self.tracked.is_some()
    }

    pub fn base_of(&self, entity_id: i64) -> Option<i64> {
        self.bases.get(&entity_id).copied()
    }

    /// `base + elapsed` for the tracked entity, `None` without a snapshot
    pub fn live_total(&self, entity_id: i64, elapsed_seconds: i64) -> Option<i64> {
        if self.tracked != Some(entity_id) {
            return None;
        }
        self.base_of(entity_id).map(|base| base + elapsed_seconds)
    }

    /// Like `live_total`, but synthesizes a missing snapshot from the last known total
    pub fn live_total_or_synthesize(
        &mut self,
        entity_id: i64,
        last_known_total: i64,
        elapsed_seconds: i64,
    ) -> i64 {
        if let Some(total) = self.live_total(entity_id, elapsed_seconds) {
            return total;
        }
        tracing::debug!(entity_id, last_known_total, "no base snapshot, synthesizing");
        self.on_session_start(entity_id, last_known_total);
        last_known_total + elapsed_seconds
    }

    /// Fold the final duration into the base and clear the snapshot.
    ///
    /// Returns the new persisted total, or `None` if there was no snapshot for
    /// `entity_id` (a repeated stop is a no-op).
    pub fn on_session_stop(&mut self, entity_id: i64, final_duration: i64) -> Option<i64> {
        if self.tracked != Some(entity_id) {
            return None;
        }
        let base = self.bases.get(&entity_id).copied();
        self.clear();
        base.map(|base| base + final_duration)
    }

    pub fn clear(&mut self) {
        self.tracked = None;
        self.bases.clear();
    }
}
