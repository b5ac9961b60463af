use crate::domain::cost_for;
use std::collections::HashMap;

/// Currency totals for completed entries plus one persistent realtime copy.
///
/// The realtime map is allocated once per statistics refresh; ticks only
/// rewrite the live currency's entry.
#[derive(Debug, Default)]
pub struct CurrencyEarningsCache {
    base: HashMap<String, f64>,
    realtime: HashMap<String, f64>,
    /// Currency whose realtime entry currently differs from the base
    live_currency: Option<String>,
}

impl CurrencyEarningsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the completed-entry totals (once per statistics refresh)
    pub fn set_base(&mut self, base: HashMap<String, f64>) {
        self.realtime.clear();
        self.realtime
            .extend(base.iter().map(|(currency, amount)| (currency.clone(), *amount)));
        self.base = base;
        self.live_currency = None;
    }

    #[cfg(test)]
    pub fn base(&self) -> &HashMap<String, f64> {
        &self.base
    }

    /// The realtime map with the live session's partial earnings merged in
    pub fn with_live(
        &mut self,
        elapsed_seconds: i64,
        client_rate: f64,
        client_currency: &str,
    ) -> &HashMap<String, f64> {
        if self.live_currency.as_deref() != Some(client_currency) {
            self.restore_live_entry();
            self.live_currency = Some(client_currency.to_string());
        }
        let base = self.base.get(client_currency).copied().unwrap_or(0.0);
        let live = cost_for(elapsed_seconds, client_rate);
        match self.realtime.get_mut(client_currency) {
            Some(amount) => *amount = base + live,
            None => {
                self.realtime.insert(client_currency.to_string(), base + live);
            }
        }
        &self.realtime
    }

    /// Drop live earnings; the realtime map equals the base again
    pub fn clear_live(&mut self) -> &HashMap<String, f64> {
        self.restore_live_entry();
        self.live_currency = None;
        &self.realtime
    }

    /// Add completed earnings to the base (a session ended inside the filter)
    pub fn fold_into_base(&mut self, currency: &str, amount: f64) {
        self.restore_live_entry();
        *self.base.entry(currency.to_string()).or_insert(0.0) += amount;
        *self.realtime.entry(currency.to_string()).or_insert(0.0) += amount;
    }

    pub fn realtime(&self) -> &HashMap<String, f64> {
        &self.realtime
    }

    fn restore_live_entry(&mut self) {
        let Some(currency) = self.live_currency.take() else {
            return;
        };
        match self.base.get(&currency) {
            Some(amount) => {
                self.realtime.insert(currency, *amount);
            }
            None => {
                self.realtime.remove(&currency);
            }
        }
    }
}
