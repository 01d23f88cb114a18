use crate::core::{Quote, Sample};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// What one fetch cycle produced, tagged with the configuration epoch and
/// cycle number it was started under.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub epoch: u64,
    pub cycle: u64,
    pub samples: HashMap<String, Sample>,
    pub aggregated: Option<f64>,
    pub quote: Option<Quote>,
}

/// Published preview of the feed being edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreviewSnapshot {
    pub symbol: String,
    pub samples: HashMap<String, Sample>,
    pub aggregated: Option<f64>,
    pub quote: Option<Quote>,
    pub loading: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub epoch: u64,
    /// Number of the last cycle applied.
    pub cycle: u64,
}

impl PreviewSnapshot {
    /// Switches to a new configuration epoch. Values that belong to the old
    /// symbol are dropped.
    pub fn begin(&mut self, epoch: u64, symbol: &str) {
        if self.symbol != symbol {
            self.symbol = symbol.to_string();
            self.samples.clear();
            self.aggregated = None;
            self.quote = None;
            self.last_update = None;
        }
        self.epoch = epoch;
    }

    /// Applies a cycle result unless it is stale. Returns whether it was applied.
    pub fn apply(&mut self, result: CycleResult) -> bool {
        if result.epoch != self.epoch || result.cycle <= self.cycle {
            return false;
        }

        self.samples = result.samples;
        // Zero active samples keeps the last good value on screen.
        if result.aggregated.is_some() {
            self.aggregated = result.aggregated;
        }
        if result.quote.is_some() {
            self.quote = result.quote;
        }
        self.cycle = result.cycle;
        self.last_update = Some(Utc::now());
        true
    }

    pub fn active_count(&self) -> usize {
        self.samples.values().filter(|s| s.is_active()).count()
    }
}
