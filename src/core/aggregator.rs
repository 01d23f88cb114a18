//! Combines per-source samples into one price.
//!
//! Samples are paired with their binding by source id, so reordering or
//! filtering bindings can never shift a weight onto the wrong price.

use super::feed::{FeedConfiguration, SourceBinding, Strategy};
use super::price::Sample;
use std::collections::HashMap;

/// Aggregates the samples of the enabled bindings. Returns `None` when no
/// binding has an active sample; callers keep their previous value then.
pub fn aggregate(
    bindings: &[SourceBinding],
    samples: &HashMap<String, Sample>,
    strategy: Strategy,
) -> Option<f64> {
    let active: Vec<(f64, f64)> = bindings
        .iter()
        .filter(|b| b.enabled)
        .filter_map(|b| {
            samples
                .get(&b.id)
                .filter(|s| s.is_active())
                .map(|s| (s.price, b.weight))
        })
        .collect();

    combine(&active, strategy)
}

/// `(price, weight)` pairs of active samples only.
pub fn combine(active: &[(f64, f64)], strategy: Strategy) -> Option<f64> {
    if active.is_empty() {
        return None;
    }

    match strategy {
        Strategy::Median => {
            let mut prices: Vec<f64> = active.iter().map(|(p, _)| *p).collect();
            prices.sort_by(f64::total_cmp);
            // Index n/2 for even n as well, not the mean of the two middle values.
            Some(prices[prices.len() / 2])
        }
        Strategy::Mean => {
            let total: f64 = active.iter().map(|(p, _)| p).sum();
            Some(total / active.len() as f64)
        }
        Strategy::Weighted => {
            let usable: Vec<_> = active
                .iter()
                .filter(|(_, w)| !w.is_nan() && *w >= 0.0)
                .collect();
            let total_weight: f64 = usable.iter().map(|(_, w)| w).sum();
            if total_weight <= 0.0 {
                return None;
            }
            Some(
                usable
                    .iter()
                    .map(|(p, w)| p * (w / total_weight))
                    .sum(),
            )
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Readiness {
    pub active_sources: usize,
    pub min_sources: usize,
    pub max_deviation: Option<f64>,
    pub deviation_threshold: f64,
}

impl Readiness {
    pub fn has_enough_sources(&self) -> bool {
        self.active_sources >= self.min_sources
    }

    pub fn within_deviation(&self) -> bool {
        self.max_deviation
            .is_none_or(|d| d <= self.deviation_threshold)
    }

    pub fn is_ready(&self) -> bool {
        self.has_enough_sources() && self.within_deviation()
    }
}

/// Deployment check over `minSources` and `deviationThreshold`. It never
/// changes what [`aggregate`] returns.
pub fn deployment_readiness(
    config: &FeedConfiguration,
    samples: &HashMap<String, Sample>,
) -> Readiness {
    let prices: Vec<(f64, f64)> = config
        .enabled_sources()
        .filter_map(|b| samples.get(&b.id).filter(|s| s.is_active()))
        .map(|s| (s.price, 1.0))
        .collect();

    let max_deviation = combine(&prices, Strategy::Median).map(|median| {
        prices
            .iter()
            .map(|(p, _)| (p - median).abs() / median)
            .fold(0.0, f64::max)
    });

    Readiness {
        active_sources: prices.len(),
        min_sources: config.aggregator.min_sources,
        max_deviation,
        deviation_threshold: config.aggregator.deviation_threshold,
    }
}
