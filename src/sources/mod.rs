//! Upstream price adapters and the set that turns their results into samples.

pub mod binance;
pub mod coinbase;
pub mod coingecko;
pub mod kraken;
pub mod pyth;
pub mod util;

use crate::core::config::ProvidersConfig;
use crate::core::{PriceSource, Sample, SourceBinding};
use anyhow::Result;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Source id to adapter. Never fails outward: every fetch settles to a sample.
#[derive(Clone)]
pub struct SourceAdapters {
    adapters: HashMap<String, Arc<dyn PriceSource>>,
    timeout: Duration,
}

impl SourceAdapters {
    pub fn new(timeout: Duration) -> Self {
        SourceAdapters {
            adapters: HashMap::new(),
            timeout,
        }
    }

    /// Builds one adapter for every provider with a configured endpoint.
    pub fn from_config(providers: &ProvidersConfig, timeout: Duration) -> Result<Self> {
        let mut set = Self::new(timeout);
        if let Some(p) = &providers.coingecko {
            set.register("coingecko", coingecko::CoinGeckoSource::new(&p.base_url, timeout)?);
        }
        if let Some(p) = &providers.binance {
            set.register("binance", binance::BinanceSource::new(&p.base_url, timeout)?);
        }
        if let Some(p) = &providers.coinbase {
            set.register("coinbase", coinbase::CoinbaseSource::new(&p.base_url, timeout)?);
        }
        if let Some(p) = &providers.kraken {
            set.register("kraken", kraken::KrakenSource::new(&p.base_url, timeout)?);
        }
        if let Some(p) = &providers.pyth {
            set.register("pyth", pyth::PythSource::new(&p.base_url, timeout)?);
        }
        Ok(set)
    }

    pub fn register(&mut self, source_id: &str, adapter: impl PriceSource + 'static) {
        self.adapters.insert(source_id.to_string(), Arc::new(adapter));
    }

    pub fn supports(&self, source_id: &str) -> bool {
        self.adapters.contains_key(source_id)
    }

    /// `None` when no adapter is registered for `source_id`.
    pub async fn fetch(&self, source_id: &str, symbol: &str) -> Option<Sample> {
        let Some(adapter) = self.adapters.get(source_id) else {
            debug!("No adapter registered for source: {}", source_id);
            return None;
        };

        let sample = match tokio::time::timeout(self.timeout, adapter.fetch_price(symbol)).await {
            Ok(Ok(price)) if price.is_finite() && price > 0.0 => Sample::active(price),
            Ok(Ok(price)) => {
                warn!(source = source_id, symbol, price, "Source returned an invalid price");
                Sample::error()
            }
            Ok(Err(e)) => {
                warn!(source = source_id, symbol, error = %e, "Source fetch failed");
                Sample::error()
            }
            Err(_) => {
                warn!(source = source_id, symbol, "Source fetch timed out");
                Sample::error()
            }
        };
        Some(sample)
    }

    /// Fetches every enabled binding concurrently and waits for all of them.
    pub async fn fetch_all(
        &self,
        bindings: &[SourceBinding],
        symbol: &str,
    ) -> HashMap<String, Sample> {
        let futures = bindings.iter().filter(|b| b.enabled).map(|b| async move {
            let sample = self.fetch(&b.id, symbol).await;
            (b.id.clone(), sample)
        });

        join_all(futures)
            .await
            .into_iter()
            .filter_map(|(id, sample)| sample.map(|s| (id, s)))
            .collect()
    }
}
