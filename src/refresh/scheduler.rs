use super::preview::{CycleResult, PreviewSnapshot};
use crate::core::aggregator::aggregate;
use crate::core::{FeedConfiguration, Quote, QuoteService};
use crate::sources::SourceAdapters;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

struct Inner {
    adapters: SourceAdapters,
    quotes: Option<Arc<dyn QuoteService>>,
    current: Mutex<Option<(u64, FeedConfiguration)>>,
    epoch: AtomicU64,
    cycles: AtomicU64,
    snapshot: watch::Sender<PreviewSnapshot>,
}

impl Inner {
    async fn quote_for(&self, config: &FeedConfiguration) -> Option<Quote> {
        let quotes = self.quotes.as_ref()?;
        let key = config.symbol.trim().to_uppercase();
        let mut response = quotes
            .quotes(&[key.clone()], Some(config.aggregator.strategy))
            .await;
        response.prices.remove(&key)
    }

    /// One fetch cycle over the current configuration. Returns whether its
    /// result made it into the snapshot.
    async fn run_cycle(&self) -> bool {
        let Some((epoch, config)) = self.current.lock().await.clone() else {
            return false;
        };
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.snapshot.send_modify(|s| s.loading = true);
        debug!(epoch, cycle, symbol = %config.symbol, "Starting fetch cycle");

        let (samples, quote) = tokio::join!(
            self.adapters.fetch_all(&config.sources, &config.symbol),
            self.quote_for(&config)
        );
        let aggregated = aggregate(&config.sources, &samples, config.aggregator.strategy);

        let newest = self.cycles.load(Ordering::SeqCst) == cycle;
        let mut applied = false;
        self.snapshot.send_modify(|s| {
            applied = s.apply(CycleResult {
                epoch,
                cycle,
                samples,
                aggregated,
                quote,
            });
            if newest {
                s.loading = false;
            }
        });

        if applied {
            debug!(epoch, cycle, ?aggregated, "Applied fetch cycle");
        } else {
            debug!(epoch, cycle, "Discarded stale fetch cycle");
        }
        applied
    }
}

/// Drives periodic fetch cycles for the configuration under edit and
/// publishes the result as a [`PreviewSnapshot`].
pub struct RefreshScheduler {
    inner: Arc<Inner>,
    cadence: Duration,
    timer: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(
        adapters: SourceAdapters,
        quotes: Option<Arc<dyn QuoteService>>,
        cadence: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(PreviewSnapshot::default());
        RefreshScheduler {
            inner: Arc::new(Inner {
                adapters,
                quotes,
                current: Mutex::new(None),
                epoch: AtomicU64::new(0),
                cycles: AtomicU64::new(0),
                snapshot,
            }),
            cadence,
            timer: None,
        }
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> PreviewSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Makes `config` current: results of earlier cycles are discarded from
    /// now on, one cycle runs immediately and the timer is re-armed.
    pub async fn set_configuration(&mut self, config: FeedConfiguration) {
        let epoch = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        info!(epoch, symbol = %config.symbol, "Preview configuration changed");

        self.inner
            .snapshot
            .send_modify(|s| s.begin(epoch, &config.symbol));
        *self.inner.current.lock().await = Some((epoch, config));
        self.arm_timer();
    }

    /// Runs one extra cycle now. The timer keeps its schedule.
    pub async fn refresh_now(&self) -> bool {
        self.inner.run_cycle().await
    }

    /// Stops the timer. A cycle aborted mid-flight leaves no loading flag behind.
    pub fn shutdown(&mut self) {
        self.stop_timer();
        self.inner.snapshot.send_modify(|s| s.loading = false);
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("Stopping refresh timer");
            timer.abort();
        }
    }

    fn arm_timer(&mut self) {
        self.stop_timer();

        let inner = Arc::clone(&self.inner);
        let cadence = self.cadence;
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cadence);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // First tick completes immediately.
                ticker.tick().await;
                inner.run_cycle().await;
            }
        }));
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feed::SourceKind;
    use crate::core::{PriceSource, QuoteResponse, SourceBinding, Strategy};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicBool;
    use tokio::time::sleep;

    /// Counts calls; fails while `failing` is set.
    struct CountingSource {
        price: f64,
        calls: Arc<AtomicU64>,
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn fetch_price(&self, symbol: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(anyhow!("down for {}", symbol));
            }
            Ok(self.price)
        }
    }

    /// First call is slow and returns 100; later calls return 200 at once.
    struct SlowFirstSource {
        calls: AtomicU64,
    }

    #[async_trait]
    impl PriceSource for SlowFirstSource {
        async fn fetch_price(&self, _symbol: &str) -> Result<f64> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                sleep(Duration::from_secs(5)).await;
                return Ok(100.0);
            }
            Ok(200.0)
        }
    }

    struct FixedQuotes;

    #[async_trait]
    impl QuoteService for FixedQuotes {
        async fn quotes(&self, symbols: &[String], strategy: Option<Strategy>) -> QuoteResponse {
            let prices = symbols
                .iter()
                .map(|s| {
                    let quote = Quote {
                        price: 64000.0,
                        change_24h: Some(1.25),
                        last_updated: Utc::now(),
                    };
                    (s.clone(), quote)
                })
                .collect::<HashMap<_, _>>();
            QuoteResponse {
                prices,
                strategy,
                timestamp: Utc::now(),
            }
        }
    }

    fn config(symbol: &str, ids: &[&str]) -> FeedConfiguration {
        FeedConfiguration {
            symbol: symbol.to_string(),
            sources: ids
                .iter()
                .map(|id| SourceBinding {
                    id: id.to_string(),
                    name: id.to_string(),
                    kind: SourceKind::Api,
                    enabled: true,
                    weight: 1.0,
                })
                .collect(),
            ..Default::default()
        }
    }

    fn counting(
        adapters: &mut SourceAdapters,
        id: &str,
        price: f64,
    ) -> (Arc<AtomicU64>, Arc<AtomicBool>) {
        let calls = Arc::new(AtomicU64::new(0));
        let failing = Arc::new(AtomicBool::new(false));
        adapters.register(
            id,
            CountingSource {
                price,
                calls: Arc::clone(&calls),
                failing: Arc::clone(&failing),
            },
        );
        (calls, failing)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_runs_immediately_then_on_cadence() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        let (calls, _) = counting(&mut adapters, "a", 100.0);
        let mut scheduler = RefreshScheduler::new(adapters, None, Duration::from_secs(30));

        scheduler.set_configuration(config("BTC/USD", &["a"])).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.snapshot().aggregated, Some(100.0));
        assert!(!scheduler.snapshot().loading);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Manual refresh leaves the timer schedule alone.
        assert!(scheduler.refresh_now().await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_is_left_out() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        counting(&mut adapters, "a", 100.0);
        counting(&mut adapters, "b", 102.0);
        let (_, c_failing) = counting(&mut adapters, "c", 98.0);
        let mut scheduler = RefreshScheduler::new(adapters, None, Duration::from_secs(30));
        let mut cfg = config("BTC/USD", &["a", "b", "c"]);
        cfg.aggregator.strategy = Strategy::Mean;
        scheduler.set_configuration(cfg).await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.snapshot().aggregated, Some(100.0));

        c_failing.store(true, Ordering::SeqCst);
        scheduler.refresh_now().await;
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.aggregated, Some(101.0));
        assert_eq!(snapshot.active_count(), 2);
        assert_eq!(snapshot.samples.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_sources_failing_keeps_previous_value() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        let (_, a_failing) = counting(&mut adapters, "a", 100.0);
        let (_, b_failing) = counting(&mut adapters, "b", 102.0);
        let mut scheduler = RefreshScheduler::new(adapters, None, Duration::from_secs(30));
        scheduler
            .set_configuration(config("BTC/USD", &["a", "b"]))
            .await;
        sleep(Duration::from_millis(10)).await;
        let before = scheduler.snapshot().aggregated;
        assert!(before.is_some());

        a_failing.store(true, Ordering::SeqCst);
        b_failing.store(true, Ordering::SeqCst);
        assert!(scheduler.refresh_now().await);

        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.aggregated, before);
        assert_eq!(snapshot.active_count(), 0);
        assert_eq!(snapshot.samples.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_cycle_is_discarded() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        adapters.register(
            "slow",
            SlowFirstSource {
                calls: AtomicU64::new(0),
            },
        );
        let mut scheduler = RefreshScheduler::new(adapters, None, Duration::from_secs(60));
        scheduler.set_configuration(config("BTC/USD", &["slow"])).await;
        // Let the timer start its (slow) first cycle.
        sleep(Duration::from_millis(10)).await;
        assert!(scheduler.snapshot().loading);

        assert!(scheduler.refresh_now().await);
        assert_eq!(scheduler.snapshot().aggregated, Some(200.0));

        sleep(Duration::from_secs(10)).await;
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.aggregated, Some(200.0));
        assert_eq!(snapshot.cycle, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_symbol_change_clears_value_and_quote_is_attached() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        let (_, failing) = counting(&mut adapters, "a", 100.0);
        let mut scheduler =
            RefreshScheduler::new(adapters, Some(Arc::new(FixedQuotes)), Duration::from_secs(30));
        let mut rx = scheduler.subscribe();

        scheduler.set_configuration(config("btc/usd", &["a"])).await;
        rx.changed().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.aggregated, Some(100.0));
        assert_eq!(snapshot.quote.as_ref().map(|q| q.price), Some(64000.0));

        failing.store(true, Ordering::SeqCst);
        scheduler.set_configuration(config("ETH/USD", &["a"])).await;
        sleep(Duration::from_millis(10)).await;
        let snapshot = scheduler.snapshot();
        assert_eq!(snapshot.symbol, "ETH/USD");
        assert_eq!(snapshot.aggregated, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_and_drop_stop_the_timer() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        let (calls, _) = counting(&mut adapters, "a", 100.0);
        let mut scheduler = RefreshScheduler::new(adapters.clone(), None, Duration::from_secs(30));
        scheduler.set_configuration(config("BTC/USD", &["a"])).await;
        sleep(Duration::from_millis(10)).await;
        assert!(scheduler.is_running());

        scheduler.shutdown();
        assert!(!scheduler.is_running());
        sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let mut dropped = RefreshScheduler::new(adapters, None, Duration::from_secs(30));
        dropped.set_configuration(config("BTC/USD", &["a"])).await;
        sleep(Duration::from_millis(10)).await;
        drop(dropped);
        sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_cycle_clears_loading() {
        let mut adapters = SourceAdapters::new(Duration::from_secs(10));
        adapters.register(
            "slow",
            SlowFirstSource {
                calls: AtomicU64::new(0),
            },
        );
        let mut scheduler = RefreshScheduler::new(adapters, None, Duration::from_secs(60));
        scheduler.set_configuration(config("BTC/USD", &["slow"])).await;
        sleep(Duration::from_millis(10)).await;
        assert!(scheduler.snapshot().loading);

        scheduler.shutdown();
        assert!(!scheduler.snapshot().loading);

        sleep(Duration::from_secs(10)).await;
        let snapshot = scheduler.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(snapshot.aggregated, None);
    }

    #[tokio::test]
    async fn test_refresh_without_configuration_is_noop() {
        let scheduler = RefreshScheduler::new(
            SourceAdapters::new(Duration::from_secs(1)),
            None,
            Duration::from_secs(30),
        );
        assert!(!scheduler.refresh_now().await);
        assert_eq!(scheduler.snapshot(), PreviewSnapshot::default());
    }
}
