//! Keeps a locally edited feed configuration in step with the copy its owner holds.
//!
//! Local edits apply at once and reach the owner through a debounced
//! notification. Inbound owner updates are dropped while a local edit is
//! pending or cooling down, since they are most likely the echo of that edit.

use super::debounce::Debouncer;
use crate::core::config::SyncConfig;
use crate::core::{FeedConfiguration, FeedPatch, SourceBinding, SourceDescriptor, SourceRegistry};
use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

type OnChange = Arc<dyn Fn(FeedConfiguration) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub debounce: Duration,
    pub cooldown: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        SyncSettings {
            debounce: Duration::from_millis(config.debounce_ms),
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Mirroring the owner.
    Idle,
    /// Local copy changed; the outward notification has not fired yet.
    LocalEdit { edited_at: Instant },
    /// Applying a configuration the owner swapped in.
    ExternalReplace,
    /// Outward notification sent; inbound updates are treated as its echo.
    Cooldown { until: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Dropped as an echo of a recent local edit.
    Ignored,
    /// Same logical feed; local state kept.
    Unchanged,
    /// Local copy replaced by the owner's.
    Replaced,
    /// Replaced, and the empty source list was seeded and sent back.
    Seeded,
    /// Nobody had a configuration; the default was created and sent out.
    Defaulted,
}

#[derive(Default)]
struct Views {
    enabled: Vec<SourceBinding>,
    available_to_add: Vec<SourceDescriptor>,
}

pub struct ConfigSynchronizer {
    registry: Arc<SourceRegistry>,
    settings: SyncSettings,
    local: Option<FeedConfiguration>,
    owner_id: Option<String>,
    state: SyncState,
    views: Views,
    on_change: OnChange,
    outbound: Debouncer<FeedConfiguration>,
}

impl ConfigSynchronizer {
    /// `on_change` receives every configuration sent to the owner. Must be
    /// created inside a tokio runtime.
    pub fn new(
        registry: Arc<SourceRegistry>,
        settings: SyncSettings,
        on_change: impl Fn(FeedConfiguration) + Send + Sync + 'static,
    ) -> Self {
        let on_change: OnChange = Arc::new(on_change);
        let notify = Arc::clone(&on_change);
        let outbound = Debouncer::new(settings.debounce, move |config| notify(config));

        let mut sync = ConfigSynchronizer {
            registry,
            settings,
            local: None,
            owner_id: None,
            state: SyncState::Idle,
            views: Views::default(),
            on_change,
            outbound,
        };
        sync.refresh_views();
        sync
    }

    pub fn local(&self) -> Option<&FeedConfiguration> {
        self.local.as_ref()
    }

    pub fn state(&mut self) -> SyncState {
        self.advance(Instant::now());
        self.state
    }

    pub fn enabled_sources(&self) -> &[SourceBinding] {
        &self.views.enabled
    }

    pub fn available_to_add(&self) -> &[SourceDescriptor] {
        &self.views.available_to_add
    }

    pub fn default_configuration(&self) -> FeedConfiguration {
        let mut config = FeedConfiguration {
            sources: self.registry.default_bindings(),
            ..Default::default()
        };
        config.normalize();
        config
    }

    /// Handles a configuration supplied by the owner. `None` means the owner
    /// has nothing yet.
    pub fn receive(&mut self, incoming: Option<FeedConfiguration>) -> ReceiveOutcome {
        self.advance(Instant::now());
        if matches!(
            self.state,
            SyncState::LocalEdit { .. } | SyncState::Cooldown { .. }
        ) {
            debug!(state = ?self.state, "Ignoring inbound configuration as echo");
            return ReceiveOutcome::Ignored;
        }

        let Some(mut incoming) = incoming else {
            if self.local.is_some() {
                return ReceiveOutcome::Unchanged;
            }
            let config = self.default_configuration();
            info!(symbol = %config.symbol, "No configuration available, creating default");
            self.owner_id = None;
            self.set_local(config.clone());
            (self.on_change)(config);
            return ReceiveOutcome::Defaulted;
        };

        incoming.normalize();
        self.registry.complete(&mut incoming.sources);
        let different_by_id = self.owner_id != incoming.id;
        let different_by_content = self
            .local
            .as_ref()
            .is_some_and(|local| local.fingerprint() != incoming.fingerprint());

        if self.local.is_some() && !different_by_id && !different_by_content {
            return ReceiveOutcome::Unchanged;
        }

        self.transition(SyncState::ExternalReplace);
        debug!(
            id = ?incoming.id,
            different_by_id,
            different_by_content,
            "Owner supplied a different feed"
        );
        self.owner_id = incoming.id.clone();

        // Chain and network are sticky across feed swaps.
        if let Some(local) = &self.local {
            incoming.chain = local.chain.or(incoming.chain);
            incoming.network = local.network.or(incoming.network);
        }

        let outcome = if incoming.sources.is_empty() {
            incoming.sources = self.registry.default_bindings();
            incoming.normalize();
            (self.on_change)(incoming.clone());
            ReceiveOutcome::Seeded
        } else {
            ReceiveOutcome::Replaced
        };

        self.set_local(incoming);
        self.transition(SyncState::Idle);
        outcome
    }

    /// Applies a partial update to the local copy and schedules the outward
    /// notification. No-op until a local configuration exists.
    pub fn update(&mut self, patch: FeedPatch) {
        let Some(local) = self.local.as_mut() else {
            debug!("Ignoring patch without a local configuration");
            return;
        };
        local.apply(patch);
        let updated = local.clone();

        self.transition(SyncState::LocalEdit {
            edited_at: Instant::now(),
        });
        self.refresh_views();
        self.outbound.submit(updated);
    }

    pub fn toggle_source(&mut self, source_id: &str) -> bool {
        let Some(mut sources) = self.sources_with(source_id) else {
            return false;
        };
        for source in sources.iter_mut().filter(|s| s.id == source_id) {
            source.enabled = !source.enabled;
        }
        self.update_sources(sources);
        true
    }

    /// No-op when a binding with the same id already exists.
    pub fn add_source(&mut self, binding: SourceBinding) -> bool {
        let Some(local) = &self.local else {
            return false;
        };
        if local.binding(&binding.id).is_some() {
            return false;
        }
        let mut sources = local.sources.clone();
        sources.push(binding);
        self.update_sources(sources);
        true
    }

    pub fn remove_source(&mut self, source_id: &str) -> bool {
        let Some(mut sources) = self.sources_with(source_id) else {
            return false;
        };
        sources.retain(|s| s.id != source_id);
        self.update_sources(sources);
        true
    }

    pub fn set_weight(&mut self, source_id: &str, weight: f64) -> Result<()> {
        if !weight.is_finite() || weight < 0.0 {
            bail!("Invalid weight {} for source {}", weight, source_id);
        }
        let Some(mut sources) = self.sources_with(source_id) else {
            return Ok(());
        };
        for source in sources.iter_mut().filter(|s| s.id == source_id) {
            source.weight = weight;
        }
        self.update_sources(sources);
        Ok(())
    }

    /// Sends any pending notification now.
    pub fn flush(&mut self) {
        self.outbound.flush();
        if let SyncState::LocalEdit { edited_at } = self.state {
            self.transition(SyncState::Cooldown {
                until: edited_at + self.settings.cooldown,
            });
        }
    }

    fn sources_with(&self, source_id: &str) -> Option<Vec<SourceBinding>> {
        let local = self.local.as_ref()?;
        local.binding(source_id)?;
        Some(local.sources.clone())
    }

    fn update_sources(&mut self, sources: Vec<SourceBinding>) {
        self.update(FeedPatch {
            sources: Some(sources),
            ..Default::default()
        });
    }

    fn set_local(&mut self, config: FeedConfiguration) {
        self.local = Some(config);
        self.refresh_views();
    }

    fn refresh_views(&mut self) {
        let bound: Vec<&str> = self
            .local
            .iter()
            .flat_map(|c| c.sources.iter().map(|s| s.id.as_str()))
            .collect();

        self.views = Views {
            enabled: self
                .local
                .iter()
                .flat_map(|c| c.enabled_sources().cloned())
                .collect(),
            available_to_add: self
                .registry
                .list()
                .iter()
                .filter(|d| !bound.contains(&d.id))
                .cloned()
                .collect(),
        };
    }

    fn advance(&mut self, now: Instant) {
        if let SyncState::LocalEdit { edited_at } = self.state {
            if now >= edited_at + self.settings.debounce {
                self.transition(SyncState::Cooldown {
                    until: edited_at + self.settings.cooldown,
                });
            }
        }
        if let SyncState::Cooldown { until } = self.state {
            if now >= until {
                self.transition(SyncState::Idle);
            }
        }
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "Sync state transition");
            self.state = next;
        }
    }
}
