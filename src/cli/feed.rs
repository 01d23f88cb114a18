//! `feed` subcommands. Edits run through a [`ConfigSynchronizer`] whose
//! owner is the store: every outward notification is persisted and the
//! stored copy is handed back as the owner's version.

use super::ui;
use crate::core::config::AppConfig;
use crate::core::{FeedConfiguration, FeedPatch, SourceRegistry};
use crate::store::FeedStore;
use crate::sync::{ConfigSynchronizer, SyncSettings};
use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, CellAlignment};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Picks the feed a command works on: the given id, else the oldest stored
/// feed, else the one in the configuration file.
pub async fn resolve(
    store: &dyn FeedStore,
    config: &AppConfig,
    id: Option<&str>,
) -> Result<Option<FeedConfiguration>> {
    if let Some(id) = id {
        return store
            .get(id)
            .await?
            .map(Some)
            .ok_or_else(|| anyhow!("No feed with id: {}", id));
    }
    if let Some(first) = store.list().await?.into_iter().next() {
        return Ok(Some(first));
    }
    Ok(config.feed.clone())
}

/// Ready-to-fetch configuration for preview commands. Falls back to the
/// default feed when nothing is stored or configured.
pub async fn resolve_or_default(
    store: &dyn FeedStore,
    config: &AppConfig,
    id: Option<&str>,
    registry: &SourceRegistry,
) -> Result<FeedConfiguration> {
    let mut feed = resolve(store, config, id).await?.unwrap_or_default();
    if feed.sources.is_empty() {
        feed.sources = registry.default_bindings();
    }
    registry.complete(&mut feed.sources);
    feed.normalize();
    Ok(feed)
}

/// A synchronizer wired to the store.
pub struct FeedSession<'a> {
    store: &'a dyn FeedStore,
    sync: ConfigSynchronizer,
    outbox: mpsc::UnboundedReceiver<FeedConfiguration>,
    saved: Option<FeedConfiguration>,
}

impl<'a> FeedSession<'a> {
    pub async fn open(
        store: &'a dyn FeedStore,
        registry: Arc<SourceRegistry>,
        config: &AppConfig,
        initial: Option<FeedConfiguration>,
    ) -> Result<FeedSession<'a>> {
        let (tx, outbox) = mpsc::unbounded_channel();
        let sync = ConfigSynchronizer::new(registry, SyncSettings::from(&config.sync), move |c| {
            // Receiver lives as long as the session.
            let _ = tx.send(c);
        });

        let mut session = FeedSession {
            store,
            sync,
            outbox,
            saved: None,
        };
        let outcome = session.sync.receive(initial);
        debug!(?outcome, "Opened feed session");
        session.persist_outbox().await?;
        Ok(session)
    }

    pub fn sync(&mut self) -> &mut ConfigSynchronizer {
        &mut self.sync
    }

    /// Sends pending edits to the store and returns the last stored record.
    pub async fn commit(mut self) -> Result<Option<FeedConfiguration>> {
        self.sync.flush();
        self.persist_outbox().await?;
        Ok(self.saved)
    }

    async fn persist_outbox(&mut self) -> Result<()> {
        while let Ok(config) = self.outbox.try_recv() {
            let stored = self.store.upsert(config).await?;
            // The stored copy carries the id; an echo of a fresh edit is ignored.
            let outcome = self.sync.receive(Some(stored.clone()));
            debug!(id = ?stored.id, ?outcome, "Persisted feed");
            self.saved = Some(stored);
        }
        Ok(())
    }
}

pub fn render_list(feeds: &[FeedConfiguration]) -> String {
    if feeds.is_empty() {
        return ui::style_text("No feeds stored yet", ui::StyleType::Subtle);
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Id"),
        ui::header_cell("Name"),
        ui::header_cell("Symbol"),
        ui::header_cell("Strategy"),
        ui::header_cell("Sources"),
        ui::header_cell("Chain"),
        ui::header_cell("Enabled"),
        ui::header_cell("Updated"),
    ]);

    for feed in feeds {
        table.add_row(vec![
            Cell::new(feed.id.as_deref().unwrap_or("-")),
            Cell::new(&feed.name),
            Cell::new(&feed.symbol),
            Cell::new(feed.aggregator.strategy.to_string()),
            Cell::new(format!(
                "{}/{}",
                feed.enabled_sources().count(),
                feed.sources.len()
            ))
            .set_alignment(CellAlignment::Right),
            Cell::new(chain_label(feed)),
            ui::flag_cell(feed.enabled),
            Cell::new(
                feed.updated_at
                    .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string()),
            ),
        ]);
    }
    table.to_string()
}

pub fn render_detail(feed: &FeedConfiguration) -> String {
    let mut output = format!(
        "Feed: {}\n",
        ui::style_text(&feed.name, ui::StyleType::Title)
    );
    let fields = [
        ("Id", feed.id.clone().unwrap_or_else(|| "-".to_string())),
        ("Symbol", feed.symbol.clone()),
        (
            "Description",
            feed.description.clone().unwrap_or_else(|| "-".to_string()),
        ),
        ("Strategy", feed.aggregator.strategy.to_string()),
        ("Min sources", feed.aggregator.min_sources.to_string()),
        (
            "Deviation threshold",
            format!("{:.2}%", feed.aggregator.deviation_threshold * 100.0),
        ),
        ("Update interval", format!("{}s", feed.update_interval)),
        ("Decimals", feed.decimals.to_string()),
        ("Chain", chain_label(feed)),
        ("Enabled", feed.enabled.to_string()),
    ];
    for (label, value) in fields {
        output.push_str(&format!(
            "{}: {value}\n",
            ui::style_text(label, ui::StyleType::TotalLabel)
        ));
    }

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Source"),
        ui::header_cell("Name"),
        ui::header_cell("Type"),
        ui::header_cell("Enabled"),
        ui::header_cell("Weight"),
    ]);
    for source in &feed.sources {
        table.add_row(vec![
            Cell::new(&source.id),
            Cell::new(&source.name),
            Cell::new(source.kind.to_string()),
            ui::flag_cell(source.enabled),
            Cell::new(format!("{:.2}", source.weight)).set_alignment(CellAlignment::Right),
        ]);
    }
    output.push('\n');
    output.push_str(&table.to_string());
    output
}

fn chain_label(feed: &FeedConfiguration) -> String {
    match (feed.chain, feed.network) {
        (Some(chain), Some(network)) => format!("{chain}/{network}"),
        (Some(chain), None) => chain.to_string(),
        (None, Some(network)) => format!("-/{network}"),
        (None, None) => "-".to_string(),
    }
}

/// Builds a fresh feed from the given fields and stores it.
pub async fn create(
    store: &dyn FeedStore,
    registry: Arc<SourceRegistry>,
    config: &AppConfig,
    name: String,
    symbol: String,
    patch: FeedPatch,
) -> Result<FeedConfiguration> {
    let fresh = FeedConfiguration {
        name,
        symbol,
        ..Default::default()
    };
    let mut session = FeedSession::open(store, registry, config, Some(fresh)).await?;
    if !patch.is_empty() {
        session.sync().update(patch);
    }
    session
        .commit()
        .await?
        .context("New feed was not stored")
}

/// Opens the resolved feed, applies `edit` and stores the result.
pub async fn edit(
    store: &dyn FeedStore,
    registry: Arc<SourceRegistry>,
    config: &AppConfig,
    id: Option<&str>,
    apply: impl FnOnce(&mut ConfigSynchronizer) -> Result<()>,
) -> Result<FeedConfiguration> {
    let initial = resolve(store, config, id).await?;
    let mut session = FeedSession::open(store, registry, config, initial).await?;
    apply(session.sync())?;

    let fallback = session.sync().local().cloned();
    let saved = session.commit().await?;
    saved
        .or(fallback)
        .context("No feed configuration to edit")
}
