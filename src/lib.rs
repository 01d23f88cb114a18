pub mod cli;
pub mod core;
pub mod refresh;
pub mod sources;
pub mod store;
pub mod sync;

pub use crate::core::config;

use crate::core::cache::Cache;
use crate::core::config::AppConfig;
use crate::core::{FeedPatch, QuoteService, SourceRegistry};
use crate::refresh::RefreshScheduler;
use crate::sources::SourceAdapters;
use crate::sources::coingecko::CoinGeckoQuotes;
use crate::store::FeedStore;
use anyhow::{Context, Result, anyhow, bail};
use std::sync::Arc;
use tracing::{debug, info};

pub enum AppCommand {
    Sources,
    Quote { symbols: Vec<String> },
    Preview { feed: Option<String> },
    Watch { feed: Option<String>, cycles: Option<usize> },
    Feed(FeedCommand),
}

pub enum FeedCommand {
    List,
    Show { feed: Option<String> },
    Create { symbol: String, patch: FeedPatch },
    Set { feed: Option<String>, patch: FeedPatch },
    AddSource { feed: Option<String>, source: String, weight: Option<f64> },
    RemoveSource { feed: Option<String>, source: String },
    Toggle { feed: Option<String>, source: String },
    Weight { feed: Option<String>, source: String, weight: f64 },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("feedforge starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let registry = Arc::new(SourceRegistry::builtin());

    match command {
        AppCommand::Sources => {
            let adapters =
                SourceAdapters::from_config(&config.providers, config.refresh.request_timeout())?;
            cli::sources::run(&registry, &adapters);
            Ok(())
        }
        AppCommand::Quote { symbols } => {
            let service = quote_service(&config)?
                .context("Quotes need the coingecko provider to be configured")?;
            cli::quote::run(service.as_ref(), &symbols).await;
            Ok(())
        }
        AppCommand::Preview { feed } => {
            let store = store::open_store(&config)?;
            let feed =
                cli::feed::resolve_or_default(&store, &config, feed.as_deref(), &registry).await?;
            cli::preview::run(scheduler(&config)?, feed).await
        }
        AppCommand::Watch { feed, cycles } => {
            let store = store::open_store(&config)?;
            let feed =
                cli::feed::resolve_or_default(&store, &config, feed.as_deref(), &registry).await?;
            cli::watch::run(scheduler(&config)?, feed, cycles).await
        }
        AppCommand::Feed(command) => run_feed_command(command, &config, registry).await,
    }
}

async fn run_feed_command(
    command: FeedCommand,
    config: &AppConfig,
    registry: Arc<SourceRegistry>,
) -> Result<()> {
    use cli::feed;

    let store = store::open_store(config)?;

    let updated = match command {
        FeedCommand::List => {
            println!("{}", feed::render_list(&store.list().await?));
            return Ok(());
        }
        FeedCommand::Show { feed: id } => {
            let found = feed::resolve(&store, config, id.as_deref())
                .await?
                .context("No feed stored or configured")?;
            println!("{}", feed::render_detail(&found));
            return Ok(());
        }
        FeedCommand::Create { symbol, mut patch } => {
            let name = patch.name.take().unwrap_or_else(|| format!("{symbol} Feed"));
            patch.symbol = None;
            feed::create(&store, registry, config, name, symbol, patch).await?
        }
        FeedCommand::Set { feed: id, patch } => {
            if patch.is_empty() {
                bail!("Nothing to change");
            }
            feed::edit(&store, registry, config, id.as_deref(), |sync| {
                sync.update(patch);
                Ok(())
            })
            .await?
        }
        FeedCommand::AddSource {
            feed: id,
            source,
            weight,
        } => {
            let mut binding = registry
                .resolve(&source)
                .ok_or_else(|| anyhow!("Unknown source: {}", source))?
                .to_binding();
            if let Some(weight) = weight {
                if !weight.is_finite() || weight < 0.0 {
                    bail!("Invalid weight {} for source {}", weight, source);
                }
                binding.weight = weight;
            }
            feed::edit(&store, Arc::clone(&registry), config, id.as_deref(), |sync| {
                if !sync.add_source(binding) {
                    bail!("Source {} is already bound", source);
                }
                Ok(())
            })
            .await?
        }
        FeedCommand::RemoveSource { feed: id, source } => {
            feed::edit(&store, registry, config, id.as_deref(), |sync| {
                if !sync.remove_source(&source) {
                    bail!("Feed has no source: {}", source);
                }
                Ok(())
            })
            .await?
        }
        FeedCommand::Toggle { feed: id, source } => {
            feed::edit(&store, registry, config, id.as_deref(), |sync| {
                if !sync.toggle_source(&source) {
                    bail!("Feed has no source: {}", source);
                }
                Ok(())
            })
            .await?
        }
        FeedCommand::Weight {
            feed: id,
            source,
            weight,
        } => {
            feed::edit(&store, registry, config, id.as_deref(), |sync| {
                if sync.local().and_then(|c| c.binding(&source)).is_none() {
                    bail!("Feed has no source: {}", source);
                }
                sync.set_weight(&source, weight)
            })
            .await?
        }
    };

    info!(id = ?updated.id, "Feed saved");
    println!("{}", feed::render_detail(&updated));
    Ok(())
}

fn quote_service(config: &AppConfig) -> Result<Option<Arc<dyn QuoteService>>> {
    let Some(provider) = &config.providers.coingecko else {
        return Ok(None);
    };
    let quotes: Arc<dyn QuoteService> = Arc::new(CoinGeckoQuotes::new(
        &provider.base_url,
        config.refresh.request_timeout(),
        Cache::with_ttl(config.quote_cache_ttl()),
    )?);
    Ok(Some(quotes))
}

fn scheduler(config: &AppConfig) -> Result<RefreshScheduler> {
    let adapters =
        SourceAdapters::from_config(&config.providers, config.refresh.request_timeout())?;
    Ok(RefreshScheduler::new(
        adapters,
        quote_service(config)?,
        config.refresh.cadence(),
    ))
}
