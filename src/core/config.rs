use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

use super::feed::FeedConfiguration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
}

impl ProviderConfig {
    fn new(base_url: &str) -> Option<Self> {
        Some(ProviderConfig {
            base_url: base_url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub coingecko: Option<ProviderConfig>,
    pub binance: Option<ProviderConfig>,
    pub coinbase: Option<ProviderConfig>,
    pub kraken: Option<ProviderConfig>,
    pub pyth: Option<ProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: ProviderConfig::new("https://api.coingecko.com/api/v3"),
            binance: ProviderConfig::new("https://api.binance.com"),
            coinbase: ProviderConfig::new("https://api.coinbase.com"),
            kraken: ProviderConfig::new("https://api.kraken.com"),
            pyth: ProviderConfig::new("https://hermes.pyth.network"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RefreshConfig {
    pub cadence_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            cadence_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl RefreshConfig {
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.cadence_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    pub debounce_ms: u64,
    pub cooldown_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            debounce_ms: 150,
            cooldown_ms: 2000,
        }
    }
}

fn default_quote_cache_ttl() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_quote_cache_ttl")]
    pub quote_cache_ttl_secs: u64,
    pub data_path: Option<String>,
    pub feed: Option<FeedConfiguration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            refresh: RefreshConfig::default(),
            sync: SyncConfig::default(),
            quote_cache_ttl_secs: default_quote_cache_ttl(),
            data_path: None,
            feed: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "feedforge", "feedforge")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "feedforge", "feedforge")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn quote_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.quote_cache_ttl_secs)
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feed::{Chain, Strategy};

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
providers:
  binance:
    base_url: "http://example.com/binance"
  kraken:
    base_url: "http://example.com/kraken"
refresh:
  cadence_secs: 5
sync:
  debounce_ms: 300
data_path: "/tmp/feedforge"
feed:
  name: "ETH Feed"
  symbol: "ETH/USD"
  sources:
    - id: binance
      name: Binance
      type: api
    - id: kraken
      weight: 2
  aggregator:
    strategy: weighted
  chain: ethereum
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(
            config.providers.binance.as_ref().unwrap().base_url,
            "http://example.com/binance"
        );
        assert!(config.providers.coingecko.is_none());
        assert_eq!(config.refresh.cadence(), Duration::from_secs(5));
        assert_eq!(config.refresh.request_timeout_secs, 10);
        assert_eq!(config.sync.debounce_ms, 300);
        assert_eq!(config.sync.cooldown_ms, 2000);
        assert_eq!(config.quote_cache_ttl_secs, 30);
        assert_eq!(config.data_path().unwrap(), PathBuf::from("/tmp/feedforge"));

        let feed = config.feed.expect("feed should be present");
        assert_eq!(feed.symbol, "ETH/USD");
        assert_eq!(feed.sources.len(), 2);
        assert_eq!(feed.sources[1].weight, 2.0);
        assert_eq!(feed.aggregator.strategy, Strategy::Weighted);
        assert_eq!(feed.chain, Some(Chain::Ethereum));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(
            config.providers.coingecko.unwrap().base_url,
            "https://api.coingecko.com/api/v3"
        );
        assert_eq!(config.refresh.cadence_secs, 30);
        assert!(config.feed.is_none());
    }

    #[test]
    fn test_load_from_missing_path_fails() {
        let result = AppConfig::load_from_path("/definitely/not/here.yaml");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }
}
