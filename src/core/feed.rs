//! Feed configuration types and normalization

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::str::FromStr;

pub const MAX_DECIMALS: u8 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Median,
    Mean,
    Weighted,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Strategy::Median => "median",
                Strategy::Mean => "mean",
                Strategy::Weighted => "weighted",
            }
        )
    }
}

impl FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "median" => Ok(Strategy::Median),
            "mean" => Ok(Strategy::Mean),
            "weighted" => Ok(Strategy::Weighted),
            _ => Err(anyhow::anyhow!("Invalid aggregation strategy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    #[default]
    #[serde(rename = "api")]
    Api,
    #[serde(rename = "on-chain")]
    OnChain,
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Api => write!(f, "api"),
            SourceKind::OnChain => write!(f, "on-chain"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Ethereum,
    Monad,
}

impl FromStr for Chain {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "solana" => Ok(Chain::Solana),
            "ethereum" => Ok(Chain::Ethereum),
            "monad" => Ok(Chain::Monad),
            _ => Err(anyhow::anyhow!("Invalid chain: {}", s)),
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Chain::Solana => "solana",
            Chain::Ethereum => "ethereum",
            Chain::Monad => "monad",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Devnet,
    Testnet,
}

impl FromStr for Network {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            _ => Err(anyhow::anyhow!("Invalid network: {}", s)),
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
        };
        write!(f, "{name}")
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// One upstream's participation in a feed. A binding given only by id gets
/// its name and kind from the registry when the feed is received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBinding {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type", alias = "kind")]
    pub kind: SourceKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatorSettings {
    #[serde(alias = "type")]
    pub strategy: Strategy,
    pub min_sources: usize,
    pub deviation_threshold: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        AggregatorSettings {
            strategy: Strategy::Median,
            min_sources: 1,
            deviation_threshold: 0.05,
        }
    }
}

/// The user-editable description of a data feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(alias = "dataSources")]
    pub sources: Vec<SourceBinding>,
    pub aggregator: AggregatorSettings,
    pub update_interval: u64,
    pub decimals: u8,
    #[serde(alias = "blockchain")]
    pub chain: Option<Chain>,
    pub network: Option<Network>,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Sources are left empty here; a synchronizer seeds them from the registry.
impl Default for FeedConfiguration {
    fn default() -> Self {
        FeedConfiguration {
            id: None,
            name: "BTC/USD Feed".to_string(),
            symbol: "BTC/USD".to_string(),
            description: None,
            sources: Vec::new(),
            aggregator: AggregatorSettings::default(),
            update_interval: 60,
            decimals: 8,
            chain: Some(Chain::Solana),
            network: Some(Network::Mainnet),
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }
}

/// Content signals used to tell one logical feed from another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub symbol: String,
    pub name: String,
    pub update_interval: u64,
}

/// Partial update applied to a local configuration. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPatch {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub description: Option<String>,
    pub sources: Option<Vec<SourceBinding>>,
    pub strategy: Option<Strategy>,
    pub min_sources: Option<usize>,
    pub deviation_threshold: Option<f64>,
    pub update_interval: Option<u64>,
    pub decimals: Option<u8>,
    pub chain: Option<Chain>,
    pub network: Option<Network>,
    pub enabled: Option<bool>,
}

impl FeedPatch {
    pub fn is_empty(&self) -> bool {
        *self == FeedPatch::default()
    }
}

impl FeedConfiguration {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            update_interval: self.update_interval,
        }
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceBinding> {
        self.sources.iter().filter(|s| s.enabled)
    }

    pub fn binding(&self, id: &str) -> Option<&SourceBinding> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn apply(&mut self, patch: FeedPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(symbol) = patch.symbol {
            self.symbol = symbol;
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(sources) = patch.sources {
            self.sources = sources;
        }
        if let Some(strategy) = patch.strategy {
            self.aggregator.strategy = strategy;
        }
        if let Some(min_sources) = patch.min_sources {
            self.aggregator.min_sources = min_sources;
        }
        if let Some(threshold) = patch.deviation_threshold {
            self.aggregator.deviation_threshold = threshold;
        }
        if let Some(interval) = patch.update_interval {
            self.update_interval = interval;
        }
        if let Some(decimals) = patch.decimals {
            self.decimals = decimals;
        }
        if let Some(chain) = patch.chain {
            self.chain = Some(chain);
        }
        if let Some(network) = patch.network {
            self.network = Some(network);
        }
        if let Some(enabled) = patch.enabled {
            self.enabled = enabled;
        }
        self.normalize();
    }

    /// Repairs out-of-range fields in place instead of rejecting the configuration.
    pub fn normalize(&mut self) {
        let mut seen = HashSet::new();
        self.sources.retain(|s| seen.insert(s.id.clone()));

        self.update_interval = self.update_interval.max(1);
        self.decimals = self.decimals.min(MAX_DECIMALS);

        let threshold = self.aggregator.deviation_threshold;
        self.aggregator.deviation_threshold = if threshold.is_nan() {
            0.0
        } else {
            threshold.clamp(0.0, 1.0)
        };

        let max_sources = self.sources.len().max(1);
        self.aggregator.min_sources = self.aggregator.min_sources.clamp(1, max_sources);
    }
}
