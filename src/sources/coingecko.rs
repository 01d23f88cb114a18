use super::util::{http_client, split_pair, with_retry};
use crate::core::cache::Cache;
use crate::core::{PriceSource, Quote, QuoteResponse, QuoteService, Strategy};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("BNB", "binancecoin"),
    ("XRP", "ripple"),
    ("ADA", "cardano"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("LTC", "litecoin"),
    ("SHIB", "shiba-inu"),
    ("USDC", "usd-coin"),
    ("USDT", "tether"),
    ("MATIC", "matic-network"),
    ("AVAX", "avalanche-2"),
    ("ARB", "arbitrum"),
    ("OP", "optimism"),
    ("APT", "aptos"),
    ("SUI", "sui"),
    ("SEI", "sei-network"),
    ("TIA", "celestia"),
    ("INJ", "injective-protocol"),
    ("ATOM", "cosmos"),
    ("NEAR", "near"),
    ("LINK", "chainlink"),
    ("UNI", "uniswap"),
    ("AAVE", "aave"),
    ("RNDR", "render-token"),
    ("BONK", "bonk"),
    ("JUP", "jupiter-exchange-solana"),
    ("WIF", "dogwifcoin"),
    ("PYTH", "pyth-network"),
    ("RAY", "raydium"),
    ("ORCA", "orca"),
    ("MSOL", "marinade-staked-sol"),
    ("JITOSOL", "jito-staked-sol"),
    ("PEPE", "pepe"),
];

/// Maps the base asset of a pair to a CoinGecko coin id, falling back to the
/// lowercase ticker.
pub fn coin_id(symbol: &str) -> String {
    let (base, _) = split_pair(symbol);
    COIN_IDS
        .iter()
        .find(|(ticker, _)| *ticker == base)
        .map(|(_, id)| id.to_string())
        .unwrap_or_else(|| base.to_lowercase())
}

type SimplePriceResponse = HashMap<String, HashMap<String, Option<f64>>>;

async fn simple_price(
    client: &reqwest::Client,
    base_url: &str,
    ids: &[String],
    vs_currency: &str,
) -> Result<SimplePriceResponse> {
    let url = format!(
        "{}/simple/price?ids={}&vs_currencies={}&include_24hr_change=true&include_last_updated_at=true",
        base_url,
        ids.join(","),
        vs_currency
    );
    debug!("Requesting simple price from {}", url);

    let response = with_retry(|| async { client.get(&url).send().await }, 1, 250)
        .await
        .with_context(|| format!("Request failed for CoinGecko ids: {}", ids.join(",")))?;

    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        return Err(anyhow!("CoinGecko rate limited"));
    }
    if !response.status().is_success() {
        return Err(anyhow!("HTTP error: {} from CoinGecko", response.status()));
    }

    response
        .json::<SimplePriceResponse>()
        .await
        .context("Failed to parse CoinGecko response")
}

pub struct CoinGeckoSource {
    base_url: String,
    client: reqwest::Client,
}

impl CoinGeckoSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(CoinGeckoSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    #[instrument(name = "CoinGeckoPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let id = coin_id(symbol);
        let (_, quote) = split_pair(symbol);
        let vs = quote.to_lowercase();

        let data = simple_price(&self.client, &self.base_url, &[id.clone()], &vs).await?;
        data.get(&id)
            .and_then(|fields| fields.get(&vs).copied().flatten())
            .ok_or_else(|| anyhow!("No price data found for CoinGecko id: {}", id))
    }
}

/// Batch quotes for the preview header, read through a shared TTL cache.
pub struct CoinGeckoQuotes {
    base_url: String,
    client: reqwest::Client,
    cache: Cache<String, Quote>,
}

impl CoinGeckoQuotes {
    pub fn new(base_url: &str, timeout: Duration, cache: Cache<String, Quote>) -> Result<Self> {
        Ok(CoinGeckoQuotes {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
            cache,
        })
    }

    async fn fetch_missing(&self, symbols: &[String]) -> HashMap<String, Quote> {
        let ids: Vec<String> = symbols.iter().map(|s| coin_id(s)).collect();
        let mut unique_ids = ids.clone();
        unique_ids.sort();
        unique_ids.dedup();

        let data = match simple_price(&self.client, &self.base_url, &unique_ids, "usd").await {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "Quote request failed");
                return HashMap::new();
            }
        };

        symbols
            .iter()
            .zip(ids)
            .filter_map(|(symbol, id)| {
                let fields = data.get(&id)?;
                let price = fields.get("usd").copied().flatten()?;
                let last_updated = fields
                    .get("last_updated_at")
                    .copied()
                    .flatten()
                    .and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single())
                    .unwrap_or_else(Utc::now);
                Some((
                    symbol.clone(),
                    Quote {
                        price,
                        change_24h: fields.get("usd_24h_change").copied().flatten(),
                        last_updated,
                    },
                ))
            })
            .collect()
    }
}

#[async_trait]
impl QuoteService for CoinGeckoQuotes {
    async fn quotes(&self, symbols: &[String], strategy: Option<Strategy>) -> QuoteResponse {
        let mut prices = HashMap::new();
        let mut missing = Vec::new();

        for symbol in symbols {
            let key = symbol.trim().to_uppercase();
            match self.cache.get(&key).await {
                Some(quote) => {
                    prices.insert(key, quote);
                }
                None if !missing.contains(&key) => missing.push(key),
                None => {}
            }
        }

        if !missing.is_empty() {
            for (symbol, quote) in self.fetch_missing(&missing).await {
                self.cache.put(symbol.clone(), quote.clone()).await;
                prices.insert(symbol, quote);
            }
        }

        QuoteResponse {
            prices,
            strategy,
            timestamp: Utc::now(),
        }
    }
}
