use super::util::{http_client, parse_price, split_pair, with_retry};
use crate::core::PriceSource;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Hermes price feed ids for the USD pairs Pyth publishes on Solana mainnet.
const FEED_IDS: &[(&str, &str)] = &[
    (
        "BTC",
        "e62df6c8b4a85fe1a67db44dc12de5db330f7ac66b72dc658afedf0f4a415b43",
    ),
    (
        "ETH",
        "ff61491a931112ddf1bd8147cd1b641375f79f5825126d665480874634fd0ace",
    ),
    (
        "SOL",
        "ef0d8b6fda2ceba41da15d4095d1da392a0d2f8ed0c6c7bc0f4cfac8c280b56d",
    ),
    (
        "USDC",
        "eaa020c61cc479712813461ce153894a96a6c00b21ed0cfc2798d1f9a9e9c94a",
    ),
    (
        "USDT",
        "2b89b9dc8fdf9f34709a5b106b472f0f39bb6ca9ce04b0fd7f2e971688e2e53b",
    ),
];

pub fn feed_id(symbol: &str) -> Option<&'static str> {
    let (base, quote) = split_pair(symbol);
    if quote != "USD" {
        return None;
    }
    FEED_IDS
        .iter()
        .find(|(ticker, _)| *ticker == base)
        .map(|(_, id)| *id)
}

pub struct PythSource {
    base_url: String,
    client: reqwest::Client,
}

impl PythSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(PythSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct LatestUpdates {
    #[serde(default)]
    parsed: Vec<ParsedUpdate>,
}

#[derive(Debug, Deserialize)]
struct ParsedUpdate {
    price: PythPrice,
}

#[derive(Debug, Deserialize)]
struct PythPrice {
    price: String,
    expo: i32,
}

#[async_trait]
impl PriceSource for PythSource {
    #[instrument(name = "PythPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let id = feed_id(symbol).ok_or_else(|| anyhow!("No Pyth feed for symbol: {}", symbol))?;
        let url = format!("{}/v2/updates/price/latest?ids[]={}", self.base_url, id);
        debug!("Requesting Pyth update from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 1, 250)
            .await
            .with_context(|| format!("Request failed for Pyth feed: {symbol}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for Pyth feed: {}",
                response.status(),
                symbol
            ));
        }

        let body: LatestUpdates = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Pyth response for {symbol}"))?;
        let update = body
            .parsed
            .first()
            .ok_or_else(|| anyhow!("No Pyth update found for symbol: {}", symbol))?;

        let mantissa = parse_price(&update.price.price)?;
        Ok(mantissa * 10f64.powi(update.price.expo))
    }
}
