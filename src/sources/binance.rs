use super::util::{http_client, parse_price, split_pair, with_retry};
use crate::core::PriceSource;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct BinanceSource {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(BinanceSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    /// `BTC/USD` becomes `BTCUSDT`; Binance quotes dollar pairs in tether.
    pub fn pair(symbol: &str) -> String {
        let (base, quote) = split_pair(symbol);
        let quote = if quote == "USD" { "USDT".to_string() } else { quote };
        format!("{base}{quote}")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerResponse {
    last_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    msg: Option<String>,
}

#[async_trait]
impl PriceSource for BinanceSource {
    #[instrument(name = "BinancePriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let pair = Self::pair(symbol);
        let url = format!("{}/api/v3/ticker/24hr?symbol={}", self.base_url, pair);
        debug!("Requesting ticker for {} from {}", pair, url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 1, 250)
            .await
            .with_context(|| format!("Request failed for Binance pair: {pair}"))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<BinanceError>()
                .await
                .ok()
                .and_then(|e| e.msg)
                .unwrap_or_else(|| status.to_string());
            return Err(anyhow!("HTTP error: {} for Binance pair: {}", message, pair));
        }

        let ticker: TickerResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Binance response for {pair}"))?;
        let raw = ticker
            .last_price
            .ok_or_else(|| anyhow!("Invalid Binance response for {}", pair))?;
        parse_price(&raw)
    }
}
