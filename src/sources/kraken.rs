use super::util::{http_client, parse_price, split_pair, with_retry};
use crate::core::PriceSource;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct KrakenSource {
    base_url: String,
    client: reqwest::Client,
}

impl KrakenSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(KrakenSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    /// Kraken lists bitcoin as XBT: `BTC/USD` becomes `XBTUSD`.
    pub fn pair(symbol: &str) -> String {
        let (base, quote) = split_pair(symbol);
        let base = if base == "BTC" { "XBT".to_string() } else { base };
        format!("{base}{quote}")
    }
}

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: HashMap<String, TickerInfo>,
}

#[derive(Debug, Deserialize)]
struct TickerInfo {
    /// Last trade closed: `[price, lot volume]`.
    c: Vec<String>,
}

#[async_trait]
impl PriceSource for KrakenSource {
    #[instrument(name = "KrakenPriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let pair = Self::pair(symbol);
        let url = format!("{}/0/public/Ticker?pair={}", self.base_url, pair);
        debug!("Requesting ticker from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 1, 250)
            .await
            .with_context(|| format!("Request failed for Kraken pair: {pair}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for Kraken pair: {}",
                response.status(),
                pair
            ));
        }

        let body: TickerResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Kraken response for {pair}"))?;
        if !body.error.is_empty() {
            return Err(anyhow!("Kraken error for {}: {}", pair, body.error.join(", ")));
        }

        // Kraken answers with its own pair key (XXBTZUSD for XBTUSD); one pair per request.
        let raw = body
            .result
            .values()
            .next()
            .and_then(|info| info.c.first())
            .ok_or_else(|| anyhow!("No ticker data found for Kraken pair: {}", pair))?;
        parse_price(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(pair: &str, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/0/public/Ticker"))
            .and(query_param("pair", pair))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[test]
    fn test_pair_translation() {
        assert_eq!(KrakenSource::pair("BTC/USD"), "XBTUSD");
        assert_eq!(KrakenSource::pair("ETH/EUR"), "ETHEUR");
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let body = r#"{"error":[],"result":{"XXBTZUSD":{"a":["64010.0","1","1.000"],"c":["64005.4","0.0012"]}}}"#;
        let mock_server = create_mock_server("XBTUSD", body).await;
        let source = KrakenSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        assert_eq!(source.fetch_price("BTC/USD").await.unwrap(), 64005.4);
    }

    #[tokio::test]
    async fn test_kraken_error_array() {
        let body = r#"{"error":["EQuery:Unknown asset pair"]}"#;
        let mock_server = create_mock_server("FOOUSD", body).await;
        let source = KrakenSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        let err = source.fetch_price("FOO/USD").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Kraken error for FOOUSD: EQuery:Unknown asset pair"
        );
    }

    #[tokio::test]
    async fn test_malformed_price() {
        let body = r#"{"error":[],"result":{"XXBTZUSD":{"c":["not-a-number","1"]}}}"#;
        let mock_server = create_mock_server("XBTUSD", body).await;
        let source = KrakenSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        assert!(source.fetch_price("BTC/USD").await.is_err());
    }
}
