use super::util::{http_client, parse_price, split_pair, with_retry};
use crate::core::PriceSource;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument};

pub struct CoinbaseSource {
    base_url: String,
    client: reqwest::Client,
}

impl CoinbaseSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(CoinbaseSource {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    data: Option<ExchangeRates>,
}

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    #[serde(default)]
    rates: HashMap<String, String>,
}

#[async_trait]
impl PriceSource for CoinbaseSource {
    #[instrument(name = "CoinbasePriceFetch", skip(self), fields(symbol = %symbol))]
    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let (base, quote) = split_pair(symbol);
        let url = format!("{}/v2/exchange-rates?currency={}", self.base_url, base);
        debug!("Requesting exchange rates from {}", url);

        let response = with_retry(|| async { self.client.get(&url).send().await }, 1, 250)
            .await
            .with_context(|| format!("Request failed for Coinbase currency: {base}"))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "HTTP error: {} for Coinbase currency: {}",
                response.status(),
                base
            ));
        }

        let body: ExchangeRatesResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Coinbase response for {base}"))?;
        let raw = body
            .data
            .and_then(|d| d.rates.get(&quote).cloned())
            .ok_or_else(|| anyhow!("No {} rate in Coinbase response for {}", quote, base))?;
        parse_price(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(currency: &str, status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/exchange-rates"))
            .and(query_param("currency", currency))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_successful_price_fetch() {
        let body = r#"{"data":{"currency":"ETH","rates":{"USD":"3120.55","EUR":"2890.10"}}}"#;
        let mock_server = create_mock_server("ETH", 200, body).await;
        let source = CoinbaseSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        assert_eq!(source.fetch_price("ETH/USD").await.unwrap(), 3120.55);
        assert_eq!(source.fetch_price("eth/eur").await.unwrap(), 2890.10);
    }

    #[tokio::test]
    async fn test_missing_rate() {
        let body = r#"{"data":{"currency":"ETH","rates":{"EUR":"2890.10"}}}"#;
        let mock_server = create_mock_server("ETH", 200, body).await;
        let source = CoinbaseSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        let err = source.fetch_price("ETH/USD").await.unwrap_err();
        assert_eq!(err.to_string(), "No USD rate in Coinbase response for ETH");
    }

    #[tokio::test]
    async fn test_server_error() {
        let mock_server = create_mock_server("ETH", 503, "").await;
        let source = CoinbaseSource::new(&mock_server.uri(), Duration::from_secs(5)).unwrap();

        let err = source.fetch_price("ETH/USD").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "HTTP error: 503 Service Unavailable for Coinbase currency: ETH"
        );
    }
}
