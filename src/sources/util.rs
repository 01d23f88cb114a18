use anyhow::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = "feedforge/0.1";

/// Retries an async operation with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful result or the error after all attempts
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Splits `BTC/USD` into `("BTC", "USD")`. A bare symbol is quoted in USD.
pub fn split_pair(symbol: &str) -> (String, String) {
    let upper = symbol.trim().to_uppercase();
    match upper.split_once('/') {
        Some((base, quote)) if !quote.is_empty() => (base.to_string(), quote.to_string()),
        Some((base, _)) => (base.to_string(), "USD".to_string()),
        None => (upper, "USD".to_string()),
    }
}

/// Upstreams that report prices as decimal strings.
pub fn parse_price(raw: &str) -> Result<f64> {
    let price: f64 = raw
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Unparsable price '{}': {}", raw, e))?;
    Ok(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pair() {
        assert_eq!(split_pair("btc/usd"), ("BTC".to_string(), "USD".to_string()));
        assert_eq!(split_pair("ETH/EUR"), ("ETH".to_string(), "EUR".to_string()));
        assert_eq!(split_pair("SOL"), ("SOL".to_string(), "USD".to_string()));
        assert_eq!(split_pair("SOL/"), ("SOL".to_string(), "USD".to_string()));
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price(" 64000.50 ").unwrap(), 64000.5);
        assert!(parse_price("n/a").is_err());
    }

    #[tokio::test]
    async fn test_with_retry_gives_up() {
        let mut calls = 0;
        let result: Result<(), Error> = with_retry(
            || {
                calls += 1;
                async {
                    reqwest::Client::new()
                        .get("http://127.0.0.1:1/unreachable")
                        .send()
                        .await
                        .map(|_| ())
                }
            },
            2,
            1,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }
}
