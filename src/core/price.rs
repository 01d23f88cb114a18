//! Pricing abstractions and core types

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::feed::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Active,
    Error,
}

/// One upstream's price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub price: f64,
    pub status: SampleStatus,
    pub observed_at: DateTime<Utc>,
}

impl Sample {
    pub fn active(price: f64) -> Self {
        Sample {
            price,
            status: SampleStatus::Active,
            observed_at: Utc::now(),
        }
    }

    pub fn error() -> Self {
        Sample {
            price: 0.0,
            status: SampleStatus::Error,
            observed_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SampleStatus::Active && self.price > 0.0
    }
}

/// An upstream that can price a slash-delimited pair such as `BTC/USD`.
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_price(&self, symbol: &str) -> Result<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub price: f64,
    pub change_24h: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub prices: HashMap<String, Quote>,
    pub strategy: Option<Strategy>,
    pub timestamp: DateTime<Utc>,
}

/// Batch price lookup. Symbols that fail are left out of the response.
#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn quotes(&self, symbols: &[String], strategy: Option<Strategy>) -> QuoteResponse;
}
