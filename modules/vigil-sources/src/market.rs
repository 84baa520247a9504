use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use vigil_common::types::MarketSnapshot;
use vigil_pipeline::limiter::RateLimiter;
use vigil_pipeline::traits::MarketDataProvider;

use crate::error::SourceError;

const BASE_URL: &str = "https://www.alphavantage.co";

/// Rate-limit identity shared by every call through this client.
const RESOURCE: &str = "alpha_vantage";

/// Free-tier quota.
const MAX_CALLS: usize = 5;
const WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: String,
    #[serde(rename = "05. price")]
    price: String,
    #[serde(rename = "06. volume")]
    volume: String,
    #[serde(rename = "07. latest trading day")]
    latest_trading_day: String,
    #[serde(rename = "10. change percent")]
    change_percent: String,
}

/// Alpha Vantage quote client.
pub struct MarketClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl MarketClient {
    pub fn new(api_key: String, limiter: Arc<RateLimiter>) -> Self {
        limiter.add_limit(RESOURCE, MAX_CALLS, WINDOW_SECONDS);
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
            limiter,
        }
    }

    /// Convenience constructor from Config — keeps caller-side wiring clean.
    pub fn from_config(config: &vigil_common::Config, limiter: Arc<RateLimiter>) -> Self {
        Self::new(config.market_api_key.clone(), limiter)
    }

    /// Point the client at a different host (tests, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the latest quote for one symbol.
    pub async fn global_quote(&self, symbol: &str) -> Result<MarketSnapshot, SourceError> {
        self.limiter.wait_if_needed(RESOURCE).await;

        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, symbol, self.api_key
        );
        let resp = self.client.get(&url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: GlobalQuoteResponse = resp.json().await?;
        let quote = parsed.global_quote.ok_or_else(|| {
            // The API answers 200 with an empty body or a note when the
            // symbol is unknown or the quota is spent upstream.
            SourceError::MissingData(format!("no quote for {symbol}"))
        })?;

        let snapshot = snapshot_from_quote(quote)?;
        tracing::debug!(symbol = %snapshot.symbol, price = snapshot.last_price, "Quote fetched");
        Ok(snapshot)
    }
}

fn snapshot_from_quote(quote: GlobalQuote) -> Result<MarketSnapshot, SourceError> {
    let last_price: f64 = quote
        .price
        .parse()
        .map_err(|_| SourceError::Parse(format!("bad price: {}", quote.price)))?;
    let change_pct: f64 = quote
        .change_percent
        .trim_end_matches('%')
        .parse()
        .map_err(|_| SourceError::Parse(format!("bad change percent: {}", quote.change_percent)))?;
    let volume = quote.volume.parse::<u64>().ok();
    let as_of = parse_trading_day(&quote.latest_trading_day)?;

    Ok(MarketSnapshot {
        symbol: quote.symbol,
        last_price,
        change_pct,
        volume,
        as_of,
    })
}

fn parse_trading_day(day: &str) -> Result<DateTime<Utc>, SourceError> {
    let date = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| SourceError::Parse(format!("bad trading day: {day}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| SourceError::Parse(format!("bad trading day: {day}")))?;
    Ok(midnight.and_utc())
}

#[async_trait]
impl MarketDataProvider for MarketClient {
    async fn quote(&self, symbol: &str) -> Result<MarketSnapshot> {
        Ok(self.global_quote(symbol).await?)
    }
}
