use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use vigil_common::types::{MacroIndicator, MacroSeries};
use vigil_pipeline::limiter::RateLimiter;
use vigil_pipeline::traits::MacroDataProvider;

use crate::error::SourceError;

const BASE_URL: &str = "https://api.stlouisfed.org";

const RESOURCE: &str = "fred";
const MAX_CALLS: usize = 120;
const WINDOW_SECONDS: u64 = 60;

/// FRED series ids. US coverage; other regions fall back to the US series
/// until regional sources are wired in.
fn series_id(series: MacroSeries) -> &'static str {
    match series {
        MacroSeries::Cpi => "CPIAUCSL",
        MacroSeries::Gdp => "GDP",
        MacroSeries::Unemployment => "UNRATE",
        MacroSeries::InterestRate => "FEDFUNDS",
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    date: String,
    value: String,
}

/// FRED series-observation client.
pub struct MacroClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl MacroClient {
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
        Self::new(config.macro_api_key.clone(), limiter)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch the most recent observation of one series.
    pub async fn latest(&self, series: MacroSeries) -> Result<MacroIndicator, SourceError> {
        self.limiter.wait_if_needed(RESOURCE).await;

        let url = format!(
            "{}/fred/series/observations?series_id={}&api_key={}&file_type=json&sort_order=desc&limit=1",
            self.base_url,
            series_id(series),
            self.api_key
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

        let parsed: ObservationsResponse = resp.json().await?;
        let observation = parsed
            .observations
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::MissingData(format!("no observations for {series}")))?;

        let indicator = indicator_from_observation(series, observation)?;
        tracing::debug!(series = %series, value = indicator.value, "Macro observation fetched");
        Ok(indicator)
    }
}

fn indicator_from_observation(
    series: MacroSeries,
    observation: Observation,
) -> Result<MacroIndicator, SourceError> {
    // FRED publishes "." for observations that exist but have no value yet.
    if observation.value.trim() == "." {
        return Err(SourceError::MissingData(format!(
            "empty observation for {series}"
        )));
    }
    let value: f64 = observation
        .value
        .parse()
        .map_err(|_| SourceError::Parse(format!("bad observation value: {}", observation.value)))?;
    let as_of = parse_observation_date(&observation.date)?;

    Ok(MacroIndicator {
        series,
        value,
        as_of,
    })
}

fn parse_observation_date(date: &str) -> Result<DateTime<Utc>, SourceError> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| SourceError::Parse(format!("bad observation date: {date}")))?;
    let midnight = parsed
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| SourceError::Parse(format!("bad observation date: {date}")))?;
    Ok(midnight.and_utc())
}

#[async_trait]
impl MacroDataProvider for MacroClient {
    async fn cpi(&self, _region: &str) -> Result<MacroIndicator> {
        Ok(self.latest(MacroSeries::Cpi).await?)
    }

    async fn gdp(&self, _region: &str) -> Result<MacroIndicator> {
        Ok(self.latest(MacroSeries::Gdp).await?)
    }

    async fn unemployment(&self, _region: &str) -> Result<MacroIndicator> {
        Ok(self.latest(MacroSeries::Unemployment).await?)
    }

    async fn interest_rates(&self, _region: &str) -> Result<MacroIndicator> {
        Ok(self.latest(MacroSeries::InterestRate).await?)
    }
}
