use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vigil_common::types::{NewsDigest, NewsItem};
use vigil_pipeline::limiter::RateLimiter;
use vigil_pipeline::traits::NewsProvider;

use crate::error::SourceError;

const BASE_URL: &str = "https://api.tavily.com";

const RESOURCE: &str = "tavily";
const MAX_CALLS: usize = 100;
const WINDOW_SECONDS: u64 = 60;

/// Anchors every anomaly query to the financial domain.
const DOMAIN_SUFFIX: &str = "finance OR financial OR market OR economy";

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: String,
    topic: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    published_date: Option<String>,
}

/// Tavily search client for the news/anomaly sweep.
pub struct NewsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    limiter: Arc<RateLimiter>,
}

impl NewsClient {
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
        Self::new(config.news_api_key.clone(), limiter)
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Search recent coverage for anomaly signals matching the terms.
    pub async fn search(
        &self,
        terms: &[String],
        max_results: usize,
    ) -> Result<NewsDigest, SourceError> {
        self.limiter.wait_if_needed(RESOURCE).await;

        let query = build_query(terms);
        let request = SearchRequest {
            api_key: &self.api_key,
            query: query.clone(),
            topic: "finance",
            search_depth: "advanced",
            max_results,
        };

        let url = format!("{}/search", self.base_url);
        let resp = self.client.post(&url).json(&request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let parsed: SearchResponse = resp.json().await?;
        let items: Vec<NewsItem> = parsed.results.into_iter().map(item_from_result).collect();
        tracing::debug!(query, count = items.len(), "News search complete");

        Ok(NewsDigest {
            query_terms: terms.to_vec(),
            items,
        })
    }
}

fn build_query(terms: &[String]) -> String {
    if terms.is_empty() {
        DOMAIN_SUFFIX.to_string()
    } else {
        format!("{} {}", terms.join(" OR "), DOMAIN_SUFFIX)
    }
}

fn item_from_result(result: SearchResult) -> NewsItem {
    let source = url::Url::parse(&result.url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(String::from))
        .unwrap_or_else(|| "Tavily".to_string());
    let published_at = result
        .published_date
        .as_deref()
        .and_then(parse_published_date);

    NewsItem {
        title: result.title,
        url: result.url,
        snippet: result.content,
        source,
        published_at,
    }
}

fn parse_published_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

#[async_trait]
impl NewsProvider for NewsClient {
    async fn anomaly_search(&self, terms: &[String], max_results: usize) -> Result<NewsDigest> {
        Ok(self.search(terms, max_results).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "query": "banking stress OR recession finance OR financial OR market OR economy",
        "response_time": 1.2,
        "results": [
            {
                "title": "Regional lenders under renewed deposit pressure",
                "url": "https://www.reuters.com/markets/us/regional-lenders-2026-08-03/",
                "content": "Deposit outflows accelerated at mid-sized banks last week...",
                "score": 0.97,
                "published_date": "2026-08-03T09:30:00Z"
            },
            {
                "title": "Opinion: the soft landing narrative",
                "url": "not a url",
                "content": "Markets keep pricing perfection...",
                "score": 0.41
            }
        ]
    }"#;

    #[test]
    fn fixture_parses_into_a_digest() {
        let parsed: SearchResponse = serde_json::from_str(FIXTURE).unwrap();
        let items: Vec<NewsItem> = parsed.results.into_iter().map(item_from_result).collect();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].source, "www.reuters.com");
        assert!(items[0].published_at.is_some());
        // Unparsable url and absent date degrade, not fail.
        assert_eq!(items[1].source, "Tavily");
        assert!(items[1].published_at.is_none());
    }

    #[test]
    fn query_joins_terms_and_anchors_to_finance() {
        let terms = vec!["banking stress".to_string(), "recession".to_string()];
        assert_eq!(
            build_query(&terms),
            "banking stress OR recession finance OR financial OR market OR economy"
        );
    }

    #[test]
    fn empty_terms_still_query_the_domain() {
        assert_eq!(build_query(&[]), DOMAIN_SUFFIX);
    }

    #[test]
    fn empty_results_deserialize() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
