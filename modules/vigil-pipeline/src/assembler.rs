use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{info, warn};

use vigil_common::freshness::{
    freshness_score, MACRO_MAX_AGE_HOURS, MARKET_MAX_AGE_HOURS, NEWS_MAX_AGE_HOURS,
};
use vigil_common::types::{
    ContextBundle, FreshnessReport, Intent, MacroSnapshot, MarketSnapshot, NewsDigest,
    GENERAL_MARKET,
};

use crate::traits::{MacroDataProvider, MarketDataProvider, NewsProvider};

/// Fixed anomaly vocabulary appended to the intent's own keywords for the
/// news search.
pub const CRISIS_VOCABULARY: [&str; 8] = [
    "crisis",
    "crash",
    "collapse",
    "panic",
    "anomaly",
    "banking stress",
    "market crash",
    "recession",
];

/// News search runs on at most this many terms.
const MAX_NEWS_TERMS: usize = 5;

const MAX_NEWS_RESULTS: usize = 20;

/// Assembles the live context bundle for one query: market quotes per asset,
/// macro indicators for the region, and an anomaly news sweep, all fetched
/// concurrently. A failing branch is excluded, never fatal.
pub struct ContextAssembler {
    market: Arc<dyn MarketDataProvider>,
    macro_data: Arc<dyn MacroDataProvider>,
    news: Arc<dyn NewsProvider>,
}

impl ContextAssembler {
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        macro_data: Arc<dyn MacroDataProvider>,
        news: Arc<dyn NewsProvider>,
    ) -> Self {
        Self {
            market,
            macro_data,
            news,
        }
    }

    /// Fan out to every data provider and aggregate whatever survives.
    /// Branches complete in unconstrained order; every payload carries its
    /// own identity (symbol, series, source), so aggregation never depends
    /// on completion order.
    pub async fn assemble(&self, intent: &Intent, _query: &str) -> ContextBundle {
        let market_branch = async {
            let fetches = intent
                .assets
                .iter()
                .filter(|asset| asset.as_str() != GENERAL_MARKET)
                .map(|asset| self.fetch_quote(asset));
            join_all(fetches).await.into_iter().flatten().collect()
        };

        let (market, macro_data, news) = tokio::join!(
            market_branch,
            self.fetch_macro(&intent.region),
            self.fetch_news(intent),
        );

        let assembled_at = Utc::now();
        let freshness = compute_freshness(&market, &macro_data, &news, assembled_at);

        info!(
            market = market.len(),
            has_macro = macro_data.is_some(),
            has_news = news.is_some(),
            overall_freshness = freshness.overall,
            "Context bundle assembled"
        );

        ContextBundle {
            intent: intent.clone(),
            market,
            macro_data,
            news,
            assembled_at,
            freshness,
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Option<MarketSnapshot> {
        match self.market.quote(symbol).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(symbol, error = %e, "Market fetch failed (non-fatal)");
                None
            }
        }
    }

    async fn fetch_macro(&self, region: &str) -> Option<MacroSnapshot> {
        let (cpi, gdp, unemployment, interest) = tokio::join!(
            self.macro_data.cpi(region),
            self.macro_data.gdp(region),
            self.macro_data.unemployment(region),
            self.macro_data.interest_rates(region),
        );

        let mut indicators = Vec::new();
        for outcome in [cpi, gdp, unemployment, interest] {
            match outcome {
                Ok(indicator) => indicators.push(indicator),
                Err(e) => warn!(region, error = %e, "Macro indicator fetch failed (non-fatal)"),
            }
        }

        if indicators.is_empty() {
            None
        } else {
            Some(MacroSnapshot {
                region: region.to_string(),
                indicators,
            })
        }
    }

    async fn fetch_news(&self, intent: &Intent) -> Option<NewsDigest> {
        let mut terms = intent.keywords.clone();
        terms.extend(CRISIS_VOCABULARY.iter().map(|term| term.to_string()));
        terms.truncate(MAX_NEWS_TERMS);

        match self.news.anomaly_search(&terms, MAX_NEWS_RESULTS).await {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(error = %e, "News fetch failed (non-fatal)");
                None
            }
        }
    }
}

/// Score each present category from its latest observation timestamp.
/// Overall is the mean of present categories, 0.5 when nothing came back.
fn compute_freshness(
    market: &[MarketSnapshot],
    macro_data: &Option<MacroSnapshot>,
    news: &Option<NewsDigest>,
    reference: DateTime<Utc>,
) -> FreshnessReport {
    let market_score = market
        .iter()
        .map(|snapshot| snapshot.as_of)
        .max()
        .map(|latest| freshness_score(latest, MARKET_MAX_AGE_HOURS, reference));

    let macro_score = macro_data
        .as_ref()
        .and_then(|snapshot| snapshot.indicators.iter().map(|i| i.as_of).max())
        .map(|latest| freshness_score(latest, MACRO_MAX_AGE_HOURS, reference));

    let news_score = news
        .as_ref()
        .and_then(|digest| digest.items.iter().filter_map(|item| item.published_at).max())
        .map(|latest| freshness_score(latest, NEWS_MAX_AGE_HOURS, reference));

    let present: Vec<f64> = [market_score, macro_score, news_score]
        .into_iter()
        .flatten()
        .collect();
    let overall = if present.is_empty() {
        0.5
    } else {
        present.iter().sum::<f64>() / present.len() as f64
    };

    FreshnessReport {
        market: market_score,
        macro_data: macro_score,
        news: news_score,
        overall,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use vigil_common::types::{MacroIndicator, MacroSeries};

    use crate::testing::{MockMacroData, MockMarketData, MockNewsData};

    fn intent_for(assets: Vec<&str>, keywords: Vec<&str>) -> Intent {
        Intent {
            assets: assets.into_iter().map(String::from).collect(),
            region: "US".to_string(),
            analysis_type: "risk".to_string(),
            time_horizon: "short".to_string(),
            keywords: keywords.into_iter().map(String::from).collect(),
        }
    }

    fn assembler(
        market: MockMarketData,
        macro_data: MockMacroData,
        news: MockNewsData,
    ) -> ContextAssembler {
        ContextAssembler::new(Arc::new(market), Arc::new(macro_data), Arc::new(news))
    }

    #[tokio::test]
    async fn macro_only_context_takes_macro_freshness() {
        // 16.8h into a 168h window = 0.9 freshness.
        let as_of = Utc::now() - Duration::seconds((168.0 * 0.1 * 3600.0) as i64);
        let macro_data = MockMacroData::new().with_indicator(MacroIndicator {
            series: MacroSeries::Cpi,
            value: 310.2,
            as_of,
        });

        let bundle = assembler(MockMarketData::new(), macro_data, MockNewsData::new())
            .assemble(&intent_for(vec![GENERAL_MARKET], vec![]), "macro risk")
            .await;

        assert!(bundle.market.is_empty());
        assert!(bundle.news.is_none());
        let report = bundle.freshness;
        assert!((report.macro_data.unwrap() - 0.9).abs() < 1e-3);
        assert!((report.overall - 0.9).abs() < 1e-3);
        assert!(report.market.is_none());
        assert!(report.news.is_none());
    }

    #[tokio::test]
    async fn empty_context_defaults_overall_to_half() {
        let bundle = assembler(MockMarketData::new(), MockMacroData::new(), MockNewsData::new())
            .assemble(&intent_for(vec![GENERAL_MARKET], vec![]), "anything")
            .await;

        assert!((bundle.freshness.overall - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sentinel_asset_is_not_fetched() {
        let market = MockMarketData::new();
        let calls = market.call_log();

        assembler(market, MockMacroData::new(), MockNewsData::new())
            .assemble(&intent_for(vec![GENERAL_MARKET], vec![]), "general")
            .await;

        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_market_branch_does_not_abort_assembly() {
        // "TSLA" is unregistered, so the market branch errors; news survives.
        let news = MockNewsData::new().with_digest(NewsDigest {
            query_terms: vec!["crisis".to_string()],
            items: vec![],
        });

        let bundle = assembler(MockMarketData::new(), MockMacroData::new(), news)
            .assemble(&intent_for(vec!["TSLA"], vec![]), "tesla risk")
            .await;

        assert!(bundle.market.is_empty());
        assert!(bundle.news.is_some());
    }

    #[tokio::test]
    async fn news_terms_keep_intent_keywords_first_and_cap_at_five() {
        let news = MockNewsData::new().with_digest(NewsDigest {
            query_terms: vec![],
            items: vec![],
        });
        let terms = news.term_log();

        assembler(MockMarketData::new(), MockMacroData::new(), news)
            .assemble(
                &intent_for(
                    vec![GENERAL_MARKET],
                    vec!["inflation", "bonds", "energy", "housing"],
                ),
                "broad risk",
            )
            .await;

        let seen = terms.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec!["inflation", "bonds", "energy", "housing", "crisis"]
        );
    }

    #[tokio::test]
    async fn partial_macro_indicators_still_form_a_snapshot() {
        // Only CPI registered; the other three sub-indicators fail.
        let macro_data = MockMacroData::new().with_indicator(MacroIndicator {
            series: MacroSeries::Cpi,
            value: 310.2,
            as_of: Utc::now(),
        });

        let bundle = assembler(MockMarketData::new(), macro_data, MockNewsData::new())
            .assemble(&intent_for(vec![GENERAL_MARKET], vec![]), "cpi")
            .await;

        let snapshot = bundle.macro_data.unwrap();
        assert_eq!(snapshot.indicators.len(), 1);
        assert_eq!(snapshot.indicators[0].series, MacroSeries::Cpi);
    }
}
