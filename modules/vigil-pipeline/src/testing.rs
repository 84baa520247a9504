// Test mocks for the pipeline's collaborator seams.
//
// One mock per trait boundary, HashMap-backed where the real collaborator is
// keyed (quotes by symbol, indicators by series), scripted success/failure
// for the reasoning providers, and a recording backend for the resource
// arena. Unregistered inputs return `Err`, mirroring a provider outage.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use vigil_common::types::{
    ActionItem, AnalysisResult, ConfidenceMap, ContextBundle, FinalReport, Intent, MacroIndicator,
    MacroSeries, MarketSnapshot, NewsDigest, Priority, RiskLevel, SourceSummary,
};

use crate::resource::{LoadParams, ResourceBackend, ResourceHandle};
use crate::traits::{
    AnalysisContext, AnalysisProvider, ContextCompressor, IntentExtractor, MacroDataProvider,
    MarketDataProvider, NewsProvider, SynthesisProvider,
};

// ---------------------------------------------------------------------------
// Result construction helpers
// ---------------------------------------------------------------------------

pub fn analysis_result(provider: &str, risk_level: RiskLevel, confidence: f64) -> AnalysisResult {
    AnalysisResult {
        provider: provider.to_string(),
        timestamp: Utc::now(),
        signal_type: "anomaly".to_string(),
        risk_level,
        confidence,
        key_drivers: Vec::new(),
        source_summary: Vec::new(),
        reasoning: format!("{provider} assessment"),
        raw: None,
    }
}

pub fn source(name: &str, freshness: f64, reliability: f64) -> SourceSummary {
    SourceSummary {
        source: name.to_string(),
        freshness,
        reliability,
    }
}

/// Fluent tweaks for test results.
pub trait AnalysisResultExt: Sized {
    fn with_sources(self, sources: Vec<SourceSummary>) -> Self;
    fn with_drivers(self, drivers: Vec<&str>) -> Self;
}

impl AnalysisResultExt for AnalysisResult {
    fn with_sources(mut self, sources: Vec<SourceSummary>) -> Self {
        self.source_summary = sources;
        self
    }

    fn with_drivers(mut self, drivers: Vec<&str>) -> Self {
        self.key_drivers = drivers.into_iter().map(String::from).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// MockIntentExtractor
// ---------------------------------------------------------------------------

pub struct MockIntentExtractor {
    intent: Option<Intent>,
}

impl MockIntentExtractor {
    pub fn returning(intent: Intent) -> Self {
        Self {
            intent: Some(intent),
        }
    }

    pub fn failing() -> Self {
        Self { intent: None }
    }
}

#[async_trait]
impl IntentExtractor for MockIntentExtractor {
    async fn extract(&self, _query: &str) -> Result<Intent> {
        self.intent
            .clone()
            .ok_or_else(|| anyhow!("MockIntentExtractor: scripted failure"))
    }
}

// ---------------------------------------------------------------------------
// Data provider mocks
// ---------------------------------------------------------------------------

/// HashMap-based market data. Returns `Err` for unregistered symbols and
/// records every symbol asked for.
pub struct MockMarketData {
    quotes: HashMap<String, MarketSnapshot>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            quotes: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_quote(mut self, symbol: &str, snapshot: MarketSnapshot) -> Self {
        self.quotes.insert(symbol.to_string(), snapshot);
        self
    }

    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    async fn quote(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.calls.lock().unwrap().push(symbol.to_string());
        self.quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("MockMarketData: no quote registered for {symbol}"))
    }
}

/// HashMap-based macro data keyed by series. Unregistered series fail.
pub struct MockMacroData {
    indicators: HashMap<MacroSeries, MacroIndicator>,
}

impl MockMacroData {
    pub fn new() -> Self {
        Self {
            indicators: HashMap::new(),
        }
    }

    pub fn with_indicator(mut self, indicator: MacroIndicator) -> Self {
        self.indicators.insert(indicator.series, indicator);
        self
    }

    fn lookup(&self, series: MacroSeries) -> Result<MacroIndicator> {
        self.indicators
            .get(&series)
            .cloned()
            .ok_or_else(|| anyhow!("MockMacroData: no indicator registered for {series}"))
    }
}

#[async_trait]
impl MacroDataProvider for MockMacroData {
    async fn cpi(&self, _region: &str) -> Result<MacroIndicator> {
        self.lookup(MacroSeries::Cpi)
    }

    async fn gdp(&self, _region: &str) -> Result<MacroIndicator> {
        self.lookup(MacroSeries::Gdp)
    }

    async fn unemployment(&self, _region: &str) -> Result<MacroIndicator> {
        self.lookup(MacroSeries::Unemployment)
    }

    async fn interest_rates(&self, _region: &str) -> Result<MacroIndicator> {
        self.lookup(MacroSeries::InterestRate)
    }
}

/// Scripted news digest; records the search terms it was handed.
pub struct MockNewsData {
    digest: Option<NewsDigest>,
    terms: Arc<Mutex<Vec<String>>>,
}

impl MockNewsData {
    pub fn new() -> Self {
        Self {
            digest: None,
            terms: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_digest(mut self, digest: NewsDigest) -> Self {
        self.digest = Some(digest);
        self
    }

    pub fn term_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.terms.clone()
    }
}

#[async_trait]
impl NewsProvider for MockNewsData {
    async fn anomaly_search(&self, terms: &[String], _max_results: usize) -> Result<NewsDigest> {
        *self.terms.lock().unwrap() = terms.to_vec();
        self.digest
            .clone()
            .ok_or_else(|| anyhow!("MockNewsData: no digest registered"))
    }
}

// ---------------------------------------------------------------------------
// MockCompressor
// ---------------------------------------------------------------------------

pub struct MockCompressor {
    digest: Option<String>,
}

impl MockCompressor {
    pub fn returning(digest: &str) -> Self {
        Self {
            digest: Some(digest.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { digest: None }
    }
}

#[async_trait]
impl ContextCompressor for MockCompressor {
    async fn compress(
        &self,
        _bundle: &ContextBundle,
        _query: &str,
        _intent: &Intent,
    ) -> Result<String> {
        self.digest
            .clone()
            .ok_or_else(|| anyhow!("MockCompressor: scripted failure"))
    }
}

// ---------------------------------------------------------------------------
// Reasoning provider mocks
// ---------------------------------------------------------------------------

pub struct MockAnalyst {
    name: String,
    result: Option<AnalysisResult>,
    calls: Arc<Mutex<u32>>,
}

impl MockAnalyst {
    pub fn succeeding(name: &str, result: AnalysisResult) -> Self {
        Self {
            name: name.to_string(),
            result: Some(result),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: None,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> Arc<Mutex<u32>> {
        self.calls.clone()
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        _context: &AnalysisContext,
        _intent: &Intent,
    ) -> Result<AnalysisResult> {
        *self.calls.lock().unwrap() += 1;
        self.result
            .clone()
            .ok_or_else(|| anyhow!("MockAnalyst {}: scripted failure", self.name))
    }
}

pub struct MockSynthesis {
    report: Option<FinalReport>,
    fail: bool,
}

impl MockSynthesis {
    /// Derive a well-formed report from the synthesis inputs.
    pub fn succeeding() -> Self {
        Self {
            report: None,
            fail: false,
        }
    }

    /// Return exactly this report, however malformed.
    pub fn with_report(report: FinalReport) -> Self {
        Self {
            report: Some(report),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            report: None,
            fail: true,
        }
    }
}

#[async_trait]
impl SynthesisProvider for MockSynthesis {
    async fn synthesize(
        &self,
        results: &[AnalysisResult],
        confidence: &ConfidenceMap,
        _context: &AnalysisContext,
        query: &str,
    ) -> Result<FinalReport> {
        if self.fail {
            return Err(anyhow!("MockSynthesis: scripted failure"));
        }
        if let Some(report) = &self.report {
            return Ok(report.clone());
        }

        let final_risk = results
            .iter()
            .map(|result| result.risk_level)
            .max_by_key(|level| level.ordinal())
            .unwrap_or(RiskLevel::Medium);
        let overall = if confidence.is_empty() {
            0.5
        } else {
            confidence.values().sum::<f64>() / confidence.len() as f64
        };

        let mut rationale = results
            .iter()
            .map(|result| result.reasoning.clone())
            .collect::<Vec<_>>()
            .join(" ");
        while rationale.len() < 300 {
            rationale.push_str(
                " Cross-checked against macro conditions, positioning data and recent anomaly \
                 reports before weighting the surviving judgments.",
            );
        }

        Ok(FinalReport {
            query: query.to_string(),
            timestamp: Utc::now(),
            final_risk_level: final_risk,
            overall_confidence: overall,
            strategic_rationale: rationale,
            action_plan: vec![ActionItem {
                priority: Priority::High,
                action: "Reduce exposure to the flagged assets".to_string(),
                rationale: "Majority of providers see elevated risk".to_string(),
            }],
            agent_contributions: results.to_vec(),
            data_freshness_score: 0.8,
            warnings: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// RecordingBackend
// ---------------------------------------------------------------------------

/// Resource backend that records every load/release in order and can be
/// scripted to fail either operation per resource name.
pub struct RecordingBackend {
    events: Mutex<Vec<String>>,
    fail_loads: HashSet<String>,
    fail_releases: HashSet<String>,
    handle_names: Mutex<HashMap<u64, String>>,
    counter: AtomicU64,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_loads: HashSet::new(),
            fail_releases: HashSet::new(),
            handle_names: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
        }
    }

    pub fn failing_for(mut self, name: &str) -> Self {
        self.fail_loads.insert(name.to_string());
        self
    }

    pub fn failing_release(mut self, name: &str) -> Self {
        self.fail_releases.insert(name.to_string());
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceBackend for RecordingBackend {
    async fn load(&self, name: &str, _params: &LoadParams) -> Result<ResourceHandle> {
        self.events.lock().unwrap().push(format!("load:{name}"));
        if self.fail_loads.contains(name) {
            return Err(anyhow!("RecordingBackend: scripted load failure for {name}"));
        }
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        self.handle_names
            .lock()
            .unwrap()
            .insert(id, name.to_string());
        Ok(ResourceHandle(id))
    }

    async fn release(&self, handle: ResourceHandle) -> Result<()> {
        let name = self
            .handle_names
            .lock()
            .unwrap()
            .get(&handle.0)
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        self.events.lock().unwrap().push(format!("release:{name}"));
        if self.fail_releases.contains(&name) {
            return Err(anyhow!(
                "RecordingBackend: scripted release failure for {name}"
            ));
        }
        Ok(())
    }
}
