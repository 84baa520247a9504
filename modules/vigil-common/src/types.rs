use std::collections::HashMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// --- Risk Scale ---

/// Fixed 4-point risk scale shared by every provider and the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Ordinal position on the scale: low=1 .. critical=4.
    pub fn ordinal(&self) -> u8 {
        match self {
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::High => 3,
            RiskLevel::Critical => 4,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Immediate,
    High,
    Medium,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Immediate => write!(f, "immediate"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

// --- Intent ---

/// Placeholder asset meaning "no specific instrument named in the query".
/// Market fan-out skips it.
pub const GENERAL_MARKET: &str = "GENERAL_MARKET";

/// Structured reading of one user query. Immutable for the query's lifetime;
/// produced by the intent-extraction collaborator before assembly starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub assets: Vec<String>,
    pub region: String,
    pub analysis_type: String,
    pub time_horizon: String,
    pub keywords: Vec<String>,
}

impl Intent {
    /// Conservative stand-in used when the extractor collaborator fails:
    /// market-wide risk scan over the default region.
    pub fn degraded() -> Self {
        Self {
            assets: vec![GENERAL_MARKET.to_string()],
            region: "US".to_string(),
            analysis_type: "risk".to_string(),
            time_horizon: "medium".to_string(),
            keywords: Vec::new(),
        }
    }
}

// --- Analysis Results ---

/// Reliability and recency of one data source consulted by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SourceSummary {
    pub source: String,
    /// Recency score in [0,1]; 1 = just observed.
    pub freshness: f64,
    /// Source trust score in [0,1].
    pub reliability: f64,
}

/// One provider's structured risk judgment for the current query.
/// Owned by the orchestrator and immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub signal_type: String,
    pub risk_level: RiskLevel,
    /// Provider self-confidence in [0,1], before calibration.
    pub confidence: f64,
    pub key_drivers: Vec<String>,
    pub source_summary: Vec<SourceSummary>,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
}

/// Final calibrated confidence per provider, recomputed fresh every query.
pub type ConfidenceMap = HashMap<String, f64>;

// --- Contradiction ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    ReweightAndReevaluate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionDetails {
    pub pair_count: usize,
    /// Matched pairs rendered "a_vs_b", in rule-table order.
    pub pairs: Vec<String>,
}

/// One detection pass's aggregated finding. Derived, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionEvent {
    /// Deduplicated identities of every provider involved in a matched pair.
    pub conflicting: Vec<String>,
    pub arbiter: String,
    pub action: RecommendedAction,
    pub details: ContradictionDetails,
}

/// Condensed view of one conflicting result, packaged for the arbiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub provider: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub key_drivers: Vec<String>,
}

/// Everything the arbiter needs to re-evaluate a contradiction. Advisory:
/// building this does not alter pipeline flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterBriefing {
    pub arbiter: String,
    pub conflicting: Vec<ConflictSummary>,
    pub instruction: String,
}

// --- Final Report ---

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ActionItem {
    pub priority: Priority,
    pub action: String,
    pub rationale: String,
}

/// Terminal artifact of one query. Field set is the stable output contract
/// for downstream consumers; immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalReport {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    pub final_risk_level: RiskLevel,
    pub overall_confidence: f64,
    pub strategic_rationale: String,
    pub action_plan: Vec<ActionItem>,
    pub agent_contributions: Vec<AnalysisResult>,
    pub data_freshness_score: f64,
    pub warnings: Vec<String>,
}

// --- Context Payloads ---

// Each data-provider seam returns its own typed payload, so the assembler
// never has to infer a category from key presence.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_price: f64,
    pub change_pct: f64,
    pub volume: Option<u64>,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MacroSeries {
    Cpi,
    Gdp,
    Unemployment,
    InterestRate,
}

impl std::fmt::Display for MacroSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MacroSeries::Cpi => write!(f, "cpi"),
            MacroSeries::Gdp => write!(f, "gdp"),
            MacroSeries::Unemployment => write!(f, "unemployment"),
            MacroSeries::InterestRate => write!(f, "interest_rate"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroIndicator {
    pub series: MacroSeries,
    pub value: f64,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroSnapshot {
    pub region: String,
    pub indicators: Vec<MacroIndicator>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsDigest {
    pub query_terms: Vec<String>,
    pub items: Vec<NewsItem>,
}

// --- Context Bundle ---

/// Per-category and overall data recency for one assembled context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub market: Option<f64>,
    pub macro_data: Option<f64>,
    pub news: Option<f64>,
    pub overall: f64,
}

/// Aggregated market/macro/news snapshot assembled for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBundle {
    pub intent: Intent,
    pub market: Vec<MarketSnapshot>,
    pub macro_data: Option<MacroSnapshot>,
    pub news: Option<NewsDigest>,
    pub assembled_at: DateTime<Utc>,
    pub freshness: FreshnessReport,
}

impl ContextBundle {
    /// Plain-text rendering of the bundle, used as the local fallback when
    /// the compressor collaborator fails. Bounded by the caller.
    pub fn render_digest(&self) -> String {
        let mut out = String::new();

        for m in &self.market {
            out.push_str(&format!(
                "{}: {:.2} ({:+.2}%) as of {}\n",
                m.symbol,
                m.last_price,
                m.change_pct,
                m.as_of.format("%Y-%m-%d %H:%M")
            ));
        }

        if let Some(macro_data) = &self.macro_data {
            out.push_str(&format!("macro [{}]:", macro_data.region));
            for ind in &macro_data.indicators {
                out.push_str(&format!(" {}={:.2}", ind.series, ind.value));
            }
            out.push('\n');
        }

        if let Some(news) = &self.news {
            for item in news.items.iter().take(10) {
                out.push_str(&format!("news: {} — {}\n", item.source, item.title));
            }
        }

        if out.is_empty() {
            out.push_str("no context data gathered\n");
        }
        out
    }
}
