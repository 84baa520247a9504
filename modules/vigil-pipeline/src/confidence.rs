use tracing::debug;

use vigil_common::types::{AnalysisResult, ConfidenceMap, FreshnessReport, SourceSummary};

/// Global freshness discount applied to every final score.
pub const DEFAULT_FRESHNESS_FACTOR: f64 = 0.95;

/// Reliability assumed for unknown sources and for results with no sources.
const DEFAULT_RELIABILITY: f64 = 0.70;

/// Trust prior per known source name. Static, extend as sources are added.
fn static_reliability(source: &str) -> f64 {
    match source {
        "Reuters" | "Bloomberg" => 0.95,
        "Financial Times" | "Wall Street Journal" => 0.90,
        "FRED" => 0.98,
        "Alpha Vantage" => 0.85,
        "Tavily" => 0.80,
        "NewsAPI" => 0.75,
        _ => DEFAULT_RELIABILITY,
    }
}

/// Calibrates each provider's self-confidence against source reliability and
/// data recency, and measures inter-provider agreement.
pub struct ConfidenceScorer {
    freshness_factor: f64,
}

impl ConfidenceScorer {
    pub fn new(freshness_factor: f64) -> Self {
        Self { freshness_factor }
    }

    /// Final confidence per provider:
    /// `clamp01(base × source_reliability × data_freshness × factor)`.
    pub fn compute(
        &self,
        results: &[AnalysisResult],
        context_freshness: &FreshnessReport,
    ) -> ConfidenceMap {
        let mut map = ConfidenceMap::new();

        for result in results {
            let reliability = source_reliability(&result.source_summary);
            let data_freshness = combined_freshness(result, context_freshness.overall);
            let final_confidence = (result.confidence * reliability * data_freshness
                * self.freshness_factor)
                .clamp(0.0, 1.0);

            debug!(
                provider = %result.provider,
                base = result.confidence,
                reliability,
                freshness = data_freshness,
                calibrated = final_confidence,
                "Confidence calibrated"
            );
            map.insert(result.provider.clone(), final_confidence);
        }

        map
    }

    /// How tightly the providers' risk readings cluster: 1.0 = unanimous.
    /// Population standard deviation over risk ordinals, rescaled so a
    /// spread of two full levels zeroes the score.
    pub fn agreement(&self, results: &[AnalysisResult]) -> f64 {
        if results.len() < 2 {
            return 1.0;
        }

        let ordinals: Vec<f64> = results
            .iter()
            .map(|result| result.risk_level.ordinal() as f64)
            .collect();
        let mean = ordinals.iter().sum::<f64>() / ordinals.len() as f64;
        let variance = ordinals
            .iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / ordinals.len() as f64;
        let std_dev = variance.sqrt();

        (1.0 - (std_dev / 2.0).min(1.0)).clamp(0.0, 1.0)
    }
}

/// Freshness-weighted mean of `static × declared` reliability across the
/// result's sources. Falls back to the default when there are no sources or
/// every freshness weight is zero.
fn source_reliability(sources: &[SourceSummary]) -> f64 {
    if sources.is_empty() {
        return DEFAULT_RELIABILITY;
    }

    let mut total = 0.0;
    let mut weight = 0.0;
    for source in sources {
        total += static_reliability(&source.source) * source.reliability * source.freshness;
        weight += source.freshness;
    }

    if weight > 0.0 {
        total / weight
    } else {
        DEFAULT_RELIABILITY
    }
}

/// Mean of the result's own source freshness (0.5 when sourceless) and the
/// context-wide score.
fn combined_freshness(result: &AnalysisResult, context_overall: f64) -> f64 {
    let own = if result.source_summary.is_empty() {
        0.5
    } else {
        result
            .source_summary
            .iter()
            .map(|source| source.freshness)
            .sum::<f64>()
            / result.source_summary.len() as f64
    };

    ((own + context_overall) / 2.0).clamp(0.0, 1.0)
}
