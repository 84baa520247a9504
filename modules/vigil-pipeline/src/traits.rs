// Trait abstractions for the pipeline's external collaborators.
//
// Data providers return their own typed payload per category, so the
// assembler never infers a payload's category from key presence. Analysis
// and synthesis providers are opaque reasoning components; the pipeline only
// sees their structured outputs.
//
// These enable deterministic testing with the mocks in `testing`:
// no network, no loaded models. `cargo test` in seconds.

use anyhow::Result;
use async_trait::async_trait;

use vigil_common::types::{
    AnalysisResult, ConfidenceMap, ContextBundle, FinalReport, Intent, MacroIndicator,
    MarketSnapshot, NewsDigest,
};

// ---------------------------------------------------------------------------
// Data providers
// ---------------------------------------------------------------------------

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch the current quote for one instrument.
    async fn quote(&self, symbol: &str) -> Result<MarketSnapshot>;
}

#[async_trait]
pub trait MacroDataProvider: Send + Sync {
    async fn cpi(&self, region: &str) -> Result<MacroIndicator>;
    async fn gdp(&self, region: &str) -> Result<MacroIndicator>;
    async fn unemployment(&self, region: &str) -> Result<MacroIndicator>;
    async fn interest_rates(&self, region: &str) -> Result<MacroIndicator>;
}

#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Search recent news for anomaly signals matching the given terms.
    async fn anomaly_search(&self, terms: &[String], max_results: usize) -> Result<NewsDigest>;
}

// ---------------------------------------------------------------------------
// Query-side collaborators
// ---------------------------------------------------------------------------

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    /// Turn one raw user query into a structured intent.
    async fn extract(&self, query: &str) -> Result<Intent>;
}

#[async_trait]
pub trait ContextCompressor: Send + Sync {
    /// Reduce an assembled bundle to a bounded text digest.
    async fn compress(&self, bundle: &ContextBundle, query: &str, intent: &Intent)
        -> Result<String>;
}

// ---------------------------------------------------------------------------
// Reasoning providers
// ---------------------------------------------------------------------------

/// Context handed to reasoning providers: the full assembled bundle in the
/// concurrent mode, or a compressed digest when running against the
/// memory-constrained local resource.
#[derive(Debug, Clone)]
pub enum AnalysisContext {
    Bundle(ContextBundle),
    Digest(String),
}

impl AnalysisContext {
    /// Text rendering bounded to `max_chars`, truncated on a char boundary.
    pub fn digest(&self, max_chars: usize) -> String {
        let full = match self {
            AnalysisContext::Bundle(bundle) => bundle.render_digest(),
            AnalysisContext::Digest(digest) => digest.clone(),
        };
        full.chars().take(max_chars).collect()
    }
}

#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Stable provider identity; results and confidence are keyed by it.
    fn name(&self) -> &str;

    /// Produce one structured risk judgment for the query.
    async fn analyze(&self, context: &AnalysisContext, intent: &Intent) -> Result<AnalysisResult>;
}

#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    /// Combine surviving stage-1 results into the final report.
    async fn synthesize(
        &self,
        results: &[AnalysisResult],
        confidence: &ConfidenceMap,
        context: &AnalysisContext,
        query: &str,
    ) -> Result<FinalReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_truncates_on_char_boundary() {
        let ctx = AnalysisContext::Digest("héllo wörld".to_string());
        let out = ctx.digest(6);
        assert_eq!(out, "héllo ");
    }

    #[test]
    fn digest_shorter_than_limit_is_untouched() {
        let ctx = AnalysisContext::Digest("short".to_string());
        assert_eq!(ctx.digest(500), "short");
    }
}
