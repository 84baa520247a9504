use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use vigil_common::error::PipelineError;
use vigil_common::types::{
    ActionItem, AnalysisResult, ConfidenceMap, ContextBundle, FinalReport, Intent, Priority,
    RiskLevel,
};

use crate::assembler::ContextAssembler;
use crate::confidence::{ConfidenceScorer, DEFAULT_FRESHNESS_FACTOR};
use crate::contradiction::ContradictionDetector;
use crate::resource::{ResourceManager, ResourceSpec};
use crate::traits::{
    AnalysisContext, AnalysisProvider, ContextCompressor, IntentExtractor, MacroDataProvider,
    MarketDataProvider, NewsProvider, SynthesisProvider,
};

/// The sequential mode's synthesis stage sees at most this much digest text;
/// its resource is sized for short prompts.
const SYNTHESIS_DIGEST_LIMIT: usize = 500;

/// Reports whose rationale is shorter than this are delivered with a
/// degradation warning instead of being rejected.
const MIN_RATIONALE_LEN: usize = 300;

const DEFAULT_ACTION: &str =
    "Monitor market conditions and re-run the analysis as new data arrives";

/// Shared dependency container for the concurrent pipeline. Holds
/// long-lived, cloneable collaborators; per-query state is constructed
/// inside `process`.
#[derive(Clone, TypedBuilder)]
pub struct PipelineDeps {
    pub intent: Arc<dyn IntentExtractor>,
    pub market: Arc<dyn MarketDataProvider>,
    pub macro_data: Arc<dyn MacroDataProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub analysts: Vec<Arc<dyn AnalysisProvider>>,
    pub synthesis: Arc<dyn SynthesisProvider>,
    #[builder(default = DEFAULT_FRESHNESS_FACTOR)]
    pub freshness_factor: f64,
}

/// Mode A: concurrent stage-1. All analysis providers run in parallel
/// against the full context bundle; branch failures are isolated.
pub struct Orchestrator {
    deps: PipelineDeps,
    assembler: ContextAssembler,
    scorer: ConfidenceScorer,
    detector: ContradictionDetector,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps) -> Self {
        Self::with_detector(deps, ContradictionDetector::new())
    }

    /// Entry point for a custom rule table or contradiction policy.
    pub fn with_detector(deps: PipelineDeps, detector: ContradictionDetector) -> Self {
        let assembler = ContextAssembler::new(
            deps.market.clone(),
            deps.macro_data.clone(),
            deps.news.clone(),
        );
        let scorer = ConfidenceScorer::new(deps.freshness_factor);
        Self {
            deps,
            assembler,
            scorer,
            detector,
        }
    }

    /// Run one query end to end. Fails only on resource exhaustion or when
    /// every stage-1 branch dies; everything else degrades into warnings on
    /// the delivered report.
    pub async fn process(&self, query: &str) -> Result<FinalReport, PipelineError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, query, "Processing query");
        let mut warnings = Vec::new();

        let intent = self.resolve_intent(query, &mut warnings).await;
        let bundle = self.assembler.assemble(&intent, query).await;
        let context = AnalysisContext::Bundle(bundle.clone());

        // Stage-1 fan-out. Results are keyed by each provider's embedded
        // identity, never by completion order.
        let calls = self.deps.analysts.iter().map(|analyst| {
            let context = &context;
            let intent = &intent;
            async move {
                (
                    analyst.name().to_string(),
                    analyst.analyze(context, intent).await,
                )
            }
        });
        let outcomes = futures::future::join_all(calls).await;

        let mut results = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(provider = %name, error = %e, "Analysis branch failed (non-fatal)");
                    warnings.push(format!("{name} analysis failed: {e}"));
                }
            }
        }
        if results.is_empty() {
            return Err(PipelineError::NoSurvivors(
                "every stage-1 analysis branch failed".to_string(),
            ));
        }
        info!(survivors = results.len(), "Stage-1 complete");

        // Advisory circuit breaker: the event is surfaced on the report and
        // the briefing kept available to callers, but synthesis proceeds
        // unconditionally with every surviving result.
        if let Some(event) = self.detector.check(&results) {
            let briefing = self.detector.arbiter_briefing(&event, &results);
            debug!(arbiter = %briefing.arbiter, "Arbiter briefing prepared");
            warnings.push(format!(
                "contradiction detected between {}; arbiter: {}",
                event.conflicting.join(", "),
                event.arbiter
            ));
        }

        let confidence = self.scorer.compute(&results, &bundle.freshness);
        debug!(agreement = self.scorer.agreement(&results), "Inter-provider agreement");

        let report = match self
            .deps
            .synthesis
            .synthesize(&results, &confidence, &context, query)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Synthesis failed, building local fallback report (non-fatal)");
                warnings.push(format!("synthesis failed, heuristic fallback used: {e}"));
                fallback_report(query, &results, &confidence, &bundle)
            }
        };

        let report = normalize_report(report, &results, warnings);
        info!(risk = %report.final_risk_level, "Final report produced");
        Ok(report)
    }

    async fn resolve_intent(&self, query: &str, warnings: &mut Vec<String>) -> Intent {
        match self.deps.intent.extract(query).await {
            Ok(intent) => {
                info!(
                    analysis_type = %intent.analysis_type,
                    assets = ?intent.assets,
                    "Intent resolved"
                );
                intent
            }
            Err(e) => {
                warn!(error = %e, "Intent extraction failed, using degraded intent (non-fatal)");
                warnings.push(format!("intent extraction failed: {e}"));
                Intent::degraded()
            }
        }
    }
}

/// Dependency container for the sequential mode. One analyst, one synthesis
/// provider, and the exclusive compute resource they share.
#[derive(Clone, TypedBuilder)]
pub struct SequentialDeps {
    pub intent: Arc<dyn IntentExtractor>,
    pub market: Arc<dyn MarketDataProvider>,
    pub macro_data: Arc<dyn MacroDataProvider>,
    pub news: Arc<dyn NewsProvider>,
    pub compressor: Arc<dyn ContextCompressor>,
    pub analyst: Arc<dyn AnalysisProvider>,
    pub synthesis: Arc<dyn SynthesisProvider>,
    pub resources: Arc<ResourceManager>,
    pub stage1_resource: ResourceSpec,
    pub stage2_resource: ResourceSpec,
    #[builder(default = DEFAULT_FRESHNESS_FACTOR)]
    pub freshness_factor: f64,
}

/// Mode B: resource-constrained sequential pipeline. One stage-1 call and
/// one synthesis call, each on the exclusive heavy resource, with the
/// resource guaranteed unloaded between stages and on every failure path.
pub struct SequentialRunner {
    deps: SequentialDeps,
    assembler: ContextAssembler,
    scorer: ConfidenceScorer,
}

impl SequentialRunner {
    pub fn new(deps: SequentialDeps) -> Self {
        let assembler = ContextAssembler::new(
            deps.market.clone(),
            deps.macro_data.clone(),
            deps.news.clone(),
        );
        let scorer = ConfidenceScorer::new(deps.freshness_factor);
        Self {
            deps,
            assembler,
            scorer,
        }
    }

    pub async fn process(&self, query: &str) -> Result<FinalReport, PipelineError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, query, "Sequential run started");
        let mut warnings = Vec::new();

        let intent = match self.deps.intent.extract(query).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Intent extraction failed, using degraded intent (non-fatal)");
                warnings.push(format!("intent extraction failed: {e}"));
                Intent::degraded()
            }
        };

        let bundle = self.assembler.assemble(&intent, query).await;

        let digest = match self
            .deps
            .compressor
            .compress(&bundle, query, &intent)
            .await
        {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "Compression failed, using local digest (non-fatal)");
                warnings.push(format!("context compression failed: {e}"));
                bundle.render_digest()
            }
        };

        // Stage-1 on the exclusive resource. The unload runs on both the
        // success and the failure path before anything else happens.
        self.deps.resources.load(&self.deps.stage1_resource).await?;
        let context = AnalysisContext::Digest(digest.clone());
        let stage1 = self.deps.analyst.analyze(&context, &intent).await;
        self.deps.resources.unload().await;

        let result = match stage1 {
            Ok(result) => result,
            Err(e) => {
                return Err(PipelineError::NoSurvivors(format!(
                    "stage-1 analysis failed: {e}"
                )));
            }
        };
        info!(risk = %result.risk_level, "Stage-1 complete");

        let results = vec![result];
        let confidence = self.scorer.compute(&results, &bundle.freshness);

        self.deps.resources.load(&self.deps.stage2_resource).await?;
        let synthesis_context = AnalysisContext::Digest(context.digest(SYNTHESIS_DIGEST_LIMIT));
        let outcome = self
            .deps
            .synthesis
            .synthesize(&results, &confidence, &synthesis_context, query)
            .await;
        self.deps.resources.unload().await;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Synthesis failed, building local fallback report (non-fatal)");
                warnings.push(format!("synthesis failed, heuristic fallback used: {e}"));
                fallback_report(query, &results, &confidence, &bundle)
            }
        };

        let report = normalize_report(report, &results, warnings);
        info!(risk = %report.final_risk_level, "Sequential run complete");
        Ok(report)
    }
}

/// Locally built stand-in when the synthesis provider fails. Conservative:
/// the most severe surviving judgment wins, so a degraded report never
/// understates risk.
fn fallback_report(
    query: &str,
    results: &[AnalysisResult],
    confidence: &ConfidenceMap,
    bundle: &ContextBundle,
) -> FinalReport {
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

    let rationale = results
        .iter()
        .map(|result| format!("[{}] {}", result.provider, result.reasoning))
        .collect::<Vec<_>>()
        .join("\n");

    FinalReport {
        query: query.to_string(),
        timestamp: Utc::now(),
        final_risk_level: final_risk,
        overall_confidence: overall.clamp(0.0, 1.0),
        strategic_rationale: rationale,
        action_plan: Vec::new(),
        agent_contributions: results.to_vec(),
        data_freshness_score: bundle.freshness.overall,
        warnings: Vec::new(),
    }
}

/// Enforce the report invariants regardless of what the synthesis provider
/// returned: scores in [0,1], a non-empty action plan, a non-empty
/// rationale, contributions attached, pipeline warnings appended.
fn normalize_report(
    mut report: FinalReport,
    results: &[AnalysisResult],
    mut warnings: Vec<String>,
) -> FinalReport {
    report.overall_confidence = report.overall_confidence.clamp(0.0, 1.0);
    report.data_freshness_score = report.data_freshness_score.clamp(0.0, 1.0);

    if report.agent_contributions.is_empty() {
        report.agent_contributions = results.to_vec();
    }

    if report.strategic_rationale.trim().is_empty() {
        report.strategic_rationale = results
            .iter()
            .map(|result| format!("[{}] {}", result.provider, result.reasoning))
            .collect::<Vec<_>>()
            .join("\n");
        warnings.push("synthesis returned no rationale; stage-1 reasoning substituted".to_string());
    } else if report.strategic_rationale.len() < MIN_RATIONALE_LEN {
        warnings.push(format!(
            "strategic rationale below expected length ({} chars)",
            report.strategic_rationale.len()
        ));
    }

    if report.action_plan.is_empty() {
        report.action_plan.push(ActionItem {
            priority: Priority::Medium,
            action: DEFAULT_ACTION.to_string(),
            rationale: "Synthesis supplied no action plan".to_string(),
        });
    }

    report.warnings.append(&mut warnings);
    report
}
