use std::collections::HashMap;

use tracing::warn;

use vigil_common::types::{
    AnalysisResult, ArbiterBriefing, ConflictSummary, ContradictionDetails, ContradictionEvent,
    RecommendedAction,
};

/// Identity of the synthesis provider; fallback arbiter when no rule names
/// one. Structurally unreachable as long as events only arise from rules.
pub const SYNTHESIS_PROVIDER: &str = "synthesis";

/// Two risk readings at least this far apart on the ordinal scale conflict
/// outright (e.g. low vs critical).
const ORDINAL_GAP_THRESHOLD: u8 = 3;

/// Opposed driver vocabulary. One member on each side of a pair, in either
/// order, marks the pair contradictory.
const ANTONYM_PAIRS: [(&str, &str); 6] = [
    ("bullish", "bearish"),
    ("rise", "fall"),
    ("growth", "decline"),
    ("positive", "negative"),
    ("buy", "sell"),
    ("crash", "rally"),
];

/// Decides whether two results genuinely disagree. Pluggable so structured
/// signals can replace substring matching without touching the orchestrator.
pub trait ContradictionPolicy: Send + Sync {
    fn is_contradictory(&self, a: &AnalysisResult, b: &AnalysisResult) -> bool;
}

/// Default policy: a wide risk-ordinal gap, or opposed vocabulary across the
/// two results' key-driver text.
pub struct RiskDivergencePolicy;

impl ContradictionPolicy for RiskDivergencePolicy {
    fn is_contradictory(&self, a: &AnalysisResult, b: &AnalysisResult) -> bool {
        let gap = a.risk_level.ordinal().abs_diff(b.risk_level.ordinal());
        if gap >= ORDINAL_GAP_THRESHOLD {
            return true;
        }

        let drivers_a = a.key_drivers.join(" ").to_lowercase();
        let drivers_b = b.key_drivers.join(" ").to_lowercase();
        ANTONYM_PAIRS.iter().any(|(first, second)| {
            (drivers_a.contains(first) && drivers_b.contains(second))
                || (drivers_a.contains(second) && drivers_b.contains(first))
        })
    }
}

/// Directed pairing of two provider identities with a designated arbiter.
#[derive(Debug, Clone)]
pub struct ContradictionRule {
    pub first: String,
    pub second: String,
    pub arbiter: String,
}

impl ContradictionRule {
    pub fn new(first: &str, second: &str, arbiter: &str) -> Self {
        Self {
            first: first.to_string(),
            second: second.to_string(),
            arbiter: arbiter.to_string(),
        }
    }
}

/// Circuit breaker over the stage-1 results: scans the rule table for
/// provider pairs in genuine disagreement and aggregates one event per pass.
/// Pure over the immutable result list.
pub struct ContradictionDetector {
    rules: Vec<ContradictionRule>,
    policy: Box<dyn ContradictionPolicy>,
}

impl ContradictionDetector {
    pub fn new() -> Self {
        Self::with_rules(Self::default_rules(), Box::new(RiskDivergencePolicy))
    }

    pub fn with_rules(rules: Vec<ContradictionRule>, policy: Box<dyn ContradictionPolicy>) -> Self {
        Self { rules, policy }
    }

    /// The stage-1 roster's standing rules. The anomaly-hunting risk
    /// provider vs the trend-following technical one is refereed by macro;
    /// macro vs sentiment is refereed by risk.
    pub fn default_rules() -> Vec<ContradictionRule> {
        vec![
            ContradictionRule::new("risk", "technical", "macro"),
            ContradictionRule::new("technical", "risk", "macro"),
            ContradictionRule::new("macro", "sentiment", "risk"),
            ContradictionRule::new("sentiment", "macro", "risk"),
        ]
    }

    /// Test every rule whose two identities are both present. Returns one
    /// aggregated event, or `None` when nothing conflicts or fewer than two
    /// results exist.
    pub fn check(&self, results: &[AnalysisResult]) -> Option<ContradictionEvent> {
        if results.len() < 2 {
            return None;
        }

        let by_provider: HashMap<&str, &AnalysisResult> = results
            .iter()
            .map(|result| (result.provider.as_str(), result))
            .collect();

        let mut matched: Vec<(&str, &str)> = Vec::new();
        let mut arbiter: Option<&str> = None;
        for rule in &self.rules {
            let (Some(a), Some(b)) = (
                by_provider.get(rule.first.as_str()),
                by_provider.get(rule.second.as_str()),
            ) else {
                continue;
            };
            if self.policy.is_contradictory(a, b) {
                matched.push((rule.first.as_str(), rule.second.as_str()));
                if arbiter.is_none() {
                    arbiter = Some(rule.arbiter.as_str());
                }
            }
        }

        if matched.is_empty() {
            return None;
        }

        let mut conflicting: Vec<String> = Vec::new();
        for (first, second) in &matched {
            for identity in [*first, *second] {
                if !conflicting.iter().any(|seen| seen == identity) {
                    conflicting.push(identity.to_string());
                }
            }
        }

        let event = ContradictionEvent {
            conflicting,
            arbiter: arbiter.unwrap_or(SYNTHESIS_PROVIDER).to_string(),
            action: RecommendedAction::ReweightAndReevaluate,
            details: ContradictionDetails {
                pair_count: matched.len(),
                pairs: matched
                    .iter()
                    .map(|(first, second)| format!("{first}_vs_{second}"))
                    .collect(),
            },
        };
        warn!(
            conflicting = ?event.conflicting,
            arbiter = %event.arbiter,
            "Contradiction detected between providers"
        );
        Some(event)
    }

    /// Package the conflicting results and an instruction for the arbiter.
    /// Advisory: building this does not alter pipeline flow.
    pub fn arbiter_briefing(
        &self,
        event: &ContradictionEvent,
        results: &[AnalysisResult],
    ) -> ArbiterBriefing {
        let conflicting: Vec<ConflictSummary> = results
            .iter()
            .filter(|result| event.conflicting.contains(&result.provider))
            .map(|result| ConflictSummary {
                provider: result.provider.clone(),
                risk_level: result.risk_level,
                confidence: result.confidence,
                key_drivers: result.key_drivers.clone(),
            })
            .collect();

        ArbiterBriefing {
            arbiter: event.arbiter.clone(),
            instruction: format!(
                "Re-evaluate the conflicting assessments from {} and issue a deciding judgment.",
                event.conflicting.join(", ")
            ),
            conflicting,
        }
    }
}

impl Default for ContradictionDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vigil_common::types::RiskLevel;

    use crate::testing::{analysis_result, AnalysisResultExt};

    #[test]
    fn fewer_than_two_results_never_conflict() {
        let detector = ContradictionDetector::new();
        assert!(detector.check(&[]).is_none());
        assert!(detector
            .check(&[analysis_result("risk", RiskLevel::Critical, 0.9)])
            .is_none());
    }

    #[test]
    fn wide_ordinal_gap_is_a_contradiction() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::Low, 0.9),
            analysis_result("technical", RiskLevel::Critical, 0.8),
        ];

        let event = detector.check(&results).expect("event");
        assert!(event.conflicting.contains(&"risk".to_string()));
        assert!(event.conflicting.contains(&"technical".to_string()));
        assert_eq!(event.conflicting.len(), 2);
        assert_eq!(event.arbiter, "macro");
    }

    #[test]
    fn opposed_drivers_conflict_regardless_of_risk() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("macro", RiskLevel::Medium, 0.7)
                .with_drivers(vec!["bullish momentum in equities"]),
            analysis_result("sentiment", RiskLevel::Medium, 0.7)
                .with_drivers(vec!["bearish retail positioning"]),
        ];

        let event = detector.check(&results).expect("event");
        assert_eq!(event.arbiter, "risk");
        assert_eq!(event.details.pair_count, 2); // both directed rules match
    }

    #[test]
    fn antonyms_match_in_either_order() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::Medium, 0.7)
                .with_drivers(vec!["imminent crash in credit"]),
            analysis_result("technical", RiskLevel::Medium, 0.7)
                .with_drivers(vec!["rally continuation likely"]),
        ];
        assert!(detector.check(&results).is_some());
    }

    #[test]
    fn adjacent_risk_levels_do_not_conflict() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::High, 0.9)
                .with_drivers(vec!["credit spreads widening"]),
            analysis_result("technical", RiskLevel::Medium, 0.8)
                .with_drivers(vec!["volume contraction"]),
        ];
        assert!(detector.check(&results).is_none());
    }

    #[test]
    fn unpaired_providers_are_ignored() {
        // No rule pairs risk with sentiment, so even a wide gap stays quiet.
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::Low, 0.9),
            analysis_result("sentiment", RiskLevel::Critical, 0.8),
        ];
        assert!(detector.check(&results).is_none());
    }

    #[test]
    fn conflicting_identities_are_deduplicated() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::Low, 0.9),
            analysis_result("technical", RiskLevel::Critical, 0.8),
        ];

        let event = detector.check(&results).expect("event");
        // Both directed rules match; identities appear once each.
        assert_eq!(event.details.pair_count, 2);
        assert_eq!(event.conflicting.len(), 2);
    }

    #[test]
    fn briefing_packages_only_conflicting_results() {
        let detector = ContradictionDetector::new();
        let results = vec![
            analysis_result("risk", RiskLevel::Low, 0.9),
            analysis_result("technical", RiskLevel::Critical, 0.8),
            analysis_result("sentiment", RiskLevel::Medium, 0.5),
        ];

        let event = detector.check(&results).expect("event");
        let briefing = detector.arbiter_briefing(&event, &results);
        assert_eq!(briefing.arbiter, "macro");
        assert_eq!(briefing.conflicting.len(), 2);
        assert!(briefing.instruction.contains("risk"));
        assert!(briefing.instruction.contains("technical"));
    }

    #[test]
    fn custom_policy_replaces_substring_matching() {
        struct AlwaysConflicts;
        impl ContradictionPolicy for AlwaysConflicts {
            fn is_contradictory(&self, _: &AnalysisResult, _: &AnalysisResult) -> bool {
                true
            }
        }

        let detector = ContradictionDetector::with_rules(
            vec![ContradictionRule::new("a", "b", "c")],
            Box::new(AlwaysConflicts),
        );
        let results = vec![
            analysis_result("a", RiskLevel::Medium, 0.5),
            analysis_result("b", RiskLevel::Medium, 0.5),
        ];
        let event = detector.check(&results).expect("event");
        assert_eq!(event.arbiter, "c");
    }
}
