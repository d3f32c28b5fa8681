//! Escalation Decision Engine
//!
//! A pure function of the request analysis and the current thresholds:
//!
//! ```text
//! score = 0.4·(1 − confidence) + 0.3·complexity + 0.2·(domains / 5) + 0.1·ambiguous
//!       + enterprise bonus + architectural bonus            (capped at 1.0)
//!
//! score > escalation  OR enterprise scope      → ESCALATE_TO_ORGANIZER
//! domains ≥ min  AND  confidence > orch conf   → ORCHESTRATION_ROUTING
//! otherwise                                    → DIRECT_AGENT_ROUTING
//! ```
//!
//! Every trigger is evaluated and recorded whichever branch is taken.

use crate::classifier::coarse::estimate_minutes;
use crate::classifier::ClassificationResult;
use crate::confidence::ConfidenceBreakdown;
use crate::config::{RoutingConfig, ThresholdConfig};
use crate::decision::{RoutingAction, RoutingTarget};
use crate::detector::DomainAnalysis;
use crate::learning::AdaptiveThresholds;
use crate::registry::{RegistrySnapshot, WorkerProfile, WorkerRef};
use crate::signature::Tokens;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const SCALE_INDICATORS: &[&str] = &[
    "enterprise",
    "large-scale",
    "system-wide",
    "comprehensive",
    "platform",
    "organization",
    "company-wide",
    "organization-wide",
];

const STRATEGIC_INDICATORS: &[&str] = &[
    "strategy",
    "roadmap",
    "architecture",
    "modernization",
    "transformation",
    "migration",
    "overhaul",
];

const COORDINATION_INDICATORS: &[&str] = &[
    "coordinate",
    "orchestrate",
    "manage",
    "govern",
    "standardize",
    "centralize",
];

const DESIGN_WORDS: &[&str] = &["architecture", "design", "pattern", "framework", "structure"];

const SYSTEM_DESIGN_WORDS: &[&str] = &[
    "scalability",
    "performance",
    "reliability",
    "availability",
    "consistency",
    "partition",
    "distributed",
    "microservice",
    "microservices",
];

const DECISION_WORDS: &[&str] = &[
    "choose",
    "select",
    "decide",
    "recommend",
    "evaluate",
    "compare",
    "assess",
    "analyze",
];

/// More than this many hedging matches marks the requirements ambiguous.
const AMBIGUITY_LIMIT: usize = 2;

static AMBIGUITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(maybe|perhaps|might|could|should)\b",
        r"(?i)\b(not sure|unclear|vague|ambiguous)\b",
        r"\?.*\?",
        r"(?i)\b(what|how|which|where|when|why)\b.*\b(what|how|which|where|when|why)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    LowConfidence,
    HighComplexity,
    MultiDomain,
    EnterpriseScope,
    ArchitecturalDecisions,
    AmbiguousRequirements,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::HighComplexity => write!(f, "high_complexity"),
            Self::MultiDomain => write!(f, "multi_domain"),
            Self::EnterpriseScope => write!(f, "enterprise_scope"),
            Self::ArchitecturalDecisions => write!(f, "architectural_decisions"),
            Self::AmbiguousRequirements => write!(f, "ambiguous_requirements"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSet {
    pub low_confidence: bool,
    pub high_complexity: bool,
    pub multi_domain: bool,
    pub enterprise_scope: bool,
    pub architectural_decisions: bool,
    pub ambiguous_requirements: bool,
}

impl TriggerSet {
    pub fn fired(&self) -> Vec<Trigger> {
        [
            (self.low_confidence, Trigger::LowConfidence),
            (self.high_complexity, Trigger::HighComplexity),
            (self.multi_domain, Trigger::MultiDomain),
            (self.enterprise_scope, Trigger::EnterpriseScope),
            (self.architectural_decisions, Trigger::ArchitecturalDecisions),
            (self.ambiguous_requirements, Trigger::AmbiguousRequirements),
        ]
        .into_iter()
        .filter_map(|(on, trigger)| on.then_some(trigger))
        .collect()
    }

    fn describe(&self) -> String {
        let mut reasons = Vec::new();
        if self.enterprise_scope {
            reasons.push("enterprise-scale requirements");
        }
        if self.architectural_decisions {
            reasons.push("architectural decisions");
        }
        if self.high_complexity {
            reasons.push("high complexity requiring a strategic approach");
        }
        if self.multi_domain {
            reasons.push("multi-domain coordination");
        }
        if self.low_confidence {
            reasons.push("low confidence in automated routing");
        }
        if self.ambiguous_requirements {
            reasons.push("ambiguous requirements needing clarification");
        }
        if reasons.is_empty() {
            "escalation score above threshold".to_string()
        } else {
            reasons.join(", ")
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategicRequirements {
    pub enterprise_coordination: bool,
    pub architectural_design: bool,
    pub multi_domain_expertise: bool,
    pub complexity_management: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceEstimate {
    pub estimated_minutes: u32,
    pub estimated_tokens: u32,
    pub parallel_processing: bool,
    pub specialized_workers: bool,
}

/// Context handed to the organizer on escalation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationPackage {
    pub original_text: String,
    pub classification: ClassificationResult,
    pub domain_analysis: DomainAnalysis,
    pub confidence: ConfidenceBreakdown,
    pub triggers: Vec<Trigger>,
    pub escalation_score: f64,
    pub escalation_reason: String,
    pub available_workers: Vec<WorkerRef>,
    pub strategic_requirements: StrategicRequirements,
    pub performance_estimate: PerformanceEstimate,
}

/// Everything about the request the decision reads.
#[derive(Debug, Clone, Copy)]
pub struct EscalationInputs<'a> {
    pub text: &'a str,
    pub tokens: &'a Tokens,
    pub classification: &'a ClassificationResult,
    pub domains: &'a DomainAnalysis,
    pub confidence: &'a ConfidenceBreakdown,
    pub registry: Option<&'a RegistrySnapshot>,
}

/// Thresholds and routing targets in force for one decision.
#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy<'a> {
    pub thresholds: &'a ThresholdConfig,
    pub adaptive: AdaptiveThresholds,
    pub routing: &'a RoutingConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub action: RoutingAction,
    pub target: RoutingTarget,
    pub reason: String,
    pub triggers: Vec<Trigger>,
    pub escalation_score: f64,
}

/// Any scale indicator, or at least two strategic/coordination indicators.
pub fn enterprise_scope(tokens: &Tokens) -> bool {
    tokens.count_hits(SCALE_INDICATORS) > 0
        || tokens.count_hits(STRATEGIC_INDICATORS) + tokens.count_hits(COORDINATION_INDICATORS) >= 2
}

pub fn architectural_decisions(tokens: &Tokens) -> bool {
    let design = tokens.count_hits(DESIGN_WORDS);
    let system = tokens.count_hits(SYSTEM_DESIGN_WORDS);
    let decisions = tokens.count_hits(DECISION_WORDS);
    (design > 0 && system > 0) || decisions > 1
}

/// Total hedging-pattern matches over the raw text.
pub fn ambiguity_score(text: &str) -> usize {
    AMBIGUITY_PATTERNS
        .iter()
        .map(|re| re.find_iter(text).count())
        .sum()
}

pub fn evaluate_triggers(inputs: &EscalationInputs<'_>, thresholds: &ThresholdConfig) -> TriggerSet {
    TriggerSet {
        low_confidence: inputs.confidence.total < thresholds.low_confidence,
        high_complexity: inputs.classification.score > thresholds.high_complexity,
        multi_domain: inputs.domains.domain_count() > thresholds.multi_domain_count,
        enterprise_scope: enterprise_scope(inputs.tokens),
        architectural_decisions: architectural_decisions(inputs.tokens),
        ambiguous_requirements: ambiguity_score(inputs.text) > AMBIGUITY_LIMIT,
    }
}

pub fn escalation_score(
    inputs: &EscalationInputs<'_>,
    triggers: &TriggerSet,
    thresholds: &ThresholdConfig,
) -> f64 {
    let ambiguous = if triggers.ambiguous_requirements { 1.0 } else { 0.0 };
    let mut score = 0.4 * (1.0 - inputs.confidence.total)
        + 0.3 * inputs.classification.score
        + 0.2 * (inputs.domains.domain_count() as f64 / 5.0)
        + 0.1 * ambiguous;
    if triggers.enterprise_scope {
        score += thresholds.enterprise_bonus;
    }
    if triggers.architectural_decisions {
        score += thresholds.architectural_bonus;
    }
    score.clamp(0.0, 1.0)
}

/// Best direct worker for the primary domain, or the configured default.
pub fn select_worker(
    inputs: &EscalationInputs<'_>,
    routing: &RoutingConfig,
) -> (WorkerRef, String) {
    let default = || WorkerRef::new(routing.default_worker.clone());

    let (Some(primary), Some(snapshot)) = (inputs.domains.primary(), inputs.registry) else {
        return (default(), "no specialist domain detected".to_string());
    };

    let complexity = inputs.classification.score;
    let best = snapshot
        .lookup(&primary.domain)
        .iter()
        .filter_map(|w| snapshot.profile(w))
        .min_by(|a, b| rank(a, inputs.tokens, complexity).total_cmp_with(&rank(b, inputs.tokens, complexity)))
        .map(WorkerProfile::worker_ref);

    match best {
        Some(worker) => (worker, format!("single-domain task for {}", primary.domain)),
        None => (default(), format!("no worker registered for {}", primary.domain)),
    }
}

/// Sort key: more pattern hits first, then closer complexity fit, then id.
struct Rank<'a> {
    hits: usize,
    distance: f64,
    id: &'a str,
}

impl Rank<'_> {
    fn total_cmp_with(&self, other: &Rank<'_>) -> std::cmp::Ordering {
        other
            .hits
            .cmp(&self.hits)
            .then_with(|| self.distance.total_cmp(&other.distance))
            .then_with(|| self.id.cmp(other.id))
    }
}

fn rank<'a>(profile: &'a WorkerProfile, tokens: &Tokens, complexity: f64) -> Rank<'a> {
    Rank {
        hits: tokens.count_owned_hits(&profile.patterns),
        distance: (profile.complexity_affinity - complexity).abs(),
        id: &profile.id,
    }
}

fn orchestration_entry_point(
    inputs: &EscalationInputs<'_>,
    policy: &EscalationPolicy<'_>,
) -> String {
    let advanced = inputs.domains.domain_count() >= policy.thresholds.advanced_orchestration_domains
        || inputs.classification.score > policy.thresholds.high_complexity;
    if advanced {
        policy.routing.advanced_orchestration_entry_point.clone()
    } else {
        policy.routing.orchestration_entry_point.clone()
    }
}

fn build_package(
    inputs: &EscalationInputs<'_>,
    triggers: &TriggerSet,
    score: f64,
) -> EscalationPackage {
    let complexity = inputs.classification.score;
    EscalationPackage {
        original_text: inputs.text.to_string(),
        classification: inputs.classification.clone(),
        domain_analysis: inputs.domains.clone(),
        confidence: *inputs.confidence,
        triggers: triggers.fired(),
        escalation_score: score,
        escalation_reason: triggers.describe(),
        available_workers: inputs
            .registry
            .map(|s| s.workers().map(WorkerProfile::worker_ref).collect())
            .unwrap_or_default(),
        strategic_requirements: StrategicRequirements {
            enterprise_coordination: triggers.enterprise_scope,
            architectural_design: triggers.architectural_decisions,
            multi_domain_expertise: triggers.multi_domain,
            complexity_management: triggers.high_complexity,
        },
        performance_estimate: PerformanceEstimate {
            estimated_minutes: estimate_minutes(
                inputs.classification.tier,
                inputs.domains.domain_count(),
            ),
            estimated_tokens: inputs.classification.estimated_tokens,
            parallel_processing: complexity > 0.7,
            specialized_workers: complexity > 0.6,
        },
    }
}

/// Decide escalate, orchestrate or route directly.
pub fn decide(inputs: &EscalationInputs<'_>, policy: &EscalationPolicy<'_>) -> Verdict {
    let triggers = evaluate_triggers(inputs, policy.thresholds);
    let score = escalation_score(inputs, &triggers, policy.thresholds);
    let total = inputs.confidence.total;
    let domains = inputs.domains.domain_count();

    if score > policy.adaptive.escalation || triggers.enterprise_scope {
        let package = build_package(inputs, &triggers, score);
        return Verdict {
            action: RoutingAction::EscalateToOrganizer,
            reason: format!("strategic analysis required: {}", package.escalation_reason),
            target: RoutingTarget::Escalation {
                package: Box::new(package),
            },
            triggers: triggers.fired(),
            escalation_score: score,
        };
    }

    if domains >= policy.thresholds.orchestration_min_domains
        && total > policy.adaptive.orchestration_confidence
    {
        let entry_point = orchestration_entry_point(inputs, policy);
        return Verdict {
            action: RoutingAction::OrchestrationRouting,
            reason: format!(
                "multi-agent coordination across {domains} domains (confidence {total:.2})"
            ),
            target: RoutingTarget::Orchestration {
                entry_point,
                domain_analysis: inputs.domains.clone(),
            },
            triggers: triggers.fired(),
            escalation_score: score,
        };
    }

    let (worker, why) = select_worker(inputs, policy.routing);
    Verdict {
        action: RoutingAction::DirectAgentRouting,
        reason: format!("single worker capable: {why}"),
        target: RoutingTarget::Worker { worker },
        triggers: triggers.fired(),
        escalation_score: score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Tier;
    use crate::detector::DomainMatch;
    use crate::registry::catalog::{builtin_domains, builtin_workers};

    fn classification(tier: Tier, score: f64) -> ClassificationResult {
        ClassificationResult {
            tier,
            score,
            coarse_tier: tier,
            ..ClassificationResult::neutral()
        }
    }

    fn analysis(domains: &[(&str, f64)]) -> DomainAnalysis {
        DomainAnalysis {
            matches: domains
                .iter()
                .map(|(d, c)| DomainMatch {
                    domain: d.to_string(),
                    confidence: *c,
                    complexity_bias: 0.7,
                })
                .collect(),
            total_confidence: domains.iter().map(|(_, c)| c).sum(),
            complexity_adjustment: 0.7,
            timed_out: false,
        }
    }

    fn confidence(total: f64) -> ConfidenceBreakdown {
        ConfidenceBreakdown {
            total,
            ..ConfidenceBreakdown::neutral()
        }
    }

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::build(builtin_workers(), builtin_domains(), 1).unwrap()
    }

    struct Case {
        text: &'static str,
        tokens: Tokens,
        classification: ClassificationResult,
        domains: DomainAnalysis,
        confidence: ConfidenceBreakdown,
    }

    impl Case {
        fn new(text: &'static str, c: ClassificationResult, d: DomainAnalysis, total: f64) -> Self {
            Self {
                text,
                tokens: Tokens::new(text),
                classification: c,
                domains: d,
                confidence: confidence(total),
            }
        }

        fn decide(&self, registry: Option<&RegistrySnapshot>) -> Verdict {
            let thresholds = ThresholdConfig::default();
            let routing = RoutingConfig::default();
            let inputs = EscalationInputs {
                text: self.text,
                tokens: &self.tokens,
                classification: &self.classification,
                domains: &self.domains,
                confidence: &self.confidence,
                registry,
            };
            decide(
                &inputs,
                &EscalationPolicy {
                    thresholds: &thresholds,
                    adaptive: AdaptiveThresholds::from_config(&thresholds),
                    routing: &routing,
                },
            )
        }
    }

    #[test]
    fn test_enterprise_scope_escalates_regardless_of_score() {
        let case = Case::new(
            "comprehensive enterprise-wide microservices migration architecture",
            classification(Tier::Complex, 1.0),
            analysis(&[("backend", 0.6)]),
            0.7,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::EscalateToOrganizer);
        assert!(verdict.triggers.contains(&Trigger::EnterpriseScope));
        assert!(verdict.triggers.contains(&Trigger::ArchitecturalDecisions));
        assert!(verdict.escalation_score > 0.7);
        match verdict.target {
            RoutingTarget::Escalation { package } => {
                assert!(package.strategic_requirements.enterprise_coordination);
                assert!(package.performance_estimate.parallel_processing);
                assert_eq!(package.available_workers.len(), builtin_workers().len());
            }
            other => panic!("expected escalation target, got {other:?}"),
        }
    }

    #[test]
    fn test_multi_domain_confident_orchestrates() {
        let case = Case::new(
            "Build a react component and postgres query optimization",
            classification(Tier::Standard, 0.5),
            analysis(&[("frontend", 0.75), ("backend", 0.6), ("performance", 0.45)]),
            0.75,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::OrchestrationRouting);
        assert_eq!(verdict.target.label(), "orchestrate-agents");
        // 0.4·0.25 + 0.3·0.5 + 0.2·0.6
        assert!((verdict.escalation_score - 0.37).abs() < 1e-9);
    }

    #[test]
    fn test_four_domains_use_advanced_orchestration() {
        let case = Case::new(
            "react api docker tests",
            classification(Tier::Standard, 0.5),
            analysis(&[("frontend", 0.6), ("backend", 0.6), ("infrastructure", 0.6), ("testing", 0.6)]),
            0.8,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::OrchestrationRouting);
        assert_eq!(verdict.target.label(), "orchestrate-agents-adv");
        assert!(verdict.triggers.contains(&Trigger::MultiDomain));
    }

    #[test]
    fn test_low_confidence_multi_domain_routes_direct() {
        let case = Case::new(
            "react form and api endpoint",
            classification(Tier::Standard, 0.5),
            analysis(&[("frontend", 0.6), ("backend", 0.6)]),
            0.55,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::DirectAgentRouting);
        assert_eq!(verdict.target.label(), "build-frontend");
    }

    #[test]
    fn test_no_domain_routes_to_default_worker() {
        let case = Case::new(
            "check config file status",
            classification(Tier::Simple, 0.2),
            DomainAnalysis::empty(),
            0.75,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::DirectAgentRouting);
        assert_eq!(verdict.target.label(), "general-purpose");
        assert!(verdict.triggers.is_empty());
        assert!(!verdict.reason.is_empty());
    }

    #[test]
    fn test_worker_rank_prefers_pattern_hits_then_affinity() {
        let case = Case::new(
            "fix slow latency in the api",
            classification(Tier::Standard, 0.5),
            analysis(&[("backend", 0.6)]),
            0.7,
        );
        let verdict = case.decide(Some(&snapshot()));
        // performance-engineer has two pattern hits, build-backend one
        assert_eq!(verdict.target.label(), "performance-engineer");

        let case = Case::new(
            "an unrelated backend request",
            classification(Tier::Standard, 0.6),
            analysis(&[("backend", 0.6)]),
            0.7,
        );
        // no hits anywhere: build-backend affinity 0.6 is closest to 0.6
        assert_eq!(case.decide(Some(&snapshot())).target.label(), "build-backend");
    }

    #[test]
    fn test_missing_registry_falls_back_to_default_worker() {
        let case = Case::new(
            "react form",
            classification(Tier::Simple, 0.3),
            analysis(&[("frontend", 0.6)]),
            0.7,
        );
        assert_eq!(case.decide(None).target.label(), "general-purpose");
    }

    #[test]
    fn test_ambiguity_needs_more_than_two_hits() {
        assert_eq!(ambiguity_score("add a login button"), 0);
        assert!(ambiguity_score("maybe we should do this? or perhaps that?") > AMBIGUITY_LIMIT);
    }

    #[test]
    fn test_enterprise_signal() {
        assert!(enterprise_scope(&Tokens::new("roll out across the enterprise")));
        assert!(enterprise_scope(&Tokens::new("migration roadmap for billing")));
        assert!(!enterprise_scope(&Tokens::new("add a postgres migration")));
    }

    #[test]
    fn test_architectural_signal() {
        assert!(architectural_decisions(&Tokens::new("design for scalability")));
        assert!(architectural_decisions(&Tokens::new("compare and evaluate options")));
        assert!(!architectural_decisions(&Tokens::new("design a button")));
    }

    #[test]
    fn test_triggers_recorded_on_every_branch() {
        let case = Case::new(
            "react form",
            classification(Tier::Simple, 0.2),
            analysis(&[("frontend", 0.6)]),
            0.3,
        );
        let verdict = case.decide(Some(&snapshot()));
        assert_eq!(verdict.action, RoutingAction::DirectAgentRouting);
        assert_eq!(verdict.triggers, vec![Trigger::LowConfidence]);
    }

    #[test]
    fn test_score_capped_at_one() {
        let case = Case::new(
            "enterprise architecture for scalability? maybe? should we? perhaps?",
            classification(Tier::Complex, 1.0),
            analysis(&[("backend", 0.6), ("frontend", 0.6), ("security", 0.6), ("testing", 0.6), ("performance", 0.6)]),
            0.0,
        );
        assert_eq!(case.decide(None).escalation_score, 1.0);
    }
}
