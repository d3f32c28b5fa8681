//! Routing property tests: invariants checked over generated inputs.
//!
//! Tests verify:
//! - Every score a decision carries stays within [0, 1]
//! - Adding complex indicators never lowers the coarse complexity score
//! - Learned weight sets always sum to 1.0 and respect their bounds
//! - Adaptive thresholds stay within their clamps under any correction stream
//! - Detection is order-independent: the same text yields the same domains
//! - More detected domains at confident scores never turn a multi-agent
//!   route back into a direct one

use chrono::Utc;
use std::sync::Arc;
use task_router::classifier::CoarseClassifier;
use task_router::config::{FeedbackConfig, RoutingConfig, ThresholdConfig};
use task_router::escalation::{decide, EscalationInputs, EscalationPolicy};
use task_router::learning::{
    adjust_thresholds, apply_outcomes, normalize_bounded, AdaptiveThresholds, DecisionRecord,
    OutcomeReport, WeightSet,
};
use task_router::signature::Tokens;
use task_router::{
    ConfidenceBreakdown, DomainAnalysis, DomainMatch, RouterConfig, RoutingAction, RoutingEngine,
    RoutingTarget, StaticSource,
};
use uuid::Uuid;

const SUBJECTS: &[&str] = &[
    "react component",
    "postgres query",
    "login bug",
    "kubernetes deployment",
    "unit tests",
    "readme",
    "memory leak",
    "auth tokens",
];

const VERBS: &[&str] = &["check", "fix", "build", "optimize", "design", "document"];

const QUALIFIERS: &[&str] = &[
    "",
    "for the whole platform",
    "and maybe the api",
    "with a comprehensive migration",
    "across the enterprise architecture",
];

fn corpus() -> Vec<String> {
    let mut texts = Vec::new();
    for verb in VERBS {
        for subject in SUBJECTS {
            for qualifier in QUALIFIERS {
                texts.push(format!("{verb} the {subject} {qualifier}").trim().to_string());
            }
        }
    }
    texts
}

fn test_config() -> RouterConfig {
    let mut config = RouterConfig::default();
    config.detector.max_wait_ms = 1_000;
    config
}

fn in_unit(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

// ── Property: decision scores stay in range ────────────────────────

#[tokio::test]
async fn prop_decision_scores_bounded() {
    let engine = RoutingEngine::builder(Arc::new(StaticSource::builtin()))
        .config(test_config())
        .build()
        .await
        .unwrap();

    for text in corpus() {
        let d = engine.classify_and_route(&text, None).await.unwrap();
        assert!(in_unit(d.confidence.total), "{text}: total {}", d.confidence.total);
        for c in d.confidence.components() {
            assert!(in_unit(c), "{text}: component {c}");
        }
        assert!(in_unit(d.classification.score), "{text}");
        assert!(in_unit(d.escalation_score), "{text}");
        assert!(!d.reason.is_empty(), "{text}");
        assert!(!d.fallback, "{text} fell back: {}", d.reason);
        if let RoutingTarget::Orchestration { domain_analysis, .. } = &d.target {
            assert_eq!(domain_analysis.domain_count(), d.domain_count, "{text}");
        }
    }
}

// ── Property: coarse score monotone in complex indicators ──────────

#[test]
fn prop_complex_indicators_never_lower_score() {
    let classifier = CoarseClassifier::default();
    let additions = ["architecture", "distributed", "overhaul", "redesign", "platform"];

    for base in ["refactor the billing module", "update api handlers", "rework caching"] {
        let mut text = base.to_string();
        let mut previous = classifier.classify(&Tokens::new(&text)).score;
        for word in additions {
            text.push(' ');
            text.push_str(word);
            let score = classifier.classify(&Tokens::new(&text)).score;
            assert!(score >= previous, "{text}: {score} < {previous}");
            previous = score;
        }
        assert!(previous > 0.6);
    }
}

// ── Property: bounded normalization sums to one ────────────────────

#[test]
fn prop_normalize_bounded_sums_to_one() {
    let mut seed = 0x9e37_79b9_u64;
    let mut next = || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        (seed % 10_000) as f64 / 1_000.0 - 2.0
    };

    for _ in 0..500 {
        let raw = [next(), next(), next(), next(), next()];
        let w = normalize_bounded(raw, 0.05, 0.7);
        let sum: f64 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "{raw:?} -> {w:?}");
        for v in w {
            assert!((0.05 - 1e-9..=0.7 + 1e-9).contains(&v), "{raw:?} -> {w:?}");
        }
    }
}

// ── Property: learning keeps weight sets valid ─────────────────────

fn report(i: usize) -> OutcomeReport {
    let action = match i % 3 {
        0 => RoutingAction::DirectAgentRouting,
        1 => RoutingAction::OrchestrationRouting,
        _ => RoutingAction::EscalateToOrganizer,
    };
    let corrected = match i % 5 {
        0 => Some(RoutingAction::EscalateToOrganizer),
        1 => Some(RoutingAction::DirectAgentRouting),
        _ => None,
    };
    let v = (i % 11) as f64 / 10.0;
    OutcomeReport {
        record: DecisionRecord {
            request_id: Uuid::new_v4(),
            similarity_key: "STANDARD|backend".into(),
            action,
            confidence: ConfidenceBreakdown {
                pattern_match: v,
                historical_success: 1.0 - v,
                context_completeness: 0.5,
                resource_availability: 1.0,
                total: 0.5 + v / 4.0,
            },
            complexity_score: v,
            refined: None,
            decided_at: Utc::now(),
        },
        success: i % 2 == 0,
        corrected_action: corrected,
        reported_at: Utc::now(),
    }
}

#[test]
fn prop_learning_preserves_weight_invariants() {
    let config = FeedbackConfig::default();
    let mut weights = WeightSet::default();

    for round in 0..50 {
        let batch: Vec<OutcomeReport> = (0..16).map(|i| report(round * 16 + i)).collect();
        weights = apply_outcomes(&weights, &batch, &config);

        assert!((weights.confidence.sum() - 1.0).abs() < 1e-9);
        assert!((weights.refined.sum() - 1.0).abs() < 1e-9);
        for w in weights.confidence.as_array() {
            assert!(w >= config.min_weight - 1e-9 && w <= config.max_weight + 1e-9);
        }
    }
    assert_eq!(weights.iteration, 50 * 16);
}

#[test]
fn prop_adaptive_thresholds_stay_clamped() {
    let actions = [
        RoutingAction::DirectAgentRouting,
        RoutingAction::OrchestrationRouting,
        RoutingAction::EscalateToOrganizer,
    ];
    let mut thresholds = AdaptiveThresholds::default();
    let (esc_lo, esc_hi) = AdaptiveThresholds::ESCALATION_BOUNDS;
    let (orc_lo, orc_hi) = AdaptiveThresholds::ORCHESTRATION_BOUNDS;

    for i in 0..1_000 {
        let decided = actions[i % 3];
        let corrected = actions[(i / 3) % 3];
        thresholds = adjust_thresholds(thresholds, decided, corrected, 0.05);
        assert!((esc_lo..=esc_hi).contains(&thresholds.escalation));
        assert!((orc_lo..=orc_hi).contains(&thresholds.orchestration_confidence));
    }
}

// ── Property: repeated detection is stable ─────────────────────────

#[tokio::test]
async fn prop_detection_stable_across_runs() {
    let engine = RoutingEngine::builder(Arc::new(StaticSource::builtin()))
        .config(test_config())
        .build()
        .await
        .unwrap();

    for text in corpus().into_iter().step_by(7) {
        let first = engine.classify_and_route(&text, None).await.unwrap();
        engine.flush_cache();
        let second = engine.classify_and_route(&text, None).await.unwrap();
        assert!(!second.cache_hit);
        assert_eq!(first.similarity_key, second.similarity_key, "{text}");
        assert_eq!(first.action, second.action, "{text}");
    }
}

// ── Property: more domains never demote to direct routing ──────────

const DOMAIN_IDS: &[&str] = &["backend", "frontend", "performance", "security", "devops"];

fn analysis_with(count: usize) -> DomainAnalysis {
    let matches: Vec<DomainMatch> = DOMAIN_IDS[..count]
        .iter()
        .map(|id| DomainMatch {
            domain: id.to_string(),
            confidence: 0.6,
            complexity_bias: 0.5,
        })
        .collect();
    DomainAnalysis {
        total_confidence: 0.6 * count as f64,
        complexity_adjustment: 0.5,
        matches,
        timed_out: false,
    }
}

fn confidence_at(total: f64) -> ConfidenceBreakdown {
    ConfidenceBreakdown {
        pattern_match: total,
        historical_success: 0.5,
        context_completeness: total,
        resource_availability: 1.0,
        total,
    }
}

#[test]
fn prop_growing_domain_set_never_returns_to_direct() {
    let thresholds = ThresholdConfig::default();
    let routing = RoutingConfig::default();
    let policy = EscalationPolicy {
        thresholds: &thresholds,
        adaptive: AdaptiveThresholds::default(),
        routing: &routing,
    };
    let classifier = CoarseClassifier::default();

    for text in corpus() {
        let tokens = Tokens::new(&text);
        let classification = classifier.classify(&tokens);

        for total in [0.61, 0.7, 0.8, 0.9, 1.0] {
            let confidence = confidence_at(total);
            let mut multi_agent = false;

            for count in 1..=DOMAIN_IDS.len() {
                let domains = analysis_with(count);
                let verdict = decide(
                    &EscalationInputs {
                        text: &text,
                        tokens: &tokens,
                        classification: &classification,
                        domains: &domains,
                        confidence: &confidence,
                        registry: None,
                    },
                    &policy,
                );
                let direct = verdict.action == RoutingAction::DirectAgentRouting;
                if count >= 2 {
                    assert!(!direct, "{text}: {count} domains at {total} routed direct");
                }
                assert!(
                    !(multi_agent && direct),
                    "{text}: {count} domains at {total} fell back to direct"
                );
                multi_agent |= !direct;
            }
        }
    }
}
