//! Routing engine: the request path and the public surface.
//!
//! ```text
//! classify_and_route(text, hints)
//!   │ validate ───────────────────────────────► Err(input error)
//!   │ cache L2 ──hit──────────────────────────► cached decision
//!   │ breaker.try_acquire ──rejected──────────► fallback decision
//!   │ coarse (or L3)
//!   │ join!(domain detection (or L1), text factors)
//!   │ refine (STANDARD only)
//!   │ confidence
//!   │ escalation
//!   └ cache L1/L2/L3 (unless detection timed out), ledger, monitor ──► decision
//!
//! any pipeline error ──► breaker.record_failure ──► fallback decision
//! ```

use crate::cache::{CacheStats, CachedResult, CachedValue, InvalidationReason, PatternCache};
use crate::circuit_breaker::{Admission, BreakerSnapshot, CircuitBreaker};
use crate::classifier::{ClassificationResult, CoarseClassifier, RefinedScorer, Tier};
use crate::confidence::{ConfidenceBreakdown, ConfidenceEngine, ConfidenceInputs};
use crate::config::{ConfigCell, LatencyBudgets, RouterConfig};
use crate::decision::{RoutingAction, RoutingDecision, RoutingTarget};
use crate::detector::{DomainAnalysis, DomainDetector};
use crate::error::{RoutingError, RoutingResult};
use crate::escalation::{self, EscalationInputs, EscalationPolicy};
use crate::learning::feedback::{self, FeedbackLoop, FeedbackSender, OutcomeReport};
use crate::learning::{similarity_key, DecisionLedger, DecisionRecord, OutcomeHistory, WeightSet, WeightStore};
use crate::monitor::{RoutingMonitor, RoutingStats};
use crate::otel::{self, Stage};
use crate::registry::{AlwaysAvailable, AvailabilityProbe, CapabilityRegistry, CapabilitySource};
use crate::signature::{TaskSignature, Tokens};
use crate::task::{StructuredHints, TaskDescription};
use crate::validation::TaskValidator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Point-in-time view of the engine for dashboards and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub routing: RoutingStats,
    pub cache: CacheStats,
    pub breaker: BreakerSnapshot,
    pub weights: WeightSet,
    pub registry_generation: u64,
    pub registry_loaded: bool,
}

pub struct EngineBuilder {
    source: Arc<dyn CapabilitySource>,
    probe: Arc<dyn AvailabilityProbe>,
    config: RouterConfig,
}

impl EngineBuilder {
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn probe(mut self, probe: Arc<dyn AvailabilityProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Validate the config, load the registry once and start the feedback
    /// loop. A failed initial load is logged; requests then run with
    /// degraded confidence until a refresh succeeds.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> RoutingResult<RoutingEngine> {
        self.config.validate()?;

        let registry = Arc::new(CapabilityRegistry::new(self.source));
        if !registry.refresh().await {
            warn!("Starting with an unloaded capability registry");
        }

        let cache = Arc::new(PatternCache::new(&self.config.cache));
        let weights = Arc::new(WeightStore::new(WeightSet::from_config(&self.config.thresholds)));
        let history = Arc::new(OutcomeHistory::new(
            self.config.feedback.history_window,
            Duration::from_secs(self.config.feedback.history_max_age_secs),
        ));
        let ledger = DecisionLedger::new(self.config.feedback.ledger_capacity);
        let breaker = CircuitBreaker::new(self.config.circuit_breaker);
        let confidence = ConfidenceEngine::new(registry.clone(), self.probe, history.clone());

        let (sender, rx) = feedback::channel(self.config.feedback.channel_capacity);
        let config = Arc::new(ConfigCell::new(self.config));
        let feedback_task =
            FeedbackLoop::new(weights.clone(), history.clone(), cache.clone(), config.clone())
                .spawn(rx);

        info!(
            registry_loaded = registry.is_loaded(),
            generation = registry.generation(),
            "Routing engine ready"
        );

        Ok(RoutingEngine {
            config,
            registry,
            cache,
            weights,
            history,
            ledger,
            breaker,
            confidence,
            monitor: RoutingMonitor::new(),
            feedback: sender,
            feedback_task,
        })
    }
}

pub struct RoutingEngine {
    config: Arc<ConfigCell>,
    registry: Arc<CapabilityRegistry>,
    cache: Arc<PatternCache>,
    weights: Arc<WeightStore>,
    history: Arc<OutcomeHistory>,
    ledger: DecisionLedger,
    breaker: CircuitBreaker,
    confidence: ConfidenceEngine,
    monitor: RoutingMonitor,
    feedback: FeedbackSender,
    feedback_task: JoinHandle<()>,
}

impl RoutingEngine {
    pub fn builder(source: Arc<dyn CapabilitySource>) -> EngineBuilder {
        EngineBuilder {
            source,
            probe: Arc::new(AlwaysAvailable),
            config: RouterConfig::default(),
        }
    }

    /// Classify a task and decide where it goes.
    ///
    /// Only input errors are returned; every other failure degrades to the
    /// fallback decision.
    pub async fn classify_and_route(
        &self,
        text: &str,
        hints: Option<StructuredHints>,
    ) -> RoutingResult<RoutingDecision> {
        let started = Instant::now();
        let request_id = Uuid::new_v4();
        let span = otel::classify_span(&request_id.to_string(), text.len());

        async {
            let config = self.config.load();

            let cleaned = match TaskValidator::new(config.routing.max_task_chars).check(text) {
                Ok(cleaned) => cleaned,
                Err(e) => {
                    self.monitor.record_input_rejection();
                    debug!("Task rejected: {e}");
                    return Err(e);
                }
            };

            let task = TaskDescription {
                text: cleaned,
                hints,
            };
            let signature = TaskSignature::compute(&task);
            let mut cached = self.cache.get(&signature).unwrap_or_default();

            // Cache hits are served ahead of the breaker and never count as
            // pipeline outcomes.
            let mut decision = if let Some(mut hit) = cached.decision.take() {
                debug!(key = %signature.key, "Routing cache hit");
                hit.request_id = request_id;
                hit.cache_hit = true;
                hit.decided_at = Utc::now();
                hit
            } else {
                match self.breaker.try_acquire() {
                    Admission::Rejected { state, last_error } => {
                        let reason = format!(
                            "circuit breaker {state}; last error: {}",
                            last_error.as_deref().unwrap_or("none recorded")
                        );
                        fallback_decision(request_id, reason, &config)
                    }
                    Admission::Allowed => {
                        match self
                            .run_pipeline(request_id, &task, &signature, cached, &config)
                            .await
                        {
                            Ok(decision) => {
                                self.breaker.record_success();
                                decision
                            }
                            Err(e) => {
                                self.breaker.record_failure(&e.to_string());
                                self.monitor.record_pipeline_failure();
                                let stage = e
                                    .stage()
                                    .map(|s| s.to_string())
                                    .unwrap_or_else(|| "pipeline".to_string());
                                warn!(%stage, "Routing pipeline failed, returning fallback: {e}");
                                fallback_decision(
                                    request_id,
                                    format!("{stage} failure, fallback routing: {e}"),
                                    &config,
                                )
                            }
                        }
                    }
                }
            };

            let elapsed = started.elapsed();
            decision.elapsed_ms = elapsed.as_millis() as u64;
            self.check_budget(&config.latency, &decision, elapsed);
            self.finish(&decision, elapsed);
            Ok(decision)
        }
        .instrument(span)
        .await
    }

    /// Coarse classification through escalation, reusing L1/L3 hits.
    async fn run_pipeline(
        &self,
        request_id: Uuid,
        task: &TaskDescription,
        signature: &TaskSignature,
        cached: CachedResult,
        config: &RouterConfig,
    ) -> RoutingResult<RoutingDecision> {
        let weights = self.weights.snapshot()?;
        let tokens = Arc::new(Tokens::new(&task.text));
        let thresholds = &config.thresholds;

        let cached_classification = cached.classification;
        let classification = match &cached_classification {
            Some(hit) => hit.clone(),
            None => otel::stage_span(Stage::Coarse).in_scope(|| {
                CoarseClassifier::new(thresholds.coarse_simple, thresholds.coarse_complex)
                    .classify(&tokens)
            }),
        };

        let signatures = self.registry.signatures();
        let detector = DomainDetector::new(thresholds.activation, config.detector.max_wait());
        let cached_domains = cached.domains;
        let detect = async {
            match &cached_domains {
                Some(hit) => Ok(hit.clone()),
                None => {
                    detector
                        .detect(&signatures, Arc::clone(&tokens), task.hints.as_ref())
                        .instrument(otel::stage_span(Stage::Detect))
                        .await
                }
            }
        };
        let text_factors = async {
            RefinedScorer::text_factors(&tokens, classification.estimated_tokens)
        };
        let (domains, text_factors) = tokio::join!(detect, text_factors);
        let domains = domains?;
        if domains.timed_out {
            self.monitor.record_detector_timeout();
        }

        let key = similarity_key(classification.coarse_tier, domains.domain_ids());

        let classification = if cached_classification.is_none() && classification.tier == Tier::Standard {
            let _guard = otel::stage_span(Stage::Refine).entered();
            let factors = RefinedScorer::factors(
                text_factors,
                domains.domain_count(),
                self.history.failure_rate(&key),
            );
            RefinedScorer::new(thresholds.refined_simple, thresholds.refined_complex).refine(
                &classification,
                factors,
                &weights.refined,
            )?
        } else {
            classification
        };

        let confidence = self
            .confidence
            .assess(
                ConfidenceInputs {
                    tokens: &tokens,
                    domains: &domains,
                    hints: task.hints.as_ref(),
                    similarity_key: &key,
                },
                &weights.confidence,
            )
            .instrument(otel::stage_span(Stage::Confidence))
            .await?;

        let snapshot = self.registry.snapshot().ok();
        let verdict = otel::stage_span(Stage::Escalation).in_scope(|| {
            escalation::decide(
                &EscalationInputs {
                    text: &task.text,
                    tokens: &tokens,
                    classification: &classification,
                    domains: &domains,
                    confidence: &confidence,
                    registry: snapshot.as_deref(),
                },
                &EscalationPolicy {
                    thresholds,
                    adaptive: weights.thresholds,
                    routing: &config.routing,
                },
            )
        });

        let decision = RoutingDecision {
            request_id,
            action: verdict.action,
            target: verdict.target,
            confidence,
            reason: verdict.reason,
            triggers: verdict.triggers,
            escalation_score: verdict.escalation_score,
            classification: classification.clone(),
            domain_count: domains.domain_count(),
            similarity_key: key,
            cache_hit: false,
            fallback: false,
            elapsed_ms: 0,
            decided_at: Utc::now(),
        };

        // A partial detection degrades this request only.
        if !domains.timed_out {
            if cached_domains.is_none() {
                self.cache.put(signature, CachedValue::Domains(domains));
            }
            if cached_classification.is_none() {
                self.cache
                    .put(signature, CachedValue::Classification(classification));
            }
            self.cache
                .put(signature, CachedValue::Decision(Box::new(decision.clone())));
        }

        Ok(decision)
    }

    fn check_budget(&self, budgets: &LatencyBudgets, decision: &RoutingDecision, elapsed: Duration) {
        let budget_ms = match decision.classification.tier.family() {
            Tier::Simple => budgets.simple_ms,
            Tier::Complex => budgets.complex_ms,
            _ => budgets.standard_ms,
        };
        if elapsed > Duration::from_millis(budget_ms) {
            self.monitor.record_budget_overrun();
            warn!(
                tier = %decision.classification.tier,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms,
                "Routing exceeded latency budget"
            );
        }
    }

    fn finish(&self, decision: &RoutingDecision, elapsed: Duration) {
        // Fallbacks carry no real classification to learn from.
        if !decision.fallback {
            self.ledger.insert(DecisionRecord {
                request_id: decision.request_id,
                similarity_key: decision.similarity_key.clone(),
                action: decision.action,
                confidence: decision.confidence,
                complexity_score: decision.classification.score,
                refined: decision.classification.refined,
                decided_at: decision.decided_at,
            });
        }
        self.monitor
            .record_decision(decision, elapsed.as_micros() as u64);

        let span = tracing::Span::current();
        otel::record_decision(
            &span,
            &decision.action.to_string(),
            decision.confidence.total,
            decision.cache_hit,
            decision.domain_count,
        );
        otel::record_duration(&span, decision.elapsed_ms);
        info!(
            action = %decision.action,
            target = decision.target.label(),
            tier = %decision.classification.tier,
            confidence = decision.confidence.total,
            cache_hit = decision.cache_hit,
            fallback = decision.fallback,
            "Task routed"
        );
    }

    /// Queue the outcome of a past decision for learning.
    pub async fn report_outcome(
        &self,
        request_id: Uuid,
        success: bool,
        corrected_action: Option<RoutingAction>,
    ) -> RoutingResult<()> {
        let record = self
            .ledger
            .take(&request_id)
            .ok_or(RoutingError::UnknownRequest(request_id))?;
        self.feedback
            .send(OutcomeReport {
                record,
                success,
                corrected_action,
                reported_at: Utc::now(),
            })
            .await
    }

    /// Wait until every reported outcome has been applied.
    pub async fn flush_feedback(&self) -> RoutingResult<()> {
        self.feedback.flush().await
    }

    /// Reload the registry; registry-dependent cache tiers are cleared on success.
    pub async fn refresh_registry(&self) -> bool {
        let refreshed = self.registry.refresh().await;
        if refreshed {
            self.cache.invalidate(InvalidationReason::RegistryRefresh);
        }
        refreshed
    }

    /// Validate and swap in a new config. The old one stays on error.
    pub fn reload_config(&self, config: RouterConfig) -> RoutingResult<()> {
        config.validate()?;
        self.breaker.reconfigure(config.circuit_breaker);
        self.weights.reseed_thresholds(&config.thresholds)?;
        self.cache.reconfigure(&config.cache);
        self.cache.invalidate(InvalidationReason::ConfigReload);
        self.config.store(config);
        info!("Routing configuration reloaded");
        Ok(())
    }

    pub fn flush_cache(&self) -> usize {
        self.cache.flush()
    }

    pub fn config(&self) -> Arc<RouterConfig> {
        self.config.load()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn weights(&self) -> RoutingResult<Arc<WeightSet>> {
        self.weights.snapshot()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn stats(&self) -> RoutingResult<EngineStats> {
        Ok(EngineStats {
            routing: self.monitor.snapshot(),
            cache: self.cache.stats(),
            breaker: self.breaker.snapshot(),
            weights: (*self.weights.snapshot()?).clone(),
            registry_generation: self.registry.generation(),
            registry_loaded: self.registry.is_loaded(),
        })
    }

    /// Stop the feedback loop after it applies what is queued.
    pub async fn shutdown(self) {
        let Self {
            feedback,
            feedback_task,
            ..
        } = self;
        drop(feedback);
        if let Err(e) = feedback_task.await {
            warn!("Feedback loop ended abnormally: {e}");
        }
    }
}

impl std::fmt::Debug for RoutingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingEngine")
            .field("registry", &self.registry)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

/// ORCHESTRATION_ROUTING to the fallback entry point with neutral scores.
pub fn fallback_decision(request_id: Uuid, reason: String, config: &RouterConfig) -> RoutingDecision {
    RoutingDecision {
        request_id,
        action: RoutingAction::OrchestrationRouting,
        target: RoutingTarget::Orchestration {
            entry_point: config.routing.fallback_entry_point.clone(),
            domain_analysis: DomainAnalysis::empty(),
        },
        confidence: ConfidenceBreakdown::neutral(),
        reason,
        triggers: Vec::new(),
        escalation_score: 0.0,
        classification: ClassificationResult::neutral(),
        domain_count: 0,
        similarity_key: similarity_key(Tier::Standard, std::iter::empty()),
        cache_hit: false,
        fallback: true,
        elapsed_ms: 0,
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{catalog, DomainSpec, StaticSource};

    async fn engine() -> RoutingEngine {
        RoutingEngine::builder(Arc::new(StaticSource::builtin()))
            .build()
            .await
            .unwrap()
    }

    #[test]
    fn test_fallback_decision_shape() {
        let d = fallback_decision(Uuid::new_v4(), "breaker open".into(), &RouterConfig::default());
        assert_eq!(d.action, RoutingAction::OrchestrationRouting);
        assert_eq!(d.target.label(), "orchestrate-tasks");
        assert_eq!(d.confidence.total, 0.5);
        assert!(d.fallback);
        assert_eq!(d.similarity_key, "STANDARD|none");
    }

    #[tokio::test]
    async fn test_input_errors_surface_without_decision() {
        let engine = engine().await;
        assert!(matches!(
            engine.classify_and_route("   ", None).await,
            Err(RoutingError::EmptyTask)
        ));
        let long = "word ".repeat(1000);
        assert!(matches!(
            engine.classify_and_route(&long, None).await,
            Err(RoutingError::TaskTooLong { .. })
        ));
        let stats = engine.stats().unwrap();
        assert_eq!(stats.routing.input_rejections, 2);
        assert_eq!(stats.routing.requests, 0);
        assert_eq!(stats.breaker.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_second_request_hits_routing_cache() {
        let engine = engine().await;
        let first = engine.classify_and_route("fix the login bug", None).await.unwrap();
        let second = engine.classify_and_route("Fix the login bug!", None).await.unwrap();
        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert!(first.is_same_route(&second));
        assert_ne!(first.request_id, second.request_id);
    }

    #[tokio::test]
    async fn test_reload_rejects_invalid_config() {
        let engine = engine().await;
        let mut bad = RouterConfig::default();
        bad.thresholds.activation = 2.0;
        assert!(matches!(engine.reload_config(bad), Err(RoutingError::Config(_))));
        assert_eq!(engine.config().thresholds.activation, 0.3);
    }

    #[tokio::test]
    async fn test_reload_reseeds_thresholds_and_flushes_cache() {
        let engine = engine().await;
        engine.classify_and_route("fix the login bug", None).await.unwrap();
        let mut next = RouterConfig::default();
        next.thresholds.escalation = 0.85;
        engine.reload_config(next).unwrap();
        assert_eq!(engine.weights().unwrap().thresholds.escalation, 0.85);
        let again = engine.classify_and_route("fix the login bug", None).await.unwrap();
        assert!(!again.cache_hit);
    }

    #[tokio::test]
    async fn test_timed_out_detection_not_cached() {
        let mut config = RouterConfig::default();
        config.detector.max_wait_ms = 0;
        let engine = RoutingEngine::builder(Arc::new(StaticSource::builtin()))
            .config(config)
            .build()
            .await
            .unwrap();

        let text = "Build a react component and postgres query optimization";
        let first = engine.classify_and_route(text, None).await.unwrap();
        let second = engine.classify_and_route(text, None).await.unwrap();
        assert!(!first.fallback);
        assert!(!first.cache_hit);
        assert!(!second.cache_hit);

        let stats = engine.stats().unwrap();
        assert_eq!(stats.routing.detector_timeouts, 2);
        assert_eq!(stats.cache.routing.hits, 0);
        assert_eq!(stats.cache.complexity.hits, 0);
    }

    #[tokio::test]
    async fn test_fallback_decisions_take_no_feedback() {
        let source = StaticSource::new(catalog::builtin_workers()).with_domains(vec![DomainSpec {
            id: "broken".into(),
            keywords: vec!["widget".into(), "gadget".into()],
            file_patterns: vec![],
            verbs: vec![],
            complexity_bias: f64::NAN,
        }]);
        let engine = RoutingEngine::builder(Arc::new(source)).build().await.unwrap();

        let decision = engine.classify_and_route("widget gadget", None).await.unwrap();
        assert!(decision.fallback);
        assert!(matches!(
            engine.report_outcome(decision.request_id, false, None).await,
            Err(RoutingError::UnknownRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_outcome_rejected() {
        let engine = engine().await;
        let id = Uuid::new_v4();
        assert!(matches!(
            engine.report_outcome(id, true, None).await,
            Err(RoutingError::UnknownRequest(got)) if got == id
        ));
    }
}
