//! Asynchronous outcome feedback.
//!
//! ```text
//! report_outcome() ──mpsc──► FeedbackLoop ──batch (size | interval | flush)──►
//!     WeightStore::update (one atomic swap per batch)
//!     OutcomeHistory::record
//!     PatternCache::invalidate(WeightUpdate)
//! ```
//!
//! The request path only enqueues; all learning happens on the loop task.

use super::history::OutcomeHistory;
use super::ledger::DecisionRecord;
use super::weights::{
    normalize_bounded, AdaptiveThresholds, ConfidenceWeights, RefinedWeights, WeightSet,
    WeightStore,
};
use crate::cache::{InvalidationReason, PatternCache};
use crate::config::{ConfigCell, FeedbackConfig};
use crate::decision::RoutingAction;
use crate::error::{RoutingError, RoutingResult};
use crate::otel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One reported outcome joined with the decision it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub record: DecisionRecord,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corrected_action: Option<RoutingAction>,
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum FeedbackMessage {
    Outcome(Box<OutcomeReport>),
    /// Apply everything queued so far, then acknowledge.
    Flush(oneshot::Sender<()>),
}

/// Cloneable sending half of the feedback channel.
#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<FeedbackMessage>,
}

impl FeedbackSender {
    pub async fn send(&self, report: OutcomeReport) -> RoutingResult<()> {
        self.tx
            .send(FeedbackMessage::Outcome(Box::new(report)))
            .await
            .map_err(|_| RoutingError::FeedbackUnavailable)
    }

    /// Wait until every outcome sent before this call has been applied.
    pub async fn flush(&self) -> RoutingResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(FeedbackMessage::Flush(ack))
            .await
            .map_err(|_| RoutingError::FeedbackUnavailable)?;
        done.await.map_err(|_| RoutingError::FeedbackUnavailable)
    }
}

pub fn channel(capacity: usize) -> (FeedbackSender, mpsc::Receiver<FeedbackMessage>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (FeedbackSender { tx }, rx)
}

/// Nudge adaptive thresholds toward a human-corrected action.
pub fn adjust_thresholds(
    thresholds: AdaptiveThresholds,
    decided: RoutingAction,
    corrected: RoutingAction,
    step: f64,
) -> AdaptiveThresholds {
    use RoutingAction::*;

    let mut next = thresholds;
    match (decided, corrected) {
        (a, b) if a == b => {}
        (_, EscalateToOrganizer) => next.escalation -= step,
        (EscalateToOrganizer, _) => next.escalation += step,
        (DirectAgentRouting, OrchestrationRouting) => next.orchestration_confidence -= step,
        (OrchestrationRouting, DirectAgentRouting) => next.orchestration_confidence += step,
        _ => {}
    }

    let (lo, hi) = AdaptiveThresholds::ESCALATION_BOUNDS;
    next.escalation = next.escalation.clamp(lo, hi);
    let (lo, hi) = AdaptiveThresholds::ORCHESTRATION_BOUNDS;
    next.orchestration_confidence = next.orchestration_confidence.clamp(lo, hi);

    debug!(
        %decided,
        %corrected,
        escalation = next.escalation,
        orchestration = next.orchestration_confidence,
        "Adaptive thresholds nudged"
    );
    next
}

/// Fold a batch of outcomes into a new weight set.
///
/// Confidence weights take one SGD step per outcome toward the observed
/// result (1.0 for an uncorrected success, 0.0 otherwise). Refined weights
/// move only on failures of refined decisions, toward the factors that were
/// high on a task that proved harder than scored.
pub fn apply_outcomes(
    current: &WeightSet,
    outcomes: &[OutcomeReport],
    config: &FeedbackConfig,
) -> WeightSet {
    let mut next = current.clone();

    for outcome in outcomes {
        let lr = next.learning_rate(config);
        let record = &outcome.record;

        let target = if outcome.success && outcome.corrected_action.is_none() {
            1.0
        } else {
            0.0
        };
        let error = target - record.confidence.total;
        let features = record.confidence.components();
        let mut w = next.confidence.as_array();
        for (weight, feature) in w.iter_mut().zip(features) {
            *weight += lr * error * feature;
        }
        next.confidence =
            ConfidenceWeights::from_array(normalize_bounded(w, config.min_weight, config.max_weight));

        if let (Some(factors), false) = (record.refined, outcome.success) {
            let error = 1.0 - record.complexity_score;
            let mut w = next.refined.as_array();
            for (weight, feature) in w.iter_mut().zip(factors.as_array()) {
                *weight += lr * error * feature;
            }
            next.refined = RefinedWeights::from_array(normalize_bounded(
                w,
                config.min_weight,
                config.max_weight,
            ));
        }

        if let Some(corrected) = outcome.corrected_action {
            next.thresholds =
                adjust_thresholds(next.thresholds, record.action, corrected, config.threshold_step);
        }

        next.iteration += 1;
    }

    next
}

/// Background task that owns the receiving half of the feedback channel.
pub struct FeedbackLoop {
    weights: Arc<WeightStore>,
    history: Arc<OutcomeHistory>,
    cache: Arc<PatternCache>,
    config: Arc<ConfigCell>,
}

impl FeedbackLoop {
    pub fn new(
        weights: Arc<WeightStore>,
        history: Arc<OutcomeHistory>,
        cache: Arc<PatternCache>,
        config: Arc<ConfigCell>,
    ) -> Self {
        Self {
            weights,
            history,
            cache,
            config,
        }
    }

    /// Spawn onto the current tokio runtime. The task ends when every
    /// [`FeedbackSender`] is dropped, after applying what is still queued.
    pub fn spawn(self, rx: mpsc::Receiver<FeedbackMessage>) -> JoinHandle<()> {
        tokio::spawn(self.run(rx))
    }

    async fn run(self, mut rx: mpsc::Receiver<FeedbackMessage>) {
        let settings = self.config.load().feedback.clone();
        let batch_size = settings.batch_size.max(1);
        let mut ticker = tokio::time::interval(
            settings.flush_interval().max(Duration::from_millis(1)),
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut batch: Vec<OutcomeReport> = Vec::with_capacity(batch_size);

        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(FeedbackMessage::Outcome(report)) => {
                        batch.push(*report);
                        if batch.len() >= batch_size {
                            self.apply(std::mem::take(&mut batch));
                        }
                    }
                    Some(FeedbackMessage::Flush(ack)) => {
                        if !batch.is_empty() {
                            self.apply(std::mem::take(&mut batch));
                        }
                        let _ = ack.send(());
                    }
                    None => {
                        if !batch.is_empty() {
                            self.apply(std::mem::take(&mut batch));
                        }
                        info!("Feedback channel closed; learning loop stopped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.apply(std::mem::take(&mut batch));
                    }
                }
            }
        }
    }

    fn apply(&self, batch: Vec<OutcomeReport>) {
        let span = otel::feedback_span(batch.len());
        let _guard = span.enter();

        let config = self.config.load();
        let result = self
            .weights
            .update(|current| apply_outcomes(current, &batch, &config.feedback));

        for outcome in &batch {
            self.history.record(
                &outcome.record.similarity_key,
                outcome.success && outcome.corrected_action.is_none(),
                outcome.reported_at,
            );
        }

        match result {
            Ok(next) => {
                otel::record_weight_version(&span, next.version);
                self.cache.invalidate(InvalidationReason::WeightUpdate);
                info!(
                    outcomes = batch.len(),
                    version = next.version,
                    iteration = next.iteration,
                    escalation = next.thresholds.escalation,
                    "Applied feedback batch"
                );
            }
            Err(e) => warn!(outcomes = batch.len(), "Feedback batch dropped: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::confidence::ConfidenceBreakdown;
    use uuid::Uuid;

    fn record(action: RoutingAction, total: f64) -> DecisionRecord {
        DecisionRecord {
            request_id: Uuid::new_v4(),
            similarity_key: "STANDARD|backend".into(),
            action,
            confidence: ConfidenceBreakdown {
                pattern_match: 1.0,
                historical_success: 0.5,
                context_completeness: 0.5,
                resource_availability: 1.0,
                total,
            },
            complexity_score: 0.5,
            refined: None,
            decided_at: Utc::now(),
        }
    }

    fn report(action: RoutingAction, success: bool, corrected: Option<RoutingAction>) -> OutcomeReport {
        OutcomeReport {
            record: record(action, 0.75),
            success,
            corrected_action: corrected,
            reported_at: Utc::now(),
        }
    }

    #[test]
    fn test_success_shifts_weight_toward_strong_factors() {
        let config = FeedbackConfig::default();
        let current = WeightSet::default();
        let outcomes: Vec<_> = (0..50)
            .map(|_| report(RoutingAction::DirectAgentRouting, true, None))
            .collect();
        let next = apply_outcomes(&current, &outcomes, &config);
        // weight shifts toward components that are strong relative to their share
        assert!(next.confidence.resource_availability > current.confidence.resource_availability);
        assert!(next.confidence.historical_success < current.confidence.historical_success);
        assert!((next.confidence.sum() - 1.0).abs() < 1e-9);
        assert_eq!(next.iteration, 50);
    }

    #[test]
    fn test_failures_keep_weights_in_bounds() {
        let config = FeedbackConfig::default();
        let mut set = WeightSet::default();
        for _ in 0..200 {
            set = apply_outcomes(
                &set,
                &[report(RoutingAction::OrchestrationRouting, false, None)],
                &config,
            );
            for w in set.confidence.as_array() {
                assert!(w >= config.min_weight - 1e-9 && w <= config.max_weight + 1e-9);
            }
            assert!((set.confidence.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_refined_weights_move_only_on_refined_failures() {
        let config = FeedbackConfig::default();
        let current = WeightSet::default();
        let mut failed = report(RoutingAction::DirectAgentRouting, false, None);
        failed.record.refined = Some(crate::classifier::RefinedFactors {
            domain_count: 1.0,
            ..Default::default()
        });
        let next = apply_outcomes(&current, &[failed.clone()], &config);
        assert!(next.refined.domain_count > current.refined.domain_count);
        assert!((next.refined.sum() - 1.0).abs() < 1e-9);

        failed.success = true;
        let unchanged = apply_outcomes(&current, &[failed], &config);
        assert_eq!(unchanged.refined, current.refined);
    }

    #[test]
    fn test_correction_to_escalate_lowers_threshold() {
        let t = adjust_thresholds(
            AdaptiveThresholds::default(),
            RoutingAction::OrchestrationRouting,
            RoutingAction::EscalateToOrganizer,
            0.02,
        );
        assert!((t.escalation - 0.68).abs() < 1e-12);
    }

    #[test]
    fn test_correction_away_from_escalate_raises_threshold() {
        let t = adjust_thresholds(
            AdaptiveThresholds::default(),
            RoutingAction::EscalateToOrganizer,
            RoutingAction::DirectAgentRouting,
            0.02,
        );
        assert!((t.escalation - 0.72).abs() < 1e-12);
    }

    #[test]
    fn test_orchestration_corrections() {
        let base = AdaptiveThresholds::default();
        let lower = adjust_thresholds(
            base,
            RoutingAction::DirectAgentRouting,
            RoutingAction::OrchestrationRouting,
            0.02,
        );
        assert!((lower.orchestration_confidence - 0.58).abs() < 1e-12);
        let higher = adjust_thresholds(
            base,
            RoutingAction::OrchestrationRouting,
            RoutingAction::DirectAgentRouting,
            0.02,
        );
        assert!((higher.orchestration_confidence - 0.62).abs() < 1e-12);
    }

    #[test]
    fn test_thresholds_stay_in_bounds() {
        let mut t = AdaptiveThresholds::default();
        for _ in 0..100 {
            t = adjust_thresholds(
                t,
                RoutingAction::DirectAgentRouting,
                RoutingAction::EscalateToOrganizer,
                0.02,
            );
        }
        assert_eq!(t.escalation, AdaptiveThresholds::ESCALATION_BOUNDS.0);
    }

    #[tokio::test]
    async fn test_loop_applies_on_flush_and_invalidates_cache() {
        use crate::cache::{CachedValue, PatternCache};
        use crate::classifier::ClassificationResult;
        use crate::config::{CacheConfig, RouterConfig};
        use crate::signature::TaskSignature;
        use crate::task::TaskDescription;

        let weights = Arc::new(WeightStore::default());
        let history = Arc::new(OutcomeHistory::new(50, Duration::from_secs(3600)));
        let cache = Arc::new(PatternCache::new(&CacheConfig::default()));
        let config = Arc::new(ConfigCell::new(RouterConfig::default()));

        let sig = TaskSignature::compute(&TaskDescription::new("rename a field"));
        cache.put(&sig, CachedValue::Classification(ClassificationResult::neutral()));

        let (tx, rx) = channel(16);
        let handle = FeedbackLoop::new(weights.clone(), history.clone(), cache.clone(), config)
            .spawn(rx);

        tx.send(report(RoutingAction::DirectAgentRouting, true, None))
            .await
            .unwrap();
        tx.flush().await.unwrap();

        assert_eq!(weights.snapshot().unwrap().version, 1);
        assert_eq!(history.success_rate("STANDARD|backend"), Some(1.0));
        assert!(cache.get(&sig).is_none());

        drop(tx);
        handle.await.unwrap();
    }
}
