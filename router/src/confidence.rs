//! Confidence Engine
//!
//! Four components, each in [0,1], combined with the current
//! [`ConfidenceWeights`]:
//!
//! ```text
//! pattern_match          best worker pattern overlap among candidates
//! historical_success     success rate for the similarity key
//! context_completeness   how much of the structured hints is filled in
//! resource_availability  share of candidates accepting work
//! ```
//!
//! Registry or probe failures degrade the affected component to 0.5; they
//! never fail the request.

use crate::detector::DomainAnalysis;
use crate::error::{RoutingError, RoutingResult};
use crate::learning::{ConfidenceWeights, OutcomeHistory};
use crate::otel::Stage;
use crate::registry::{AvailabilityProbe, CapabilityRegistry, RegistrySnapshot, WorkerRef};
use crate::signature::Tokens;
use crate::task::StructuredHints;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

const NEUTRAL: f64 = 0.5;
const PATTERN_SATURATION: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub pattern_match: f64,
    pub historical_success: f64,
    pub context_completeness: f64,
    pub resource_availability: f64,
    pub total: f64,
}

impl ConfidenceBreakdown {
    /// All components and the total at 0.5; used by fallback decisions.
    pub fn neutral() -> Self {
        Self {
            pattern_match: NEUTRAL,
            historical_success: NEUTRAL,
            context_completeness: NEUTRAL,
            resource_availability: NEUTRAL,
            total: NEUTRAL,
        }
    }

    /// Components in weight order.
    pub fn components(&self) -> [f64; 4] {
        [
            self.pattern_match,
            self.historical_success,
            self.context_completeness,
            self.resource_availability,
        ]
    }

    /// Weighted total of `components`. Non-finite results are a pipeline error.
    pub fn combine(components: [f64; 4], weights: &ConfidenceWeights) -> RoutingResult<Self> {
        let total: f64 = components
            .iter()
            .zip(weights.as_array())
            .map(|(c, w)| c * w)
            .sum();
        if !total.is_finite() {
            return Err(RoutingError::pipeline(
                Stage::Confidence,
                format!("non-finite confidence total from {components:?}"),
            ));
        }
        Ok(Self {
            pattern_match: components[0],
            historical_success: components[1],
            context_completeness: components[2],
            resource_availability: components[3],
            total: total.clamp(0.0, 1.0),
        })
    }
}

/// Everything about one request the engine needs.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInputs<'a> {
    pub tokens: &'a Tokens,
    pub domains: &'a DomainAnalysis,
    pub hints: Option<&'a StructuredHints>,
    pub similarity_key: &'a str,
}

pub struct ConfidenceEngine {
    registry: Arc<CapabilityRegistry>,
    probe: Arc<dyn AvailabilityProbe>,
    history: Arc<OutcomeHistory>,
}

impl ConfidenceEngine {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        probe: Arc<dyn AvailabilityProbe>,
        history: Arc<OutcomeHistory>,
    ) -> Self {
        Self {
            registry,
            probe,
            history,
        }
    }

    pub async fn assess(
        &self,
        inputs: ConfidenceInputs<'_>,
        weights: &ConfidenceWeights,
    ) -> RoutingResult<ConfidenceBreakdown> {
        let snapshot = match self.registry.snapshot() {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Confidence degraded: {e}");
                None
            }
        };

        let candidates = snapshot
            .as_deref()
            .map(|s| candidate_workers(s, inputs.domains))
            .unwrap_or_default();

        let pattern = pattern_match(snapshot.as_deref(), &candidates, inputs.tokens);
        let historical = self
            .history
            .success_rate(inputs.similarity_key)
            .unwrap_or(NEUTRAL);
        let context = context_completeness(inputs.hints);
        let resource = self.resource_availability(&candidates).await;

        debug!(
            pattern,
            historical,
            context,
            resource,
            candidates = candidates.len(),
            "Confidence components"
        );
        ConfidenceBreakdown::combine([pattern, historical, context, resource], weights)
    }

    async fn resource_availability(&self, candidates: &BTreeSet<WorkerRef>) -> f64 {
        if candidates.is_empty() {
            return NEUTRAL;
        }
        let checks = join_all(candidates.iter().map(|worker| async move {
            self.probe
                .accepting_work(worker)
                .await
                .map_err(|e| RoutingError::AvailabilityCheck {
                    worker: worker.to_string(),
                    message: format!("{e:#}"),
                })
        }))
        .await;

        let mut accepting = 0usize;
        for check in checks {
            match check {
                Ok(true) => accepting += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Resource availability degraded: {e}");
                    return NEUTRAL;
                }
            }
        }
        accepting as f64 / candidates.len() as f64
    }
}

impl std::fmt::Debug for ConfidenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfidenceEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Workers serving any detected domain; every worker when none do.
pub fn candidate_workers(snapshot: &RegistrySnapshot, domains: &DomainAnalysis) -> BTreeSet<WorkerRef> {
    let served: BTreeSet<WorkerRef> = domains
        .matches
        .iter()
        .flat_map(|m| snapshot.lookup(&m.domain))
        .collect();
    if served.is_empty() {
        snapshot.workers().map(|w| w.worker_ref()).collect()
    } else {
        served
    }
}

pub fn pattern_match(
    snapshot: Option<&RegistrySnapshot>,
    candidates: &BTreeSet<WorkerRef>,
    tokens: &Tokens,
) -> f64 {
    let Some(snapshot) = snapshot else {
        return NEUTRAL;
    };
    candidates
        .iter()
        .filter_map(|w| snapshot.profile(w))
        .map(|p| (tokens.count_owned_hits(&p.patterns) as f64 / PATTERN_SATURATION).min(1.0))
        .fold(None, |best: Option<f64>, s| Some(best.map_or(s, |b| b.max(s))))
        .unwrap_or(NEUTRAL)
}

pub fn context_completeness(hints: Option<&StructuredHints>) -> f64 {
    match hints {
        None => NEUTRAL,
        Some(h) => {
            0.25 + 0.75 * (h.filled_fields() as f64 / StructuredHints::FIELD_COUNT as f64)
        }
    }
}
