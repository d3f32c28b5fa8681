//! OpenTelemetry-Compatible Span Helpers
//!
//! Structured `tracing` span builders for the routing pipeline. All spans
//! use dot-notation field names compatible with OpenTelemetry semantic
//! conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! routing.classify             (root, one per classify_and_route call)
//!   ├─ routing.stage           (coarse, detect, refine, confidence, escalation)
//!   └─ routing.breaker         (circuit breaker transition)
//! routing.feedback             (one per applied outcome batch)
//! routing.registry_refresh     (capability registry reload)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use task_router::otel;
//!
//! let span = otel::classify_span(&request_id.to_string(), text.len());
//! let guard = span.enter();
//! // ... run the pipeline ...
//! otel::record_decision(&span, "ORCHESTRATION_ROUTING", 0.74, false, 3);
//! drop(guard);
//! ```

use serde::{Deserialize, Serialize};
use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

/// Root span for one routing request.
pub const SPAN_CLASSIFY: &str = "routing.classify";

/// One pipeline stage within a request.
pub const SPAN_STAGE: &str = "routing.stage";

/// Circuit breaker state transition.
pub const SPAN_BREAKER: &str = "routing.breaker";

/// Application of one batch of routing outcomes.
pub const SPAN_FEEDBACK: &str = "routing.feedback";

/// Capability registry reload.
pub const SPAN_REGISTRY_REFRESH: &str = "routing.registry_refresh";

// ── Field Name Constants ─────────────────────────────────────────────

pub const FIELD_REQUEST_ID: &str = "routing.request_id";
pub const FIELD_TEXT_LEN: &str = "routing.text_len";
pub const FIELD_STAGE: &str = "routing.stage.name";
pub const FIELD_ACTION: &str = "routing.action";
pub const FIELD_CONFIDENCE: &str = "routing.confidence";
pub const FIELD_CACHE_HIT: &str = "routing.cache_hit";
pub const FIELD_DOMAIN_COUNT: &str = "routing.domain_count";
pub const FIELD_DURATION_MS: &str = "routing.duration_ms";
pub const FIELD_BREAKER_FROM: &str = "routing.breaker.from";
pub const FIELD_BREAKER_TO: &str = "routing.breaker.to";
pub const FIELD_BATCH_SIZE: &str = "routing.feedback.batch_size";
pub const FIELD_WEIGHT_VERSION: &str = "routing.weights.version";
pub const FIELD_WORKER_COUNT: &str = "routing.registry.workers";
pub const FIELD_SUCCESS: &str = "routing.success";

// ── Pipeline Stage ───────────────────────────────────────────────────

/// Pipeline stage, used for span tagging and pipeline error attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Cache,
    Coarse,
    Detect,
    Refine,
    Confidence,
    Escalation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cache => write!(f, "cache"),
            Self::Coarse => write!(f, "coarse"),
            Self::Detect => write!(f, "detect"),
            Self::Refine => write!(f, "refine"),
            Self::Confidence => write!(f, "confidence"),
            Self::Escalation => write!(f, "escalation"),
        }
    }
}

// ── Span Builders ────────────────────────────────────────────────────

/// Create the root span for a routing request.
///
/// Fields filled later via [`record_decision`]: action, confidence,
/// cache hit, domain count and duration.
pub fn classify_span(request_id: &str, text_len: usize) -> Span {
    tracing::info_span!(
        "routing.classify",
        "routing.request_id" = %request_id,
        "routing.text_len" = text_len as u64,
        "routing.action" = tracing::field::Empty,
        "routing.confidence" = tracing::field::Empty,
        "routing.cache_hit" = tracing::field::Empty,
        "routing.domain_count" = tracing::field::Empty,
        "routing.duration_ms" = tracing::field::Empty,
    )
}

/// Record the final decision on a classify span.
pub fn record_decision(
    span: &Span,
    action: &str,
    confidence: f64,
    cache_hit: bool,
    domain_count: usize,
) {
    span.record("routing.action", action);
    span.record("routing.confidence", confidence);
    span.record("routing.cache_hit", cache_hit);
    span.record("routing.domain_count", domain_count as u64);
}

/// Record the end-to-end duration on a classify span.
pub fn record_duration(span: &Span, duration_ms: u64) {
    span.record("routing.duration_ms", duration_ms);
}

/// Create a span for one pipeline stage.
pub fn stage_span(stage: Stage) -> Span {
    tracing::debug_span!(
        "routing.stage",
        "routing.stage.name" = %stage,
        "routing.success" = tracing::field::Empty,
    )
}

/// Create a span for a breaker transition. All fields filled at creation.
pub fn breaker_span(from: &str, to: &str) -> Span {
    tracing::info_span!(
        "routing.breaker",
        "routing.breaker.from" = %from,
        "routing.breaker.to" = %to,
    )
}

/// Create a span for applying one feedback batch.
pub fn feedback_span(batch_size: usize) -> Span {
    tracing::info_span!(
        "routing.feedback",
        "routing.feedback.batch_size" = batch_size as u64,
        "routing.weights.version" = tracing::field::Empty,
    )
}

/// Record the weight-set version produced by a feedback batch.
pub fn record_weight_version(span: &Span, version: u64) {
    span.record("routing.weights.version", version);
}

/// Create a span for a registry refresh.
pub fn registry_refresh_span(source: &str) -> Span {
    tracing::info_span!(
        "routing.registry_refresh",
        source = %source,
        "routing.registry.workers" = tracing::field::Empty,
        "routing.success" = tracing::field::Empty,
    )
}

/// Record the outcome of a registry refresh.
pub fn record_refresh_result(span: &Span, success: bool, worker_count: usize) {
    span.record("routing.success", success);
    span.record("routing.registry.workers", worker_count as u64);
}
