//! Task Router Library
//!
//! Classifies free-text task descriptions and routes each one to a
//! specialist worker, an orchestration entry point or the organizer:
//!
//! - Coarse keyword classification, refined multi-factor scoring for
//!   borderline (`STANDARD`) tasks
//! - Concurrent domain detection against the capability registry
//! - Four-component confidence, escalation triggers and scoring
//! - Three-tier pattern cache (domains, decisions, classifications)
//! - Circuit breaker with a fallback route on pipeline failure
//! - Outcome feedback that adapts weights and thresholds in the background
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use task_router::{RoutingEngine, StaticSource};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let engine = RoutingEngine::builder(Arc::new(StaticSource::builtin()))
//!     .build()
//!     .await?;
//! let decision = engine.classify_and_route("fix the login bug", None).await?;
//! println!("{} -> {}", decision.action, decision.target.label());
//! engine.report_outcome(decision.request_id, true, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod classifier;
pub mod confidence;
pub mod config;
pub mod decision;
pub mod detector;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod learning;
pub mod monitor;
pub mod otel;
pub mod registry;
pub mod signature;
pub mod task;
pub mod validation;

pub use cache::{CacheStats, InvalidationReason, PatternCache};
pub use circuit_breaker::{Admission, BreakerSnapshot, CircuitBreaker, CircuitState};
pub use classifier::{ClassificationResult, CoarseClassifier, RefinedScorer, Tier};
pub use confidence::{ConfidenceBreakdown, ConfidenceEngine};
pub use config::{ConfigError, RouterConfig};
pub use decision::{RoutingAction, RoutingDecision, RoutingTarget};
pub use detector::{DomainAnalysis, DomainDetector, DomainMatch};
pub use engine::{EngineBuilder, EngineStats, RoutingEngine};
pub use error::{RoutingError, RoutingResult};
pub use escalation::{EscalationPackage, Trigger};
pub use learning::{OutcomeReport, WeightSet};
pub use monitor::RoutingStats;
pub use registry::{
    AlwaysAvailable, AvailabilityProbe, CapabilityRegistry, CapabilitySource, StaticAvailability,
    StaticSource, TomlFileSource, WorkerProfile, WorkerRef,
};
pub use task::{StructuredHints, TaskDescription};
