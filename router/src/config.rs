//! Router configuration.
//!
//! Every threshold the pipeline consults lives here as a tunable default.
//! Configuration is layered:
//!
//! ```text
//! RouterConfig::default()  →  TOML file (optional)  →  TASKROUTE_* env  →  validate()
//! ```
//!
//! A validated config can be swapped into a running engine with
//! `RoutingEngine::reload_config`; an invalid one is rejected and the
//! previous config stays in effect.
//!
//! # Environment Variables
//!
//! - `TASKROUTE_ACTIVATION_THRESHOLD`: domain activation, 0.0-1.0 (default: 0.3)
//! - `TASKROUTE_ESCALATION_THRESHOLD`: escalation score cut-off, 0.0-1.0 (default: 0.7)
//! - `TASKROUTE_ORCHESTRATION_CONFIDENCE`: 0.0-1.0 (default: 0.6)
//! - `TASKROUTE_ORCHESTRATION_MIN_DOMAINS`: (default: 2)
//! - `TASKROUTE_BREAKER_FAILURES`: consecutive failures before opening (default: 5)
//! - `TASKROUTE_BREAKER_COOLDOWN_MS`: (default: 30000)
//! - `TASKROUTE_DETECTOR_MAX_WAIT_MS`: (default: 25)
//! - `TASKROUTE_DEFAULT_WORKER`: (default: "general-purpose")
//! - `TASKROUTE_MAX_TASK_CHARS`: (default: 2000)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ACTIVATION_THRESHOLD: f64 = 0.3;
pub const DEFAULT_ESCALATION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_ORCHESTRATION_CONFIDENCE: f64 = 0.6;
pub const DEFAULT_ORCHESTRATION_MIN_DOMAINS: usize = 2;
pub const DEFAULT_BREAKER_FAILURES: u32 = 5;
pub const DEFAULT_BREAKER_COOLDOWN_MS: u64 = 30_000;
pub const DEFAULT_BREAKER_WINDOW_MS: u64 = 60_000;
pub const DEFAULT_DETECTOR_MAX_WAIT_MS: u64 = 25;
pub const DEFAULT_WORKER: &str = "general-purpose";
pub const DEFAULT_FALLBACK_ENTRY_POINT: &str = "orchestrate-tasks";
pub const DEFAULT_MAX_TASK_CHARS: usize = 2000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Decision thresholds for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Domain confidence must exceed this to count as detected.
    pub activation: f64,
    /// Coarse simple-indicator density above which a task is SIMPLE.
    pub coarse_simple: f64,
    /// Coarse complex-indicator density above which a task is COMPLEX.
    pub coarse_complex: f64,
    /// Refined score below which a STANDARD task becomes SIMPLE_REFINED.
    pub refined_simple: f64,
    /// Refined score above which a STANDARD task becomes COMPLEX_REFINED.
    pub refined_complex: f64,
    /// Escalation score above which the task is escalated.
    pub escalation: f64,
    pub orchestration_min_domains: usize,
    /// Total confidence above which multi-domain work is orchestrated.
    pub orchestration_confidence: f64,
    pub low_confidence: f64,
    pub high_complexity: f64,
    /// Domain count above which `multi_domain` fires.
    pub multi_domain_count: usize,
    /// Domain count at or above which the advanced orchestration entry is used.
    pub advanced_orchestration_domains: usize,
    pub enterprise_bonus: f64,
    pub architectural_bonus: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            activation: DEFAULT_ACTIVATION_THRESHOLD,
            coarse_simple: 0.6,
            coarse_complex: 0.4,
            refined_simple: 0.3,
            refined_complex: 0.7,
            escalation: DEFAULT_ESCALATION_THRESHOLD,
            orchestration_min_domains: DEFAULT_ORCHESTRATION_MIN_DOMAINS,
            orchestration_confidence: DEFAULT_ORCHESTRATION_CONFIDENCE,
            low_confidence: 0.4,
            high_complexity: 0.8,
            multi_domain_count: 3,
            advanced_orchestration_domains: 4,
            enterprise_bonus: 0.2,
            architectural_bonus: 0.15,
        }
    }
}

/// TTL and capacity of one cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl TierConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1: domain analysis per signature.
    pub pattern: TierConfig,
    /// L2: full routing decision per signature.
    pub routing: TierConfig,
    /// L3: classification result per signature.
    pub complexity: TierConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pattern: TierConfig {
                ttl_secs: 300,
                capacity: 256,
            },
            routing: TierConfig {
                ttl_secs: 1800,
                capacity: 512,
            },
            complexity: TierConfig {
                ttl_secs: 3600,
                capacity: 1024,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
    /// Failures further apart than this restart the consecutive count.
    pub window_ms: u64,
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_BREAKER_FAILURES,
            cooldown_ms: DEFAULT_BREAKER_COOLDOWN_MS,
            window_ms: DEFAULT_BREAKER_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Soft wait for matcher completion; late matchers are dropped.
    pub max_wait_ms: u64,
}

impl DetectorConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_wait_ms: DEFAULT_DETECTOR_MAX_WAIT_MS,
        }
    }
}

/// Soft end-to-end latency targets per tier. Overruns are logged, never cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyBudgets {
    pub simple_ms: u64,
    pub standard_ms: u64,
    pub complex_ms: u64,
}

impl Default for LatencyBudgets {
    fn default() -> Self {
        Self {
            simple_ms: 50,
            standard_ms: 100,
            complex_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub channel_capacity: usize,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub learning_rate: f64,
    pub decay: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    /// Adjustment applied to an adaptive threshold per human correction.
    pub threshold_step: f64,
    pub ledger_capacity: usize,
    /// Outcomes kept per similarity key.
    pub history_window: usize,
    pub history_max_age_secs: u64,
}

impl FeedbackConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            batch_size: 16,
            flush_interval_ms: 250,
            learning_rate: 0.01,
            decay: 0.001,
            min_weight: 0.05,
            max_weight: 0.7,
            threshold_step: 0.02,
            ledger_capacity: 4096,
            history_window: 50,
            history_max_age_secs: 7 * 24 * 3600,
        }
    }
}

/// Routing targets and input limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Worker used for direct routing when no detected domain has a worker.
    pub default_worker: String,
    /// Coordination entry point used by the circuit breaker fallback.
    pub fallback_entry_point: String,
    pub orchestration_entry_point: String,
    pub advanced_orchestration_entry_point: String,
    pub max_task_chars: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_worker: DEFAULT_WORKER.to_string(),
            fallback_entry_point: DEFAULT_FALLBACK_ENTRY_POINT.to_string(),
            orchestration_entry_point: "orchestrate-agents".to_string(),
            advanced_orchestration_entry_point: "orchestrate-agents-adv".to_string(),
            max_task_chars: DEFAULT_MAX_TASK_CHARS,
        }
    }
}

/// Top-level router configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub thresholds: ThresholdConfig,
    pub cache: CacheConfig,
    pub circuit_breaker: BreakerConfig,
    pub detector: DetectorConfig,
    pub latency: LatencyBudgets,
    pub feedback: FeedbackConfig,
    pub routing: RoutingConfig,
}

impl RouterConfig {
    /// Defaults with `TASKROUTE_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, apply env overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply overrides from a key lookup. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let unit = |key: &str| {
            lookup(key)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .map(|v| v.clamp(0.0, 1.0))
        };

        if let Some(v) = unit("TASKROUTE_ACTIVATION_THRESHOLD") {
            self.thresholds.activation = v;
        }
        if let Some(v) = unit("TASKROUTE_ESCALATION_THRESHOLD") {
            self.thresholds.escalation = v;
        }
        if let Some(v) = unit("TASKROUTE_ORCHESTRATION_CONFIDENCE") {
            self.thresholds.orchestration_confidence = v;
        }
        if let Some(v) = lookup("TASKROUTE_ORCHESTRATION_MIN_DOMAINS")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            self.thresholds.orchestration_min_domains = v;
        }
        if let Some(v) = lookup("TASKROUTE_BREAKER_FAILURES")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            self.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = lookup("TASKROUTE_BREAKER_COOLDOWN_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.circuit_breaker.cooldown_ms = v;
        }
        if let Some(v) =
            lookup("TASKROUTE_DETECTOR_MAX_WAIT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            self.detector.max_wait_ms = v;
        }
        if let Some(v) = lookup("TASKROUTE_DEFAULT_WORKER").filter(|v| !v.trim().is_empty()) {
            self.routing.default_worker = v.trim().to_string();
        }
        if let Some(v) = lookup("TASKROUTE_MAX_TASK_CHARS")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            self.routing.max_task_chars = v;
        }
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.thresholds;
        let unit_fields = [
            ("thresholds.activation", t.activation),
            ("thresholds.coarse_simple", t.coarse_simple),
            ("thresholds.coarse_complex", t.coarse_complex),
            ("thresholds.refined_simple", t.refined_simple),
            ("thresholds.refined_complex", t.refined_complex),
            ("thresholds.escalation", t.escalation),
            ("thresholds.orchestration_confidence", t.orchestration_confidence),
            ("thresholds.low_confidence", t.low_confidence),
            ("thresholds.high_complexity", t.high_complexity),
            ("thresholds.enterprise_bonus", t.enterprise_bonus),
            ("thresholds.architectural_bonus", t.architectural_bonus),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        if t.refined_simple >= t.refined_complex {
            return Err(ConfigError::Invalid(
                "thresholds.refined_simple must be below thresholds.refined_complex".into(),
            ));
        }
        if t.orchestration_min_domains == 0 {
            return Err(ConfigError::Invalid(
                "thresholds.orchestration_min_domains must be at least 1".into(),
            ));
        }

        for (name, tier) in [
            ("cache.pattern", &self.cache.pattern),
            ("cache.routing", &self.cache.routing),
            ("cache.complexity", &self.cache.complexity),
        ] {
            if tier.capacity == 0 {
                return Err(ConfigError::Invalid(format!("{name}.capacity must be > 0")));
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "circuit_breaker.failure_threshold must be > 0".into(),
            ));
        }

        let f = &self.feedback;
        if f.channel_capacity == 0 || f.batch_size == 0 || f.ledger_capacity == 0 {
            return Err(ConfigError::Invalid(
                "feedback channel_capacity, batch_size and ledger_capacity must be > 0".into(),
            ));
        }
        if f.history_window == 0 {
            return Err(ConfigError::Invalid(
                "feedback.history_window must be > 0".into(),
            ));
        }
        if !(f.learning_rate.is_finite() && f.learning_rate > 0.0)
            || !f.decay.is_finite()
            || f.decay < 0.0
        {
            return Err(ConfigError::Invalid(
                "feedback.learning_rate must be > 0 and feedback.decay >= 0".into(),
            ));
        }
        // Five refined weights must fit between the bounds and still sum to 1.
        if !(f.min_weight > 0.0 && f.min_weight < f.max_weight && f.max_weight <= 1.0)
            || f.min_weight * 5.0 > 1.0
            || f.max_weight * 4.0 < 1.0
        {
            return Err(ConfigError::Invalid(format!(
                "feedback weight bounds [{}, {}] cannot hold a normalized weight set",
                f.min_weight, f.max_weight
            )));
        }
        if !(0.0..=0.5).contains(&f.threshold_step) {
            return Err(ConfigError::Invalid(
                "feedback.threshold_step must be within [0, 0.5]".into(),
            ));
        }

        let r = &self.routing;
        if r.default_worker.trim().is_empty() || r.fallback_entry_point.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "routing.default_worker and routing.fallback_entry_point must be set".into(),
            ));
        }
        if r.max_task_chars == 0 {
            return Err(ConfigError::Invalid(
                "routing.max_task_chars must be > 0".into(),
            ));
        }

        Ok(())
    }
}

/// Hot-swappable holder of the active config.
#[derive(Debug)]
pub struct ConfigCell {
    current: RwLock<Arc<RouterConfig>>,
}

impl ConfigCell {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn load(&self) -> Arc<RouterConfig> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn store(&self, config: RouterConfig) {
        let next = Arc::new(config);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
