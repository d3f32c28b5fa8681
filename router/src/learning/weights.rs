//! Weight Set and its atomically swapped store.

use crate::config::{FeedbackConfig, ThresholdConfig};
use crate::error::{RoutingError, RoutingResult};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Clamp every weight into `[min, max]` and redistribute so the set sums to 1.0.
///
/// The residual is spread proportionally over weights not pinned at the
/// relevant bound; each round pins at least one more weight, so `N + 1`
/// rounds always settle a feasible set.
pub fn normalize_bounded<const N: usize>(mut weights: [f64; N], min: f64, max: f64) -> [f64; N] {
    for w in weights.iter_mut() {
        *w = if w.is_finite() { w.clamp(min, max) } else { min };
    }

    for _ in 0..=N {
        let residual = 1.0 - weights.iter().sum::<f64>();
        if residual.abs() < 1e-12 {
            return weights;
        }
        let free: Vec<usize> = (0..N)
            .filter(|&i| {
                (residual > 0.0 && weights[i] < max) || (residual < 0.0 && weights[i] > min)
            })
            .collect();
        let free_sum: f64 = free.iter().map(|&i| weights[i]).sum();
        if free.is_empty() || free_sum <= 0.0 {
            break;
        }
        for i in free {
            weights[i] = (weights[i] + residual * weights[i] / free_sum).clamp(min, max);
        }
    }

    // Infeasible bounds: fall back to plain rescaling.
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 && (sum - 1.0).abs() >= 1e-12 {
        for w in weights.iter_mut() {
            *w /= sum;
        }
    }
    weights
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    pub pattern_match: f64,
    pub historical_success: f64,
    pub context_completeness: f64,
    pub resource_availability: f64,
}

impl ConfidenceWeights {
    pub fn as_array(&self) -> [f64; 4] {
        [
            self.pattern_match,
            self.historical_success,
            self.context_completeness,
            self.resource_availability,
        ]
    }

    pub fn from_array(w: [f64; 4]) -> Self {
        Self {
            pattern_match: w[0],
            historical_success: w[1],
            context_completeness: w[2],
            resource_availability: w[3],
        }
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            pattern_match: 0.4,
            historical_success: 0.3,
            context_completeness: 0.2,
            resource_availability: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefinedWeights {
    pub domain_count: f64,
    pub parameter_complexity: f64,
    pub interdependency: f64,
    pub resource_estimate: f64,
    pub historical_failure: f64,
}

impl RefinedWeights {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.domain_count,
            self.parameter_complexity,
            self.interdependency,
            self.resource_estimate,
            self.historical_failure,
        ]
    }

    pub fn from_array(w: [f64; 5]) -> Self {
        Self {
            domain_count: w[0],
            parameter_complexity: w[1],
            interdependency: w[2],
            resource_estimate: w[3],
            historical_failure: w[4],
        }
    }

    pub fn sum(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

impl Default for RefinedWeights {
    fn default() -> Self {
        Self {
            domain_count: 0.3,
            parameter_complexity: 0.2,
            interdependency: 0.2,
            resource_estimate: 0.15,
            historical_failure: 0.15,
        }
    }
}

/// Thresholds the feedback loop may nudge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveThresholds {
    pub escalation: f64,
    pub orchestration_confidence: f64,
}

impl AdaptiveThresholds {
    pub const ESCALATION_BOUNDS: (f64, f64) = (0.5, 0.9);
    pub const ORCHESTRATION_BOUNDS: (f64, f64) = (0.4, 0.8);

    pub fn from_config(thresholds: &ThresholdConfig) -> Self {
        Self {
            escalation: thresholds.escalation,
            orchestration_confidence: thresholds.orchestration_confidence,
        }
    }
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self::from_config(&ThresholdConfig::default())
    }
}

/// Process-wide scoring weights. Replaced whole, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightSet {
    pub confidence: ConfidenceWeights,
    pub refined: RefinedWeights,
    pub thresholds: AdaptiveThresholds,
    /// Bumped on every swap.
    pub version: u64,
    /// Outcomes applied so far; drives learning-rate decay.
    pub iteration: u64,
}

impl WeightSet {
    pub fn from_config(thresholds: &ThresholdConfig) -> Self {
        Self {
            confidence: ConfidenceWeights::default(),
            refined: RefinedWeights::default(),
            thresholds: AdaptiveThresholds::from_config(thresholds),
            version: 0,
            iteration: 0,
        }
    }

    /// Step size after `iteration` applied outcomes.
    pub fn learning_rate(&self, config: &FeedbackConfig) -> f64 {
        config.learning_rate / (1.0 + config.decay * self.iteration as f64)
    }

    /// Renormalize both weight groups within the configured bounds.
    pub fn normalized(mut self, config: &FeedbackConfig) -> Self {
        self.confidence = ConfidenceWeights::from_array(normalize_bounded(
            self.confidence.as_array(),
            config.min_weight,
            config.max_weight,
        ));
        self.refined = RefinedWeights::from_array(normalize_bounded(
            self.refined.as_array(),
            config.min_weight,
            config.max_weight,
        ));
        self
    }
}

impl Default for WeightSet {
    fn default() -> Self {
        Self::from_config(&ThresholdConfig::default())
    }
}

pub type SharedWeightStore = Arc<WeightStore>;

/// Copy-then-swap holder of the current [`WeightSet`].
#[derive(Debug)]
pub struct WeightStore {
    current: RwLock<Arc<WeightSet>>,
}

impl WeightStore {
    pub fn new(initial: WeightSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Consistent view for one request.
    pub fn snapshot(&self) -> RoutingResult<Arc<WeightSet>> {
        self.current
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| RoutingError::LockPoisoned("weight store"))
    }

    /// Compute a new set from the current one and swap it in.
    ///
    /// `update` runs under the write lock so concurrent updates serialize;
    /// readers keep whichever `Arc` they already hold.
    pub fn update<F>(&self, update: F) -> RoutingResult<Arc<WeightSet>>
    where
        F: FnOnce(&WeightSet) -> WeightSet,
    {
        let mut guard = self
            .current
            .write()
            .map_err(|_| RoutingError::LockPoisoned("weight store"))?;
        let mut next = update(&guard);
        next.version = guard.version + 1;
        let next = Arc::new(next);
        *guard = Arc::clone(&next);
        Ok(next)
    }

    /// Reset the adaptive thresholds, keeping learned weights.
    pub fn reseed_thresholds(&self, thresholds: &ThresholdConfig) -> RoutingResult<Arc<WeightSet>> {
        self.update(|current| WeightSet {
            thresholds: AdaptiveThresholds::from_config(thresholds),
            ..current.clone()
        })
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new(WeightSet::default())
    }
}
