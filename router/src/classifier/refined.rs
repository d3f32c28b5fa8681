//! Refined Scorer: five-factor complexity score for STANDARD tasks
//!
//! | Factor                 | Formula                                                  |
//! |------------------------|----------------------------------------------------------|
//! | `domain_count`         | min(detected domains / 4, 1)                             |
//! | `parameter_complexity` | min(0.15·scope + 0.2·complex actions + 0.1·numerics, 1)  |
//! | `interdependency`      | min(connector occurrences / 4, 1)                        |
//! | `resource_estimate`    | min(estimated tokens / 30 000, 1)                        |
//! | `historical_failure`   | failure rate for the similarity key, 0.5 when unknown    |
//!
//! The score is the dot product with the current
//! [`RefinedWeights`](crate::learning::RefinedWeights). The three text-only
//! factors are computed while domain detection runs.

use super::{ClassificationResult, Tier};
use crate::error::RoutingResult;
use crate::learning::RefinedWeights;
use crate::signature::Tokens;
use serde::{Deserialize, Serialize};

const SCOPE_WORDS: &[&str] = &[
    "multiple", "several", "many", "all", "complete", "full", "every", "entire", "various",
];

/// Stems of actions that span components.
const COMPLEX_ACTION_STEMS: &[&str] = &[
    "integrat",
    "coordinat",
    "orchestrat",
    "manag",
    "migrat",
    "synchroniz",
    "refactor",
];

const CONNECTORS: &[&str] = &[
    "and", "with", "then", "after", "before", "depends", "dependent", "between", "across",
    "while", "plus", "also", "both",
];

const DOMAIN_DIVISOR: f64 = 4.0;
const CONNECTOR_DIVISOR: f64 = 4.0;
const TOKEN_CEILING: f64 = 30_000.0;

/// Factors derivable from the text alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFactors {
    pub parameter_complexity: f64,
    pub interdependency: f64,
    pub resource_estimate: f64,
}

/// All five factors, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinedFactors {
    pub domain_count: f64,
    pub parameter_complexity: f64,
    pub interdependency: f64,
    pub resource_estimate: f64,
    pub historical_failure: f64,
}

impl RefinedFactors {
    pub fn as_array(&self) -> [f64; 5] {
        [
            self.domain_count,
            self.parameter_complexity,
            self.interdependency,
            self.resource_estimate,
            self.historical_failure,
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RefinedScorer {
    simple_below: f64,
    complex_above: f64,
}

impl RefinedScorer {
    pub fn new(simple_below: f64, complex_above: f64) -> Self {
        Self {
            simple_below,
            complex_above,
        }
    }

    /// Text-only factors; cheap enough to run alongside detection.
    pub fn text_factors(tokens: &Tokens, estimated_tokens: u32) -> TextFactors {
        let scope = tokens.count_hits(SCOPE_WORDS) as f64;
        let actions = COMPLEX_ACTION_STEMS
            .iter()
            .filter(|stem| tokens.has_prefix(stem))
            .count() as f64;
        let numerics = tokens
            .iter()
            .filter(|t| t.chars().any(|c| c.is_ascii_digit()))
            .count() as f64;
        let connectors = tokens.iter().filter(|t| CONNECTORS.contains(t)).count() as f64;

        TextFactors {
            parameter_complexity: (0.15 * scope + 0.2 * actions + 0.1 * numerics).min(1.0),
            interdependency: (connectors / CONNECTOR_DIVISOR).min(1.0),
            resource_estimate: (estimated_tokens as f64 / TOKEN_CEILING).min(1.0),
        }
    }

    pub fn factors(
        text: TextFactors,
        domain_count: usize,
        historical_failure: Option<f64>,
    ) -> RefinedFactors {
        RefinedFactors {
            domain_count: (domain_count as f64 / DOMAIN_DIVISOR).min(1.0),
            parameter_complexity: text.parameter_complexity,
            interdependency: text.interdependency,
            resource_estimate: text.resource_estimate,
            historical_failure: historical_failure.unwrap_or(0.5).clamp(0.0, 1.0),
        }
    }

    pub fn score(factors: &RefinedFactors, weights: &RefinedWeights) -> f64 {
        factors
            .as_array()
            .iter()
            .zip(weights.as_array())
            .map(|(f, w)| f * w)
            .sum()
    }

    pub fn tier_for(&self, score: f64) -> Tier {
        if score < self.simple_below {
            Tier::SimpleRefined
        } else if score > self.complex_above {
            Tier::ComplexRefined
        } else {
            Tier::StandardConfirmed
        }
    }

    /// Refine a coarse STANDARD result.
    pub fn refine(
        &self,
        coarse: &ClassificationResult,
        factors: RefinedFactors,
        weights: &RefinedWeights,
    ) -> RoutingResult<ClassificationResult> {
        let score = Self::score(&factors, weights);
        coarse.refine(self.tier_for(score), score, factors)
    }
}

impl Default for RefinedScorer {
    fn default() -> Self {
        Self::new(0.3, 0.7)
    }
}
