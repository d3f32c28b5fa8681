//! Complexity classification.
//!
//! ```text
//! text ──► CoarseClassifier ──► SIMPLE ───────────────────────► (cache-worthy)
//!                          ├──► COMPLEX ──────────────────────► (cache-worthy)
//!                          └──► STANDARD ──► RefinedScorer ──► SIMPLE_REFINED
//!                                                          ├─► STANDARD_CONFIRMED
//!                                                          └─► COMPLEX_REFINED
//! ```
//!
//! A result moves coarse → refined at most once and only from `STANDARD`.

pub mod coarse;
pub mod refined;

pub use coarse::{CoarseClassifier, CoarseScores};
pub use refined::{RefinedFactors, RefinedScorer, TextFactors};

use crate::error::{RoutingError, RoutingResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Simple,
    Standard,
    Complex,
    SimpleRefined,
    StandardConfirmed,
    ComplexRefined,
}

impl Tier {
    /// Whether this tier came out of the refined pass.
    pub fn is_refined(&self) -> bool {
        matches!(
            self,
            Self::SimpleRefined | Self::StandardConfirmed | Self::ComplexRefined
        )
    }

    /// Collapse refined sub-states onto their coarse bucket.
    pub fn family(&self) -> Tier {
        match self {
            Self::Simple | Self::SimpleRefined => Self::Simple,
            Self::Standard | Self::StandardConfirmed => Self::Standard,
            Self::Complex | Self::ComplexRefined => Self::Complex,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Simple => write!(f, "SIMPLE"),
            Self::Standard => write!(f, "STANDARD"),
            Self::Complex => write!(f, "COMPLEX"),
            Self::SimpleRefined => write!(f, "SIMPLE_REFINED"),
            Self::StandardConfirmed => write!(f, "STANDARD_CONFIRMED"),
            Self::ComplexRefined => write!(f, "COMPLEX_REFINED"),
        }
    }
}

/// Tier plus complexity score in [0,1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: Tier,
    pub score: f64,
    /// Tier assigned by the coarse pass; unchanged by refinement.
    pub coarse_tier: Tier,
    pub coarse: CoarseScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined: Option<RefinedFactors>,
    pub estimated_tokens: u32,
}

impl ClassificationResult {
    /// Apply the refined pass. Only a coarse `STANDARD` result may be refined.
    pub fn refine(&self, tier: Tier, score: f64, factors: RefinedFactors) -> RoutingResult<Self> {
        if self.tier != Tier::Standard || !tier.is_refined() {
            return Err(RoutingError::InvalidTierTransition {
                from: self.tier,
                to: tier,
            });
        }
        Ok(Self {
            tier,
            score: score.clamp(0.0, 1.0),
            coarse_tier: self.coarse_tier,
            coarse: self.coarse,
            refined: Some(factors),
            estimated_tokens: self.estimated_tokens,
        })
    }

    /// Neutral classification used by fallback decisions.
    pub fn neutral() -> Self {
        Self {
            tier: Tier::Standard,
            score: 0.5,
            coarse_tier: Tier::Standard,
            coarse: CoarseScores::default(),
            refined: None,
            estimated_tokens: 0,
        }
    }
}
