//! Coarse Classifier: cheap keyword-density pass
//!
//! Pure and deterministic: counts distinct simple and complex indicator
//! keywords, normalizes each count by a fixed divisor and picks a tier.
//!
//! ```text
//! simple_score  = min(simple_hits  / 3, 1)
//! complex_score = min(complex_hits / 4, 1)
//!
//! simple_score  > 0.6 → SIMPLE    score = 0.4 − 0.2·simple_score
//! complex_score > 0.4 → COMPLEX   score = min(0.6 + 0.4·complex_score, 1)
//! otherwise           → STANDARD  score = 0.5
//! ```

use super::{ClassificationResult, Tier};
use crate::signature::Tokens;
use serde::{Deserialize, Serialize};

/// Keywords that indicate read-only or lookup work.
const SIMPLE_INDICATORS: &[&str] = &[
    "read", "check", "status", "get", "show", "list", "display", "view", "find", "search",
    "look", "see",
];

/// Keywords that indicate broad, cross-cutting work.
const COMPLEX_INDICATORS: &[&str] = &[
    "comprehensive",
    "system-wide",
    "enterprise",
    "architecture",
    "modernize",
    "platform",
    "microservices",
    "strategic",
    "complete",
    "full",
    "entire",
    "overhaul",
    "transform",
    "migration",
    "redesign",
    "distributed",
];

const SIMPLE_DIVISOR: f64 = 3.0;
const COMPLEX_DIVISOR: f64 = 4.0;
const STANDARD_SCORE: f64 = 0.5;

/// Token budget ranges per tier family, from lookup work to platform work.
const SIMPLE_TOKENS: (u32, u32) = (3_000, 8_000);
const STANDARD_TOKENS: (u32, u32) = (6_000, 18_000);
const COMPLEX_TOKENS: (u32, u32) = (12_000, 30_000);

/// Word count at which a task reaches the top of its token range.
const TOKEN_SATURATION_WORDS: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoarseScores {
    pub simple_score: f64,
    pub complex_score: f64,
    pub simple_hits: usize,
    pub complex_hits: usize,
}

#[derive(Debug, Clone)]
pub struct CoarseClassifier {
    simple_threshold: f64,
    complex_threshold: f64,
}

impl CoarseClassifier {
    pub fn new(simple_threshold: f64, complex_threshold: f64) -> Self {
        Self {
            simple_threshold,
            complex_threshold,
        }
    }

    pub fn scores(tokens: &Tokens) -> CoarseScores {
        let simple_hits = tokens.count_hits(SIMPLE_INDICATORS);
        let complex_hits = tokens.count_hits(COMPLEX_INDICATORS);
        CoarseScores {
            simple_score: (simple_hits as f64 / SIMPLE_DIVISOR).min(1.0),
            complex_score: (complex_hits as f64 / COMPLEX_DIVISOR).min(1.0),
            simple_hits,
            complex_hits,
        }
    }

    pub fn classify(&self, tokens: &Tokens) -> ClassificationResult {
        let coarse = Self::scores(tokens);

        let (tier, score) = if coarse.simple_score > self.simple_threshold {
            (Tier::Simple, 0.4 - 0.2 * coarse.simple_score)
        } else if coarse.complex_score > self.complex_threshold {
            (Tier::Complex, (0.6 + 0.4 * coarse.complex_score).min(1.0))
        } else {
            (Tier::Standard, STANDARD_SCORE)
        };

        ClassificationResult {
            tier,
            score,
            coarse_tier: tier,
            coarse,
            refined: None,
            estimated_tokens: estimate_tokens(tier, tokens.len()),
        }
    }
}

impl Default for CoarseClassifier {
    fn default() -> Self {
        Self::new(0.6, 0.4)
    }
}

/// Rough token budget for a task of `tier` with `word_count` words.
pub fn estimate_tokens(tier: Tier, word_count: usize) -> u32 {
    let (low, high) = match tier.family() {
        Tier::Simple => SIMPLE_TOKENS,
        Tier::Complex => COMPLEX_TOKENS,
        _ => STANDARD_TOKENS,
    };
    let fill = (word_count as f64 / TOKEN_SATURATION_WORDS).min(1.0);
    low + ((high - low) as f64 * fill).round() as u32
}

/// Rough wall-clock estimate in minutes for planning payloads.
pub fn estimate_minutes(tier: Tier, domain_count: usize) -> u32 {
    let base = match tier.family() {
        Tier::Simple => 5,
        Tier::Complex => 45,
        _ => 15,
    };
    base + 10 * domain_count.saturating_sub(1) as u32
}
