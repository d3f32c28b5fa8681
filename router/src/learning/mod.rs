//! Adaptive Weight Store
//!
//! Holds the process-wide [`WeightSet`] and learns from routing outcomes off
//! the request path:
//!
//! - [`weights`]: the weight set and its copy-then-swap store
//! - [`ledger`]: recent decisions, so outcome reports can be interpreted
//! - [`history`]: per-similarity-key success windows
//! - [`feedback`]: the batching channel consumer that applies updates

pub mod feedback;
pub mod history;
pub mod ledger;
pub mod weights;

pub use feedback::{
    adjust_thresholds, apply_outcomes, FeedbackLoop, FeedbackMessage, FeedbackSender,
    OutcomeReport,
};
pub use history::{similarity_key, OutcomeHistory};
pub use ledger::{DecisionLedger, DecisionRecord};
pub use weights::{
    normalize_bounded, AdaptiveThresholds, ConfidenceWeights, RefinedWeights, SharedWeightStore,
    WeightSet, WeightStore,
};
