//! Domain Detector
//!
//! Scores every [`DomainSignature`] against the task concurrently. Each
//! signature gets its own task on a [`JoinSet`] over shared immutable data;
//! the detector merges whatever has finished when `max_wait` elapses and
//! marks the analysis `timed_out` instead of failing the request.
//!
//! ```text
//! confidence = 0.60 · min(distinct keyword hits / 2, 1)
//!            + 0.25 · [any file pattern matches]
//!            + 0.15 · [any verb prefixes a token]      (only with another signal)
//!            + 0.20   if the caller declared the domain (clamped to 1)
//! ```

use crate::error::{RoutingError, RoutingResult};
use crate::otel::Stage;
use crate::registry::DomainSignature;
use crate::signature::Tokens;
use crate::task::StructuredHints;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const KEYWORD_SATURATION: f64 = 2.0;
const DECLARED_BOOST: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainScoreWeights {
    pub keyword: f64,
    pub file_pattern: f64,
    pub verb: f64,
}

impl Default for DomainScoreWeights {
    fn default() -> Self {
        Self {
            keyword: 0.6,
            file_pattern: 0.25,
            verb: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainMatch {
    pub domain: String,
    pub confidence: f64,
    pub complexity_bias: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainAnalysis {
    /// Sorted by confidence descending, then domain id.
    pub matches: Vec<DomainMatch>,
    /// Sum of match confidences.
    pub total_confidence: f64,
    /// Mean complexity bias of the matches; 0.5 with none.
    pub complexity_adjustment: f64,
    /// Some matchers had not finished when the wait budget ran out.
    #[serde(default)]
    pub timed_out: bool,
}

impl DomainAnalysis {
    pub fn empty() -> Self {
        Self {
            matches: Vec::new(),
            total_confidence: 0.0,
            complexity_adjustment: 0.5,
            timed_out: false,
        }
    }

    fn from_matches(mut matches: Vec<DomainMatch>, timed_out: bool) -> RoutingResult<Self> {
        matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.domain.cmp(&b.domain))
        });
        let total_confidence = matches.iter().map(|m| m.confidence).sum();
        let complexity_adjustment = if matches.is_empty() {
            0.5
        } else {
            matches.iter().map(|m| m.complexity_bias).sum::<f64>() / matches.len() as f64
        };
        if !complexity_adjustment.is_finite() {
            return Err(RoutingError::pipeline(
                Stage::Detect,
                "non-finite complexity bias in detected domains",
            ));
        }
        Ok(Self {
            matches,
            total_confidence,
            complexity_adjustment,
            timed_out,
        })
    }

    pub fn domain_count(&self) -> usize {
        self.matches.len()
    }

    pub fn primary(&self) -> Option<&DomainMatch> {
        self.matches.first()
    }

    pub fn domain_ids(&self) -> impl Iterator<Item = &str> {
        self.matches.iter().map(|m| m.domain.as_str())
    }
}

/// Per-request hint data shared by all matcher tasks.
#[derive(Debug, Default)]
struct HintView {
    files: Vec<String>,
    declared: BTreeSet<String>,
}

impl HintView {
    fn new(hints: Option<&StructuredHints>) -> Self {
        match hints {
            None => Self::default(),
            Some(h) => Self {
                files: h.file_patterns.clone(),
                declared: h
                    .declared_domains
                    .iter()
                    .map(|d| d.trim().to_lowercase())
                    .collect(),
            },
        }
    }
}

/// Confidence that `signature` applies; 0.0 when nothing but verbs matched.
pub fn score_signature(
    signature: &DomainSignature,
    tokens: &Tokens,
    hinted_files: &[String],
    declared: bool,
    weights: &DomainScoreWeights,
) -> f64 {
    let keyword = (tokens.count_owned_hits(&signature.keywords) as f64 / KEYWORD_SATURATION).min(1.0);
    let file = tokens.iter().any(|t| signature.matches_file(t))
        || hinted_files.iter().any(|f| signature.matches_file(f));
    let file = if file { 1.0 } else { 0.0 };

    if keyword == 0.0 && file == 0.0 && !declared {
        return 0.0;
    }

    let verb = if signature.verbs.iter().any(|v| tokens.has_prefix(v)) {
        1.0
    } else {
        0.0
    };
    let mut confidence = weights.keyword * keyword + weights.file_pattern * file;
    if keyword > 0.0 || file > 0.0 {
        confidence += weights.verb * verb;
    }
    if declared {
        confidence += DECLARED_BOOST;
    }
    confidence.clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct DomainDetector {
    weights: DomainScoreWeights,
    activation: f64,
    max_wait: Duration,
}

impl DomainDetector {
    pub fn new(activation: f64, max_wait: Duration) -> Self {
        Self {
            weights: DomainScoreWeights::default(),
            activation,
            max_wait,
        }
    }

    pub fn with_weights(mut self, weights: DomainScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    /// Detect every domain whose confidence exceeds the activation threshold.
    pub async fn detect(
        &self,
        signatures: &[Arc<DomainSignature>],
        tokens: Arc<Tokens>,
        hints: Option<&StructuredHints>,
    ) -> RoutingResult<DomainAnalysis> {
        let view = Arc::new(HintView::new(hints));
        let mut set = JoinSet::new();

        for signature in signatures {
            let signature = Arc::clone(signature);
            let tokens = Arc::clone(&tokens);
            let view = Arc::clone(&view);
            let weights = self.weights;
            let activation = self.activation;
            set.spawn(async move {
                let declared = view.declared.contains(&signature.id);
                let confidence =
                    score_signature(&signature, &tokens, &view.files, declared, &weights);
                (confidence > activation).then(|| DomainMatch {
                    domain: signature.id.clone(),
                    confidence,
                    complexity_bias: signature.complexity_bias,
                })
            });
        }

        let deadline = tokio::time::Instant::now() + self.max_wait;
        let mut matches = Vec::new();
        let mut timed_out = false;

        loop {
            // timeout_at polls the set first; an expired deadline wins.
            if !set.is_empty() && tokio::time::Instant::now() >= deadline {
                timed_out = true;
                break;
            }
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok(found))) => matches.extend(found),
                Ok(Some(Err(e))) => {
                    set.abort_all();
                    return Err(RoutingError::pipeline(
                        Stage::Detect,
                        format!("domain matcher failed: {e}"),
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }

        if timed_out {
            while let Some(joined) = set.try_join_next() {
                if let Ok(found) = joined {
                    matches.extend(found);
                }
            }
            let pending = set.len();
            set.abort_all();
            warn!(
                pending,
                merged = matches.len(),
                max_wait_ms = self.max_wait.as_millis() as u64,
                "Domain detection exceeded wait budget; merged partial results"
            );
        }

        let analysis = DomainAnalysis::from_matches(matches, timed_out)?;
        debug!(
            domains = ?analysis.domain_ids().collect::<Vec<_>>(),
            total_confidence = analysis.total_confidence,
            "Domains detected"
        );
        Ok(analysis)
    }
}

impl Default for DomainDetector {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_ACTIVATION_THRESHOLD,
            Duration::from_millis(crate::config::DEFAULT_DETECTOR_MAX_WAIT_MS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog::builtin_domains;
    use crate::registry::DomainSpec;

    fn signatures() -> Vec<Arc<DomainSignature>> {
        builtin_domains()
            .iter()
            .map(|s| Arc::new(DomainSignature::compile(s).unwrap()))
            .collect()
    }

    fn signature(id: &str) -> DomainSignature {
        builtin_domains()
            .iter()
            .find(|s| s.id == id)
            .map(|s| DomainSignature::compile(s).unwrap())
            .unwrap()
    }

    async fn detect(text: &str, hints: Option<&StructuredHints>) -> DomainAnalysis {
        DomainDetector::default()
            .detect(&signatures(), Arc::new(Tokens::new(text)), hints)
            .await
            .unwrap()
    }

    #[test]
    fn test_verbs_alone_never_activate() {
        let sig = signature("performance");
        let tokens = Tokens::new("optimizing things");
        let score = score_signature(&sig, &tokens, &[], false, &DomainScoreWeights::default());
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_keyword_and_verb_combine() {
        let sig = signature("performance");
        let tokens = Tokens::new("optimization work");
        let score = score_signature(&sig, &tokens, &[], false, &DomainScoreWeights::default());
        assert!((score - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_declared_domain_boost() {
        let sig = signature("frontend");
        let tokens = Tokens::new("react widget");
        let plain = score_signature(&sig, &tokens, &[], false, &DomainScoreWeights::default());
        let boosted = score_signature(&sig, &tokens, &[], true, &DomainScoreWeights::default());
        assert!((boosted - plain - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_multi_domain_text() {
        let analysis = detect("Build a react component and postgres query optimization", None).await;
        let ids: Vec<&str> = analysis.domain_ids().collect();
        assert!(ids.contains(&"frontend"));
        assert!(ids.contains(&"backend"));
        assert!(ids.contains(&"performance"));
        assert!(!analysis.timed_out);
        for m in &analysis.matches {
            assert!(m.confidence > 0.3);
        }
    }

    #[tokio::test]
    async fn test_matches_sorted_by_confidence_then_id() {
        let analysis = detect("react component and postgres query", None).await;
        let ids: Vec<&str> = analysis.domain_ids().collect();
        // equal confidence, so id order decides
        assert_eq!(ids, vec!["backend", "frontend"]);
    }

    #[tokio::test]
    async fn test_no_domains_gives_neutral_adjustment() {
        let analysis = detect("check status", None).await;
        assert_eq!(analysis.domain_count(), 0);
        assert_eq!(analysis.complexity_adjustment, 0.5);
        assert_eq!(analysis.total_confidence, 0.0);
    }

    #[tokio::test]
    async fn test_hinted_files_count_as_file_match() {
        let hints = StructuredHints::default().with_file_pattern("src/components/Button.tsx");
        let analysis = detect("react button", Some(&hints)).await;
        let frontend = analysis.matches.iter().find(|m| m.domain == "frontend").unwrap();
        assert!(frontend.confidence > 0.3 + 0.25 - 1e-9);
    }

    #[tokio::test]
    async fn test_non_finite_bias_is_pipeline_error() {
        let spec = DomainSpec {
            id: "broken".into(),
            keywords: vec!["widget".into(), "gadget".into()],
            file_patterns: vec![],
            verbs: vec![],
            complexity_bias: f64::NAN,
        };
        let sigs = vec![Arc::new(DomainSignature::compile(&spec).unwrap())];
        let err = DomainDetector::default()
            .detect(&sigs, Arc::new(Tokens::new("widget gadget")), None)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Detect));
    }

    #[tokio::test]
    async fn test_zero_wait_marks_timed_out() {
        let detector = DomainDetector::new(0.3, Duration::ZERO);
        let analysis = detector
            .detect(&signatures(), Arc::new(Tokens::new("react component")), None)
            .await
            .unwrap();
        assert!(analysis.timed_out);
    }
}
