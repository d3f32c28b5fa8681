//! Task signatures and tokenization.
//!
//! A [`TaskSignature`] is the anonymized cache/learning form of a task:
//! lower-cased, punctuation stripped, stop words removed. Its `key` is a
//! blake3 digest over the normalized text and the canonical hints, so two
//! requests with the same wording and hints share cache entries.
//!
//! [`Tokens`] is the shared keyword-matching view of the raw text. Hyphenated
//! and slash-separated tokens also match on their parts
//! (`enterprise-wide` matches `enterprise`).

use crate::task::TaskDescription;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "to", "of", "for", "in", "on", "at", "by", "is", "are", "be", "it", "this",
    "that", "these", "those", "please", "my", "our", "your", "we", "i", "me", "can", "could",
    "would", "should",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskSignature {
    pub normalized: String,
    pub key: String,
}

impl TaskSignature {
    pub fn compute(task: &TaskDescription) -> Self {
        let normalized = normalize(&task.text);
        let mut hasher = blake3::Hasher::new();
        hasher.update(normalized.as_bytes());
        if let Some(hints) = &task.hints {
            hasher.update(&[0x1f]);
            hasher.update(hints.canonical().as_bytes());
        }
        Self {
            normalized,
            key: hasher.finalize().to_hex().to_string(),
        }
    }
}

/// Lower-case, strip punctuation, drop stop words, collapse whitespace.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(clean_token)
        .filter(|t| !t.is_empty() && !STOP_WORDS.contains(&t.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case and trim surrounding punctuation. Inner `-`, `.`, `/`, `_`
/// survive so file names and hyphenated words stay intact.
fn clean_token(raw: &str) -> String {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '*' && c != '_')
        .to_lowercase()
}

/// Token view of a task text used by every keyword matcher.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    ordered: Vec<String>,
    lookup: HashSet<String>,
}

impl Tokens {
    pub fn new(text: &str) -> Self {
        let ordered: Vec<String> = text
            .split_whitespace()
            .map(clean_token)
            .filter(|t| !t.is_empty())
            .collect();

        let mut lookup = HashSet::with_capacity(ordered.len() * 2);
        for token in &ordered {
            lookup.insert(token.clone());
            if token.contains(['-', '/']) {
                for part in token.split(['-', '/']).filter(|p| !p.is_empty()) {
                    lookup.insert(part.to_string());
                }
            }
        }

        Self { ordered, lookup }
    }

    /// Exact token (or hyphen/slash part) match.
    pub fn contains(&self, word: &str) -> bool {
        self.lookup.contains(word)
    }

    /// Any token (or part) starting with `prefix`.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.lookup.iter().any(|t| t.starts_with(prefix))
    }

    /// Number of distinct entries of `words` present.
    pub fn count_hits(&self, words: &[&str]) -> usize {
        words.iter().filter(|w| self.contains(w)).count()
    }

    /// Like [`count_hits`](Self::count_hits) for owned keyword lists.
    pub fn count_owned_hits(&self, words: &[String]) -> usize {
        words.iter().filter(|w| self.contains(w)).count()
    }

    /// Tokens in their original order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ordered.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::StructuredHints;

    #[test]
    fn test_normalize_strips_punctuation_and_stop_words() {
        assert_eq!(
            normalize("Please FIX the login bug, in auth.rs!"),
            "fix login bug auth.rs"
        );
    }

    #[test]
    fn test_same_text_same_key() {
        let a = TaskSignature::compute(&TaskDescription::new("Check config file status"));
        let b = TaskSignature::compute(&TaskDescription::new("check   config file status."));
        assert_eq!(a, b);
        assert_eq!(a.key.len(), 64);
    }

    #[test]
    fn test_hints_change_key() {
        let plain = TaskSignature::compute(&TaskDescription::new("build form"));
        let hinted = TaskSignature::compute(
            &TaskDescription::new("build form")
                .with_hints(StructuredHints::default().with_file_pattern("*.tsx")),
        );
        assert_eq!(plain.normalized, hinted.normalized);
        assert_ne!(plain.key, hinted.key);
    }

    #[test]
    fn test_hyphenated_tokens_match_parts() {
        let tokens = Tokens::new("comprehensive enterprise-wide migration");
        assert!(tokens.contains("enterprise-wide"));
        assert!(tokens.contains("enterprise"));
        assert!(tokens.contains("wide"));
        assert!(!tokens.contains("enterprises"));
    }

    #[test]
    fn test_prefix_and_hit_counting() {
        let tokens = Tokens::new("Optimize the Postgres query.");
        assert!(tokens.has_prefix("optimiz"));
        assert_eq!(tokens.count_hits(&["postgres", "query", "mysql"]), 2);
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_file_names_survive_tokenization() {
        let tokens = Tokens::new("update (src/App.tsx),");
        assert!(tokens.contains("src/app.tsx"));
        assert!(tokens.contains("app.tsx"));
    }
}
