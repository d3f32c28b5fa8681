//! Domain signatures: the keyword, file-pattern and verb sets a domain is
//! recognized by.
//!
//! Sources supply [`DomainSpec`] (plain data, TOML-friendly). The registry
//! compiles each into a [`DomainSignature`] at refresh time so file globs are
//! turned into regexes once, never per request.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Declarative domain definition as supplied by a capability source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSpec {
    pub id: String,
    pub keywords: Vec<String>,
    /// Glob-style file patterns matched against file names (`*.tsx`, `Dockerfile`).
    #[serde(default)]
    pub file_patterns: Vec<String>,
    /// Operation verb stems matched as token prefixes (`optimiz`, `deploy`).
    #[serde(default)]
    pub verbs: Vec<String>,
    pub complexity_bias: f64,
}

/// Compiled, immutable domain signature shared across matcher tasks.
#[derive(Debug, Clone)]
pub struct DomainSignature {
    pub id: String,
    pub keywords: Vec<String>,
    pub file_patterns: Vec<Regex>,
    pub verbs: Vec<String>,
    pub complexity_bias: f64,
}

impl DomainSignature {
    pub fn compile(spec: &DomainSpec) -> Result<Self, regex::Error> {
        let file_patterns = spec
            .file_patterns
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: spec.id.trim().to_lowercase(),
            keywords: lowered(&spec.keywords),
            file_patterns,
            verbs: lowered(&spec.verbs),
            complexity_bias: spec.complexity_bias.clamp(0.0, 1.0),
        })
    }

    /// Whether a path or glob's final segment matches any file pattern.
    pub fn matches_file(&self, path: &str) -> bool {
        let name = path.rsplit('/').next().unwrap_or(path);
        !name.is_empty() && self.file_patterns.iter().any(|re| re.is_match(name))
    }
}

fn lowered(words: &[String]) -> Vec<String> {
    let mut out: Vec<String> = words
        .iter()
        .map(|w| w.trim().to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Translate a file glob into an anchored, case-insensitive regex.
///
/// `*` matches within one path segment, `?` one character. Everything else
/// is literal.
pub fn glob_to_regex(glob: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("(?i)^");
    for c in glob.trim().chars() {
        match c {
            '*' => pattern.push_str("[^/]*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> DomainSpec {
        DomainSpec {
            id: "Frontend".into(),
            keywords: vec!["React".into(), "react".into(), " ui ".into()],
            file_patterns: vec!["*.tsx".into(), "Dockerfile".into()],
            verbs: vec!["Render".into()],
            complexity_bias: 1.4,
        }
    }

    #[test]
    fn test_compile_normalizes_domain_spec() {
        let sig = DomainSignature::compile(&spec()).unwrap();
        assert_eq!(sig.id, "frontend");
        assert_eq!(sig.keywords, vec!["react", "ui"]);
        assert_eq!(sig.verbs, vec!["render"]);
        assert_eq!(sig.complexity_bias, 1.0);
    }

    #[test]
    fn test_matches_file_on_last_segment() {
        let sig = DomainSignature::compile(&spec()).unwrap();
        assert!(sig.matches_file("src/components/App.tsx"));
        assert!(sig.matches_file("src/components/*.tsx"));
        assert!(sig.matches_file("deploy/dockerfile"));
        assert!(!sig.matches_file("src/main.rs"));
        assert!(!sig.matches_file("src/"));
    }

    #[test]
    fn test_glob_literals_escaped() {
        let re = glob_to_regex("docker-compose.y?ml").unwrap();
        assert!(re.is_match("docker-compose.yaml"));
        assert!(!re.is_match("docker-composeXyaml"));
    }
}
