//! Request input: task text plus optional structured hints.

use serde::{Deserialize, Serialize};

/// Optional structured context supplied with a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredHints {
    /// File globs or paths the task touches, e.g. `src/components/*.tsx`.
    pub file_patterns: Vec<String>,
    /// Domains the caller already knows are involved.
    pub declared_domains: Vec<String>,
    pub working_context: Option<String>,
    pub acceptance_criteria: Vec<String>,
}

impl StructuredHints {
    /// Number of hint fields the completeness score considers.
    pub const FIELD_COUNT: usize = 4;

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_patterns.push(pattern.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.declared_domains.push(domain.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.working_context = Some(context.into());
        self
    }

    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.acceptance_criteria.push(criterion.into());
        self
    }

    /// Count of non-empty hint fields.
    pub fn filled_fields(&self) -> usize {
        [
            self.file_patterns.iter().any(|p| !p.trim().is_empty()),
            self.declared_domains.iter().any(|d| !d.trim().is_empty()),
            self.working_context
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty()),
            self.acceptance_criteria.iter().any(|c| !c.trim().is_empty()),
        ]
        .into_iter()
        .filter(|filled| *filled)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.filled_fields() == 0
    }

    /// Stable rendering used as part of the cache key.
    pub fn canonical(&self) -> String {
        let mut files: Vec<&str> = self.file_patterns.iter().map(|s| s.trim()).collect();
        files.sort_unstable();
        files.dedup();
        let mut domains: Vec<String> = self
            .declared_domains
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();
        domains.sort_unstable();
        domains.dedup();
        format!(
            "files={};domains={};context={};criteria={}",
            files.join(","),
            domains.join(","),
            self.working_context.as_deref().unwrap_or("").trim(),
            self.acceptance_criteria.join("|"),
        )
    }
}

/// A unit of work to classify. Immutable for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescription {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<StructuredHints>,
}

impl TaskDescription {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            hints: None,
        }
    }

    pub fn with_hints(mut self, hints: StructuredHints) -> Self {
        self.hints = Some(hints);
        self
    }

    /// Hinted file patterns, empty when no hints were supplied.
    pub fn file_patterns(&self) -> &[String] {
        self.hints
            .as_ref()
            .map(|h| h.file_patterns.as_slice())
            .unwrap_or(&[])
    }

    pub fn declared_domains(&self) -> &[String] {
        self.hints
            .as_ref()
            .map(|h| h.declared_domains.as_slice())
            .unwrap_or(&[])
    }
}
