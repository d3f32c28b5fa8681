//! Input validation for task descriptions.
//!
//! Runs before the circuit breaker boundary: a rejected task fails fast
//! with a specific error and never counts as a pipeline failure.

use crate::error::{RoutingError, RoutingResult};

/// Fragments that indicate an attempt to smuggle executable payloads
/// through the routing text.
const DISALLOWED_PATTERNS: &[&str] = &["eval(", "exec(", "__import__", "subprocess"];

#[derive(Debug, Clone)]
pub struct TaskValidator {
    max_chars: usize,
}

impl TaskValidator {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    /// Validate and sanitize in one step, returning the text to route.
    pub fn check(&self, text: &str) -> RoutingResult<String> {
        let sanitized = sanitize(text);
        if sanitized.is_empty() {
            return Err(RoutingError::EmptyTask);
        }

        let len = sanitized.chars().count();
        if len > self.max_chars {
            return Err(RoutingError::TaskTooLong {
                len,
                max: self.max_chars,
            });
        }

        let lower = sanitized.to_lowercase();
        if let Some(pattern) = DISALLOWED_PATTERNS.iter().find(|p| lower.contains(*p)) {
            return Err(RoutingError::UnsafeContent {
                pattern: (*pattern).to_string(),
            });
        }

        Ok(sanitized)
    }
}

impl Default for TaskValidator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_MAX_TASK_CHARS)
    }
}

/// Collapse whitespace runs and strip control characters.
pub fn sanitize(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.chars().filter(|c| !c.is_control()).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
