//! Outcome history per similarity key.
//!
//! Similar tasks share a key made of the coarse tier and the sorted detected
//! domains (`STANDARD|backend+frontend`, `SIMPLE|none`). Each key keeps a
//! sliding window of its most recent outcomes; outcomes older than the max
//! age are ignored and pruned. Rates are `None` until a key has a sample, so
//! callers fall back to the neutral 0.5.

use crate::classifier::Tier;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Build the similarity key for a tier and a set of domain ids.
pub fn similarity_key<'a, I>(tier: Tier, domains: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut ids: Vec<&str> = domains.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    let joined = if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join("+")
    };
    format!("{}|{}", tier.family(), joined)
}

#[derive(Debug)]
pub struct OutcomeHistory {
    window: usize,
    max_age: ChronoDuration,
    entries: Mutex<HashMap<String, VecDeque<(DateTime<Utc>, bool)>>>,
}

impl OutcomeHistory {
    pub fn new(window: usize, max_age: std::time::Duration) -> Self {
        Self {
            window: window.max(1),
            max_age: ChronoDuration::from_std(max_age).unwrap_or(ChronoDuration::days(7)),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn record(&self, key: &str, success: bool, at: DateTime<Utc>) {
        let Ok(mut entries) = self.entries.lock() else {
            tracing::debug!(key, "Outcome history lock poisoned; outcome dropped");
            return;
        };
        let samples = entries.entry(key.to_string()).or_default();
        samples.push_back((at, success));
        while samples.len() > self.window {
            samples.pop_front();
        }
    }

    /// Success rate over the live window, evaluated at `now`.
    pub fn success_rate_at(&self, key: &str, now: DateTime<Utc>) -> Option<f64> {
        let mut entries = self.entries.lock().ok()?;
        let samples = entries.get_mut(key)?;
        let cutoff = now - self.max_age;
        while samples.front().is_some_and(|(at, _)| *at < cutoff) {
            samples.pop_front();
        }
        if samples.is_empty() {
            return None;
        }
        let successes = samples.iter().filter(|(_, ok)| *ok).count();
        Some(successes as f64 / samples.len() as f64)
    }

    pub fn success_rate(&self, key: &str) -> Option<f64> {
        self.success_rate_at(key, Utc::now())
    }

    pub fn failure_rate(&self, key: &str) -> Option<f64> {
        self.success_rate(key).map(|rate| 1.0 - rate)
    }

    pub fn sample_count(&self, key: &str) -> usize {
        self.entries
            .lock()
            .map(|e| e.get(key).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }
}
