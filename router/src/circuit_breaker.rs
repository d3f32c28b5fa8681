//! Circuit breaker around the classification pipeline.
//!
//! Consecutive pipeline failures inside the failure window trip the breaker
//! *open*; while open no stage runs and callers get the fallback decision.
//! After the cooldown the breaker goes *half-open* and admits one probe
//! request; its outcome closes or re-opens the circuit.
//!
//! ```text
//!          N failures in window            cooldown elapsed
//! CLOSED ───────────────────────► OPEN ───────────────────────► HALF_OPEN
//!   ▲                               ▲                               │
//!   │                               └────────── probe failed ───────┤
//!   └──────────────────────────────────────── probe succeeded ──────┘
//! ```

use crate::config::BreakerConfig;
use crate::otel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Transitions kept for audit.
pub const TRANSITION_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Healthy: requests run the pipeline.
    Closed,
    /// Tripped: requests get the fallback until the cooldown expires.
    Open,
    /// Cooldown expired: one probe request allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected {
        state: CircuitState,
        last_error: Option<String>,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub transitions: usize,
    /// Failures still tolerated before the breaker opens; 0 unless closed.
    pub failures_until_open: u32,
    /// Seconds until an open breaker admits a probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds_until_half_open: Option<u64>,
    /// Successful requests over all requests seen, including rejected ones.
    pub uptime_percentage: f64,
}

#[derive(Debug)]
struct Inner {
    config: BreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    window_start: Option<Instant>,
    last_failure: Option<Instant>,
    last_error: Option<String>,
    probe_in_flight: bool,
    transitions: VecDeque<BreakerTransition>,
    successes: u64,
    failures: u64,
    rejections: u64,
}

impl Inner {
    fn transition(&mut self, to: CircuitState, reason: String) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;

        let span = otel::breaker_span(&from.to_string(), &to.to_string());
        let _guard = span.enter();
        match to {
            CircuitState::Open => warn!(
                %from,
                %to,
                failures = self.consecutive_failures,
                "Routing circuit breaker opened: {reason}"
            ),
            _ => info!(%from, %to, "Routing circuit breaker transition: {reason}"),
        }

        self.transitions.push_back(BreakerTransition {
            from,
            to,
            at: Utc::now(),
            reason,
        });
        while self.transitions.len() > TRANSITION_LOG_CAPACITY {
            self.transitions.pop_front();
        }
    }

    fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.window_start = None;
        self.probe_in_flight = false;
    }
}

/// Process-wide breaker for the routing pipeline.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                window_start: None,
                last_failure: None,
                last_error: None,
                probe_in_flight: false,
                transitions: VecDeque::new(),
                successes: 0,
                failures: 0,
                rejections: 0,
            }),
        }
    }

    // Poisoning is ignored; every field is valid on its own.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask to run the pipeline.
    pub fn try_acquire(&self) -> Admission {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> Admission {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let cooled = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at) >= inner.config.cooldown())
                    .unwrap_or(true);
                if cooled {
                    inner.transition(CircuitState::HalfOpen, "cooldown elapsed".into());
                    inner.probe_in_flight = true;
                    Admission::Allowed
                } else {
                    inner.rejections += 1;
                    Admission::Rejected {
                        state: CircuitState::Open,
                        last_error: inner.last_error.clone(),
                    }
                }
            }
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Admission::Allowed
            }
            CircuitState::HalfOpen => {
                inner.rejections += 1;
                Admission::Rejected {
                    state: CircuitState::HalfOpen,
                    last_error: inner.last_error.clone(),
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.successes += 1;
        match inner.state {
            CircuitState::Closed => inner.reset_failures(),
            CircuitState::HalfOpen => {
                inner.reset_failures();
                inner.transition(CircuitState::Closed, "probe request succeeded".into());
            }
            // A request admitted before the trip finished late; stay open.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, error: &str) {
        self.record_failure_at(Instant::now(), error);
    }

    pub fn record_failure_at(&self, now: Instant, error: &str) {
        let mut inner = self.lock();
        inner.failures += 1;
        inner.last_failure = Some(now);
        inner.last_error = Some(error.to_string());

        match inner.state {
            CircuitState::Closed => {
                let window = inner.config.window();
                let in_window = inner
                    .window_start
                    .is_some_and(|start| now.saturating_duration_since(start) <= window);
                if in_window {
                    inner.consecutive_failures += 1;
                } else {
                    inner.window_start = Some(now);
                    inner.consecutive_failures = 1;
                }
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    let reason = format!(
                        "{} consecutive failures, last: {error}",
                        inner.consecutive_failures
                    );
                    inner.transition(CircuitState::Open, reason);
                }
            }
            CircuitState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.consecutive_failures += 1;
                inner.transition(CircuitState::Open, format!("probe request failed: {error}"));
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> BreakerSnapshot {
        let inner = self.lock();
        let failures_until_open = match inner.state {
            CircuitState::Closed => inner
                .config
                .failure_threshold
                .saturating_sub(inner.consecutive_failures),
            _ => 0,
        };
        let seconds_until_half_open = match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(at)) => Some(
                inner
                    .config
                    .cooldown()
                    .saturating_sub(now.saturating_duration_since(at))
                    .as_secs(),
            ),
            (CircuitState::Open, None) => Some(0),
            _ => None,
        };
        let total = inner.successes + inner.failures + inner.rejections;
        let uptime_percentage = if total == 0 {
            100.0
        } else {
            inner.successes as f64 / total as f64 * 100.0
        };
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: inner.config.failure_threshold,
            last_error: inner.last_error.clone(),
            transitions: inner.transitions.len(),
            failures_until_open,
            seconds_until_half_open,
            uptime_percentage,
        }
    }

    /// Audit log of recent transitions, oldest first.
    pub fn transitions(&self) -> Vec<BreakerTransition> {
        self.lock().transitions.iter().cloned().collect()
    }

    /// Apply new limits. The current state is kept.
    pub fn reconfigure(&self, config: BreakerConfig) {
        self.lock().config = config;
    }

    /// Time until an open breaker admits a probe; zero otherwise.
    pub fn retry_after(&self) -> Duration {
        let inner = self.lock();
        match (inner.state, inner.last_failure) {
            (CircuitState::Open, Some(at)) => inner.config.cooldown().saturating_sub(at.elapsed()),
            _ => Duration::ZERO,
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
