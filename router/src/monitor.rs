//! Lock-free routing counters with a serializable snapshot.

use crate::decision::{RoutingAction, RoutingDecision};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RoutingMonitor {
    requests: AtomicU64,
    direct: AtomicU64,
    orchestration: AtomicU64,
    escalation: AtomicU64,
    cache_hits: AtomicU64,
    fallbacks: AtomicU64,
    pipeline_failures: AtomicU64,
    input_rejections: AtomicU64,
    budget_overruns: AtomicU64,
    detector_timeouts: AtomicU64,
    total_latency_us: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStats {
    pub requests: u64,
    pub direct: u64,
    pub orchestration: u64,
    pub escalation: u64,
    pub cache_hits: u64,
    pub fallbacks: u64,
    pub pipeline_failures: u64,
    pub input_rejections: u64,
    pub budget_overruns: u64,
    pub detector_timeouts: u64,
    pub avg_latency_ms: f64,
    pub cache_hit_rate: f64,
}

impl RoutingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a returned decision and its latency.
    pub fn record_decision(&self, decision: &RoutingDecision, latency_us: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match decision.action {
            RoutingAction::DirectAgentRouting => self.direct.fetch_add(1, Ordering::Relaxed),
            RoutingAction::OrchestrationRouting => {
                self.orchestration.fetch_add(1, Ordering::Relaxed)
            }
            RoutingAction::EscalateToOrganizer => self.escalation.fetch_add(1, Ordering::Relaxed),
        };
        if decision.cache_hit {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        if decision.fallback {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_pipeline_failure(&self) {
        self.pipeline_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_input_rejection(&self) {
        self.input_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_budget_overrun(&self) {
        self.budget_overruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detector_timeout(&self) {
        self.detector_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RoutingStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let total_us = self.total_latency_us.load(Ordering::Relaxed);
        let (avg_latency_ms, cache_hit_rate) = if requests == 0 {
            (0.0, 0.0)
        } else {
            (
                total_us as f64 / requests as f64 / 1000.0,
                cache_hits as f64 / requests as f64,
            )
        };

        RoutingStats {
            requests,
            direct: self.direct.load(Ordering::Relaxed),
            orchestration: self.orchestration.load(Ordering::Relaxed),
            escalation: self.escalation.load(Ordering::Relaxed),
            cache_hits,
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            pipeline_failures: self.pipeline_failures.load(Ordering::Relaxed),
            input_rejections: self.input_rejections.load(Ordering::Relaxed),
            budget_overruns: self.budget_overruns.load(Ordering::Relaxed),
            detector_timeouts: self.detector_timeouts.load(Ordering::Relaxed),
            avg_latency_ms,
            cache_hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot() {
        let stats = RoutingMonitor::new().snapshot();
        assert_eq!(stats, RoutingStats::default());
    }

    #[test]
    fn test_counters_accumulate() {
        let monitor = RoutingMonitor::new();
        monitor.record_pipeline_failure();
        monitor.record_pipeline_failure();
        monitor.record_input_rejection();
        monitor.record_budget_overrun();
        let stats = monitor.snapshot();
        assert_eq!(stats.pipeline_failures, 2);
        assert_eq!(stats.input_rejections, 1);
        assert_eq!(stats.budget_overruns, 1);
        assert_eq!(stats.requests, 0);
    }
}
