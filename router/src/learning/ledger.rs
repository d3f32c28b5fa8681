//! Bounded record of recent decisions, keyed by request id, so outcome
//! reports can be matched to the features that produced the decision.

use crate::classifier::RefinedFactors;
use crate::confidence::ConfidenceBreakdown;
use crate::decision::RoutingAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub request_id: Uuid,
    pub similarity_key: String,
    pub action: RoutingAction,
    pub confidence: ConfidenceBreakdown,
    pub complexity_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refined: Option<RefinedFactors>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct DecisionLedger {
    capacity: usize,
    inner: Mutex<LedgerInner>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    records: HashMap<Uuid, DecisionRecord>,
    order: VecDeque<Uuid>,
}

impl DecisionLedger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Remember a decision, evicting the oldest beyond capacity.
    pub fn insert(&self, record: DecisionRecord) {
        let Ok(mut inner) = self.inner.lock() else {
            tracing::debug!("Decision ledger lock poisoned; record dropped");
            return;
        };
        let id = record.request_id;
        if inner.records.insert(id, record).is_none() {
            inner.order.push_back(id);
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
            }
        }
    }

    /// Remove and return the record for `id`; one outcome per decision.
    pub fn take(&self, id: &Uuid) -> Option<DecisionRecord> {
        let mut inner = self.inner.lock().ok()?;
        let record = inner.records.remove(id)?;
        inner.order.retain(|queued| queued != id);
        Some(record)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.records.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
