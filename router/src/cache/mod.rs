//! Pattern Cache
//!
//! Three independently bounded tiers keyed by [`TaskSignature::key`]:
//!
//! ```text
//!   L1 pattern     DomainAnalysis        short TTL   registry-dependent
//!   L2 routing     RoutingDecision       mid TTL     registry + weight dependent
//!   L3 complexity  ClassificationResult  long TTL    registry + weight dependent
//! ```
//!
//! Each tier sits behind its own `Mutex`. A poisoned tier behaves as empty:
//! reads miss, writes are dropped, and nothing is surfaced to the caller.

pub mod tier;

pub use tier::{TierStats, TierStore};

use crate::classifier::ClassificationResult;
use crate::config::CacheConfig;
use crate::decision::RoutingDecision;
use crate::detector::DomainAnalysis;
use crate::signature::TaskSignature;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Pattern,
    Routing,
    Complexity,
}

impl std::fmt::Display for CacheTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pattern => write!(f, "pattern"),
            Self::Routing => write!(f, "routing"),
            Self::Complexity => write!(f, "complexity"),
        }
    }
}

/// What changed upstream of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    RegistryRefresh,
    WeightUpdate,
    ConfigReload,
    Manual,
}

impl InvalidationReason {
    /// Tiers whose contents depend on what changed.
    pub fn tiers(&self) -> &'static [CacheTier] {
        match self {
            Self::WeightUpdate => &[CacheTier::Routing, CacheTier::Complexity],
            Self::RegistryRefresh | Self::ConfigReload | Self::Manual => {
                &[CacheTier::Pattern, CacheTier::Routing, CacheTier::Complexity]
            }
        }
    }
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegistryRefresh => write!(f, "registry_refresh"),
            Self::WeightUpdate => write!(f, "weight_update"),
            Self::ConfigReload => write!(f, "config_reload"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// A value to cache; the variant selects the tier.
#[derive(Debug, Clone)]
pub enum CachedValue {
    Domains(DomainAnalysis),
    Decision(Box<RoutingDecision>),
    Classification(ClassificationResult),
}

impl CachedValue {
    pub fn tier(&self) -> CacheTier {
        match self {
            Self::Domains(_) => CacheTier::Pattern,
            Self::Decision(_) => CacheTier::Routing,
            Self::Classification(_) => CacheTier::Complexity,
        }
    }
}

/// Whatever the tiers hold for one signature.
#[derive(Debug, Clone, Default)]
pub struct CachedResult {
    pub decision: Option<RoutingDecision>,
    pub classification: Option<ClassificationResult>,
    pub domains: Option<DomainAnalysis>,
}

impl CachedResult {
    pub fn is_empty(&self) -> bool {
        self.decision.is_none() && self.classification.is_none() && self.domains.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub pattern: TierStats,
    pub routing: TierStats,
    pub complexity: TierStats,
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        self.pattern.hits + self.routing.hits + self.complexity.hits
    }
}

#[derive(Debug)]
pub struct PatternCache {
    pattern: Mutex<TierStore<DomainAnalysis>>,
    routing: Mutex<TierStore<RoutingDecision>>,
    complexity: Mutex<TierStore<ClassificationResult>>,
}

fn read<V: Clone>(tier: &Mutex<TierStore<V>>, name: CacheTier, key: &str, now: Instant) -> Option<V> {
    match tier.lock() {
        Ok(mut store) => store.get(key, now),
        Err(_) => {
            debug!(tier = %name, "Cache tier lock poisoned; treating as miss");
            None
        }
    }
}

fn clear<V: Clone>(tier: &Mutex<TierStore<V>>, name: CacheTier) -> usize {
    match tier.lock() {
        Ok(mut store) => store.clear(),
        Err(_) => {
            debug!(tier = %name, "Cache tier lock poisoned; clear skipped");
            0
        }
    }
}

fn stats<V: Clone>(tier: &Mutex<TierStore<V>>) -> TierStats {
    tier.lock().map(|store| store.stats()).unwrap_or_default()
}

impl PatternCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            pattern: Mutex::new(TierStore::new(config.pattern.ttl(), config.pattern.capacity)),
            routing: Mutex::new(TierStore::new(config.routing.ttl(), config.routing.capacity)),
            complexity: Mutex::new(TierStore::new(
                config.complexity.ttl(),
                config.complexity.capacity,
            )),
        }
    }

    /// Look up every tier for `signature`. `None` when all tiers miss.
    pub fn get(&self, signature: &TaskSignature) -> Option<CachedResult> {
        self.get_at(signature, Instant::now())
    }

    pub fn get_at(&self, signature: &TaskSignature, now: Instant) -> Option<CachedResult> {
        let key = signature.key.as_str();
        let result = CachedResult {
            domains: read(&self.pattern, CacheTier::Pattern, key, now),
            decision: read(&self.routing, CacheTier::Routing, key, now),
            classification: read(&self.complexity, CacheTier::Complexity, key, now),
        };
        (!result.is_empty()).then_some(result)
    }

    pub fn put(&self, signature: &TaskSignature, value: CachedValue) {
        self.put_at(signature, value, Instant::now());
    }

    pub fn put_at(&self, signature: &TaskSignature, value: CachedValue, now: Instant) {
        let tier = value.tier();
        let key = signature.key.clone();
        let stored = match value {
            CachedValue::Domains(v) => self.pattern.lock().map(|mut s| s.put(key, v, now)).is_ok(),
            CachedValue::Decision(v) => self.routing.lock().map(|mut s| s.put(key, *v, now)).is_ok(),
            CachedValue::Classification(v) => {
                self.complexity.lock().map(|mut s| s.put(key, v, now)).is_ok()
            }
        };
        if !stored {
            debug!(tier = %tier, "Cache tier lock poisoned; write dropped");
        }
    }

    /// Clear the tiers that depend on `reason`.
    pub fn invalidate(&self, reason: InvalidationReason) -> usize {
        let removed: usize = reason
            .tiers()
            .iter()
            .map(|tier| match tier {
                CacheTier::Pattern => clear(&self.pattern, *tier),
                CacheTier::Routing => clear(&self.routing, *tier),
                CacheTier::Complexity => clear(&self.complexity, *tier),
            })
            .sum();
        debug!(%reason, removed, "Pattern cache invalidated");
        removed
    }

    pub fn flush(&self) -> usize {
        let removed = self.invalidate(InvalidationReason::Manual);
        info!(removed, "Pattern cache flushed");
        removed
    }

    /// Apply new TTLs and capacities to every tier.
    pub fn reconfigure(&self, config: &CacheConfig) {
        let now = Instant::now();
        if let Ok(mut s) = self.pattern.lock() {
            s.reconfigure(config.pattern.ttl(), config.pattern.capacity, now);
        }
        if let Ok(mut s) = self.routing.lock() {
            s.reconfigure(config.routing.ttl(), config.routing.capacity, now);
        }
        if let Ok(mut s) = self.complexity.lock() {
            s.reconfigure(config.complexity.ttl(), config.complexity.capacity, now);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pattern: stats(&self.pattern),
            routing: stats(&self.routing),
            complexity: stats(&self.complexity),
        }
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
