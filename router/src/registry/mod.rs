//! Capability Registry: worker identities, domains and matching patterns
//!
//! The registry holds an immutable [`RegistrySnapshot`] behind an
//! `RwLock<Arc<_>>`. [`CapabilityRegistry::refresh`] builds a complete new
//! snapshot from the [`CapabilitySource`] and swaps it in one step, so
//! in-flight requests always read a consistent registry.
//!
//! ```text
//! CapabilitySource ──refresh()──► build snapshot ──ok──► swap Arc
//!                                       │
//!                                       └──err──► keep previous, warn!
//! ```

pub mod catalog;
pub mod domain;
pub mod source;

pub use domain::{DomainSignature, DomainSpec};
pub use source::{
    AlwaysAvailable, AvailabilityProbe, CapabilitySource, RegistryFile, StaticAvailability,
    StaticSource, TomlFileSource,
};

use crate::error::{RoutingError, RoutingResult};
use crate::otel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Identifier of a worker, as consumed by the external dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerRef(String);

impl WorkerRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared capabilities of one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerProfile {
    pub id: String,
    #[serde(default)]
    pub domains: Vec<String>,
    /// Complexity the worker is best suited for, 0.0-1.0.
    pub complexity_affinity: f64,
    /// Keywords this worker is known to handle well.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl WorkerProfile {
    pub fn worker_ref(&self) -> WorkerRef {
        WorkerRef::new(self.id.clone())
    }
}

/// One consistent view of the registry.
#[derive(Debug)]
pub struct RegistrySnapshot {
    workers: BTreeMap<WorkerRef, WorkerProfile>,
    by_domain: BTreeMap<String, BTreeSet<WorkerRef>>,
    signatures: Vec<Arc<DomainSignature>>,
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Validate and index source data.
    pub fn build(
        workers: Vec<WorkerProfile>,
        domains: Vec<DomainSpec>,
        generation: u64,
    ) -> anyhow::Result<Self> {
        if workers.is_empty() {
            anyhow::bail!("capability source returned no workers");
        }

        let mut indexed = BTreeMap::new();
        let mut by_domain: BTreeMap<String, BTreeSet<WorkerRef>> = BTreeMap::new();
        for mut profile in workers {
            profile.id = profile.id.trim().to_string();
            if profile.id.is_empty() {
                anyhow::bail!("worker with empty id");
            }
            profile.complexity_affinity = profile.complexity_affinity.clamp(0.0, 1.0);
            profile.domains = profile
                .domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect();
            profile.patterns = profile
                .patterns
                .iter()
                .map(|p| p.trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect();

            let worker = profile.worker_ref();
            for d in &profile.domains {
                by_domain.entry(d.clone()).or_default().insert(worker.clone());
            }
            if indexed.insert(worker.clone(), profile).is_some() {
                anyhow::bail!("duplicate worker id {worker}");
            }
        }

        let mut signatures = Vec::with_capacity(domains.len());
        for spec in &domains {
            let sig = DomainSignature::compile(spec)
                .map_err(|e| anyhow::anyhow!("domain {}: {e}", spec.id))?;
            signatures.push(Arc::new(sig));
        }
        signatures.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Self {
            workers: indexed,
            by_domain,
            signatures,
            generation,
            loaded_at: Utc::now(),
        })
    }

    pub fn lookup(&self, domain: &str) -> BTreeSet<WorkerRef> {
        self.by_domain.get(domain).cloned().unwrap_or_default()
    }

    pub fn profile(&self, worker: &WorkerRef) -> Option<&WorkerProfile> {
        self.workers.get(worker)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerProfile> {
        self.workers.values()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn signatures(&self) -> &[Arc<DomainSignature>] {
        &self.signatures
    }

    /// Domains with a signature or at least one serving worker.
    pub fn all_domains(&self) -> BTreeSet<String> {
        self.signatures
            .iter()
            .map(|s| s.id.clone())
            .chain(self.by_domain.keys().cloned())
            .collect()
    }
}

pub type SharedRegistry = Arc<CapabilityRegistry>;

pub struct CapabilityRegistry {
    source: Arc<dyn CapabilitySource>,
    current: RwLock<Option<Arc<RegistrySnapshot>>>,
    /// Built-in signatures used for detection until a snapshot loads.
    fallback_signatures: Vec<Arc<DomainSignature>>,
    generation: AtomicU64,
}

impl CapabilityRegistry {
    /// Create an empty registry. Call [`refresh`](Self::refresh) to load it.
    pub fn new(source: Arc<dyn CapabilitySource>) -> Self {
        let fallback_signatures = catalog::builtin_domains()
            .iter()
            .filter_map(|spec| match DomainSignature::compile(spec) {
                Ok(sig) => Some(Arc::new(sig)),
                Err(e) => {
                    warn!(domain = %spec.id, "Built-in domain failed to compile: {e}");
                    None
                }
            })
            .collect();

        Self {
            source,
            current: RwLock::new(None),
            fallback_signatures,
            generation: AtomicU64::new(0),
        }
    }

    /// Reload from the source and swap atomically.
    ///
    /// Returns `false` when the source failed; the previous snapshot stays
    /// authoritative and the failure is only logged.
    pub async fn refresh(&self) -> bool {
        let span = otel::registry_refresh_span(self.source.name());
        let result = self.load().await;

        match result {
            Ok(mut snapshot) => {
                let workers = snapshot.worker_count();
                // Generation is assigned under the write lock so swaps and
                // generations advance in the same order.
                let generation = match self.current.write() {
                    Ok(mut guard) => {
                        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                        snapshot.generation = generation;
                        *guard = Some(Arc::new(snapshot));
                        generation
                    }
                    Err(_) => {
                        warn!(source = self.source.name(), "Registry lock poisoned; refresh dropped");
                        otel::record_refresh_result(&span, false, 0);
                        return false;
                    }
                };
                otel::record_refresh_result(&span, true, workers);
                info!(
                    source = self.source.name(),
                    workers,
                    generation,
                    "Capability registry refreshed"
                );
                true
            }
            Err(e) => {
                otel::record_refresh_result(&span, false, 0);
                warn!(
                    source = self.source.name(),
                    loaded = self.is_loaded(),
                    "Capability registry refresh failed, keeping previous snapshot: {e:#}"
                );
                false
            }
        }
    }

    async fn load(&self) -> anyhow::Result<RegistrySnapshot> {
        let workers = self.source.list_workers().await?;
        let domains = self.source.domain_signatures().await?;
        RegistrySnapshot::build(workers, domains, 0)
    }

    /// Current snapshot, or `RegistryUnavailable` if none has ever loaded.
    pub fn snapshot(&self) -> RoutingResult<Arc<RegistrySnapshot>> {
        let guard = self
            .current
            .read()
            .map_err(|_| RoutingError::RegistryUnavailable("registry lock poisoned".into()))?;
        guard
            .clone()
            .ok_or_else(|| RoutingError::RegistryUnavailable("registry not loaded".into()))
    }

    /// Workers serving `domain`. Unknown domains yield an empty set.
    pub fn lookup(&self, domain: &str) -> RoutingResult<BTreeSet<WorkerRef>> {
        Ok(self.snapshot()?.lookup(domain))
    }

    /// All known domains; empty when the registry has never loaded.
    pub fn all_domains(&self) -> BTreeSet<String> {
        self.snapshot()
            .map(|s| s.all_domains())
            .unwrap_or_default()
    }

    /// Signatures for detection: the snapshot's, or the built-in set.
    pub fn signatures(&self) -> Vec<Arc<DomainSignature>> {
        match self.snapshot() {
            Ok(snapshot) => snapshot.signatures().to_vec(),
            Err(_) => self.fallback_signatures.clone(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_ok()
    }

    /// Generation of the last successful refresh (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("source", &self.source.name())
            .field("generation", &self.generation())
            .finish()
    }
}
