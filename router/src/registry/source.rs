//! Capability sources and worker availability probes.
//!
//! The engine never decides how worker data is produced; it polls a
//! [`CapabilitySource`] on refresh and asks an [`AvailabilityProbe`] whether
//! candidate workers are accepting work.

use super::catalog;
use super::domain::DomainSpec;
use super::{WorkerProfile, WorkerRef};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// External supplier of worker capabilities.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn list_workers(&self) -> anyhow::Result<Vec<WorkerProfile>>;

    /// Domain signatures to detect. Defaults to the built-in catalog.
    async fn domain_signatures(&self) -> anyhow::Result<Vec<DomainSpec>> {
        Ok(catalog::builtin_domains())
    }
}

/// Answers whether a worker is currently accepting work.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn accepting_work(&self, worker: &WorkerRef) -> anyhow::Result<bool>;
}

/// Probe that reports every worker as available.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAvailable;

#[async_trait]
impl AvailabilityProbe for AlwaysAvailable {
    async fn accepting_work(&self, _worker: &WorkerRef) -> anyhow::Result<bool> {
        Ok(true)
    }
}

/// Probe backed by a fixed availability table. Unknown workers are available.
#[derive(Debug, Clone, Default)]
pub struct StaticAvailability {
    table: HashMap<String, bool>,
}

impl StaticAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, worker: impl Into<String>, accepting: bool) -> Self {
        self.table.insert(worker.into(), accepting);
        self
    }
}

#[async_trait]
impl AvailabilityProbe for StaticAvailability {
    async fn accepting_work(&self, worker: &WorkerRef) -> anyhow::Result<bool> {
        Ok(self.table.get(worker.as_str()).copied().unwrap_or(true))
    }
}

/// In-memory source.
#[derive(Debug, Clone)]
pub struct StaticSource {
    workers: Vec<WorkerProfile>,
    domains: Option<Vec<DomainSpec>>,
}

impl StaticSource {
    pub fn new(workers: Vec<WorkerProfile>) -> Self {
        Self {
            workers,
            domains: None,
        }
    }

    /// Built-in roster and domain catalog.
    pub fn builtin() -> Self {
        Self::new(catalog::builtin_workers())
    }

    pub fn with_domains(mut self, domains: Vec<DomainSpec>) -> Self {
        self.domains = Some(domains);
        self
    }
}

#[async_trait]
impl CapabilitySource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    async fn list_workers(&self) -> anyhow::Result<Vec<WorkerProfile>> {
        Ok(self.workers.clone())
    }

    async fn domain_signatures(&self) -> anyhow::Result<Vec<DomainSpec>> {
        Ok(self
            .domains
            .clone()
            .unwrap_or_else(catalog::builtin_domains))
    }
}

/// On-disk registry document.
///
/// ```toml
/// [[workers]]
/// id = "build-frontend"
/// domains = ["frontend"]
/// complexity_affinity = 0.5
/// patterns = ["react", "component"]
///
/// [[domains]]            # optional; built-in catalog when absent
/// id = "frontend"
/// keywords = ["react", "ui"]
/// file_patterns = ["*.tsx"]
/// verbs = ["render"]
/// complexity_bias = 0.7
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub workers: Vec<WorkerProfile>,
    #[serde(default)]
    pub domains: Vec<DomainSpec>,
}

/// Source that re-reads a TOML file on every refresh.
#[derive(Debug, Clone)]
pub struct TomlFileSource {
    path: PathBuf,
}

impl TomlFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> anyhow::Result<RegistryFile> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading registry file {}", self.path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("parsing registry file {}", self.path.display()))
    }
}

#[async_trait]
impl CapabilitySource for TomlFileSource {
    fn name(&self) -> &str {
        "toml-file"
    }

    async fn list_workers(&self) -> anyhow::Result<Vec<WorkerProfile>> {
        Ok(self.read().await?.workers)
    }

    async fn domain_signatures(&self) -> anyhow::Result<Vec<DomainSpec>> {
        let file = self.read().await?;
        if file.domains.is_empty() {
            Ok(catalog::builtin_domains())
        } else {
            Ok(file.domains)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_static_availability_defaults_to_available() {
        let probe = StaticAvailability::new().with("build-frontend", false);
        assert!(!probe
            .accepting_work(&WorkerRef::new("build-frontend"))
            .await
            .unwrap());
        assert!(probe
            .accepting_work(&WorkerRef::new("unknown"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_toml_source_reads_workers_and_default_domains() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[[workers]]
id = "rust-expert"
domains = ["backend"]
complexity_affinity = 0.8
patterns = ["rust", "tokio"]
"#
        )
        .unwrap();

        let source = TomlFileSource::new(file.path());
        let workers = source.list_workers().await.unwrap();
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].id, "rust-expert");
        let domains = source.domain_signatures().await.unwrap();
        assert_eq!(domains.len(), catalog::builtin_domains().len());
    }

    #[tokio::test]
    async fn test_toml_source_missing_file_errors() {
        let source = TomlFileSource::new("/nonexistent/registry.toml");
        let err = source.list_workers().await.unwrap_err();
        assert!(err.to_string().contains("reading registry file"));
    }
}
