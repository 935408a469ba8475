//! Aggregated runtime configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use skillrun_permissions::PermissionConfig;
use skillrun_registry::RegistryConfig;
use skillrun_retrieval::{HttpEmbeddingConfig, RetrievalConfig};
use skillrun_sandbox::SandboxConfig;

use crate::error::{ConfigError, Result};

/// Which embedding provider backs the retrieval engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local feature hashing, no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    Http,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Hashing => write!(f, "hashing"),
            ProviderKind::Http => write!(f, "http"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hashing" | "local" => Ok(ProviderKind::Hashing),
            "http" | "openai" => Ok(ProviderKind::Http),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    /// Bucket count for the hashing provider
    pub hashing_dimension: usize,
    pub http: HttpEmbeddingConfig,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hashing,
            hashing_dimension: 256,
            http: HttpEmbeddingConfig::default(),
        }
    }
}

impl EmbeddingSettings {
    /// Vector dimension of the selected provider
    pub fn dimension(&self) -> usize {
        match self.provider {
            ProviderKind::Hashing => self.hashing_dimension,
            ProviderKind::Http => self.http.dimension,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// JSON snapshot file; in-memory only when unset
    pub snapshot_path: Option<PathBuf>,
}

/// Every component's configuration in one document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub registry: RegistryConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingSettings,
    pub store: StoreSettings,
    pub sandbox: SandboxConfig,
    pub permissions: PermissionConfig,
}

impl RuntimeConfig {
    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        let batch = &self.retrieval.batch;
        non_zero("retrieval.batch.batch_size", batch.batch_size as u64)?;
        non_zero("retrieval.batch.concurrency", batch.concurrency as u64)?;
        if batch.max_delay_ms < batch.base_delay_ms {
            return Err(ConfigError::validation(
                "retrieval.batch.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }

        let search = &self.retrieval.search;
        non_zero("retrieval.search.limit", search.limit as u64)?;
        non_zero(
            "retrieval.search.candidate_multiplier",
            search.candidate_multiplier as u64,
        )?;
        if !(0.0..=1.0).contains(&search.min_score) {
            return Err(ConfigError::validation(
                "retrieval.search.min_score",
                "must be between 0 and 1",
            ));
        }

        let cache = &self.retrieval.cache;
        if !(cache.threshold > 0.0 && cache.threshold <= 1.0) {
            return Err(ConfigError::validation(
                "retrieval.cache.threshold",
                "must be in (0, 1]",
            ));
        }

        match self.embedding.provider {
            ProviderKind::Hashing => {
                if self.embedding.hashing_dimension < 8 {
                    return Err(ConfigError::validation(
                        "embedding.hashing_dimension",
                        "must be at least 8",
                    ));
                }
            }
            ProviderKind::Http => {
                if self.embedding.http.endpoint.trim().is_empty() {
                    return Err(ConfigError::validation("embedding.http.endpoint", "is empty"));
                }
                non_zero("embedding.http.dimension", self.embedding.http.dimension as u64)?;
                non_zero("embedding.http.timeout_secs", self.embedding.http.timeout_secs)?;
            }
        }

        non_zero("sandbox.timeout_ms", self.sandbox.timeout_ms)?;
        non_zero("sandbox.memory_limit_mb", self.sandbox.memory_limit_mb)?;
        non_zero("sandbox.max_output_bytes", self.sandbox.max_output_bytes as u64)?;
        non_zero("registry.max_archive_bytes", self.registry.max_archive_bytes)?;
        non_zero("registry.max_extracted_bytes", self.registry.max_extracted_bytes)?;
        if self.registry.root.as_os_str().is_empty() {
            return Err(ConfigError::validation("registry.root", "is empty"));
        }
        Ok(())
    }
}

fn non_zero(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        Err(ConfigError::validation(field, "must be greater than 0"))
    } else {
        Ok(())
    }
}
