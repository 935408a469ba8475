//! Retrieval configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Search query defaults. `limit = 5` and `min_score = 0.4` are part of the public contract.
pub const DEFAULT_LIMIT: usize = 5;
pub const DEFAULT_MIN_SCORE: f32 = 0.4;

/// Batch embedding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Texts per provider call
    pub batch_size: usize,
    /// Batches in flight at once
    pub concurrency: usize,
    /// Retries per batch after the first attempt
    pub max_retries: u32,
    /// Base retry delay in milliseconds
    pub base_delay_ms: u64,
    /// Retry delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            concurrency: 5,
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl BatchConfig {
    /// Delay before retry `attempt` (1-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Semantic cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticCacheConfig {
    /// Cosine similarity above which a cached query is reused
    pub threshold: f32,
    /// Maximum cached queries
    pub capacity: usize,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for SemanticCacheConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            capacity: 256,
            ttl_secs: 3600,
        }
    }
}

impl SemanticCacheConfig {
    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Search defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default result limit
    pub limit: usize,
    /// Default minimum score
    pub min_score: f32,
    /// Vector candidates fetched per requested result
    pub candidate_multiplier: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            min_score: DEFAULT_MIN_SCORE,
            candidate_multiplier: 2,
        }
    }
}

/// Complete retrieval configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub batch: BatchConfig,
    pub cache: SemanticCacheConfig,
    pub search: SearchConfig,
}
