//! Local feature-hashing embedder
//!
//! Hashes word tokens and character trigrams into a fixed number of buckets.
//! Deterministic, offline, and good enough for lexical similarity. Used when no
//! remote provider is configured and in tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;

use super::{normalize, EmbeddingProvider};
use crate::error::EmbeddingError;

/// Default bucket count
pub const DEFAULT_DIMENSION: usize = 256;

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    /// Create an embedder with `dimension` buckets (minimum 8)
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty());

        for token in tokens {
            self.add_feature(&mut vector, token, 1.0);
            let chars: Vec<char> = format!("#{token}#").chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut vector, &trigram, 0.5);
            }
        }

        normalize(&mut vector);
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let hash = hasher.finish();
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}
