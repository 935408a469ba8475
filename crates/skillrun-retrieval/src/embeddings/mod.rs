//! Embedding providers
//!
//! A provider turns text into fixed-dimension vectors. Output length always
//! equals input length; callers rely on index alignment.

mod hashing;
mod http;

use async_trait::async_trait;

pub use hashing::HashingEmbedder;
pub use http::{HttpEmbeddingConfig, HttpEmbeddingProvider};

use crate::error::EmbeddingError;

/// Turns text into vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Dimension of produced vectors
    fn dimension(&self) -> usize;

    /// Embed a batch of texts. The result has one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}

/// Cosine similarity of two vectors; 0.0 when either is zero or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scale a vector to unit length in place
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
