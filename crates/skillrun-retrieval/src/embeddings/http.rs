//! OpenAI-compatible HTTP embedding provider

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::error::EmbeddingError;

/// HTTP provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpEmbeddingConfig {
    /// Base URL; requests go to `{endpoint}/embeddings`
    pub endpoint: String,
    /// Model identifier sent with each request
    pub model: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Vector dimension the model produces
    pub dimension: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpEmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434/v1".to_string(),
            model: "nomic-embed-text".to_string(),
            api_key: None,
            dimension: 768,
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Provider backed by an `/embeddings` HTTP endpoint
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: HttpEmbeddingConfig,
    url: String,
}

impl HttpEmbeddingProvider {
    /// Build a provider from configuration
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self, EmbeddingError> {
        if config.endpoint.trim().is_empty() {
            return Err(EmbeddingError::Config("endpoint is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| EmbeddingError::Config(e.to_string()))?;
        let url = format!("{}/embeddings", config.endpoint.trim_end_matches('/'));
        Ok(Self {
            client,
            config,
            url,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let mut body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Transport(e.to_string()))?;
        if body.data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: body.data.len(),
            });
        }
        body.data.sort_by_key(|datum| datum.index);

        let mut vectors = Vec::with_capacity(body.data.len());
        for datum in body.data {
            if datum.embedding.len() != self.config.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.config.dimension,
                    actual: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        debug!(count = vectors.len(), model = %self.config.model, "embedded texts");
        Ok(vectors)
    }
}
