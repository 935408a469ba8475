//! Concurrent batch embedding with retry
//!
//! Texts are split into fixed-size batches, at most `concurrency` batches are in
//! flight, and each batch is retried with capped exponential backoff plus jitter.
//! A batch that exhausts its retries contributes no vectors; the rest of the call
//! still succeeds and the failure is reported in [`BatchOutcome`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, trace, warn};

use crate::config::BatchConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::EmbeddingError;

/// Progress events emitted while embedding
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        total_texts: usize,
        total_batches: usize,
    },
    Retrying {
        batch: usize,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    BatchCompleted {
        batch: usize,
        size: usize,
    },
    BatchFailed {
        batch: usize,
        error: String,
    },
    Finished {
        succeeded: usize,
        failed_batches: usize,
        elapsed_ms: u64,
    },
}

/// Result of a batch embedding call
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// One slot per input text; `None` where the owning batch failed
    pub embeddings: Vec<Option<Vec<f32>>>,
    /// Number of batches that exhausted their retries
    pub failed_batches: usize,
    /// Input indices without a vector
    pub failed_indices: Vec<usize>,
    /// Final error message per failed batch
    pub errors: Vec<String>,
}

impl BatchOutcome {
    /// Vectors for the successful inputs, in input order
    pub fn vectors(&self) -> Vec<Vec<f32>> {
        self.embeddings.iter().flatten().cloned().collect()
    }

    /// `(input index, vector)` pairs for the successful inputs
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &Vec<f32>)> {
        self.embeddings
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|vector| (index, vector)))
    }

    /// Whether every input received a vector
    pub fn is_complete(&self) -> bool {
        self.failed_batches == 0
    }
}

/// Embeds large text sets through a provider
pub struct BatchEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    config: BatchConfig,
    events: Option<mpsc::Sender<BatchEvent>>,
}

impl BatchEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: BatchConfig) -> Self {
        Self {
            provider,
            config,
            events: None,
        }
    }

    /// Report progress on a bounded channel. Events are dropped when the channel is full.
    pub fn with_events(mut self, sender: mpsc::Sender<BatchEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Embed every text, keeping output aligned with input order
    pub async fn embed_batch(&self, texts: &[String]) -> BatchOutcome {
        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        self.emit(BatchEvent::Started {
            total_texts: texts.len(),
            total_batches,
        });

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let tasks = texts.chunks(batch_size).enumerate().map(|(batch, chunk)| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.ok();
                (batch, self.embed_with_retry(batch, chunk).await)
            }
        });
        let results = join_all(tasks).await;

        let mut outcome = BatchOutcome {
            embeddings: vec![None; texts.len()],
            ..Default::default()
        };
        for (batch, result) in results {
            let offset = batch * batch_size;
            let len = batch_size.min(texts.len() - offset);
            match result {
                Ok(vectors) => {
                    for (i, vector) in vectors.into_iter().enumerate() {
                        outcome.embeddings[offset + i] = Some(vector);
                    }
                }
                Err(err) => {
                    outcome.failed_batches += 1;
                    outcome.failed_indices.extend(offset..offset + len);
                    outcome.errors.push(err.to_string());
                }
            }
        }

        let succeeded = texts.len() - outcome.failed_indices.len();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            texts = texts.len(),
            succeeded,
            failed_batches = outcome.failed_batches,
            elapsed_ms,
            "batch embedding finished"
        );
        self.emit(BatchEvent::Finished {
            succeeded,
            failed_batches: outcome.failed_batches,
            elapsed_ms,
        });
        outcome
    }

    async fn embed_with_retry(
        &self,
        batch: usize,
        chunk: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let attempts = self.config.max_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.provider.embed(chunk).await {
                Ok(vectors) if vectors.len() == chunk.len() => {
                    debug!(batch, size = chunk.len(), attempt, "batch embedded");
                    self.emit(BatchEvent::BatchCompleted {
                        batch,
                        size: chunk.len(),
                    });
                    return Ok(vectors);
                }
                Ok(vectors) => EmbeddingError::CountMismatch {
                    expected: chunk.len(),
                    actual: vectors.len(),
                },
                Err(err) => err,
            };

            if attempt >= attempts {
                warn!(batch, attempts, error = %error, "batch embedding failed");
                self.emit(BatchEvent::BatchFailed {
                    batch,
                    error: error.to_string(),
                });
                return Err(EmbeddingError::RetriesExhausted {
                    batch,
                    attempts,
                    message: error.to_string(),
                });
            }

            let delay = self.retry_delay(attempt);
            debug!(batch, attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying batch");
            self.emit(BatchEvent::Retrying {
                batch,
                attempt,
                delay_ms: delay.as_millis() as u64,
                error: error.to_string(),
            });
            tokio::time::sleep(delay).await;
        }
    }

    /// Backoff for `attempt` with +/-25% jitter
    fn retry_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff(attempt).as_millis() as f64;
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        Duration::from_millis((base * factor).round() as u64)
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(sender) = &self.events {
            if let Err(err) = sender.try_send(event) {
                trace!(error = %err, "dropping batch progress event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text as `[len]` and fails any batch containing "poison"
    struct ScriptedProvider {
        calls: AtomicUsize,
        transient_failures: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(transient_failures: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                transient_failures: AtomicUsize::new(transient_failures),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if texts.iter().any(|t| t == "poison") {
                return Err(EmbeddingError::Transport("poisoned".to_string()));
            }
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(EmbeddingError::Transport("flaky".to_string()));
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    fn fast_config(batch_size: usize, concurrency: usize) -> BatchConfig {
        BatchConfig {
            batch_size,
            concurrency,
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 4,
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| "x".repeat(i + 1)).collect()
    }

    #[tokio::test]
    async fn test_output_aligned_with_input() {
        let provider = Arc::new(ScriptedProvider::new(0));
        let embedder = BatchEmbedder::new(provider, fast_config(3, 2));
        let input = texts(10);

        let outcome = embedder.embed_batch(&input).await;
        assert!(outcome.is_complete());
        let vectors = outcome.vectors();
        assert_eq!(vectors.len(), 10);
        for (i, vector) in vectors.iter().enumerate() {
            assert_eq!(vector[0], (i + 1) as f32);
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let provider = Arc::new(ScriptedProvider::new(0));
        let embedder = BatchEmbedder::new(provider.clone(), fast_config(1, 2));
        embedder.embed_batch(&texts(8)).await;
        assert!(provider.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(1));
        let embedder = BatchEmbedder::new(provider.clone(), fast_config(5, 1));
        let outcome = embedder.embed_batch(&texts(5)).await;
        assert!(outcome.is_complete());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_batch_contributes_no_vectors() {
        let provider = Arc::new(ScriptedProvider::new(0));
        let embedder = BatchEmbedder::new(provider.clone(), fast_config(2, 2));
        let input: Vec<String> = ["a", "bb", "poison", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let outcome = embedder.embed_batch(&input).await;
        assert_eq!(outcome.failed_batches, 1);
        assert_eq!(outcome.failed_indices, vec![2, 3]);
        assert_eq!(outcome.vectors(), vec![vec![1.0], vec![2.0], vec![5.0]]);
        let indices: Vec<usize> = outcome.indexed().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![0, 1, 4]);
        // poisoned batch: first attempt plus two retries
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2 + 3);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let embedder = BatchEmbedder::new(Arc::new(ScriptedProvider::new(0)), fast_config(4, 2));
        let outcome = embedder.embed_batch(&[]).await;
        assert!(outcome.embeddings.is_empty());
        assert!(outcome.is_complete());
    }

    #[tokio::test]
    async fn test_progress_events() {
        let (tx, mut rx) = mpsc::channel(64);
        let embedder = BatchEmbedder::new(Arc::new(ScriptedProvider::new(0)), fast_config(2, 1))
            .with_events(tx);
        embedder.embed_batch(&texts(3)).await;
        drop(embedder);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events.first(),
            Some(&BatchEvent::Started {
                total_texts: 3,
                total_batches: 2
            })
        );
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Finished {
                succeeded: 3,
                failed_batches: 0,
                ..
            })
        ));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let embedder = BatchEmbedder::new(Arc::new(ScriptedProvider::new(0)), BatchConfig::default());
        for attempt in 1..6 {
            let base = BatchConfig::default().backoff(attempt).as_millis() as f64;
            let delay = embedder.retry_delay(attempt).as_millis() as f64;
            assert!(delay >= (base * 0.75).floor() && delay <= (base * 1.25).ceil());
        }
    }
}
