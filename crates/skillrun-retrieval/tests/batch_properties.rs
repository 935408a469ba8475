//! Property-based tests for batch embedding and keyword scoring

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;
use skillrun_retrieval::fallback::{keyword_score, tokenize};
use skillrun_retrieval::{
    BatchConfig, BatchEmbedder, EmbeddingError, EmbeddingProvider, RecordMetadata,
};
use skillrun_skills::ToolType;

/// Encodes each text as its numeric value; batches containing a poisoned value always fail
struct NumericProvider {
    poisoned: HashSet<usize>,
}

#[async_trait]
impl EmbeddingProvider for NumericProvider {
    fn name(&self) -> &str {
        "numeric"
    }

    fn dimension(&self) -> usize {
        1
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let values: Vec<usize> = texts.iter().map(|t| t.parse().unwrap_or(0)).collect();
        if values.iter().any(|v| self.poisoned.contains(v)) {
            return Err(EmbeddingError::Transport("poisoned".to_string()));
        }
        Ok(values.into_iter().map(|v| vec![v as f32]).collect())
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every produced vector sits at its input's index, and failed batches leave exactly their own slots empty
    #[test]
    fn prop_batch_output_aligned(
        count in 0usize..60,
        batch_size in 1usize..9,
        concurrency in 1usize..6,
        poisoned in proptest::collection::hash_set(0usize..60, 0..4),
    ) {
        let texts: Vec<String> = (0..count).map(|i| i.to_string()).collect();
        let provider = Arc::new(NumericProvider { poisoned: poisoned.clone() });
        let embedder = BatchEmbedder::new(provider, BatchConfig {
            batch_size,
            concurrency,
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
        });

        let outcome = runtime().block_on(embedder.embed_batch(&texts));
        prop_assert_eq!(outcome.embeddings.len(), count);

        let mut expected_failed_batches = 0;
        for (batch, chunk) in (0..count).collect::<Vec<_>>().chunks(batch_size).enumerate() {
            let failed = chunk.iter().any(|i| poisoned.contains(i));
            if failed {
                expected_failed_batches += 1;
            }
            for &i in chunk {
                match &outcome.embeddings[i] {
                    Some(vector) => {
                        prop_assert!(!failed, "batch {} should have failed", batch);
                        prop_assert_eq!(vector, &vec![i as f32]);
                    }
                    None => prop_assert!(failed),
                }
            }
        }
        prop_assert_eq!(outcome.failed_batches, expected_failed_batches);
    }

    /// Keyword scores always land in [0, 1]
    #[test]
    fn prop_keyword_score_bounded(
        query in "[a-z ]{0,40}",
        name in "[a-z]{1,8}(-[a-z]{1,8}){0,2}",
        description in "[a-z ]{0,60}",
    ) {
        let metadata = RecordMetadata {
            name,
            description,
            tags: vec![],
            version: "1.0.0".to_string(),
            source_path: String::new(),
            tool_type: ToolType::Skill,
        };
        let score = keyword_score(&tokenize(&query), &metadata);
        prop_assert!((0.0..=1.0).contains(&score));
    }
}
