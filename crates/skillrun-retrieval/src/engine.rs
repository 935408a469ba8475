//! Retrieval engine facade
//!
//! Wires one embedding provider, one vector store, the semantic cache and the
//! keyword catalog into an indexer and a search engine that share state.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use skillrun_skills::InstalledSkill;
use tokio::sync::mpsc;

use crate::batch::{BatchEmbedder, BatchEvent, BatchOutcome};
use crate::cache::{CacheStats, SemanticCache};
use crate::config::RetrievalConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::fallback::KeywordIndex;
use crate::indexer::{BulkIndexReport, IndexOutcome, SkillIndexer};
use crate::search::{RankedResult, SearchEngine, SearchOptions, SearchOutcome};
use crate::store::VectorStore;

/// Embedding, indexing and search over one vector store
pub struct RetrievalEngine {
    batch: BatchEmbedder,
    indexer: SkillIndexer,
    search: SearchEngine,
    cache: Arc<SemanticCache>,
    keywords: Arc<KeywordIndex>,
}

impl RetrievalEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self::build(provider, store, config, None)
    }

    /// Same as [`RetrievalEngine::new`], reporting batch progress on `events`
    pub fn with_events(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        events: mpsc::Sender<BatchEvent>,
    ) -> Self {
        Self::build(provider, store, config, Some(events))
    }

    fn build(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        events: Option<mpsc::Sender<BatchEvent>>,
    ) -> Self {
        let cache = Arc::new(SemanticCache::new(config.cache.clone()));
        let keywords = Arc::new(KeywordIndex::new());
        let batch_embedder = || {
            let embedder = BatchEmbedder::new(Arc::clone(&provider), config.batch.clone());
            match &events {
                Some(sender) => embedder.with_events(sender.clone()),
                None => embedder,
            }
        };

        let indexer = SkillIndexer::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            Arc::clone(&keywords),
            Arc::clone(&cache),
            batch_embedder(),
        );
        let search = SearchEngine::new(
            Arc::clone(&provider),
            store,
            Arc::clone(&keywords),
            Arc::clone(&cache),
            config.search.clone(),
        );
        Self {
            batch: batch_embedder(),
            indexer,
            search,
            cache,
            keywords,
        }
    }

    /// Embed texts with bounded concurrency and retry; output aligned with input
    pub async fn embed_batch(&self, texts: &[String]) -> BatchOutcome {
        self.batch.embed_batch(texts).await
    }

    /// Index one skill
    pub async fn index(&self, skill: &InstalledSkill) -> Result<IndexOutcome> {
        self.indexer.index(skill).await
    }

    /// Index many skills in batches
    pub async fn index_many(&self, skills: &[InstalledSkill]) -> Result<BulkIndexReport> {
        self.indexer.index_many(skills).await
    }

    /// Remove a skill from the index
    pub async fn remove(&self, name: &str, dir: Option<&Path>) -> Result<bool> {
        self.indexer.remove(name, dir).await
    }

    /// Remove records for skills that no longer exist
    pub async fn prune(&self, live: &HashSet<String>) -> Result<Vec<String>> {
        self.indexer.prune(live).await
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<RankedResult> {
        self.search.search(query, options).await
    }

    pub async fn search_detailed(&self, query: &str, options: &SearchOptions) -> SearchOutcome {
        self.search.search_detailed(query, options).await
    }

    /// Records in the vector store
    pub async fn count(&self) -> Result<usize> {
        self.indexer.count().await
    }

    pub async fn ids(&self) -> Result<Vec<String>> {
        self.indexer.ids().await
    }

    /// Skills known to the keyword catalog
    pub fn catalog_size(&self) -> usize {
        self.keywords.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use crate::error::EmbeddingError;
    use crate::search::SearchPath;
    use crate::store::EmbeddedVectorStore;
    use async_trait::async_trait;
    use skillrun_skills::{read_skill, skill_id, VectorizedMarker};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        inner: HashingEmbedder,
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                inner: HashingEmbedder::default(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn name(&self) -> &str {
            "counting"
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            self.inner.embed(texts).await
        }
    }

    async fn write_skill(root: &Path, name: &str, description: &str) -> InstalledSkill {
        let dir = root.join(name);
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("SKILL.md"),
            format!("---\nname: {name}\ndescription: {description}\n---\n\nBody\n"),
        )
        .await
        .unwrap();
        read_skill(&dir).await.unwrap()
    }

    fn new_engine(provider: Arc<CountingEmbedder>) -> RetrievalEngine {
        RetrievalEngine::new(
            provider,
            Arc::new(EmbeddedVectorStore::in_memory()),
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_reindex_unchanged_skips_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingEmbedder::new());
        let engine = new_engine(provider.clone());
        let skill = write_skill(dir.path(), "file-reader", "reads files from disk").await;

        assert_eq!(engine.index(&skill).await.unwrap(), IndexOutcome::Indexed);
        assert_eq!(engine.index(&skill).await.unwrap(), IndexOutcome::Unchanged);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(VectorizedMarker::load(&skill.path).await.unwrap().is_some());
        assert_eq!(engine.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_changed_manifest_is_reembedded() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingEmbedder::new());
        let engine = new_engine(provider.clone());
        let skill = write_skill(dir.path(), "file-reader", "reads files").await;
        engine.index(&skill).await.unwrap();

        let skill = write_skill(dir.path(), "file-reader", "reads files from disk").await;
        assert_eq!(engine.index(&skill).await.unwrap(), IndexOutcome::Indexed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_record_is_reembedded() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingEmbedder::new());
        let skill = write_skill(dir.path(), "file-reader", "reads files").await;
        new_engine(provider.clone()).index(&skill).await.unwrap();

        // fresh store, marker still on disk
        let fresh = new_engine(provider.clone());
        assert_eq!(fresh.index(&skill).await.unwrap(), IndexOutcome::Indexed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_remove_clears_record_marker_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = new_engine(Arc::new(CountingEmbedder::new()));
        let skill = write_skill(dir.path(), "file-reader", "reads files from disk").await;
        engine.index(&skill).await.unwrap();

        let options = SearchOptions::default();
        let before = engine.search("reads files from disk", &options).await;
        assert_eq!(before.len(), 1);
        assert_eq!(before[0].id, skill_id("file-reader"));

        assert!(engine.remove("file-reader", Some(skill.path.as_path())).await.unwrap());
        assert!(VectorizedMarker::load(&skill.path).await.unwrap().is_none());
        assert_eq!(engine.catalog_size(), 0);
        let after = engine.search_detailed("reads files from disk", &options).await;
        assert_eq!(after.path, SearchPath::Vector);
        assert!(after.results.is_empty());
    }

    #[tokio::test]
    async fn test_index_many_uses_batches() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(CountingEmbedder::new());
        let engine = new_engine(provider.clone());
        let mut skills = Vec::new();
        for i in 0..4 {
            skills.push(write_skill(dir.path(), &format!("skill-{i}"), &format!("does thing {i}")).await);
        }
        engine.index(&skills[0]).await.unwrap();

        let report = engine.index_many(&skills).await.unwrap();
        assert_eq!(report.unchanged, vec!["skill-0".to_string()]);
        assert_eq!(report.indexed.len(), 3);
        assert!(report.failed.is_empty());
        assert_eq!(engine.count().await.unwrap(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_prune_drops_orphans() {
        let dir = tempfile::tempdir().unwrap();
        let engine = new_engine(Arc::new(CountingEmbedder::new()));
        let kept = write_skill(dir.path(), "kept", "stays indexed").await;
        let gone = write_skill(dir.path(), "gone", "directory was deleted").await;
        engine.index_many(&[kept, gone]).await.unwrap();

        let live: HashSet<String> = [skill_id("kept")].into_iter().collect();
        let removed = engine.prune(&live).await.unwrap();
        assert_eq!(removed, vec![skill_id("gone")]);
        assert_eq!(engine.ids().await.unwrap(), vec![skill_id("kept")]);
        assert_eq!(engine.catalog_size(), 1);
    }
}
