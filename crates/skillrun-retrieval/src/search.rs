//! Search orchestration: semantic cache, vector k-NN, keyword fallback
//!
//! Infrastructure failures on the vector path are absorbed by the keyword
//! fallback; `search` never returns an error.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use skillrun_skills::ToolType;
use tracing::{debug, warn};

use crate::cache::{CacheKey, SemanticCache};
use crate::config::SearchConfig;
use crate::embeddings::EmbeddingProvider;
use crate::fallback::KeywordIndex;
use crate::store::{RecordMetadata, SearchFilters, VectorStore};

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Similarity in `[0, 1]`
    pub score: f32,
    pub tags: Vec<String>,
    pub version: String,
    pub tool_type: ToolType,
    pub source_path: String,
}

impl RankedResult {
    pub(crate) fn from_metadata(id: &str, metadata: &RecordMetadata, score: f32) -> Self {
        Self {
            id: id.to_string(),
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            score,
            tags: metadata.tags.clone(),
            version: metadata.version.clone(),
            tool_type: metadata.tool_type,
            source_path: metadata.source_path.clone(),
        }
    }
}

/// Per-query options; unset values take the configured defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
    /// Do not read from the semantic cache
    pub skip_cache: bool,
    /// Do not write results into the semantic cache
    pub no_cache: bool,
    pub filters: SearchFilters,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn skip_cache(mut self) -> Self {
        self.skip_cache = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }
}

/// Which path produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPath {
    /// Empty query or zero limit; nothing was searched
    Skipped,
    Cache,
    Vector,
    Keyword,
}

/// Results plus how they were produced
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub results: Vec<RankedResult>,
    pub path: SearchPath,
    pub elapsed_ms: u64,
    /// Why the vector path was abandoned, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

/// Orchestrates the three search paths
pub struct SearchEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    keywords: Arc<KeywordIndex>,
    cache: Arc<SemanticCache>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        keywords: Arc<KeywordIndex>,
        cache: Arc<SemanticCache>,
        config: SearchConfig,
    ) -> Self {
        Self {
            provider,
            store,
            keywords,
            cache,
            config,
        }
    }

    /// Ranked results for `query`
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<RankedResult> {
        self.search_detailed(query, options).await.results
    }

    /// Ranked results plus the path that produced them
    pub async fn search_detailed(&self, query: &str, options: &SearchOptions) -> SearchOutcome {
        let started = Instant::now();
        let limit = options.limit.unwrap_or(self.config.limit);
        let min_score = options.min_score.unwrap_or(self.config.min_score);
        let filters = &options.filters;
        let outcome = |results, path, degraded_reason| SearchOutcome {
            results,
            path,
            elapsed_ms: started.elapsed().as_millis() as u64,
            degraded_reason,
        };

        if query.trim().is_empty() || limit == 0 {
            return outcome(Vec::new(), SearchPath::Skipped, None);
        }

        let key = CacheKey::new(limit, min_score, filters);
        let generation = self.cache.generation();
        if !options.skip_cache {
            if let Some(results) = self.cache.get_exact(query, &key) {
                return outcome(results, SearchPath::Cache, None);
            }
        }

        let embedding = match self.provider.embed_one(query).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(error = %err, "query embedding failed, using keyword fallback");
                let results = self.keywords.search(query, limit, min_score, filters);
                return outcome(results, SearchPath::Keyword, Some(err.to_string()));
            }
        };

        if !options.skip_cache {
            if let Some((results, similarity)) = self.cache.lookup(&embedding, &key) {
                debug!(similarity, "semantic cache hit");
                return outcome(results, SearchPath::Cache, None);
            }
        }

        let candidates = limit.saturating_mul(self.config.candidate_multiplier.max(1));
        let filter = (!filters.is_empty()).then_some(filters);
        let matches = match self.store.search(&embedding, candidates, filter).await {
            Ok(matches) => matches,
            Err(err) => {
                warn!(error = %err, "vector search failed, using keyword fallback");
                let results = self.keywords.search(query, limit, min_score, filters);
                return outcome(results, SearchPath::Keyword, Some(err.to_string()));
            }
        };

        let mut results: Vec<RankedResult> = matches
            .into_iter()
            .map(|hit| {
                let similarity = (1.0 - hit.distance).max(0.0);
                RankedResult::from_metadata(&hit.record.id, &hit.record.metadata, similarity)
            })
            .filter(|result| result.score >= min_score)
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);

        debug!(query, hits = results.len(), "vector search complete");
        if !options.no_cache {
            self.cache
                .insert_if_current(generation, query, embedding, key, results.clone());
        }
        outcome(results, SearchPath::Vector, None)
    }
}
