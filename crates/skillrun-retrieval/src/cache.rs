//! Semantic query cache
//!
//! Caches ranked results by query embedding. A lookup hits when a cached query
//! has cosine similarity at or above the threshold *and* was made with the same
//! limit, minimum score and filters. Entries expire after the TTL and the least
//! recently used entry is evicted at capacity. Any index change clears the cache
//! and bumps its generation; results computed under an older generation are
//! never stored.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::config::SemanticCacheConfig;
use crate::embeddings::cosine_similarity;
use crate::search::RankedResult;
use crate::store::SearchFilters;

/// Search parameters a cached result set is only valid for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    limit: usize,
    min_score_bits: u32,
    filters: SearchFilters,
}

impl CacheKey {
    pub fn new(limit: usize, min_score: f32, filters: &SearchFilters) -> Self {
        Self {
            limit,
            min_score_bits: min_score.to_bits(),
            filters: filters.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedQuery {
    query: String,
    embedding: Vec<f32>,
    key: CacheKey,
    results: Vec<RankedResult>,
    created_at: Instant,
    last_used: Instant,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Embedding-keyed result cache
pub struct SemanticCache {
    config: SemanticCacheConfig,
    entries: Mutex<Vec<CachedQuery>>,
    generation: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SemanticCache {
    pub fn new(config: SemanticCacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn normalize_query(query: &str) -> String {
        query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    }

    /// Exact text lookup, skipping the embedding call
    pub fn get_exact(&self, query: &str, key: &CacheKey) -> Option<Vec<RankedResult>> {
        let normalized = Self::normalize_query(query);
        let ttl = self.config.ttl();
        let mut entries = self.entries.lock();
        entries.retain(|entry| entry.created_at.elapsed() < ttl);
        let entry = entries
            .iter_mut()
            .find(|entry| entry.key == *key && entry.query == normalized)?;
        entry.last_used = Instant::now();
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(query = %normalized, "exact cache hit");
        Some(entry.results.clone())
    }

    /// Similarity lookup; returns the results and the matched similarity
    pub fn lookup(&self, embedding: &[f32], key: &CacheKey) -> Option<(Vec<RankedResult>, f32)> {
        let ttl = self.config.ttl();
        let mut entries = self.entries.lock();
        entries.retain(|entry| entry.created_at.elapsed() < ttl);

        let best = entries
            .iter_mut()
            .filter(|entry| entry.key == *key)
            .map(|entry| {
                let similarity = cosine_similarity(embedding, &entry.embedding);
                (entry, similarity)
            })
            .filter(|(_, similarity)| *similarity >= self.config.threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((entry, similarity)) => {
                entry.last_used = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(query = %entry.query, similarity, "semantic cache hit");
                Some((entry.results.clone(), similarity))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Current generation; capture it before computing results to insert
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store a result set under the current generation
    pub fn insert(&self, query: &str, embedding: Vec<f32>, key: CacheKey, results: Vec<RankedResult>) {
        self.insert_if_current(self.generation(), query, embedding, key, results);
    }

    /// Store a result set computed under `generation`; returns `false` and
    /// stores nothing when the cache was cleared since
    pub fn insert_if_current(
        &self,
        generation: u64,
        query: &str,
        embedding: Vec<f32>,
        key: CacheKey,
        results: Vec<RankedResult>,
    ) -> bool {
        if self.config.capacity == 0 {
            return false;
        }
        let normalized = Self::normalize_query(query);
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if self.generation.load(Ordering::SeqCst) != generation {
            trace!(query = %normalized, "index changed during search, not caching");
            return false;
        }
        entries.retain(|entry| !(entry.key == key && entry.query == normalized));
        while entries.len() >= self.config.capacity {
            let Some((oldest, _)) = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.last_used)
            else {
                break;
            };
            entries.swap_remove(oldest);
        }
        entries.push(CachedQuery {
            query: normalized,
            embedding,
            key,
            results,
            created_at: now,
            last_used: now,
        });
        true
    }

    /// Drop every entry and invalidate in-flight inserts
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        self.generation.fetch_add(1, Ordering::SeqCst);
        if !entries.is_empty() {
            trace!(entries = entries.len(), "clearing semantic cache");
        }
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}
