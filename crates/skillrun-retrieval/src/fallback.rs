//! Keyword fallback scoring
//!
//! Keeps an in-memory catalog of indexed skills so search keeps answering when
//! the embedding provider or the vector store is down. Scoring is token overlap:
//! a query token matches a candidate token when the candidate starts with it,
//! name matches weigh 0.6 and any-field matches 0.4, normalized by query length.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;

use crate::search::RankedResult;
use crate::store::{RecordMetadata, SearchFilters};

const NAME_WEIGHT: f32 = 0.6;
const FIELD_WEIGHT: f32 = 0.4;

/// Lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn any_prefixed(tokens: &[String], query_token: &str) -> bool {
    tokens.iter().any(|token| token.starts_with(query_token))
}

/// Score one skill against pre-tokenized query tokens, in `[0, 1]`
pub fn keyword_score(query_tokens: &[String], metadata: &RecordMetadata) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let name_tokens = tokenize(&metadata.name);
    let mut all_tokens = name_tokens.clone();
    all_tokens.extend(tokenize(&metadata.description));
    for tag in &metadata.tags {
        all_tokens.extend(tokenize(tag));
    }

    let mut name_matches = 0usize;
    let mut total_matches = 0usize;
    for token in query_tokens {
        if any_prefixed(&name_tokens, token) {
            name_matches += 1;
        }
        if any_prefixed(&all_tokens, token) {
            total_matches += 1;
        }
    }

    let raw = NAME_WEIGHT * name_matches as f32 + FIELD_WEIGHT * total_matches as f32;
    (raw / query_tokens.len() as f32).min(1.0)
}

/// Catalog of indexed skills for keyword search
#[derive(Debug, Default)]
pub struct KeywordIndex {
    documents: RwLock<BTreeMap<String, RecordMetadata>>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a skill
    pub fn upsert(&self, id: &str, metadata: RecordMetadata) {
        self.documents.write().insert(id.to_string(), metadata);
    }

    /// Remove a skill; returns whether it was present
    pub fn remove(&self, id: &str) -> bool {
        self.documents.write().remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Rank the catalog by keyword overlap
    pub fn search(
        &self,
        query: &str,
        limit: usize,
        min_score: f32,
        filters: &SearchFilters,
    ) -> Vec<RankedResult> {
        let mut seen = HashSet::new();
        let mut query_tokens = tokenize(query);
        query_tokens.retain(|token| seen.insert(token.clone()));
        if query_tokens.is_empty() || limit == 0 {
            return Vec::new();
        }

        let documents = self.documents.read();
        let mut results: Vec<RankedResult> = documents
            .iter()
            .filter(|(_, metadata)| filters.matches(metadata))
            .filter_map(|(id, metadata)| {
                let score = keyword_score(&query_tokens, metadata);
                (score > 0.0 && score >= min_score)
                    .then(|| RankedResult::from_metadata(id, metadata, score))
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(limit);
        results
    }
}
