//! Skill indexer
//!
//! Owns the vector records. A skill is re-embedded only when its `SKILL.md`
//! content hash differs from the `.vectorized.json` marker or its record is
//! missing from the store. Every index change clears the semantic cache.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use skillrun_skills::{skill_id, ContentHash, InstalledSkill, VectorizedMarker};
use tracing::{debug, info, warn};

use crate::batch::BatchEmbedder;
use crate::cache::SemanticCache;
use crate::embeddings::EmbeddingProvider;
use crate::error::Result;
use crate::fallback::KeywordIndex;
use crate::store::{RecordMetadata, VectorRecord, VectorStore};

/// What `index` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOutcome {
    /// Embedded and written
    Indexed,
    /// Marker and record already current
    Unchanged,
}

/// Summary of a bulk index run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIndexReport {
    pub indexed: Vec<String>,
    pub unchanged: Vec<String>,
    pub failed: Vec<String>,
}

/// Writes skills into the vector store
pub struct SkillIndexer {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    keywords: Arc<KeywordIndex>,
    cache: Arc<SemanticCache>,
    batch: BatchEmbedder,
}

impl SkillIndexer {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        keywords: Arc<KeywordIndex>,
        cache: Arc<SemanticCache>,
        batch: BatchEmbedder,
    ) -> Self {
        Self {
            provider,
            store,
            keywords,
            cache,
            batch,
        }
    }

    /// Hash of the skill's manifest, or `None` when the current marker and record
    /// already describe it
    async fn stale_hash(&self, skill: &InstalledSkill) -> Result<Option<ContentHash>> {
        let hash = ContentHash::of_skill_dir(&skill.path).await?;
        let marker = VectorizedMarker::load(&skill.path).await?;
        if marker.is_some_and(|m| m.matches(&hash))
            && self.store.get(&skill_id(skill.name())).await?.is_some()
        {
            return Ok(None);
        }
        Ok(Some(hash))
    }

    /// Embed and persist one skill unless it is already current
    pub async fn index(&self, skill: &InstalledSkill) -> Result<IndexOutcome> {
        let metadata = RecordMetadata::from_skill(skill);
        let id = skill_id(skill.name());

        let Some(hash) = self.stale_hash(skill).await? else {
            debug!(skill = %skill.name(), "Skill unchanged, skipping embedding");
            self.keywords.upsert(&id, metadata);
            return Ok(IndexOutcome::Unchanged);
        };

        let embedding = self
            .provider
            .embed_one(&skill.manifest.embedding_text())
            .await?;
        self.store
            .upsert(VectorRecord::new(embedding, metadata.clone()))
            .await?;
        VectorizedMarker::new(&hash).save(&skill.path).await?;

        self.keywords.upsert(&id, metadata);
        self.cache.clear();
        info!(skill = %skill.name(), "Indexed skill");
        Ok(IndexOutcome::Indexed)
    }

    /// Delete a skill's record and marker; returns whether a record existed
    pub async fn remove(&self, name: &str, dir: Option<&Path>) -> Result<bool> {
        let id = skill_id(name);
        let existed = self.store.delete(&id).await?;
        if let Some(dir) = dir {
            VectorizedMarker::remove(dir).await?;
        }
        self.keywords.remove(&id);
        self.cache.clear();
        info!(skill = %name, existed, "Removed skill from index");
        Ok(existed)
    }

    /// Index many skills, embedding the stale ones through the batch coordinator
    pub async fn index_many(&self, skills: &[InstalledSkill]) -> Result<BulkIndexReport> {
        let mut report = BulkIndexReport::default();
        let mut stale = Vec::new();
        for skill in skills {
            match self.stale_hash(skill).await? {
                Some(hash) => stale.push((skill, hash)),
                None => {
                    self.keywords
                        .upsert(&skill_id(skill.name()), RecordMetadata::from_skill(skill));
                    report.unchanged.push(skill.name().to_string());
                }
            }
        }
        if stale.is_empty() {
            return Ok(report);
        }

        let texts: Vec<String> = stale
            .iter()
            .map(|(skill, _)| skill.manifest.embedding_text())
            .collect();
        let outcome = self.batch.embed_batch(&texts).await;

        let mut records = Vec::new();
        let mut written = Vec::new();
        for (index, slot) in outcome.embeddings.into_iter().enumerate() {
            let (skill, hash) = &stale[index];
            match slot {
                Some(vector) => {
                    records.push(VectorRecord::new(vector, RecordMetadata::from_skill(skill)));
                    written.push((*skill, hash));
                }
                None => {
                    warn!(skill = %skill.name(), "No embedding produced, skill left unindexed");
                    report.failed.push(skill.name().to_string());
                }
            }
        }

        self.store.upsert_batch(records).await?;
        for (skill, hash) in written {
            VectorizedMarker::new(hash).save(&skill.path).await?;
            self.keywords
                .upsert(&skill_id(skill.name()), RecordMetadata::from_skill(skill));
            report.indexed.push(skill.name().to_string());
        }
        self.cache.clear();
        info!(
            indexed = report.indexed.len(),
            unchanged = report.unchanged.len(),
            failed = report.failed.len(),
            "Bulk index complete"
        );
        Ok(report)
    }

    /// Delete records whose id is not in `live`; returns the deleted ids
    pub async fn prune(&self, live: &HashSet<String>) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for id in self.store.ids().await? {
            if live.contains(&id) {
                continue;
            }
            if self.store.delete(&id).await? {
                self.keywords.remove(&id);
                removed.push(id);
            }
        }
        if !removed.is_empty() {
            self.cache.clear();
            info!(removed = removed.len(), "Pruned orphaned vector records");
        }
        Ok(removed)
    }

    /// Record count in the store
    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.count().await?)
    }

    /// Ids present in the store
    pub async fn ids(&self) -> Result<Vec<String>> {
        Ok(self.store.ids().await?)
    }
}
