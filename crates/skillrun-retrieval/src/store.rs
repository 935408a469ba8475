//! Vector store abstraction and the embedded implementation
//!
//! Records are keyed by the stable skill id. Distances are cosine distances
//! (`1 - cosine_similarity`), so smaller is closer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use skillrun_skills::{skill_id, InstalledSkill, ToolType};
use tracing::{debug, info, warn};

use crate::embeddings::cosine_similarity;
use crate::error::VectorStoreError;

/// Metadata stored alongside each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub version: String,
    pub source_path: String,
    #[serde(default)]
    pub tool_type: ToolType,
}

impl RecordMetadata {
    /// Metadata for an installed skill
    pub fn from_skill(skill: &InstalledSkill) -> Self {
        Self {
            name: skill.manifest.name.clone(),
            description: skill.manifest.description.clone(),
            tags: skill.manifest.tags.iter().cloned().collect(),
            version: skill.manifest.version.clone(),
            source_path: skill.path.display().to_string(),
            tool_type: skill.manifest.tool_type,
        }
    }
}

/// One indexed skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: RecordMetadata,
}

impl VectorRecord {
    /// Build a record keyed by the skill's stable id
    pub fn new(embedding: Vec<f32>, metadata: RecordMetadata) -> Self {
        Self {
            id: skill_id(&metadata.name),
            embedding,
            metadata,
        }
    }
}

/// A search hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub record: VectorRecord,
    pub distance: f32,
}

/// Metadata filters applied during search
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchFilters {
    /// Every listed tag must be present
    pub tags: Vec<String>,
    pub tool_type: Option<ToolType>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.tool_type.is_none()
    }

    /// Whether a record passes the filters
    pub fn matches(&self, metadata: &RecordMetadata) -> bool {
        if let Some(tool_type) = self.tool_type {
            if metadata.tool_type != tool_type {
                return false;
            }
        }
        self.tags.iter().all(|tag| metadata.tags.contains(tag))
    }
}

/// Persistent k-NN index over skill vectors
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or replace a record
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError>;

    /// Insert or replace many records
    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError>;

    /// Delete a record; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError>;

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError>;

    /// Nearest `k` records by cosine distance, closest first
    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorMatch>, VectorStoreError>;

    async fn count(&self) -> Result<usize, VectorStoreError>;

    /// All record ids
    async fn ids(&self) -> Result<Vec<String>, VectorStoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
}

#[derive(Debug, Default)]
struct StoreState {
    dimension: Option<usize>,
    records: BTreeMap<String, VectorRecord>,
}

/// In-process vector store with optional JSON snapshot persistence
///
/// The first record fixes the index dimension unless one is configured up front.
/// Snapshots are written to a temporary file and renamed into place.
#[derive(Debug, Default)]
pub struct EmbeddedVectorStore {
    state: RwLock<StoreState>,
    snapshot: Option<PathBuf>,
}

impl EmbeddedVectorStore {
    /// Memory-only store
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Fix the index dimension
    pub fn with_dimension(self, dimension: usize) -> Self {
        self.state.write().dimension = Some(dimension);
        self
    }

    /// Open a store persisted at `path`, loading an existing snapshot
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let path = path.into();
        let mut state = StoreState::default();
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) => {
                    state.dimension = snapshot.dimension;
                    state.records = snapshot
                        .records
                        .into_iter()
                        .map(|record| (record.id.clone(), record))
                        .collect();
                    info!(path = %path.display(), records = state.records.len(), "loaded vector snapshot");
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "vector snapshot unreadable, starting empty");
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(VectorStoreError::Persistence(err.to_string())),
        }
        Ok(Self {
            state: RwLock::new(state),
            snapshot: Some(path),
        })
    }

    /// Snapshot location, if persistent
    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn check_dimension(state: &mut StoreState, record: &VectorRecord) -> Result<(), VectorStoreError> {
        match state.dimension {
            Some(expected) if expected != record.embedding.len() => {
                Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: record.embedding.len(),
                })
            }
            Some(_) => Ok(()),
            None => {
                state.dimension = Some(record.embedding.len());
                Ok(())
            }
        }
    }

    async fn persist(&self) -> Result<(), VectorStoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = {
            let state = self.state.read();
            let snapshot = Snapshot {
                dimension: state.dimension,
                records: state.records.values().cloned().collect(),
            };
            serde_json::to_vec(&snapshot).map_err(|e| VectorStoreError::Persistence(e.to_string()))?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VectorStoreError::Persistence(e.to_string()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| VectorStoreError::Persistence(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| VectorStoreError::Persistence(e.to_string()))?;
        debug!(path = %path.display(), bytes = bytes.len(), "vector snapshot written");
        Ok(())
    }
}

#[async_trait]
impl VectorStore for EmbeddedVectorStore {
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
        {
            let mut state = self.state.write();
            Self::check_dimension(&mut state, &record)?;
            state.records.insert(record.id.clone(), record);
        }
        self.persist().await
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        if records.is_empty() {
            return Ok(());
        }
        {
            let mut state = self.state.write();
            for record in &records {
                Self::check_dimension(&mut state, record)?;
            }
            for record in records {
                state.records.insert(record.id.clone(), record);
            }
        }
        self.persist().await
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        let existed = self.state.write().records.remove(id).is_some();
        if existed {
            self.persist().await?;
        }
        Ok(existed)
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        Ok(self.state.read().records.get(id).cloned())
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let state = self.state.read();
        if let Some(expected) = state.dimension {
            if expected != vector.len() {
                return Err(VectorStoreError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        let mut matches: Vec<VectorMatch> = state
            .records
            .values()
            .filter(|record| filters.map_or(true, |f| f.matches(&record.metadata)))
            .map(|record| VectorMatch {
                distance: 1.0 - cosine_similarity(vector, &record.embedding),
                record: record.clone(),
            })
            .collect();
        matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        matches.truncate(k);
        Ok(matches)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.state.read().records.len())
    }

    async fn ids(&self) -> Result<Vec<String>, VectorStoreError> {
        Ok(self.state.read().records.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(name: &str, tags: &[&str]) -> RecordMetadata {
        RecordMetadata {
            name: name.to_string(),
            description: format!("{name} skill"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            version: "1.0.0".to_string(),
            source_path: format!("/skills/{name}"),
            tool_type: ToolType::Skill,
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = EmbeddedVectorStore::in_memory();
        store
            .upsert(VectorRecord::new(vec![1.0, 0.0], metadata("alpha", &[])))
            .await
            .unwrap();
        store
            .upsert(VectorRecord::new(vec![0.0, 1.0], metadata("alpha", &[])))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        let record = store.get(&skill_id("alpha")).await.unwrap().unwrap();
        assert_eq!(record.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_search_orders_by_distance() {
        let store = EmbeddedVectorStore::in_memory();
        store
            .upsert_batch(vec![
                VectorRecord::new(vec![1.0, 0.0], metadata("east", &[])),
                VectorRecord::new(vec![0.0, 1.0], metadata("north", &[])),
                VectorRecord::new(vec![0.7, 0.7], metadata("northeast", &[])),
            ])
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.1], 2, None).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|h| h.record.metadata.name.as_str()).collect();
        assert_eq!(names, vec!["east", "northeast"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_search_filters() {
        let store = EmbeddedVectorStore::in_memory();
        store
            .upsert_batch(vec![
                VectorRecord::new(vec![1.0, 0.0], metadata("files", &["io", "disk"])),
                VectorRecord::new(vec![1.0, 0.0], metadata("net", &["io"])),
            ])
            .await
            .unwrap();
        let filters = SearchFilters {
            tags: vec!["disk".to_string()],
            tool_type: None,
        };
        let hits = store.search(&[1.0, 0.0], 10, Some(&filters)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.metadata.name, "files");

        let mcp_only = SearchFilters {
            tags: vec![],
            tool_type: Some(ToolType::Mcp),
        };
        assert!(store.search(&[1.0, 0.0], 10, Some(&mcp_only)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = EmbeddedVectorStore::in_memory().with_dimension(3);
        let err = store
            .upsert(VectorRecord::new(vec![1.0, 0.0], metadata("a", &[])))
            .await
            .unwrap_err();
        assert!(matches!(err, VectorStoreError::DimensionMismatch { expected: 3, actual: 2 }));
        assert!(store.search(&[1.0], 1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = EmbeddedVectorStore::in_memory();
        store
            .upsert(VectorRecord::new(vec![1.0], metadata("gone", &[])))
            .await
            .unwrap();
        assert!(store.delete(&skill_id("gone")).await.unwrap());
        assert!(!store.delete(&skill_id("gone")).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index/vectors.json");
        {
            let store = EmbeddedVectorStore::open(&path).await.unwrap();
            store
                .upsert(VectorRecord::new(vec![0.5, 0.5], metadata("kept", &["x"])))
                .await
                .unwrap();
        }
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = EmbeddedVectorStore::open(&path).await.unwrap();
        assert_eq!(reopened.ids().await.unwrap(), vec![skill_id("kept")]);
        assert!(reopened
            .upsert(VectorRecord::new(vec![1.0], metadata("bad", &[])))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.json");
        std::fs::write(&path, "not json").unwrap();
        let store = EmbeddedVectorStore::open(&path).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }
}
