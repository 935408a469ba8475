//! Vectorized marker sidecar
//!
//! `.vectorized.json` records which manifest content was last embedded. The vector
//! record and this file are created and deleted together by the indexer.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::Result;
use crate::hashing::ContentHash;

/// Marker file name inside a skill directory
pub const MARKER_FILE: &str = ".vectorized.json";

/// What was embedded, and when
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorizedMarker {
    /// Epoch milliseconds of the last successful index
    pub indexed_at: i64,
    /// Manifest size in bytes
    pub skill_size: u64,
    /// Manifest content digest
    pub skill_hash: String,
}

impl VectorizedMarker {
    /// Marker for content indexed now
    pub fn new(hash: &ContentHash) -> Self {
        Self {
            indexed_at: Utc::now().timestamp_millis(),
            skill_size: hash.size,
            skill_hash: hash.digest.clone(),
        }
    }

    /// Whether the marker still describes `hash`
    pub fn matches(&self, hash: &ContentHash) -> bool {
        self.skill_size == hash.size && self.skill_hash == hash.digest
    }

    /// Read the marker from a skill directory. A corrupt marker reads as absent.
    pub async fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MARKER_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(marker) => Ok(Some(marker)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Ignoring corrupt vectorized marker");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist the marker into a skill directory
    pub async fn save(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(dir.join(MARKER_FILE), json).await?;
        Ok(())
    }

    /// Delete the marker; missing markers are fine
    pub async fn remove(dir: &Path) -> Result<()> {
        match tokio::fs::remove_file(dir.join(MARKER_FILE)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
