//! Content hashing for re-index decisions
//!
//! The hash covers the manifest bytes only: the manifest is the sole input to the
//! embedding, so script changes never force a re-embed.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::Result;
use crate::manifest::MANIFEST_FILE;

/// Digest plus byte length of a manifest
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash {
    /// Hex-encoded SHA-256
    pub digest: String,
    /// Size in bytes of the hashed content
    pub size: u64,
}

impl ContentHash {
    /// Hash raw bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self {
            digest: hex::encode(digest),
            size: bytes.len() as u64,
        }
    }

    /// Hash the SKILL.md inside a skill directory
    pub async fn of_skill_dir(dir: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(dir.join(MANIFEST_FILE)).await?;
        Ok(Self::of_bytes(&bytes))
    }
}

/// Deterministic vector record id for a skill name; stable across re-index.
pub fn skill_id(name: &str) -> String {
    let digest = Sha256::digest(format!("skill:{name}").as_bytes());
    hex::encode(&digest[..16])
}

/// Total size in bytes of all regular files below `dir`
pub async fn directory_size(dir: &Path) -> Result<u64> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let a = ContentHash::of_bytes(b"name: demo");
        let b = ContentHash::of_bytes(b"name: demo");
        assert_eq!(a, b);
        assert_eq!(a.size, 10);
        assert_eq!(a.digest.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = ContentHash::of_bytes(b"description: one");
        let b = ContentHash::of_bytes(b"description: two");
        assert_ne!(a.digest, b.digest);
    }

    #[test]
    fn test_skill_id_deterministic() {
        assert_eq!(skill_id("file-reader"), skill_id("file-reader"));
        assert_ne!(skill_id("file-reader"), skill_id("file-writer"));
        assert_eq!(skill_id("file-reader").len(), 32);
    }

    #[tokio::test]
    async fn test_directory_size_recurses() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path().join("scripts")).await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"12345").await.unwrap();
        tokio::fs::write(dir.path().join("scripts/b.txt"), b"678").await.unwrap();
        assert_eq!(directory_size(dir.path()).await.unwrap(), 8);
    }
}
