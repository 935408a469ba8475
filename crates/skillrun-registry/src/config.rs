//! Registry configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use skillrun_skills::validation::DEFAULT_RESERVED_WORDS;

/// Largest archive accepted for install
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 100 * 1024 * 1024;

/// Largest total size an archive may expand to
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Directory holding one sub-directory per installed skill
    pub root: PathBuf,
    pub max_archive_bytes: u64,
    pub max_extracted_bytes: u64,
    /// Words a skill name may not contain
    pub reserved_words: Vec<String>,
    /// Reconcile the registry against the index when the manager opens
    pub reconcile_on_open: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            max_extracted_bytes: DEFAULT_MAX_EXTRACTED_BYTES,
            reserved_words: DEFAULT_RESERVED_WORDS
                .iter()
                .map(|word| word.to_string())
                .collect(),
            reconcile_on_open: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Scratch space for installs; lives inside the root so moves are renames
    pub fn staging_dir(&self) -> PathBuf {
        self.root.join(".staging")
    }
}

fn default_root() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("skillrun").join("skills"))
        .unwrap_or_else(|| PathBuf::from("skills"))
}
