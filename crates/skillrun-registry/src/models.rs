//! Request and result types for lifecycle operations

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skillrun_skills::{ContextMode, InstalledSkill, ValidationLevel};

/// Where a skill is installed from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallSource {
    /// `.zip`, `.tar.gz`/`.tgz` or `.tar` file
    Archive(PathBuf),
    /// Unpacked skill directory
    Directory(PathBuf),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstallOptions {
    /// Replace an installed skill with the same name
    pub overwrite: bool,
    /// Install without embedding
    pub skip_indexing: bool,
    pub validation_level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallResult {
    pub success: bool,
    pub skill_name: String,
    pub installed_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub vectorized: bool,
    /// An existing skill was uninstalled first
    pub replaced: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallResult {
    pub success: bool,
    pub skill_name: String,
    /// A vector record existed and was deleted
    pub vector_removed: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub success: bool,
    pub skill_name: String,
    pub description: String,
    /// False when the description changed but re-indexing failed
    pub reindexed: bool,
    pub message: String,
}

/// Listing view of an installed skill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSummary {
    pub name: String,
    pub description: String,
    pub version: String,
    pub tags: BTreeSet<String>,
    pub context_mode: ContextMode,
    pub user_invocable: bool,
    pub installed_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub vectorized: bool,
    pub path: PathBuf,
}

impl From<&InstalledSkill> for SkillSummary {
    fn from(skill: &InstalledSkill) -> Self {
        Self {
            name: skill.manifest.name.clone(),
            description: skill.manifest.description.clone(),
            version: skill.manifest.version.clone(),
            tags: skill.manifest.tags.clone(),
            context_mode: skill.manifest.context_mode,
            user_invocable: skill.manifest.user_invocable,
            installed_at: skill.installed_at,
            size_bytes: skill.size_bytes,
            vectorized: skill.vectorized,
            path: skill.path.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    InstalledAt,
    Size,
    Version,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Filter, sort and page parameters for `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListQuery {
    /// Case-insensitive substring of the name
    pub name: Option<String>,
    /// Skills must carry every one of these tags
    pub tags: Vec<String>,
    /// Requested sort keys; each orders by name
    pub sort_by: Vec<SortKey>,
    pub sort_order: SortOrder,
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            name: None,
            tags: Vec::new(),
            sort_by: Vec::new(),
            sort_order: SortOrder::Asc,
            page: 1,
            limit: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    /// Matches before paging
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Registry-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryStats {
    pub total_skills: usize,
    pub vectorized: usize,
    pub fork_mode: usize,
    pub inline_mode: usize,
    pub user_invocable: usize,
    pub total_size_bytes: u64,
    pub tags: BTreeMap<String, usize>,
    /// Records in the vector store, `None` when the store could not be queried
    pub vector_records: Option<usize>,
}

/// What `reconcile` found and fixed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub loaded: usize,
    pub reindexed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Vector record ids with no skill directory
    pub pruned: Vec<String>,
    /// Directories or skills that could not be loaded or embedded
    pub failed: Vec<String>,
}
