//! Skill registry for skillrun
//!
//! Owns the on-disk registry directory and keeps it consistent with the vector
//! index. Installs are staged under `<root>/.staging` and moved into place only
//! after validation and the `preInstall` hook succeed; a failure after that point
//! rolls the skill back out of both the directory and the index.

pub mod archive;
pub mod config;
pub mod error;
pub mod hooks;
pub mod listing;
pub mod manager;
pub mod models;

pub use archive::{extract_archive, find_skill_root, ArchiveKind};
pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use hooks::{HookContext, HookError, HookFn, HookPoint, HookRegistry};
pub use listing::apply_query;
pub use manager::SkillManager;
pub use models::{
    InstallOptions, InstallResult, InstallSource, ListQuery, PagedResult, ReconcileReport,
    RegistryStats, SkillSummary, SortKey, SortOrder, UninstallResult, UpdateResult,
};
