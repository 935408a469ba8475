//! Skill lifecycle manager
//!
//! Installs land in `<root>/<name>`. Every mutating operation on a name holds
//! that name's async lock, so install, uninstall and update of the same skill
//! never interleave while different skills proceed in parallel.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use skillrun_retrieval::RetrievalEngine;
use skillrun_skills::{
    parse_manifest, read_skill, rewrite_description, skill_id, ContextMode, InstalledSkill,
    ManifestValidator, SkillManifest, ValidationLevel, MANIFEST_FILE,
};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::{copy_dir, extract_archive, find_skill_root, move_dir};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::hooks::{HookContext, HookPoint, HookRegistry};
use crate::listing::apply_query;
use crate::models::{
    InstallOptions, InstallResult, InstallSource, ListQuery, PagedResult, ReconcileReport,
    RegistryStats, SkillSummary, UninstallResult, UpdateResult,
};

/// Install, uninstall, update and query skills in one registry directory
pub struct SkillManager {
    config: RegistryConfig,
    retrieval: Arc<RetrievalEngine>,
    hooks: Arc<HookRegistry>,
    catalog: RwLock<BTreeMap<String, InstalledSkill>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SkillManager {
    /// Open the registry, creating its root and reconciling it when configured
    pub async fn open(config: RegistryConfig, retrieval: Arc<RetrievalEngine>) -> Result<Self> {
        tokio::fs::create_dir_all(&config.root).await?;
        let manager = Self {
            config,
            retrieval,
            hooks: Arc::new(HookRegistry::new()),
            catalog: RwLock::new(BTreeMap::new()),
            locks: DashMap::new(),
        };

        if manager.config.reconcile_on_open {
            let report = manager.reconcile().await?;
            info!(
                root = %manager.config.root.display(),
                loaded = report.loaded,
                reindexed = report.reindexed.len(),
                pruned = report.pruned.len(),
                "Opened skill registry"
            );
        } else {
            manager.load_catalog().await;
        }
        Ok(manager)
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Lifecycle hooks, shared with callers that register them
    pub fn hooks(&self) -> &Arc<HookRegistry> {
        &self.hooks
    }

    pub fn retrieval(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    /// Install a skill from an archive or directory
    pub async fn install(
        &self,
        source: InstallSource,
        options: InstallOptions,
    ) -> Result<InstallResult> {
        let started = Instant::now();
        let staging = self
            .config
            .staging_dir()
            .join(format!("install-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&staging).await?;

        let outcome = self.install_staged(&source, &staging, options, started).await;

        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(staging = %staging.display(), error = %e, "Failed to remove staging directory");
            }
        }
        outcome
    }

    async fn install_staged(
        &self,
        source: &InstallSource,
        staging: &Path,
        options: InstallOptions,
        started: Instant,
    ) -> Result<InstallResult> {
        let skill_root = self.stage(source, staging).await?;
        let manifest_path = skill_root.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&manifest_path).await?;
        let manifest = parse_manifest(&content, &manifest_path)?.manifest;
        self.validator(options.validation_level)
            .validate_skill_dir(&manifest, &skill_root)?;

        let name = manifest.name.clone();
        let _guard = self.lock(&name).await;

        let target = self.config.root.join(&name);
        let replaced = self.is_installed_dir(&name, &target).await;
        if replaced {
            if !options.overwrite {
                return Err(RegistryError::SkillAlreadyExists { name });
            }
            info!(skill = %name, "Overwriting installed skill");
            self.uninstall_locked(&name).await?;
        }

        self.run_hook(HookPoint::PreInstall, &name, Some(&skill_root), Some(&manifest))
            .await?;

        let installed = match self
            .install_core(&skill_root, &target, options.skip_indexing)
            .await
        {
            Ok(installed) => installed,
            Err(err) => {
                self.rollback_install(&name, &target, &manifest).await;
                return Err(err);
            }
        };

        if let Err(e) = self
            .run_hook(HookPoint::PostInstall, &name, Some(&target), Some(&manifest))
            .await
        {
            warn!(skill = %name, error = %e, "postInstall hook failed");
        }

        let result = InstallResult {
            success: true,
            skill_name: name.clone(),
            installed_at: installed.installed_at,
            duration_ms: started.elapsed().as_millis() as u64,
            vectorized: installed.vectorized,
            replaced,
            message: format!("Skill '{name}' installed"),
        };
        self.catalog.write().insert(name.clone(), installed);
        info!(skill = %name, duration_ms = result.duration_ms, vectorized = result.vectorized, "Installed skill");
        Ok(result)
    }

    /// Unpack or copy the source into staging and locate its manifest
    async fn stage(&self, source: &InstallSource, staging: &Path) -> Result<PathBuf> {
        let unpacked = staging.join("skill");
        match source {
            InstallSource::Archive(archive) => {
                let size = tokio::fs::metadata(archive).await?.len();
                if size > self.config.max_archive_bytes {
                    return Err(RegistryError::ArchiveTooLarge {
                        size,
                        limit: self.config.max_archive_bytes,
                    });
                }
                let archive = archive.clone();
                let target = unpacked.clone();
                let limit = self.config.max_extracted_bytes;
                tokio::task::spawn_blocking(move || extract_archive(&archive, &target, limit))
                    .await
                    .map_err(|e| RegistryError::Io(std::io::Error::other(e)))??;
            }
            InstallSource::Directory(dir) => {
                let source = dir.clone();
                let target = unpacked.clone();
                tokio::task::spawn_blocking(move || copy_dir(&source, &target))
                    .await
                    .map_err(|e| RegistryError::Io(std::io::Error::other(e)))??;
            }
        }

        let root = unpacked.clone();
        tokio::task::spawn_blocking(move || find_skill_root(&root))
            .await
            .map_err(|e| RegistryError::Io(std::io::Error::other(e)))?
    }

    async fn install_core(
        &self,
        skill_root: &Path,
        target: &Path,
        skip_indexing: bool,
    ) -> Result<InstalledSkill> {
        let source = skill_root.to_path_buf();
        let destination = target.to_path_buf();
        tokio::task::spawn_blocking(move || move_dir(&source, &destination))
            .await
            .map_err(|e| RegistryError::Io(std::io::Error::other(e)))??;

        let mut installed = read_skill(target).await?;
        if !skip_indexing {
            self.retrieval.index(&installed).await?;
            installed.vectorized = true;
        }
        Ok(installed)
    }

    /// Undo a partial install; failures are logged so the original error survives
    async fn rollback_install(&self, name: &str, target: &Path, manifest: &SkillManifest) {
        warn!(skill = %name, "Install failed, rolling back");
        if let Err(e) = self
            .run_hook(HookPoint::PreUninstall, name, Some(target), Some(manifest))
            .await
        {
            error!(skill = %name, error = %e, "Rollback preUninstall hook failed");
        }
        if let Err(e) = self.retrieval.remove(name, None).await {
            error!(skill = %name, error = %e, "Rollback could not remove vector record");
        }
        match tokio::fs::remove_dir_all(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!(skill = %name, error = %e, "Rollback could not remove skill directory"),
        }
    }

    /// Remove a skill, its vector record and its marker
    pub async fn uninstall(&self, name: &str) -> Result<UninstallResult> {
        let guard = self.lock(name).await;
        let result = self.uninstall_locked(name).await;
        self.release(name, guard);
        result
    }

    async fn uninstall_locked(&self, name: &str) -> Result<UninstallResult> {
        let target = self.config.root.join(name);
        if !self.is_installed_dir(name, &target).await {
            return Err(RegistryError::SkillNotFound {
                name: name.to_string(),
            });
        }
        let manifest = self.get(name);

        self.run_hook(HookPoint::PreUninstall, name, Some(&target), manifest.as_ref())
            .await?;

        let vector_removed = self.retrieval.remove(name, Some(&target)).await?;
        tokio::fs::remove_dir_all(&target).await?;
        self.catalog.write().remove(name);

        if let Err(e) = self
            .run_hook(HookPoint::PostUninstall, name, None, manifest.as_ref())
            .await
        {
            warn!(skill = %name, error = %e, "postUninstall hook failed");
        }

        info!(skill = %name, vector_removed, "Uninstalled skill");
        Ok(UninstallResult {
            success: true,
            skill_name: name.to_string(),
            vector_removed,
            message: format!("Skill '{name}' uninstalled"),
        })
    }

    /// Replace a skill's description and re-index it
    ///
    /// A failed re-index keeps the new description and reports `reindexed: false`.
    pub async fn update(&self, name: &str, description: &str) -> Result<UpdateResult> {
        let _guard = self.lock(name).await;
        let target = self.config.root.join(name);
        if !self.is_installed_dir(name, &target).await {
            return Err(RegistryError::SkillNotFound {
                name: name.to_string(),
            });
        }

        let description = description.trim();
        let errors = ManifestValidator::default().check_description(description);
        if !errors.is_empty() {
            return Err(RegistryError::InvalidStructure { errors });
        }

        let manifest = self.get(name);
        self.run_hook(HookPoint::PreUpdate, name, Some(&target), manifest.as_ref())
            .await?;

        let manifest_path = target.join(MANIFEST_FILE);
        let content = tokio::fs::read_to_string(&manifest_path).await?;
        let rewritten = rewrite_description(&content, description, &manifest_path)?;
        let staged = target.join(format!("{MANIFEST_FILE}.tmp"));
        tokio::fs::write(&staged, rewritten).await?;
        tokio::fs::rename(&staged, &manifest_path).await?;

        let mut skill = read_skill(&target).await?;
        let reindexed = match self.retrieval.index(&skill).await {
            Ok(outcome) => {
                debug!(skill = %name, ?outcome, "Re-indexed after update");
                skill.vectorized = true;
                true
            }
            Err(e) => {
                warn!(skill = %name, error = %e, "Re-index after update failed");
                false
            }
        };
        let updated_manifest = skill.manifest.clone();
        self.catalog.write().insert(name.to_string(), skill);

        if let Err(e) = self
            .run_hook(HookPoint::PostUpdate, name, Some(&target), Some(&updated_manifest))
            .await
        {
            warn!(skill = %name, error = %e, "postUpdate hook failed");
        }

        Ok(UpdateResult {
            success: true,
            skill_name: name.to_string(),
            description: description.to_string(),
            reindexed,
            message: if reindexed {
                format!("Skill '{name}' updated")
            } else {
                format!("Skill '{name}' updated but not re-indexed")
            },
        })
    }

    /// Filtered, sorted, paged view of installed skills
    pub fn list(&self, query: &ListQuery) -> PagedResult<SkillSummary> {
        let summaries = self
            .catalog
            .read()
            .values()
            .map(SkillSummary::from)
            .collect();
        apply_query(summaries, query)
    }

    pub fn get(&self, name: &str) -> Option<SkillManifest> {
        self.catalog
            .read()
            .get(name)
            .map(|skill| skill.manifest.clone())
    }

    pub fn get_installed(&self, name: &str) -> Option<InstalledSkill> {
        self.catalog.read().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.catalog.read().contains_key(name)
    }

    /// Directory of an installed skill
    pub fn skill_path(&self, name: &str) -> Option<PathBuf> {
        self.catalog.read().get(name).map(|skill| skill.path.clone())
    }

    /// Allow-list declared by an installed skill
    pub fn allowed_tools(&self, name: &str) -> Option<Vec<String>> {
        self.catalog
            .read()
            .get(name)
            .map(|skill| skill.manifest.allowed_tools.clone())
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = {
            let catalog = self.catalog.read();
            let mut stats = RegistryStats {
                total_skills: catalog.len(),
                ..RegistryStats::default()
            };
            for skill in catalog.values() {
                if skill.vectorized {
                    stats.vectorized += 1;
                }
                match skill.manifest.context_mode {
                    ContextMode::Fork => stats.fork_mode += 1,
                    ContextMode::Inline => stats.inline_mode += 1,
                }
                if skill.manifest.user_invocable {
                    stats.user_invocable += 1;
                }
                stats.total_size_bytes += skill.size_bytes;
                for tag in &skill.manifest.tags {
                    *stats.tags.entry(tag.clone()).or_default() += 1;
                }
            }
            stats
        };
        stats.vector_records = match self.retrieval.count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Could not count vector records");
                None
            }
        };
        stats
    }

    /// Rescan the registry, re-index stale skills and prune orphaned records
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let (mut skills, failed) = self.scan().await?;
        report.failed.extend(failed);
        report.loaded = skills.len();

        let bulk = self.retrieval.index_many(&skills).await?;
        let embedded: HashSet<&str> = bulk
            .indexed
            .iter()
            .chain(bulk.unchanged.iter())
            .map(String::as_str)
            .collect();
        for skill in &mut skills {
            skill.vectorized = embedded.contains(skill.name());
        }

        let live: HashSet<String> = skills.iter().map(|skill| skill_id(skill.name())).collect();
        report.pruned = self.retrieval.prune(&live).await?;
        report.reindexed = bulk.indexed;
        report.unchanged = bulk.unchanged;
        report.failed.extend(bulk.failed);

        let mut catalog = self.catalog.write();
        catalog.clear();
        catalog.extend(skills.into_iter().map(|skill| (skill.name().to_string(), skill)));
        Ok(report)
    }

    /// Load the catalog from disk without touching the index
    async fn load_catalog(&self) {
        match self.scan().await {
            Ok((skills, _)) => {
                let mut catalog = self.catalog.write();
                catalog.clear();
                catalog.extend(skills.into_iter().map(|skill| (skill.name().to_string(), skill)));
            }
            Err(e) => warn!(error = %e, "Failed to scan registry"),
        }
    }

    /// Read every skill directory under the root; returns loaded skills and failures
    async fn scan(&self) -> Result<(Vec<InstalledSkill>, Vec<String>)> {
        let mut skills = Vec::new();
        let mut failed = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.config.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            if dir_name.starts_with('.') || !entry.file_type().await?.is_dir() {
                continue;
            }
            match read_skill(&entry.path()).await {
                Ok(skill) if skill.name() == dir_name => skills.push(skill),
                Ok(skill) => {
                    warn!(dir = %dir_name, skill = %skill.name(), "Directory name does not match manifest name");
                    failed.push(dir_name);
                }
                Err(e) => {
                    warn!(dir = %dir_name, error = %e, "Skipping unreadable skill directory");
                    failed.push(dir_name);
                }
            }
        }
        skills.sort_by(|a, b| a.name().cmp(b.name()));
        Ok((skills, failed))
    }

    async fn is_installed_dir(&self, name: &str, target: &Path) -> bool {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return false;
        }
        tokio::fs::metadata(target)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    fn validator(&self, level: ValidationLevel) -> ManifestValidator {
        ManifestValidator::new(level).with_reserved_words(self.config.reserved_words.iter().cloned())
    }

    async fn lock(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Unlock and forget the name's mutex when no other task holds or awaits it
    fn release(&self, name: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks
            .remove_if(name, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn run_hook(
        &self,
        point: HookPoint,
        name: &str,
        path: Option<&Path>,
        manifest: Option<&SkillManifest>,
    ) -> Result<()> {
        let context = HookContext {
            skill: name.to_string(),
            point,
            path: path.map(Path::to_path_buf),
            manifest: manifest.cloned(),
        };
        self.hooks
            .run(context)
            .await
            .map_err(|e| RegistryError::Hook {
                point,
                skill: name.to_string(),
                message: e.to_string(),
            })
    }
}
