//! Skill runtime context
//!
//! One value owns every component. Callers construct it once and pass it (or an
//! `Arc` of it) wherever skills are managed, searched or executed.

use std::sync::Arc;

use skillrun_config::{ProviderKind, RuntimeConfig};
use skillrun_permissions::{AllowListProvider, PermissionDecision, PermissionValidator};
use skillrun_registry::{
    InstallOptions, InstallResult, InstallSource, ListQuery, PagedResult, ReconcileReport,
    RegistryStats, SkillManager, SkillSummary, UninstallResult, UpdateResult,
};
use skillrun_retrieval::{
    BatchEvent, EmbeddedVectorStore, EmbeddingProvider, HashingEmbedder, HttpEmbeddingProvider,
    RankedResult, RetrievalEngine, SearchOptions, SearchOutcome, VectorStore,
};
use skillrun_sandbox::{ExecutionOptions, ExecutionResult, SandboxExecutor};
use skillrun_skills::{ContextMode, InstalledSkill, SkillManifest};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Result, RuntimeError};

/// A request to run an installed skill
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub skill: String,
    /// Tools the invocation intends to use; checked against `allowedTools`
    pub tools: Vec<String>,
    /// Overrides the manifest's context mode
    pub mode: Option<ContextMode>,
    pub options: ExecutionOptions,
}

impl ExecuteRequest {
    pub fn new(skill: impl Into<String>) -> Self {
        Self {
            skill: skill.into(),
            ..Self::default()
        }
    }

    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn mode(mut self, mode: ContextMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Resolves allow-lists from the installed catalog
struct RegistryAllowList(Arc<SkillManager>);

impl AllowListProvider for RegistryAllowList {
    fn allowed_tools(&self, skill: &str) -> Option<Vec<String>> {
        self.0.allowed_tools(skill)
    }
}

/// Registry, retrieval, permissions and sandbox behind one handle
pub struct SkillRuntime {
    config: RuntimeConfig,
    retrieval: Arc<RetrievalEngine>,
    registry: Arc<SkillManager>,
    permissions: Arc<PermissionValidator>,
    sandbox: SandboxExecutor,
}

impl SkillRuntime {
    /// Build every component from `config`
    pub async fn open(config: RuntimeConfig) -> Result<Self> {
        Self::build(config, None).await
    }

    /// Same as [`SkillRuntime::open`], publishing batch embedding progress on `events`
    pub async fn open_with_events(
        config: RuntimeConfig,
        events: mpsc::Sender<BatchEvent>,
    ) -> Result<Self> {
        Self::build(config, Some(events)).await
    }

    async fn build(config: RuntimeConfig, events: Option<mpsc::Sender<BatchEvent>>) -> Result<Self> {
        config.validate()?;

        let provider = build_provider(&config)?;
        let store = build_store(&config).await?;
        let retrieval = Arc::new(match events {
            Some(events) => {
                RetrievalEngine::with_events(provider, store, config.retrieval.clone(), events)
            }
            None => RetrievalEngine::new(provider, store, config.retrieval.clone()),
        });

        let registry =
            Arc::new(SkillManager::open(config.registry.clone(), Arc::clone(&retrieval)).await?);
        let permissions = Arc::new(PermissionValidator::new(
            config.permissions.clone(),
            Arc::new(RegistryAllowList(Arc::clone(&registry))),
        ));
        let sandbox = SandboxExecutor::new(config.sandbox.clone());

        info!(
            root = %config.registry.root.display(),
            provider = %config.embedding.provider,
            permission_mode = %config.permissions.mode,
            "Skill runtime ready"
        );
        Ok(Self {
            config,
            retrieval,
            registry,
            permissions,
            sandbox,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SkillManager> {
        &self.registry
    }

    pub fn retrieval(&self) -> &Arc<RetrievalEngine> {
        &self.retrieval
    }

    pub fn permissions(&self) -> &Arc<PermissionValidator> {
        &self.permissions
    }

    pub fn sandbox(&self) -> &SandboxExecutor {
        &self.sandbox
    }

    pub async fn install(
        &self,
        source: InstallSource,
        options: InstallOptions,
    ) -> Result<InstallResult> {
        let result = self.registry.install(source, options).await?;
        self.permissions.invalidate(&result.skill_name);
        Ok(result)
    }

    pub async fn uninstall(&self, name: &str) -> Result<UninstallResult> {
        let result = self.registry.uninstall(name).await?;
        self.permissions.invalidate(name);
        Ok(result)
    }

    pub async fn update(&self, name: &str, description: &str) -> Result<UpdateResult> {
        let result = self.registry.update(name, description).await?;
        self.permissions.invalidate(name);
        Ok(result)
    }

    pub fn list(&self, query: &ListQuery) -> PagedResult<SkillSummary> {
        self.registry.list(query)
    }

    pub fn get(&self, name: &str) -> Option<SkillManifest> {
        self.registry.get(name)
    }

    pub fn get_installed(&self, name: &str) -> Option<InstalledSkill> {
        self.registry.get_installed(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.registry.exists(name)
    }

    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Vec<RankedResult> {
        self.retrieval.search(query, options).await
    }

    pub async fn search_detailed(&self, query: &str, options: &SearchOptions) -> SearchOutcome {
        self.retrieval.search_detailed(query, options).await
    }

    /// Rescan the registry and bring the index in line with it
    pub async fn reindex(&self) -> Result<ReconcileReport> {
        let report = self.registry.reconcile().await?;
        self.permissions.clear_cache();
        Ok(report)
    }

    /// Check a tool request without running anything
    pub fn validate_tools(&self, skill: &str, tools: &[String]) -> Result<PermissionDecision> {
        Ok(self.permissions.validate(skill, tools)?)
    }

    /// Permission check, then sandboxed execution in the requested or declared mode
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionResult> {
        let skill = self
            .registry
            .get_installed(&request.skill)
            .ok_or_else(|| RuntimeError::SkillNotFound(request.skill.clone()))?;

        let decision = self.permissions.validate(&request.skill, &request.tools)?;
        debug!(
            skill = %request.skill,
            unrestricted = decision.unrestricted,
            denied = ?decision.denied_tools,
            "Tool request permitted"
        );

        let mode = request.mode.unwrap_or(skill.manifest.context_mode);
        let result = self.sandbox.execute(&skill.path, mode, request.options).await?;
        info!(
            skill = %request.skill,
            %mode,
            success = result.success,
            duration_ms = result.duration_ms,
            "Skill executed"
        );
        Ok(result)
    }

    /// Terminate every in-flight fork execution; returns how many were running
    pub async fn shutdown(&self) -> usize {
        let terminated = self.sandbox.shutdown().await;
        info!(terminated, "Skill runtime shut down");
        terminated
    }
}

fn build_provider(config: &RuntimeConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(match config.embedding.provider {
        ProviderKind::Hashing => Arc::new(HashingEmbedder::new(config.embedding.hashing_dimension)),
        ProviderKind::Http => Arc::new(HttpEmbeddingProvider::new(config.embedding.http.clone())?),
    })
}

async fn build_store(config: &RuntimeConfig) -> Result<Arc<dyn VectorStore>> {
    Ok(match &config.store.snapshot_path {
        Some(path) => Arc::new(EmbeddedVectorStore::open(path.clone()).await?),
        None => Arc::new(EmbeddedVectorStore::in_memory().with_dimension(config.embedding.dimension())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillrun_permissions::{PermissionError, PermissionMode};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn config(root: &Path) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.registry.root = root.join("registry");
        config.sandbox.workspace_root = Some(root.join("work"));
        config
    }

    fn write_skill(root: &Path, name: &str, description: &str, tools: &str) -> PathBuf {
        let dir = root.join(format!("src-{name}"));
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(
            dir.join("SKILL.md"),
            format!(
                "---\nname: {name}\ndescription: {description}\nallowedTools: [{tools}]\n---\n\nUse it.\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join("scripts/execute.sh"), "echo hello from $SKILL_NAME\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_execute_checks_permissions_first() {
        let dir = TempDir::new().unwrap();
        let runtime = SkillRuntime::open(config(dir.path())).await.unwrap();
        let source = write_skill(dir.path(), "file-reader", "reads files from disk", "\"file:*\"");
        runtime
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();

        let result = runtime
            .execute(ExecuteRequest::new("file-reader").tools(["file-read"]))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.mode, ContextMode::Inline);
        assert!(result.inline.is_some());

        let err = runtime
            .execute(ExecuteRequest::new("file-reader").tools(["network-call"]))
            .await
            .unwrap_err();
        match err {
            RuntimeError::Permission(PermissionError::PermissionDenied { denied, .. }) => {
                assert_eq!(denied, vec!["network-call".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_skill() {
        let dir = TempDir::new().unwrap();
        let runtime = SkillRuntime::open(config(dir.path())).await.unwrap();
        assert!(matches!(
            runtime.execute(ExecuteRequest::new("ghost")).await,
            Err(RuntimeError::SkillNotFound(name)) if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_allow_list() {
        let dir = TempDir::new().unwrap();
        let runtime = SkillRuntime::open(config(dir.path())).await.unwrap();
        let source = write_skill(dir.path(), "net", "talks to the network", "\"file:*\"");
        runtime
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();
        let tools = vec!["network-call".to_string()];
        assert!(runtime.validate_tools("net", &tools).is_err());

        let source = write_skill(dir.path(), "net", "talks to the network", "network-call");
        runtime
            .install(
                InstallSource::Directory(source),
                InstallOptions {
                    overwrite: true,
                    ..InstallOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(runtime.validate_tools("net", &tools).unwrap().allowed);
    }

    #[tokio::test]
    async fn test_warn_mode_allows_denied_tools() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.permissions.mode = PermissionMode::Warn;
        let runtime = SkillRuntime::open(config).await.unwrap();
        let source = write_skill(dir.path(), "lenient", "allowed anyway", "\"file:*\"");
        runtime
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();

        let result = runtime
            .execute(ExecuteRequest::new("lenient").tools(["shell"]))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(runtime.permissions().audit().len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_uninstall() {
        let dir = TempDir::new().unwrap();
        let runtime = SkillRuntime::open(config(dir.path())).await.unwrap();
        let source = write_skill(dir.path(), "file-reader", "reads files from disk", "");
        runtime
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();

        let options = SearchOptions::default().with_min_score(0.0);
        let hits = runtime.search("reads files from disk", &options).await;
        assert_eq!(hits.first().map(|hit| hit.name.as_str()), Some("file-reader"));

        runtime.uninstall("file-reader").await.unwrap();
        assert!(runtime.search("reads files from disk", &options).await.is_empty());
        assert!(!runtime.exists("file-reader"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_fork_execution_through_runtime() {
        let dir = TempDir::new().unwrap();
        let runtime = SkillRuntime::open(config(dir.path())).await.unwrap();
        let source = write_skill(dir.path(), "greeter", "says hello", "");
        runtime
            .install(InstallSource::Directory(source), InstallOptions::default())
            .await
            .unwrap();

        let result = runtime
            .execute(ExecuteRequest::new("greeter").mode(ContextMode::Fork))
            .await
            .unwrap();
        assert!(result.success, "stderr: {}", result.stderr);
        assert_eq!(result.stdout.trim(), "hello from greeter");
        assert_eq!(runtime.shutdown().await, 0);
    }
}
