//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use skillrun_config::RuntimeConfig;
use skillrun_retrieval::{
    EmbeddedVectorStore, EmbeddingError, EmbeddingProvider, HashingEmbedder, SearchFilters,
    VectorMatch, VectorRecord, VectorStore, VectorStoreError,
};
use tokio::sync::Notify;

/// Skill fixture written to disk
pub struct SkillFixture {
    pub name: String,
    pub description: String,
    pub allowed_tools: Vec<String>,
    pub context: &'static str,
    pub script: Option<String>,
}

impl SkillFixture {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            allowed_tools: Vec::new(),
            context: "inline",
            script: None,
        }
    }

    pub fn allowed_tools(mut self, tools: &[&str]) -> Self {
        self.allowed_tools = tools.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Fork-mode skill running `script` through `sh`
    pub fn fork_script(mut self, script: &str) -> Self {
        self.context = "fork";
        self.script = Some(script.to_string());
        self
    }

    pub fn manifest(&self) -> String {
        let tools = self
            .allowed_tools
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "---\nname: {}\ndescription: \"{}\"\nversion: 1.0.0\ncontext: {}\nallowedTools: [{}]\n---\n\nInstructions for {}.\n",
            self.name, self.description, self.context, tools, self.name
        )
    }

    /// Write the skill as a directory under `parent`
    pub fn write_dir(&self, parent: &Path) -> PathBuf {
        let dir = parent.join(format!("source-{}", self.name));
        std::fs::create_dir_all(dir.join("scripts")).unwrap();
        std::fs::write(dir.join("SKILL.md"), self.manifest()).unwrap();
        let script = self.script.clone().unwrap_or_else(|| "echo ok\n".to_string());
        std::fs::write(dir.join("scripts/execute.sh"), script).unwrap();
        dir
    }

    /// Write the skill as a zip archive nested in a top-level directory
    pub fn write_zip(&self, parent: &Path) -> PathBuf {
        let path = parent.join(format!("{}.zip", self.name));
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
        zip.start_file(format!("{}/SKILL.md", self.name), options).unwrap();
        zip.write_all(self.manifest().as_bytes()).unwrap();
        zip.start_file(format!("{}/scripts/execute.sh", self.name), options)
            .unwrap();
        let script = self.script.clone().unwrap_or_else(|| "echo ok\n".to_string());
        zip.write_all(script.as_bytes()).unwrap();
        zip.finish().unwrap();
        path
    }
}

/// Runtime configuration rooted in a temp directory
pub fn runtime_config(root: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.registry.root = root.join("registry");
    config.sandbox.workspace_root = Some(root.join("workspaces"));
    config
}

/// Hashing embedder that counts provider calls
#[derive(Default)]
pub struct CountingEmbedder {
    inner: HashingEmbedder,
    pub calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    fn name(&self) -> &str {
        "counting"
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// In-memory store whose k-NN search can be switched off
#[derive(Default)]
pub struct FlakyStore {
    inner: EmbeddedVectorStore,
    pub fail_search: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: EmbeddedVectorStore::in_memory(),
            fail_search: AtomicBool::new(false),
        })
    }

    pub fn break_search(&self) {
        self.fail_search.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl VectorStore for FlakyStore {
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
        self.inner.upsert(record).await
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        self.inner.upsert_batch(records).await
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        self.inner.delete(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        self.inner.get(id).await
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(VectorStoreError::Unavailable("search disabled".to_string()));
        }
        self.inner.search(vector, k, filters).await
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        self.inner.count().await
    }

    async fn ids(&self) -> Result<Vec<String>, VectorStoreError> {
        self.inner.ids().await
    }
}

/// In-memory store whose k-NN search can be paused after it has read the index
#[derive(Default)]
pub struct GatedStore {
    inner: EmbeddedVectorStore,
    gated: AtomicBool,
    /// Signalled once a gated search has its results
    pub reached: Notify,
    /// Lets a gated search return
    pub release: Notify,
}

impl GatedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }
}

#[async_trait]
impl VectorStore for GatedStore {
    async fn upsert(&self, record: VectorRecord) -> Result<(), VectorStoreError> {
        self.inner.upsert(record).await
    }

    async fn upsert_batch(&self, records: Vec<VectorRecord>) -> Result<(), VectorStoreError> {
        self.inner.upsert_batch(records).await
    }

    async fn delete(&self, id: &str) -> Result<bool, VectorStoreError> {
        self.inner.delete(id).await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>, VectorStoreError> {
        self.inner.get(id).await
    }

    async fn search(
        &self,
        vector: &[f32],
        k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<VectorMatch>, VectorStoreError> {
        let matches = self.inner.search(vector, k, filters).await;
        if self.gated.load(Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
        matches
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        self.inner.count().await
    }

    async fn ids(&self) -> Result<Vec<String>, VectorStoreError> {
        self.inner.ids().await
    }
}
