//! Runtime error types

use skillrun_config::ConfigError;
use skillrun_permissions::PermissionError;
use skillrun_registry::RegistryError;
use skillrun_retrieval::{EmbeddingError, RetrievalError, VectorStoreError};
use skillrun_sandbox::SandboxError;
use thiserror::Error;

/// Runtime result type
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors surfaced by [`crate::SkillRuntime`]
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

impl From<EmbeddingError> for RuntimeError {
    fn from(err: EmbeddingError) -> Self {
        RuntimeError::Retrieval(err.into())
    }
}

impl From<VectorStoreError> for RuntimeError {
    fn from(err: VectorStoreError) -> Self {
        RuntimeError::Retrieval(err.into())
    }
}
