//! Retrieval error types

use skillrun_skills::SkillError;
use thiserror::Error;

/// Embedding provider failures
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    /// Network or transport failure talking to the provider
    #[error("Embedding transport error: {0}")]
    Transport(String),

    /// Provider answered with an error status
    #[error("Embedding provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    /// Provider answered with the wrong number of vectors
    #[error("Embedding count mismatch: expected {expected}, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    /// Provider answered with vectors of an unexpected dimension
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Batch exhausted its retries
    #[error("Embedding batch {batch} failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        batch: usize,
        attempts: u32,
        message: String,
    },

    /// Provider is misconfigured
    #[error("Embedding provider misconfigured: {0}")]
    Config(String),
}

/// Vector store failures
#[derive(Error, Debug, Clone)]
pub enum VectorStoreError {
    /// Store cannot be reached or is refusing work
    #[error("Vector store unavailable: {0}")]
    Unavailable(String),

    /// Record dimension does not match the index
    #[error("Vector dimension mismatch: index has {expected}, record has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Snapshot persistence failed
    #[error("Vector store persistence error: {0}")]
    Persistence(String),
}

/// Errors from indexing operations
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    Skill(#[from] SkillError),
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> Self {
        RetrievalError::Skill(SkillError::Io(err))
    }
}

/// Result type for retrieval operations
pub type Result<T> = std::result::Result<T, RetrievalError>;
