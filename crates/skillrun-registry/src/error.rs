//! Registry error types

use std::path::PathBuf;

use skillrun_retrieval::RetrievalError;
use skillrun_skills::{FieldError, SkillError};
use thiserror::Error;

use crate::hooks::HookPoint;

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Skill '{name}' not found")]
    SkillNotFound { name: String },

    #[error("Skill '{name}' already exists")]
    SkillAlreadyExists { name: String },

    /// Every failed constraint, with the field it applies to
    #[error("Invalid skill structure: {}", join_errors(.errors))]
    InvalidStructure { errors: Vec<FieldError> },

    #[error("Archive is {size} bytes, limit is {limit}")]
    ArchiveTooLarge { size: u64, limit: u64 },

    #[error("Unsupported archive format: {}", .0.display())]
    UnsupportedArchive(PathBuf),

    #[error("Archive error: {0}")]
    Archive(String),

    /// A lifecycle hook rejected the operation
    #[error("{point} hook failed for '{skill}': {message}")]
    Hook {
        point: HookPoint,
        skill: String,
        message: String,
    },

    /// Indexing or vector store failure
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Skill(SkillError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// Field-level reasons when this is a validation failure, empty otherwise
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::InvalidStructure { errors } => errors,
            _ => &[],
        }
    }
}

impl From<SkillError> for RegistryError {
    fn from(err: SkillError) -> Self {
        match err {
            SkillError::NotFound { name } => Self::SkillNotFound { name },
            SkillError::AlreadyExists { name } => Self::SkillAlreadyExists { name },
            SkillError::InvalidStructure { errors } => Self::InvalidStructure { errors },
            SkillError::Io(err) => Self::Io(err),
            other => Self::Skill(other),
        }
    }
}

impl From<zip::result::ZipError> for RegistryError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Archive(err.to_string())
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
