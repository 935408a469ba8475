//! Skill error taxonomy

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A single manifest or layout constraint that a skill failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Manifest field (or layout item such as `scripts/execute`)
    pub field: String,
    /// Human-readable reason
    pub reason: String,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Errors raised while reading, validating or locating skills
#[derive(Error, Debug)]
pub enum SkillError {
    /// Skill not found
    #[error("Skill '{name}' not found")]
    NotFound { name: String },

    /// A skill with the same name is already installed
    #[error("Skill '{name}' already exists")]
    AlreadyExists { name: String },

    /// Manifest or layout validation failed
    #[error("Invalid skill structure: {}", join_errors(.errors))]
    InvalidStructure { errors: Vec<FieldError> },

    /// SKILL.md has no front-matter block
    #[error("Skill manifest at {path} is missing its front-matter block")]
    MissingFrontmatter { path: PathBuf },

    /// Front-matter is not valid YAML for a manifest
    #[error("YAML parsing error in skill front-matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Marker (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error while reading a skill
    #[error("IO error reading skill: {0}")]
    Io(#[from] std::io::Error),
}

impl SkillError {
    /// Shorthand for a single-field validation failure
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidStructure {
            errors: vec![FieldError::new(field, reason)],
        }
    }

    /// Field-level reasons when this is a validation failure, empty otherwise
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            Self::InvalidStructure { errors } => errors,
            _ => &[],
        }
    }
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for skill operations
pub type Result<T> = std::result::Result<T, SkillError>;
