//! Error types for permission validation

use thiserror::Error;

/// Errors that can occur during permission validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PermissionError {
    /// Requested tools fall outside the skill's allow-list (strict mode)
    #[error("Skill '{skill}' is not permitted to use: {}", denied.join(", "))]
    PermissionDenied {
        skill: String,
        requested: Vec<String>,
        denied: Vec<String>,
    },

    /// No allow-list is known for the skill
    #[error("Skill not found: {0}")]
    SkillNotFound(String),

    /// Allow-list entry could not be compiled
    #[error("Invalid tool pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Result type for permission operations
pub type Result<T> = std::result::Result<T, PermissionError>;
