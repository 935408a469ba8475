//! Error types for sandboxed execution

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::result::ExecutionResult;

/// Sandbox errors
#[derive(Debug, Error)]
pub enum SandboxError {
    /// Skill ran past its wall-clock limit
    #[error("Skill '{skill}' timed out after {timeout_ms}ms")]
    ExecutionTimeout { skill: String, timeout_ms: u64 },

    /// Skill exited unsuccessfully or was terminated
    #[error("Skill '{skill}' failed: {message}")]
    ExecutionFailed {
        skill: String,
        exit_code: Option<i32>,
        signal: Option<i32>,
        message: String,
    },

    /// No conventional entrypoint in the skill directory
    #[error("No entrypoint found in {}", path.display())]
    EntrypointNotFound { path: PathBuf },

    /// Skill directory is missing or unreadable
    #[error("Invalid skill at {}: {reason}", path.display())]
    InvalidSkill { path: PathBuf, reason: String },

    /// Caller-supplied file would land outside the workspace
    #[error("File path escapes the workspace: {0}")]
    UnsafePath(String),

    /// Workspace creation or population failed
    #[error("Workspace error: {0}")]
    Workspace(#[source] io::Error),

    /// Failed to spawn the entrypoint
    #[error("Failed to spawn process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Workspace could not be removed after execution; the result is preserved
    #[error("Workspace cleanup failed: {source}")]
    CleanupFailed {
        result: Box<ExecutionResult>,
        #[source]
        source: io::Error,
    },
}

impl SandboxError {
    /// Execution result carried by a cleanup failure
    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        match self {
            SandboxError::CleanupFailed { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// Result type for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;
