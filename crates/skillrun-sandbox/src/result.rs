//! Execution results

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use skillrun_skills::ContextMode;

use crate::error::SandboxError;

/// What an inline execution hands back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineContext {
    pub skill: String,
    pub working_dir: PathBuf,
    /// Files in the skill directory, relative to `working_dir`
    pub files: Vec<PathBuf>,
    /// Manifest body
    pub instructions: String,
}

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: String,
    pub skill: String,
    pub mode: ContextMode,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Output hit the cap and the process was terminated
    pub truncated: bool,
    pub exit_code: Option<i32>,
    /// Signal that terminated the process (unix)
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline: Option<InlineContext>,
}

impl ExecutionResult {
    /// Convert an unsuccessful result into the matching typed error
    pub fn into_result(self) -> Result<Self, SandboxError> {
        if self.timed_out {
            return Err(SandboxError::ExecutionTimeout {
                skill: self.skill,
                timeout_ms: self.duration_ms,
            });
        }
        if !self.success {
            return Err(SandboxError::ExecutionFailed {
                message: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "execution failed".to_string()),
                skill: self.skill,
                exit_code: self.exit_code,
                signal: self.signal,
            });
        }
        Ok(self)
    }
}
