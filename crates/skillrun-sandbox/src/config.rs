//! Sandbox configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Defaults applied when an execution does not override them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit in milliseconds
    pub timeout_ms: u64,
    /// Memory limit in megabytes, passed as hints and as `RLIMIT_AS` when enforced
    pub memory_limit_mb: u64,
    /// Apply the memory limit as an address-space rlimit (unix)
    pub enforce_memory_limit: bool,
    /// Combined stdout + stderr cap in bytes
    pub max_output_bytes: usize,
    /// Parent directory for fork workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,
    /// Parent environment variables passed through to skills
    pub env_allowlist: Vec<String>,
    /// Workspace removal retries after the first attempt
    pub cleanup_retries: u32,
    /// Base delay between removal attempts in milliseconds
    pub cleanup_base_delay_ms: u64,
    /// Time allowed for output readers to drain after exit, in milliseconds
    pub drain_timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            memory_limit_mb: 512,
            enforce_memory_limit: true,
            max_output_bytes: 1024 * 1024,
            workspace_root: None,
            env_allowlist: ["PATH", "LANG", "LC_ALL", "TZ"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cleanup_retries: 3,
            cleanup_base_delay_ms: 50,
            drain_timeout_ms: 500,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Directory fork workspaces are created under
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("skillrun-sandbox"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SandboxConfig::default();
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.memory_limit_mb, 512);
        assert_eq!(config.max_output_bytes, 1_048_576);
        assert!(config.env_allowlist.contains(&"PATH".to_string()));
        assert!(config.workspace_root().ends_with("skillrun-sandbox"));
    }

    #[test]
    fn test_partial_deserialize() {
        let config: SandboxConfig = serde_json::from_str(r#"{"timeout_ms": 100}"#).unwrap();
        assert_eq!(config.timeout_ms, 100);
        assert_eq!(config.cleanup_retries, 3);
    }
}
