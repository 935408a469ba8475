//! Permission validator configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How denials are enforced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionMode {
    /// Deny and raise `PermissionDenied`
    #[default]
    Strict,
    /// Log denials and allow
    Warn,
    /// Always allow
    Disabled,
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionMode::Strict => write!(f, "strict"),
            PermissionMode::Warn => write!(f, "warn"),
            PermissionMode::Disabled => write!(f, "disabled"),
        }
    }
}

impl FromStr for PermissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(PermissionMode::Strict),
            "warn" => Ok(PermissionMode::Warn),
            "disabled" | "off" => Ok(PermissionMode::Disabled),
            other => Err(format!("unknown permission mode '{other}'")),
        }
    }
}

/// Permission validator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub mode: PermissionMode,
    /// Whether tool names compare case-sensitively
    pub case_sensitive: bool,
    /// Decision cache lifetime in seconds; 0 disables caching
    pub cache_ttl_secs: u64,
    /// Maximum cached decisions
    pub cache_capacity: usize,
    /// Audit entries kept in memory
    pub audit_capacity: usize,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            mode: PermissionMode::Strict,
            case_sensitive: true,
            cache_ttl_secs: 300,
            cache_capacity: 1024,
            audit_capacity: 1000,
        }
    }
}

impl PermissionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}
