//! Per-execution options

use std::collections::BTreeMap;
use std::time::Duration;

/// Overrides for one execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Wall-clock limit (config default when unset)
    pub timeout: Option<Duration>,
    /// Memory limit in megabytes (config default when unset)
    pub memory_limit_mb: Option<u64>,
    /// Output cap in bytes (config default when unset)
    pub max_output_bytes: Option<usize>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    /// Files written into the workspace before launch, by relative path
    pub files: BTreeMap<String, String>,
    /// Arguments passed to the entrypoint
    pub args: Vec<String>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn memory_limit_mb(mut self, megabytes: u64) -> Self {
        self.memory_limit_mb = Some(megabytes);
        self
    }

    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}
