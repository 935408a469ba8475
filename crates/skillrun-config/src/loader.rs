//! Configuration loading
//!
//! Sources, later ones winning:
//! 1. Built-in defaults
//! 2. TOML file (optional)
//! 3. `SKILLRUN__<SECTION>__<KEY>` environment variables

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use tracing::debug;

use crate::error::Result;
use crate::types::RuntimeConfig;

/// Default environment prefix
pub const ENV_PREFIX: &str = "SKILLRUN";

/// Loads [`RuntimeConfig`] from file and environment
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Load from a specific file instead of the default location
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// `<config dir>/skillrun/config.toml`
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skillrun")
            .join("config.toml")
    }

    /// Merge all sources and validate the result
    pub fn load(&self) -> Result<RuntimeConfig> {
        let config = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let runtime: RuntimeConfig = config.try_deserialize()?;
        runtime.validate()?;
        debug!(path = %self.config_path.display(), "Loaded configuration");
        Ok(runtime)
    }

    /// Write `config` as TOML to the loader's path
    pub fn save(&self, config: &RuntimeConfig) -> Result<()> {
        let toml = toml::to_string_pretty(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
