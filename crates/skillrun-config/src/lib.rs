//! Runtime configuration for skillrun
//!
//! Aggregates the registry, retrieval, sandbox and permission settings into one
//! [`RuntimeConfig`] loaded from an optional TOML file and `SKILLRUN__*`
//! environment variables, for example `SKILLRUN__SANDBOX__TIMEOUT_MS=5000`.

pub mod error;
pub mod loader;
pub mod types;

pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, ENV_PREFIX};
pub use types::{EmbeddingSettings, ProviderKind, RuntimeConfig, StoreSettings};
