//! # skillrun-sandbox
//!
//! Runs skill code behind an isolation boundary.
//!
//! - **Fork mode**: a private workspace (`0700`) receives a copy of the skill, an
//!   entrypoint is chosen from a fixed priority list, and the process runs in its
//!   own process group with a scrubbed environment. Output is capped, the
//!   wall-clock timeout kills the whole group, and the workspace is removed on
//!   every exit path with retry.
//! - **Inline mode**: no subprocess. The skill's working directory and file list
//!   are handed back for the caller to interpret.
//!
//! Every fork execution is tracked in a [`ProcessRegistry`] so a global shutdown
//! can terminate all of them.
//!
//! ```rust,no_run
//! use skillrun_sandbox::{ExecutionOptions, SandboxConfig, SandboxExecutor};
//! use skillrun_skills::ContextMode;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = SandboxExecutor::new(SandboxConfig::default());
//! let result = executor
//!     .execute(
//!         "/var/lib/skillrun/skills/file-reader".as_ref(),
//!         ContextMode::Fork,
//!         ExecutionOptions::new().timeout(Duration::from_secs(5)),
//!     )
//!     .await?;
//! println!("{}", result.stdout);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entrypoint;
pub mod error;
pub mod executor;
pub mod options;
pub mod output;
pub mod registry;
pub mod result;
pub mod workspace;

pub use config::SandboxConfig;
pub use entrypoint::{find_entrypoint, Entrypoint, ENTRYPOINT_CANDIDATES};
pub use error::{Result, SandboxError};
pub use executor::SandboxExecutor;
pub use options::ExecutionOptions;
pub use output::{OutputCapture, StreamKind, TRUNCATION_MARKER};
pub use registry::{ActiveProcess, ProcessGuard, ProcessRegistry};
pub use result::{ExecutionResult, InlineContext};
pub use workspace::Workspace;
