//! Tool permission validation for skills
//!
//! Gates tool invocations against a skill's declared `allowedTools` list.
//! Matching precedence is exact, then wildcard, then declared prefix. Decisions
//! are cached per `(skill, sorted request set)` with a TTL; the cache never
//! changes an outcome.

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod matcher;
pub mod validator;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use cache::DecisionCache;
pub use config::{PermissionConfig, PermissionMode};
pub use error::{PermissionError, Result};
pub use matcher::{ToolMatcher, NAMESPACE_SEPARATORS};
pub use validator::{AllowListProvider, PermissionDecision, PermissionValidator};
