//! Skill runtime for skillrun
//!
//! [`SkillRuntime`] is the single context object that owns the registry, the
//! retrieval engine, the permission validator and the sandbox. Execution always
//! goes permission check first, then sandbox:
//!
//! ```text
//! execute(request)
//!   ├─ registry: resolve installed skill
//!   ├─ permissions: validate requested tools (strict / warn / disabled)
//!   └─ sandbox: fork (subprocess) or inline (context only)
//! ```

pub mod error;
pub mod runtime;

pub use error::{Result, RuntimeError};
pub use runtime::{ExecuteRequest, SkillRuntime};
