//! Skill model for skillrun
//!
//! A skill is a directory holding a `SKILL.md` manifest (YAML front-matter plus a
//! free-text body) and optional scripts. This crate owns everything that can be
//! said about a skill without touching the vector index or a subprocess:
//!
//! - `SkillManifest` parsing from `SKILL.md` (camelCase fields plus kebab/snake aliases)
//! - Structural validation at `Standard` or `Strict` level with field-level reasons
//! - Content hashing and the deterministic vector record id
//! - The `VectorizedMarker` sidecar used to decide whether re-embedding is needed
//!
//! ```text
//! registry/
//! └── file-reader/
//!     ├── SKILL.md
//!     ├── .vectorized.json
//!     └── scripts/
//!         └── execute.sh
//! ```

pub mod errors;
pub mod hashing;
pub mod manifest;
pub mod marker;
pub mod models;
pub mod validation;

pub use errors::{FieldError, Result, SkillError};
pub use hashing::{directory_size, skill_id, ContentHash};
pub use manifest::{parse_manifest, read_skill, rewrite_description, ParsedSkill, MANIFEST_FILE};
pub use marker::{VectorizedMarker, MARKER_FILE};
pub use models::{ContextMode, InstalledSkill, SkillManifest, ToolType};
pub use validation::{find_execute_script, ManifestValidator, ValidationLevel};
