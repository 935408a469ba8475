//! SKILL.md parsing and rewriting

use std::path::Path;

use chrono::{DateTime, Utc};
use gray_matter::engine::YAML;
use gray_matter::Matter;
use serde_yaml::Value;
use tracing::debug;

use crate::errors::{Result, SkillError};
use crate::marker::VectorizedMarker;
use crate::models::{InstalledSkill, SkillManifest};
use crate::hashing::{directory_size, ContentHash};

/// Manifest file name at the root of every skill
pub const MANIFEST_FILE: &str = "SKILL.md";

/// Result of parsing a SKILL.md document
#[derive(Debug, Clone)]
pub struct ParsedSkill {
    /// Typed manifest
    pub manifest: SkillManifest,
    /// Markdown body after the front-matter
    pub instructions: String,
}

/// Parse SKILL.md content (front-matter + body)
pub fn parse_manifest(content: &str, path: &Path) -> Result<ParsedSkill> {
    let matter = Matter::<YAML>::new();
    let parsed = matter.parse(content);

    if parsed.matter.trim().is_empty() {
        return Err(SkillError::MissingFrontmatter {
            path: path.to_path_buf(),
        });
    }

    let manifest: SkillManifest = serde_yaml::from_str(&parsed.matter)
        .map_err(|e| SkillError::invalid("frontmatter", e.to_string()))?;

    Ok(ParsedSkill {
        manifest,
        instructions: parsed.content.trim().to_string(),
    })
}

/// Replace the `description` in SKILL.md content, keeping every other key and the body.
pub fn rewrite_description(content: &str, description: &str, path: &Path) -> Result<String> {
    let matter = Matter::<YAML>::new();
    let parsed = matter.parse(content);

    if parsed.matter.trim().is_empty() {
        return Err(SkillError::MissingFrontmatter {
            path: path.to_path_buf(),
        });
    }

    let mut front: Value = serde_yaml::from_str(&parsed.matter)?;
    let mapping = front
        .as_mapping_mut()
        .ok_or_else(|| SkillError::invalid("frontmatter", "must be a YAML mapping"))?;
    mapping.insert(
        Value::String("description".to_string()),
        Value::String(description.to_string()),
    );

    let yaml = serde_yaml::to_string(&front)?;
    Ok(format!("---\n{}---\n\n{}\n", yaml, parsed.content.trim()))
}

/// Load an installed skill from its registry directory
pub async fn read_skill(dir: &Path) -> Result<InstalledSkill> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let content = tokio::fs::read_to_string(&manifest_path).await?;
    let parsed = parse_manifest(&content, &manifest_path)?;

    let metadata = tokio::fs::metadata(dir).await?;
    let installed_at: DateTime<Utc> = metadata
        .created()
        .or_else(|_| metadata.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let size_bytes = directory_size(dir).await?;
    let hash = ContentHash::of_bytes(content.as_bytes());
    let vectorized = VectorizedMarker::load(dir)
        .await?
        .map(|marker| marker.matches(&hash))
        .unwrap_or(false);

    debug!(skill = %parsed.manifest.name, path = %dir.display(), vectorized, "Loaded skill");

    Ok(InstalledSkill {
        manifest: parsed.manifest,
        instructions: parsed.instructions,
        path: dir.to_path_buf(),
        installed_at,
        size_bytes,
        vectorized,
    })
}
