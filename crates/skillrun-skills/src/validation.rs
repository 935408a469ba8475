//! Structural validation of skills
//!
//! Every failed constraint is collected so callers get all field-level reasons in
//! one pass instead of fixing one field at a time.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{FieldError, Result, SkillError};
use crate::models::SkillManifest;

/// Maximum length of a skill name
pub const MAX_NAME_LENGTH: usize = 64;

/// Maximum length of a skill description
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

/// Words a skill name may not contain
pub const DEFAULT_RESERVED_WORDS: &[&str] = &["anthropic", "claude"];

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid name regex"));

/// How thorough validation is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Manifest constraints only
    #[default]
    Standard,
    /// Manifest constraints plus a `scripts/execute` entrypoint
    Strict,
}

/// Validates manifests and skill directory layout
#[derive(Debug, Clone)]
pub struct ManifestValidator {
    level: ValidationLevel,
    reserved_words: Vec<String>,
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new(ValidationLevel::Standard)
    }
}

impl ManifestValidator {
    /// Create a validator with the default reserved words
    pub fn new(level: ValidationLevel) -> Self {
        Self {
            level,
            reserved_words: DEFAULT_RESERVED_WORDS
                .iter()
                .map(|word| word.to_string())
                .collect(),
        }
    }

    /// Replace the reserved word list
    pub fn with_reserved_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_words = words
            .into_iter()
            .map(|word| word.into().to_ascii_lowercase())
            .collect();
        self
    }

    /// Validation level in use
    pub fn level(&self) -> ValidationLevel {
        self.level
    }

    /// Check a skill name against the naming rules
    pub fn check_name(&self, name: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(FieldError::new("name", "is required"));
            return errors;
        }
        if name.len() > MAX_NAME_LENGTH {
            errors.push(FieldError::new(
                "name",
                format!("must be at most {MAX_NAME_LENGTH} characters (got {})", name.len()),
            ));
        }
        if !NAME_PATTERN.is_match(name) {
            errors.push(FieldError::new(
                "name",
                "must contain only lowercase letters, digits and single hyphens",
            ));
        }
        for word in &self.reserved_words {
            if name.contains(word.as_str()) {
                errors.push(FieldError::new(
                    "name",
                    format!("must not contain reserved word '{word}'"),
                ));
            }
        }
        errors
    }

    /// Check a description against its constraints
    pub fn check_description(&self, description: &str) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if description.trim().is_empty() {
            errors.push(FieldError::new("description", "is required"));
        } else if description.chars().count() > MAX_DESCRIPTION_LENGTH {
            errors.push(FieldError::new(
                "description",
                format!("must be at most {MAX_DESCRIPTION_LENGTH} characters"),
            ));
        }
        errors
    }

    /// Validate manifest fields
    pub fn validate_manifest(&self, manifest: &SkillManifest) -> Result<()> {
        let mut errors = self.check_name(&manifest.name);
        errors.extend(self.check_description(&manifest.description));

        if semver::Version::parse(&manifest.version).is_err() {
            errors.push(FieldError::new(
                "version",
                format!("'{}' is not a semantic version", manifest.version),
            ));
        }

        for dependency in &manifest.dependencies {
            if dependency == &manifest.name {
                errors.push(FieldError::new("dependencies", "skill cannot depend on itself"));
            } else if !NAME_PATTERN.is_match(dependency) {
                errors.push(FieldError::new(
                    "dependencies",
                    format!("'{dependency}' is not a valid skill name"),
                ));
            }
        }

        if manifest.allowed_tools.iter().any(|tool| tool.trim().is_empty()) {
            errors.push(FieldError::new("allowedTools", "entries must not be empty"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SkillError::InvalidStructure { errors })
        }
    }

    /// Validate a manifest together with the directory it came from
    pub fn validate_skill_dir(&self, manifest: &SkillManifest, dir: &Path) -> Result<()> {
        let mut errors = match self.validate_manifest(manifest) {
            Ok(()) => Vec::new(),
            Err(SkillError::InvalidStructure { errors }) => errors,
            Err(other) => return Err(other),
        };

        if self.level == ValidationLevel::Strict && find_execute_script(dir).is_none() {
            errors.push(FieldError::new(
                "scripts/execute",
                "strict validation requires an executable entrypoint",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SkillError::InvalidStructure { errors })
        }
    }
}

/// Locate `scripts/execute` or `scripts/execute.<ext>` inside a skill directory
pub fn find_execute_script(dir: &Path) -> Option<std::path::PathBuf> {
    let scripts = dir.join("scripts");
    let entries = std::fs::read_dir(&scripts).ok()?;
    let mut candidates: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_stem()
                .and_then(|stem| stem.to_str())
                .map(|stem| stem == "execute")
                .unwrap_or(false)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(name: &str) -> SkillManifest {
        SkillManifest::new(name, "Does a thing")
    }

    #[test]
    fn test_valid_manifest() {
        let validator = ManifestValidator::default();
        assert!(validator.validate_manifest(&manifest("file-reader")).is_ok());
        assert!(validator.validate_manifest(&manifest("a1")).is_ok());
    }

    #[test]
    fn test_name_rules() {
        let validator = ManifestValidator::default();
        for bad in ["File-Reader", "file_reader", "-lead", "trail-", "double--dash", ""] {
            let err = validator.validate_manifest(&manifest(bad)).unwrap_err();
            assert!(
                err.field_errors().iter().any(|e| e.field == "name"),
                "expected name error for '{bad}'"
            );
        }
        let long = "a".repeat(MAX_NAME_LENGTH + 1);
        assert!(validator.validate_manifest(&manifest(&long)).is_err());
    }

    #[test]
    fn test_reserved_words() {
        let validator = ManifestValidator::default();
        let err = validator
            .validate_manifest(&manifest("claude-helper"))
            .unwrap_err();
        assert!(err.to_string().contains("reserved word"));

        let custom = ManifestValidator::default().with_reserved_words(["internal"]);
        assert!(custom.validate_manifest(&manifest("claude-helper")).is_ok());
        assert!(custom.validate_manifest(&manifest("internal-tool")).is_err());
    }

    #[test]
    fn test_collects_all_field_errors() {
        let mut bad = SkillManifest::new("Bad Name", "");
        bad.version = "latest".to_string();
        let err = ManifestValidator::default().validate_manifest(&bad).unwrap_err();
        let fields: Vec<&str> = err.field_errors().iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"description"));
        assert!(fields.contains(&"version"));
    }

    #[test]
    fn test_description_length() {
        let long = "x".repeat(MAX_DESCRIPTION_LENGTH + 1);
        let err = ManifestValidator::default()
            .validate_manifest(&SkillManifest::new("demo", long))
            .unwrap_err();
        assert_eq!(err.field_errors()[0].field, "description");
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut m = manifest("demo");
        m.dependencies.push("demo".to_string());
        assert!(ManifestValidator::default().validate_manifest(&m).is_err());
    }

    #[test]
    fn test_strict_requires_execute_script() {
        let dir = tempfile::tempdir().unwrap();
        let strict = ManifestValidator::new(ValidationLevel::Strict);
        let m = manifest("demo");

        let err = strict.validate_skill_dir(&m, dir.path()).unwrap_err();
        assert_eq!(err.field_errors()[0].field, "scripts/execute");

        std::fs::create_dir_all(dir.path().join("scripts")).unwrap();
        std::fs::write(dir.path().join("scripts/execute.sh"), "echo hi").unwrap();
        assert!(strict.validate_skill_dir(&m, dir.path()).is_ok());

        let standard = ManifestValidator::new(ValidationLevel::Standard);
        let empty = tempfile::tempdir().unwrap();
        assert!(standard.validate_skill_dir(&m, empty.path()).is_ok());
    }
}
