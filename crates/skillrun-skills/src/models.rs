//! Skill data models

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Default version applied when the manifest omits one
pub const DEFAULT_VERSION: &str = "0.1.0";

/// How a skill's code is run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    /// Isolated subprocess in a copied workspace
    Fork,
    /// Shared context, no subprocess
    #[default]
    Inline,
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextMode::Fork => write!(f, "fork"),
            ContextMode::Inline => write!(f, "inline"),
        }
    }
}

impl FromStr for ContextMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fork" => Ok(ContextMode::Fork),
            "inline" => Ok(ContextMode::Inline),
            other => Err(format!("unknown context mode '{other}'")),
        }
    }
}

/// Discriminator stored with every vector record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    #[default]
    Skill,
    Mcp,
    Builtin,
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolType::Skill => write!(f, "skill"),
            ToolType::Mcp => write!(f, "mcp"),
            ToolType::Builtin => write!(f, "builtin"),
        }
    }
}

/// Parsed skill metadata from SKILL.md front-matter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillManifest {
    /// Unique skill name (lowercase, alphanumeric + hyphen)
    #[serde(default, deserialize_with = "string_or_empty")]
    pub name: String,

    /// What the skill does; this is the text that gets embedded
    #[serde(default, deserialize_with = "string_or_empty")]
    pub description: String,

    /// Semantic version string
    #[serde(default = "default_version", deserialize_with = "string_or_number")]
    pub version: String,

    /// Tags for categorization and filtering
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Optional author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Ordered list of required skill names
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    /// Tool-name patterns the skill may invoke; empty means unrestricted
    #[serde(
        default,
        alias = "allowed-tools",
        alias = "allowed_tools",
        deserialize_with = "tool_list"
    )]
    pub allowed_tools: Vec<String>,

    /// Execution context mode
    #[serde(default, alias = "context", alias = "context-mode", alias = "context_mode")]
    pub context_mode: ContextMode,

    /// Whether users may invoke the skill directly
    #[serde(
        default = "default_user_invocable",
        alias = "user-invocable",
        alias = "user_invocable"
    )]
    pub user_invocable: bool,

    /// Kind of tool the skill exposes
    #[serde(default, alias = "tool-type", alias = "tool_type")]
    pub tool_type: ToolType,

    /// Lifecycle hook descriptors, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<serde_json::Value>,
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

fn default_user_invocable() -> bool {
    true
}

/// Missing and null text fields become empty so validation can name them.
fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// YAML turns `version: 1.0` into a float; accept it as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Int(value) => value.to_string(),
        Raw::Float(value) => value.to_string(),
    })
}

/// `allowedTools` may be a YAML list or a single comma/space separated string.
fn tool_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
        Null(()),
    }

    let tools = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Text(text) => text
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::to_string)
            .collect(),
        Raw::Null(()) => Vec::new(),
    };

    Ok(tools
        .into_iter()
        .map(|tool| tool.trim().to_string())
        .filter(|tool| !tool.is_empty())
        .collect())
}

impl SkillManifest {
    /// Minimal manifest with defaults for everything but name and description
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: default_version(),
            tags: BTreeSet::new(),
            author: None,
            dependencies: Vec::new(),
            allowed_tools: Vec::new(),
            context_mode: ContextMode::default(),
            user_invocable: default_user_invocable(),
            tool_type: ToolType::default(),
            hooks: None,
        }
    }

    /// Text that represents this skill in the vector index
    pub fn embedding_text(&self) -> String {
        let mut text = format!("{}: {}", self.name, self.description);
        if !self.tags.is_empty() {
            let tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
            text.push_str(" [");
            text.push_str(&tags.join(", "));
            text.push(']');
        }
        text
    }

    /// True when the manifest places no restriction on tool calls
    pub fn is_unrestricted(&self) -> bool {
        self.allowed_tools.is_empty()
    }
}

/// A skill as it lives inside the registry directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledSkill {
    /// Parsed manifest
    pub manifest: SkillManifest,
    /// Markdown body following the front-matter
    pub instructions: String,
    /// Skill directory inside the registry
    pub path: PathBuf,
    /// When the skill landed in the registry
    pub installed_at: DateTime<Utc>,
    /// Total bytes on disk
    pub size_bytes: u64,
    /// Whether a valid vectorized marker is present
    pub vectorized: bool,
}

impl InstalledSkill {
    /// Skill name
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    /// Path of the SKILL.md file
    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(crate::manifest::MANIFEST_FILE)
    }
}
