// Command-line definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use skillrun_registry::{SortKey, SortOrder};
use skillrun_skills::{ContextMode, ToolType};

/// skillrun - install, search and run skills
#[derive(Parser, Debug)]
#[command(name = "skillrun")]
#[command(bin_name = "skillrun")]
#[command(about = "Install, search and run sandboxed skills")]
#[command(version)]
#[command(author = "Skillrun Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: <config dir>/skillrun/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the registry directory
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Single-line JSON output
    #[arg(long, global = true)]
    pub compact: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Install a skill from an archive (.zip, .tar.gz, .tar) or a directory
    Install {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Replace an installed skill with the same name
        #[arg(long)]
        overwrite: bool,

        /// Install without embedding the description
        #[arg(long)]
        skip_indexing: bool,

        /// Require an executable scripts/execute entrypoint
        #[arg(long)]
        strict: bool,
    },

    /// Remove an installed skill and its index record
    Uninstall {
        name: String,
    },

    /// Replace a skill's description and re-index it
    Update {
        name: String,

        #[arg(short, long)]
        description: String,
    },

    /// List installed skills
    List {
        /// Case-insensitive name substring
        #[arg(long)]
        name: Option<String>,

        /// Required tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        /// Sort keys (each falls back to name order)
        #[arg(long, value_enum, value_delimiter = ',')]
        sort_by: Vec<SortArg>,

        #[arg(long, value_enum, default_value_t = OrderArg::Asc)]
        order: OrderArg,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one skill's manifest
    Show {
        name: String,
    },

    /// Report whether a skill is installed
    Exists {
        name: String,
    },

    /// Registry counters
    Stats,

    /// Semantic search over installed skills
    Search {
        query: String,

        #[arg(short, long)]
        limit: Option<usize>,

        #[arg(long)]
        min_score: Option<f32>,

        /// Required tag (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,

        #[arg(long, value_enum)]
        tool_type: Option<ToolTypeArg>,

        /// Bypass the semantic cache
        #[arg(long)]
        skip_cache: bool,

        /// Do not store the results in the semantic cache
        #[arg(long)]
        no_cache: bool,

        /// Include which search path answered
        #[arg(long)]
        detailed: bool,
    },

    /// Run an installed skill
    Exec {
        name: String,

        /// Tool the run intends to use (repeatable)
        #[arg(long = "tool", value_name = "TOOL")]
        tools: Vec<String>,

        /// Override the skill's context mode
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(long, value_name = "MS")]
        timeout_ms: Option<u64>,

        #[arg(long, value_name = "MB")]
        memory_mb: Option<u64>,

        #[arg(long, value_name = "BYTES")]
        max_output: Option<usize>,

        /// Extra environment variable (repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        env: Vec<(String, String)>,

        /// Arguments passed to the entrypoint
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Rescan the registry, re-index stale skills and prune orphaned records
    Reindex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Name,
    InstalledAt,
    Size,
    Version,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Name => SortKey::Name,
            SortArg::InstalledAt => SortKey::InstalledAt,
            SortArg::Size => SortKey::Size,
            SortArg::Version => SortKey::Version,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OrderArg {
    Asc,
    Desc,
}

impl From<OrderArg> for SortOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Asc => SortOrder::Asc,
            OrderArg::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Fork,
    Inline,
}

impl From<ModeArg> for ContextMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Fork => ContextMode::Fork,
            ModeArg::Inline => ContextMode::Inline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ToolTypeArg {
    Skill,
    Mcp,
    Builtin,
}

impl From<ToolTypeArg> for ToolType {
    fn from(arg: ToolTypeArg) -> Self {
        match arg {
            ToolTypeArg::Skill => ToolType::Skill,
            ToolTypeArg::Mcp => ToolType::Mcp,
            ToolTypeArg::Builtin => ToolType::Builtin,
        }
    }
}

/// `KEY=VALUE`
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
