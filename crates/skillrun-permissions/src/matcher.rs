//! Allow-list pattern matching
//!
//! Three kinds of entry, tried in order:
//!
//! - **exact**: `file-read` matches only `file-read`
//! - **wildcard**: `*` and `?` compiled to an anchored regex (`file-*`, `*-read`, `f*e`)
//! - **declared prefix**: an entry ending in a separator (`file:`, `net.`) or a
//!   separator wildcard (`file:*`, `net.*`) grants the namespace before it.
//!   A `:` namespace is a declared one and covers every separator: `file:*`
//!   admits `file`, `file:read`, `file-read`, `file_read`, `file.read` and
//!   `file/read`. Any other separator only covers itself, so `file-*` admits
//!   `file-read` but not `file:delete`.

use regex::{Regex, RegexBuilder};

use crate::error::{PermissionError, Result};

/// Characters that separate a namespace from a tool name
pub const NAMESPACE_SEPARATORS: &[char] = &[':', '-', '_', '.', '/'];

/// Separator that declares a namespace spanning every separator
pub const DECLARED_SEPARATOR: char = ':';

#[derive(Debug, Clone)]
struct Namespace {
    name: String,
    separator: char,
}

impl Namespace {
    fn covers(&self, tool: &str) -> bool {
        match tool.strip_prefix(self.name.as_str()) {
            Some("") => true,
            Some(rest) if self.separator == DECLARED_SEPARATOR => {
                rest.starts_with(NAMESPACE_SEPARATORS)
            }
            Some(rest) => rest.starts_with(self.separator),
            None => false,
        }
    }

    fn rule(&self) -> String {
        format!("{}{}*", self.name, self.separator)
    }
}

#[derive(Debug, Clone)]
struct Wildcard {
    source: String,
    regex: Regex,
}

/// Compiled allow-list
#[derive(Debug, Clone)]
pub struct ToolMatcher {
    case_sensitive: bool,
    exact: Vec<String>,
    wildcards: Vec<Wildcard>,
    namespaces: Vec<Namespace>,
}

impl ToolMatcher {
    /// Compile an allow-list
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> Result<Self> {
        let mut matcher = Self {
            case_sensitive,
            exact: Vec::new(),
            wildcards: Vec::new(),
            namespaces: Vec::new(),
        };

        for pattern in patterns {
            let pattern = pattern.as_ref().trim();
            if pattern.is_empty() {
                continue;
            }
            let normalized = matcher.normalize(pattern);

            if let Some(namespace) = namespace_of(&normalized) {
                matcher.namespaces.push(namespace);
            }
            if normalized.contains(['*', '?']) {
                matcher.wildcards.push(Wildcard {
                    regex: compile_wildcard(pattern, case_sensitive)?,
                    source: pattern.to_string(),
                });
            } else if !normalized.ends_with(NAMESPACE_SEPARATORS) {
                matcher.exact.push(normalized);
            }
        }
        Ok(matcher)
    }

    fn normalize(&self, value: &str) -> String {
        if self.case_sensitive {
            value.to_string()
        } else {
            value.to_lowercase()
        }
    }

    /// Whether the allow-list has no entries
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcards.is_empty() && self.namespaces.is_empty()
    }

    /// Whether `tool` is allowed
    pub fn is_allowed(&self, tool: &str) -> bool {
        self.matching_rule(tool).is_some()
    }

    /// The rule that admits `tool`, for diagnostics
    pub fn matching_rule(&self, tool: &str) -> Option<String> {
        let tool = self.normalize(tool.trim());
        if tool.is_empty() {
            return None;
        }

        if let Some(exact) = self.exact.iter().find(|entry| **entry == tool) {
            return Some(exact.clone());
        }
        if let Some(wildcard) = self.wildcards.iter().find(|w| w.regex.is_match(&tool)) {
            return Some(wildcard.source.clone());
        }
        self.namespaces
            .iter()
            .find(|namespace| namespace.covers(&tool))
            .map(Namespace::rule)
    }
}

/// Namespace granted by an entry, if any: `file:` and `file:*` both grant `file`
fn namespace_of(pattern: &str) -> Option<Namespace> {
    let stem = pattern.strip_suffix('*').unwrap_or(pattern);
    let separator = stem.chars().next_back()?;
    if !NAMESPACE_SEPARATORS.contains(&separator) {
        return None;
    }
    let name = &stem[..stem.len() - separator.len_utf8()];
    if name.is_empty() || name.contains(['*', '?']) {
        return None;
    }
    Some(Namespace {
        name: name.to_string(),
        separator,
    })
}

/// Compile `*` / `?` wildcards into an anchored regex; everything else is literal
fn compile_wildcard(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '*' | '?' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if ch == '*' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');

    RegexBuilder::new(&source)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| PermissionError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}
