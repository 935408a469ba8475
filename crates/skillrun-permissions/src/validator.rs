//! Permission validator
//!
//! Looks up a skill's allow-list through an [`AllowListProvider`], evaluates the
//! requested tools and applies the configured [`PermissionMode`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit::{AuditEntry, AuditLog, AuditOutcome};
use crate::cache::DecisionCache;
use crate::config::{PermissionConfig, PermissionMode};
use crate::error::{PermissionError, Result};
use crate::matcher::ToolMatcher;

/// Source of skill allow-lists
pub trait AllowListProvider: Send + Sync {
    /// The skill's `allowedTools`, or `None` when the skill is unknown
    fn allowed_tools(&self, skill: &str) -> Option<Vec<String>>;
}

impl<F> AllowListProvider for F
where
    F: Fn(&str) -> Option<Vec<String>> + Send + Sync,
{
    fn allowed_tools(&self, skill: &str) -> Option<Vec<String>> {
        self(skill)
    }
}

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDecision {
    pub skill: String,
    pub allowed: bool,
    /// Requested tools outside the allow-list, sorted
    pub denied_tools: Vec<String>,
    /// The skill declares no allow-list
    pub unrestricted: bool,
}

impl PermissionDecision {
    fn allow_all(skill: &str) -> Self {
        Self {
            skill: skill.to_string(),
            allowed: true,
            denied_tools: Vec::new(),
            unrestricted: true,
        }
    }
}

/// Gates tool invocations against skill allow-lists
pub struct PermissionValidator {
    config: PermissionConfig,
    provider: Arc<dyn AllowListProvider>,
    cache: DecisionCache,
    audit: AuditLog,
}

impl PermissionValidator {
    pub fn new(config: PermissionConfig, provider: Arc<dyn AllowListProvider>) -> Self {
        Self {
            cache: DecisionCache::new(config.cache_ttl(), config.cache_capacity),
            audit: AuditLog::new(config.audit_capacity),
            config,
            provider,
        }
    }

    pub fn config(&self) -> &PermissionConfig {
        &self.config
    }

    pub fn mode(&self) -> PermissionMode {
        self.config.mode
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Evaluate `tools` against the skill's allow-list without applying the mode
    pub fn check(&self, skill: &str, tools: &[String]) -> Result<PermissionDecision> {
        let key = DecisionCache::key(skill, tools);
        if let Some(decision) = self.cache.get(&key) {
            return Ok(decision);
        }

        let allowed_tools = self
            .provider
            .allowed_tools(skill)
            .ok_or_else(|| PermissionError::SkillNotFound(skill.to_string()))?;

        let matcher = ToolMatcher::new(&allowed_tools, self.config.case_sensitive)?;
        let decision = if matcher.is_empty() {
            debug!(skill, "Skill declares no allowed tools, allowing all");
            PermissionDecision::allow_all(skill)
        } else {
            let denied_tools: Vec<String> = key
                .1
                .iter()
                .filter(|tool| !matcher.is_allowed(tool))
                .cloned()
                .collect();
            PermissionDecision {
                skill: skill.to_string(),
                allowed: denied_tools.is_empty(),
                denied_tools,
                unrestricted: false,
            }
        };

        self.cache.insert(key, decision.clone());
        Ok(decision)
    }

    /// Validate a tool request under the configured mode
    ///
    /// - `strict`: denials return [`PermissionError::PermissionDenied`]
    /// - `warn`: denials are logged and the request is allowed
    /// - `disabled`: every request is allowed without a lookup
    pub fn validate(&self, skill: &str, tools: &[String]) -> Result<PermissionDecision> {
        let mode = self.config.mode;
        if mode == PermissionMode::Disabled {
            self.audit.record(AuditEntry::new(skill, tools, &[], mode, AuditOutcome::Allowed));
            return Ok(PermissionDecision::allow_all(skill));
        }

        let decision = self.check(skill, tools)?;
        if decision.allowed {
            self.audit.record(AuditEntry::new(skill, tools, &[], mode, AuditOutcome::Allowed));
            return Ok(decision);
        }

        match mode {
            PermissionMode::Warn => {
                warn!(skill, denied = ?decision.denied_tools, "Tools outside allow-list, allowing in warn mode");
                self.audit.record(AuditEntry::new(
                    skill,
                    tools,
                    &decision.denied_tools,
                    mode,
                    AuditOutcome::Warned,
                ));
                Ok(PermissionDecision {
                    allowed: true,
                    ..decision
                })
            }
            _ => {
                warn!(skill, denied = ?decision.denied_tools, "Permission denied");
                self.audit.record(AuditEntry::new(
                    skill,
                    tools,
                    &decision.denied_tools,
                    mode,
                    AuditOutcome::Denied,
                ));
                Err(PermissionError::PermissionDenied {
                    skill: skill.to_string(),
                    requested: tools.to_vec(),
                    denied: decision.denied_tools,
                })
            }
        }
    }

    /// Forget cached decisions for a skill; call after install, update or uninstall
    pub fn invalidate(&self, skill: &str) {
        self.cache.invalidate(skill);
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        lists: HashMap<String, Vec<String>>,
        lookups: AtomicUsize,
    }

    impl AllowListProvider for StaticProvider {
        fn allowed_tools(&self, skill: &str) -> Option<Vec<String>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.lists.get(skill).cloned()
        }
    }

    fn provider() -> Arc<StaticProvider> {
        let mut lists = HashMap::new();
        lists.insert("file-reader".to_string(), vec!["file:*".to_string()]);
        lists.insert("open".to_string(), vec![]);
        Arc::new(StaticProvider {
            lists,
            lookups: AtomicUsize::new(0),
        })
    }

    fn tools(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn validator(mode: PermissionMode) -> (PermissionValidator, Arc<StaticProvider>) {
        let provider = provider();
        let config = PermissionConfig {
            mode,
            ..Default::default()
        };
        (PermissionValidator::new(config, provider.clone()), provider)
    }

    #[test]
    fn test_namespace_allow_and_deny() {
        let (v, _) = validator(PermissionMode::Strict);
        let ok = v.validate("file-reader", &tools(&["file-read"])).unwrap();
        assert!(ok.allowed);
        assert!(ok.denied_tools.is_empty());

        let err = v.validate("file-reader", &tools(&["network-call"])).unwrap_err();
        assert_eq!(
            err,
            PermissionError::PermissionDenied {
                skill: "file-reader".to_string(),
                requested: tools(&["network-call"]),
                denied: tools(&["network-call"]),
            }
        );
    }

    #[test]
    fn test_check_reports_denied_subset() {
        let (v, _) = validator(PermissionMode::Strict);
        let decision = v
            .check("file-reader", &tools(&["network-call", "file-read", "exec"]))
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.denied_tools, tools(&["exec", "network-call"]));
    }

    #[test]
    fn test_warn_mode_allows_with_denied_list() {
        let (v, _) = validator(PermissionMode::Warn);
        let decision = v.validate("file-reader", &tools(&["network-call"])).unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.denied_tools, tools(&["network-call"]));
        assert_eq!(v.audit().recent(1)[0].outcome, AuditOutcome::Warned);
    }

    #[test]
    fn test_disabled_mode_skips_lookup() {
        let (v, provider) = validator(PermissionMode::Disabled);
        assert!(v.validate("unknown", &tools(&["anything"])).unwrap().allowed);
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let (v, _) = validator(PermissionMode::Strict);
        let decision = v.validate("open", &tools(&["network-call", "exec"])).unwrap();
        assert!(decision.allowed);
        assert!(decision.unrestricted);
    }

    #[test]
    fn test_unknown_skill() {
        let (v, _) = validator(PermissionMode::Strict);
        assert_eq!(
            v.validate("missing", &tools(&["x"])).unwrap_err(),
            PermissionError::SkillNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_cache_reuses_decision_regardless_of_order() {
        let (v, provider) = validator(PermissionMode::Strict);
        let first = v.check("file-reader", &tools(&["b-tool", "file-read"])).unwrap();
        let second = v.check("file-reader", &tools(&["file-read", "b-tool"])).unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);

        v.invalidate("file-reader");
        v.check("file-reader", &tools(&["file-read"])).unwrap();
        assert_eq!(provider.lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_closure_provider() {
        let provider = |skill: &str| (skill == "x").then(|| vec!["db-*".to_string()]);
        let v = PermissionValidator::new(PermissionConfig::default(), Arc::new(provider));
        assert!(v.validate("x", &tools(&["db-query"])).is_ok());
        assert!(v.validate("x", &tools(&["fs-read"])).is_err());
    }

    #[test]
    fn test_empty_request_allowed() {
        let (v, _) = validator(PermissionMode::Strict);
        assert!(v.validate("file-reader", &[]).unwrap().allowed);
    }
}
