//! Lifecycle hooks
//!
//! Hooks are registered per skill name and per [`HookPoint`]. A skill with no hook
//! at a point simply skips it.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use skillrun_skills::SkillManifest;
use tracing::debug;

/// Where in a lifecycle operation a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HookPoint {
    PreInstall,
    PostInstall,
    PreUninstall,
    PostUninstall,
    PreUpdate,
    PostUpdate,
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookPoint::PreInstall => "preInstall",
            HookPoint::PostInstall => "postInstall",
            HookPoint::PreUninstall => "preUninstall",
            HookPoint::PostUninstall => "postUninstall",
            HookPoint::PreUpdate => "preUpdate",
            HookPoint::PostUpdate => "postUpdate",
        };
        f.write_str(name)
    }
}

/// What a hook sees
#[derive(Debug, Clone)]
pub struct HookContext {
    pub skill: String,
    pub point: HookPoint,
    /// Skill directory, staged or installed depending on the point
    pub path: Option<PathBuf>,
    pub manifest: Option<SkillManifest>,
}

/// Failure reported by a hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError(pub String);

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for HookError {}

/// An async lifecycle callback
pub type HookFn =
    Arc<dyn Fn(HookContext) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync>;

/// Hooks registered for one skill
#[derive(Clone, Default)]
pub struct SkillHooks {
    hooks: HashMap<HookPoint, HookFn>,
}

impl SkillHooks {
    pub fn get(&self, point: HookPoint) -> Option<&HookFn> {
        self.hooks.get(&point)
    }

    pub fn points(&self) -> Vec<HookPoint> {
        self.hooks.keys().copied().collect()
    }
}

impl fmt::Debug for SkillHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkillHooks")
            .field("points", &self.points())
            .finish()
    }
}

/// Hooks for every skill, keyed by skill name
#[derive(Debug, Default)]
pub struct HookRegistry {
    skills: DashMap<String, SkillHooks>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` for `skill` at `point`, replacing any previous one
    pub fn register<F>(&self, skill: &str, point: HookPoint, hook: F)
    where
        F: Fn(HookContext) -> BoxFuture<'static, Result<(), HookError>> + Send + Sync + 'static,
    {
        self.skills
            .entry(skill.to_string())
            .or_default()
            .hooks
            .insert(point, Arc::new(hook));
        debug!(skill, %point, "Registered lifecycle hook");
    }

    /// Drop every hook for `skill`
    pub fn unregister(&self, skill: &str) -> bool {
        self.skills.remove(skill).is_some()
    }

    pub fn has_hook(&self, skill: &str, point: HookPoint) -> bool {
        self.skills
            .get(skill)
            .map(|hooks| hooks.get(point).is_some())
            .unwrap_or(false)
    }

    /// Run the hook for the context's skill and point; absent hooks succeed
    pub async fn run(&self, context: HookContext) -> Result<(), HookError> {
        // clone out so the map guard is not held across the await
        let hook = self
            .skills
            .get(&context.skill)
            .and_then(|hooks| hooks.get(context.point).cloned());
        match hook {
            Some(hook) => {
                debug!(skill = %context.skill, point = %context.point, "Running lifecycle hook");
                hook(context).await
            }
            None => Ok(()),
        }
    }
}
