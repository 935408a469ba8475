//! In-memory audit trail of permission checks

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PermissionMode;

/// What happened to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Every requested tool was allowed
    Allowed,
    /// Some tools were outside the allow-list but the mode let the call through
    Warned,
    /// The request was refused
    Denied,
}

/// One recorded check
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub skill: String,
    pub requested: Vec<String>,
    pub denied: Vec<String>,
    pub mode: PermissionMode,
    pub outcome: AuditOutcome,
}

impl AuditEntry {
    pub fn new(
        skill: &str,
        requested: &[String],
        denied: &[String],
        mode: PermissionMode,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            skill: skill.to_string(),
            requested: requested.to_vec(),
            denied: denied.to_vec(),
            mode,
            outcome,
        }
    }
}

/// Bounded audit log; the oldest entries are dropped first
#[derive(Debug)]
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries, newest last
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Entries for one skill, oldest first
    pub fn for_skill(&self, skill: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.skill == skill)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
