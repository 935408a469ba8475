//! TTL cache of permission decisions keyed by `(skill, sorted request set)`

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::validator::PermissionDecision;

type DecisionKey = (String, Vec<String>);

/// Concurrent decision cache
#[derive(Debug)]
pub struct DecisionCache {
    entries: DashMap<DecisionKey, (PermissionDecision, Instant)>,
    ttl: Duration,
    capacity: usize,
}

impl DecisionCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity,
        }
    }

    /// Cache key for a request; order and duplicates in `tools` do not matter
    pub fn key(skill: &str, tools: &[String]) -> DecisionKey {
        let mut sorted = tools.to_vec();
        sorted.sort();
        sorted.dedup();
        (skill.to_string(), sorted)
    }

    pub fn get(&self, key: &DecisionKey) -> Option<PermissionDecision> {
        if self.ttl.is_zero() {
            return None;
        }
        {
            let entry = self.entries.get(key)?;
            let (decision, stored_at) = entry.value();
            if stored_at.elapsed() < self.ttl {
                return Some(decision.clone());
            }
        }
        // guard released above; removing while holding it would deadlock the shard
        self.entries.remove(key);
        None
    }

    pub fn insert(&self, key: DecisionKey, decision: PermissionDecision) {
        if self.ttl.is_zero() || self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_expired();
            if self.entries.len() >= self.capacity {
                self.entries.clear();
            }
        }
        self.entries.insert(key, (decision, Instant::now()));
    }

    /// Drop every decision for `skill`
    pub fn invalidate(&self, skill: &str) {
        self.entries.retain(|(name, _), _| name != skill);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
    }
}
