//! Active-process registry
//!
//! Every fork execution registers while its child is alive. Shutdown cancels all
//! registered executions and force-kills any process group that outlives the
//! grace period.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// SIGKILL escalation timeout
pub(crate) const SIGKILL_TIMEOUT_MS: u64 = 200;

const SHUTDOWN_POLL_MS: u64 = 20;

/// A running fork execution
#[derive(Debug, Clone)]
pub struct ActiveProcess {
    pub execution_id: String,
    pub skill: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    token: CancellationToken,
}

/// Shared registry of in-flight executions
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    processes: Arc<DashMap<String, ActiveProcess>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a spawned process until the returned guard is dropped
    pub fn register(&self, execution_id: &str, skill: &str, pid: Option<u32>) -> ProcessGuard {
        let token = CancellationToken::new();
        self.processes.insert(
            execution_id.to_string(),
            ActiveProcess {
                execution_id: execution_id.to_string(),
                skill: skill.to_string(),
                pid,
                started_at: Utc::now(),
                token: token.clone(),
            },
        );
        debug!(execution_id, skill, ?pid, "Registered process");
        ProcessGuard {
            registry: self.clone(),
            execution_id: execution_id.to_string(),
            token,
        }
    }

    /// Request termination of one execution
    pub fn cancel(&self, execution_id: &str) -> bool {
        match self.processes.get(execution_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn list(&self) -> Vec<ActiveProcess> {
        let mut processes: Vec<_> = self
            .processes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        processes.sort_by_key(|process| process.started_at);
        processes
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Cancel every execution and kill whatever is still registered after `grace`
    ///
    /// Returns the number of executions that were active when shutdown began.
    pub async fn shutdown_all(&self, grace: Duration) -> usize {
        let active = self.list();
        if active.is_empty() {
            return 0;
        }
        info!(count = active.len(), "Terminating active skill executions");
        for process in &active {
            process.token.cancel();
        }

        let deadline = tokio::time::Instant::now() + grace;
        while !self.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(SHUTDOWN_POLL_MS)).await;
        }

        for process in self.list() {
            warn!(
                execution_id = %process.execution_id,
                skill = %process.skill,
                "Process outlived shutdown grace period, killing"
            );
            if let Some(pid) = process.pid {
                kill_group(pid);
            }
            self.processes.remove(&process.execution_id);
        }
        active.len()
    }

    fn unregister(&self, execution_id: &str) {
        if self.processes.remove(execution_id).is_some() {
            debug!(execution_id, "Unregistered process");
        }
    }
}

/// Keeps a process registered; unregisters on drop
#[derive(Debug)]
pub struct ProcessGuard {
    registry: ProcessRegistry,
    execution_id: String,
    token: CancellationToken,
}

impl ProcessGuard {
    /// Cancelled when shutdown or [`ProcessRegistry::cancel`] targets this execution
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.registry.unregister(&self.execution_id);
    }
}

/// Send SIGKILL to a process group
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {
            debug!(pid, "Sent SIGKILL to process group");
            true
        }
        Err(e) => {
            debug!(pid, error = %e, "Failed to send SIGKILL to process group");
            false
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn kill_group(_pid: u32) -> bool {
    false
}

/// SIGTERM the process group, then SIGKILL after [`SIGKILL_TIMEOUT_MS`]
#[cfg(unix)]
pub(crate) async fn terminate_group(pid: u32) -> bool {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => debug!(pid, "Sent SIGTERM to process group"),
        Err(e) => {
            warn!(pid, error = %e, "Failed to send SIGTERM to process group");
            return false;
        }
    }
    tokio::time::sleep(Duration::from_millis(SIGKILL_TIMEOUT_MS)).await;
    kill_group(pid);
    true
}

#[cfg(not(unix))]
pub(crate) async fn terminate_group(_pid: u32) -> bool {
    false
}
