//! Fork-mode workspaces
//!
//! Each fork execution gets a private directory under the configured root. The
//! skill is copied in (symlinks and the vectorized marker are skipped), caller
//! files are written on top, and the directory is removed afterwards with
//! bounded retries.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use skillrun_skills::MARKER_FILE;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, SandboxError};

/// A private per-execution directory
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Create `<root>/skill-<execution_id>`, readable only by the current user
    pub async fn create(root: &Path, execution_id: &str) -> Result<Self> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(SandboxError::Workspace)?;

        let path = root.join(format!("skill-{execution_id}"));
        tokio::fs::create_dir(&path)
            .await
            .map_err(SandboxError::Workspace)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let restricted = std::fs::Permissions::from_mode(0o700);
            if let Err(err) = tokio::fs::set_permissions(&path, restricted).await {
                let _ = tokio::fs::remove_dir_all(&path).await;
                return Err(SandboxError::Workspace(err));
            }
        }

        debug!(workspace = %path.display(), "Created workspace");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the skill directory into the workspace
    pub async fn populate(&self, skill_dir: &Path) -> Result<u64> {
        let source = skill_dir.to_path_buf();
        let target = self.path.clone();
        tokio::task::spawn_blocking(move || copy_tree(&source, &target))
            .await
            .map_err(|err| SandboxError::Workspace(io::Error::other(err)))?
            .map_err(SandboxError::Workspace)
    }

    /// Write caller-supplied files, creating parent directories as needed
    pub async fn write_files(&self, files: &BTreeMap<String, String>) -> Result<()> {
        for (relative, contents) in files {
            if !is_safe_relative_path(relative) {
                return Err(SandboxError::UnsafePath(relative.clone()));
            }
            let target = self.path.join(relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(SandboxError::Workspace)?;
            }
            tokio::fs::write(&target, contents)
                .await
                .map_err(SandboxError::Workspace)?;
        }
        Ok(())
    }

    /// Remove the workspace, retrying with exponential backoff
    ///
    /// A workspace that is already gone counts as removed.
    pub async fn cleanup(&self, retries: u32, base_delay: Duration) -> io::Result<()> {
        let mut attempt = 0u32;
        loop {
            match tokio::fs::remove_dir_all(&self.path).await {
                Ok(()) => {
                    debug!(workspace = %self.path.display(), attempt, "Removed workspace");
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(err) if attempt >= retries => return Err(err),
                Err(err) => {
                    attempt += 1;
                    let delay = base_delay.saturating_mul(1 << (attempt - 1).min(16));
                    warn!(
                        workspace = %self.path.display(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Workspace removal failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Relative, non-empty, and free of `..` or root components
pub(crate) fn is_safe_relative_path(path: &str) -> bool {
    let path = Path::new(path);
    if path.as_os_str().is_empty() {
        return false;
    }
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

fn copy_tree(source: &Path, target: &Path) -> io::Result<u64> {
    let mut copied = 0u64;
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = match entry.path().strip_prefix(source) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        if relative == Path::new(MARKER_FILE) || entry.file_type().is_symlink() {
            continue;
        }

        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&destination)?;
        } else if entry.file_type().is_file() {
            if let Some(parent) = destination.parent() {
                std::fs::create_dir_all(parent)?;
            }
            copied += std::fs::copy(entry.path(), &destination)?;
        }
    }
    Ok(copied)
}
