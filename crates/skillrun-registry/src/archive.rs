//! Archive extraction and skill root discovery
//!
//! Entries whose path is absolute or climbs out of the target are skipped, and
//! extraction stops once the expanded size passes the configured limit.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use skillrun_skills::MANIFEST_FILE;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{RegistryError, Result};

/// Archive formats accepted for install
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveKind {
    /// Detect the format from the file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if name.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Relative and free of `..` or root components
pub fn is_safe_relative_path(path: &Path) -> bool {
    !path.is_absolute()
        && !path.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        })
}

/// Expand `archive` into `output_dir`; returns the number of bytes written
pub fn extract_archive(archive: &Path, output_dir: &Path, max_extracted: u64) -> Result<u64> {
    let kind = ArchiveKind::from_path(archive)
        .ok_or_else(|| RegistryError::UnsupportedArchive(archive.to_path_buf()))?;
    std::fs::create_dir_all(output_dir)?;
    let file = File::open(archive)?;
    let written = match kind {
        ArchiveKind::Zip => extract_zip(file, output_dir, max_extracted)?,
        ArchiveKind::TarGz => {
            extract_tar(tar::Archive::new(flate2::read::GzDecoder::new(file)), output_dir, max_extracted)?
        }
        ArchiveKind::Tar => extract_tar(tar::Archive::new(file), output_dir, max_extracted)?,
    };
    debug!(archive = %archive.display(), bytes = written, "Extracted archive");
    Ok(written)
}

fn extract_zip(file: File, output_dir: &Path, max_extracted: u64) -> Result<u64> {
    let mut archive = zip::ZipArchive::new(file)?;
    let mut written = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(name) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            warn!(entry = %entry.name(), "Skipping archive entry outside the extraction root");
            continue;
        };
        if !is_safe_relative_path(&name) {
            continue;
        }

        let target = output_dir.join(name);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        written += copy_limited(&mut entry, &target, max_extracted.saturating_sub(written))
            .map_err(|e| limit_error(e, max_extracted))?;

        #[cfg(unix)]
        {
            if let Some(mode) = entry.unix_mode() {
                apply_mode(&target, mode)?;
            }
        }
    }
    Ok(written)
}

fn extract_tar<R: Read>(mut archive: tar::Archive<R>, output_dir: &Path, max_extracted: u64) -> Result<u64> {
    let mut written = 0u64;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        if !is_safe_relative_path(&path) {
            warn!(entry = %path.display(), "Skipping archive entry outside the extraction root");
            continue;
        }

        let target = output_dir.join(&path);
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if kind.is_file() {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mode = entry.header().mode().ok();
            written += copy_limited(&mut entry, &target, max_extracted.saturating_sub(written))
                .map_err(|e| limit_error(e, max_extracted))?;

            #[cfg(unix)]
            {
                if let Some(mode) = mode {
                    apply_mode(&target, mode)?;
                }
            }
            #[cfg(not(unix))]
            let _ = mode;
        }
        // links and special files are never materialized
    }
    Ok(written)
}

/// Keep the archived execute bits; owner can always read and write
#[cfg(unix)]
fn apply_mode(target: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(target, std::fs::Permissions::from_mode((mode & 0o755) | 0o600))
}

/// Copy at most `budget` bytes; more input is an `InvalidData` error
fn copy_limited<R: Read>(reader: &mut R, target: &Path, budget: u64) -> io::Result<u64> {
    let mut out = File::create(target)?;
    let copied = io::copy(&mut reader.take(budget.saturating_add(1)), &mut out)?;
    if copied > budget {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "archive expands beyond the size limit",
        ));
    }
    Ok(copied)
}

fn limit_error(err: io::Error, limit: u64) -> RegistryError {
    if err.kind() == io::ErrorKind::InvalidData {
        RegistryError::Archive(format!("archive expands beyond {limit} bytes"))
    } else {
        RegistryError::Io(err)
    }
}

/// Directory holding the manifest: `root` itself or the single directory that has one
pub fn find_skill_root(root: &Path) -> Result<PathBuf> {
    if root.join(MANIFEST_FILE).is_file() {
        return Ok(root.to_path_buf());
    }

    let hits: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANIFEST_FILE)
        .filter_map(|entry| entry.path().parent().map(Path::to_path_buf))
        .collect();

    match hits.len() {
        0 => Err(RegistryError::InvalidStructure {
            errors: vec![skillrun_skills::FieldError::new(
                MANIFEST_FILE,
                "archive does not contain a manifest",
            )],
        }),
        1 => Ok(hits.into_iter().next().unwrap_or_else(|| root.to_path_buf())),
        n => Err(RegistryError::InvalidStructure {
            errors: vec![skillrun_skills::FieldError::new(
                MANIFEST_FILE,
                format!("archive contains {n} manifests; expected a single skill"),
            )],
        }),
    }
}

/// Copy a directory tree, skipping symlinks; returns bytes copied
pub fn copy_dir(source: &Path, target: &Path) -> io::Result<u64> {
    std::fs::create_dir_all(target)?;
    let mut copied = 0u64;
    for entry in WalkDir::new(source).follow_links(false).min_depth(1) {
        let entry = entry.map_err(io::Error::other)?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
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

/// Move a directory, copying when a rename is not possible
pub fn move_dir(source: &Path, target: &Path) -> io::Result<()> {
    match std::fs::rename(source, target) {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!(error = %err, "Rename failed, copying instead");
            copy_dir(source, target)?;
            std::fs::remove_dir_all(source)
        }
    }
}
