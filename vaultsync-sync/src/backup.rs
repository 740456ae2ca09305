//! Backups of the local env file taken before it is overwritten.
//!
//! Backups are timestamped siblings (`.env.backup.20260101T120000.000Z`)
//! with owner-only permissions. They are never deleted automatically.

use crate::error::{SyncError, SyncResult};
use crate::files;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Everything needed to put a file back the way it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHandle {
    /// The file that was backed up.
    pub original: PathBuf,
    /// The copy, or `None` if the original did not exist yet.
    pub backup: Option<PathBuf>,
    /// Permission bits of the original at backup time.
    pub mode: Option<u32>,
}

impl BackupHandle {
    /// Path of the backup copy, if one was taken.
    pub fn backup_path(&self) -> Option<&Path> {
        self.backup.as_deref()
    }
}

async fn unused_backup_path(path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ").to_string();
    let mut candidate = files::sibling(path, "", &format!(".backup.{stamp}"));
    let mut n = 1;
    while fs::try_exists(&candidate).await.unwrap_or(false) {
        candidate = files::sibling(path, "", &format!(".backup.{stamp}.{n}"));
        n += 1;
    }
    candidate
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn mode_of(_metadata: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Copies `path` to a timestamped sibling. Succeeds without copying if
/// `path` does not exist.
pub async fn backup(path: &Path) -> SyncResult<BackupHandle> {
    let metadata = match fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(BackupHandle {
                original: path.to_path_buf(),
                backup: None,
                mode: None,
            });
        }
        Err(e) => return Err(SyncError::io(path, e)),
    };

    let target = unused_backup_path(path).await;
    let content = fs::read(path).await.map_err(|e| SyncError::io(path, e))?;
    files::write_private_atomic(&target, &content).await?;
    info!("Backed up {} to {}", path.display(), target.display());

    Ok(BackupHandle {
        original: path.to_path_buf(),
        backup: Some(target),
        mode: mode_of(&metadata),
    })
}

/// Puts the original file back exactly as it was when `handle` was taken.
///
/// If the original did not exist, whatever was written since is removed.
pub async fn restore(handle: &BackupHandle) -> SyncResult<()> {
    let Some(backup) = &handle.backup else {
        match fs::remove_file(&handle.original).await {
            Ok(()) => warn!("Removed {} created during the failed run", handle.original.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::io(&handle.original, e)),
        }
        return Ok(());
    };

    let content = fs::read(backup).await.map_err(|e| SyncError::io(backup, e))?;
    files::write_private_atomic(&handle.original, &content).await?;
    if let Some(mode) = handle.mode {
        files::set_mode(&handle.original, mode).await?;
    }
    warn!(
        "Restored {} from {}",
        handle.original.display(),
        backup.display()
    );
    Ok(())
}
