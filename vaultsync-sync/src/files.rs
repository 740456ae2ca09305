//! Small filesystem helpers shared by the env file, state and backup code.

use crate::error::{SyncError, SyncResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Permission bits for every file we create: owner read/write only.
pub const PRIVATE_MODE: u32 = 0o600;

/// Reads a file to a string, returning `None` if it does not exist.
pub async fn read_optional(path: &Path) -> SyncResult<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::io(path, e)),
    }
}

/// Sibling path with a prefix and suffix around the file name.
pub fn sibling(path: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}{name}{suffix}"))
}

/// Writes `contents` to a temporary sibling and renames it over `path`, so
/// readers see either the old file or the complete new one.
pub async fn write_private_atomic(path: &Path, contents: &[u8]) -> SyncResult<()> {
    let tmp = sibling(path, ".", ".tmp");

    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| SyncError::io(&tmp, e))?;
    set_mode(&tmp, PRIVATE_MODE).await?;
    file.write_all(contents)
        .await
        .map_err(|e| SyncError::io(&tmp, e))?;
    file.sync_all().await.map_err(|e| SyncError::io(&tmp, e))?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(SyncError::io(path, e));
    }
    Ok(())
}

/// Applies unix permission bits; a no-op elsewhere.
#[cfg(unix)]
pub async fn set_mode(path: &Path, mode: u32) -> SyncResult<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| SyncError::io(path, e))
}

#[cfg(not(unix))]
pub async fn set_mode(_path: &Path, _mode: u32) -> SyncResult<()> {
    Ok(())
}
