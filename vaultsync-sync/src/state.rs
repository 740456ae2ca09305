//! Persisted sync state.
//!
//! One JSON record per local env file, stored next to it as
//! `.<file>.sync-state.json`. It holds a checksum of every variable as of the
//! end of the last successful sync, which is the baseline for three-way
//! merging. The record is replaced atomically and never partially written.

use crate::error::{SyncError, SyncResult};
use crate::files;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use vaultsync_types::{checksum, SyncTarget, VariableSet};

/// Current on-disk format version.
pub const STATE_FORMAT_VERSION: u32 = 1;

/// The checksum record written after a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub version: u32,
    pub vault: String,
    pub record: String,
    pub subsection: Option<String>,
    pub last_sync: DateTime<Utc>,
    pub checksums: BTreeMap<String, String>,
}

impl SyncState {
    /// Captures the checksums of `variables` for `target`, stamped now.
    pub fn capture(target: &SyncTarget, variables: &VariableSet) -> Self {
        Self {
            version: STATE_FORMAT_VERSION,
            vault: target.vault.clone(),
            record: target.record.clone(),
            subsection: target.subsection.clone(),
            last_sync: Utc::now(),
            checksums: variables.checksums(),
        }
    }

    /// Returns true if this record was written for `target`.
    pub fn is_for(&self, target: &SyncTarget) -> bool {
        self.vault == target.vault
            && self.record == target.record
            && self.subsection == target.subsection
    }

    /// The recorded checksum for `key`.
    pub fn checksum_of(&self, key: &str) -> Option<&str> {
        self.checksums.get(key).map(String::as_str)
    }

    /// Returns true if `value` is what `key` held at the last sync.
    pub fn is_unchanged(&self, key: &str, value: &str) -> bool {
        self.checksum_of(key) == Some(checksum(value).as_str())
    }
}

/// Loads and saves the [`SyncState`] belonging to one env file.
#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    /// Store for the env file at `env_path`.
    pub fn for_env_file(env_path: &Path) -> Self {
        Self {
            path: files::sibling(env_path, ".", ".sync-state.json"),
        }
    }

    /// Store at an explicit path.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record, if one exists.
    pub async fn load(&self) -> SyncResult<Option<SyncState>> {
        let Some(content) = files::read_optional(&self.path).await? else {
            return Ok(None);
        };
        let state: SyncState = serde_json::from_str(&content)?;
        if state.version != STATE_FORMAT_VERSION {
            return Err(SyncError::Config(format!(
                "{} has unsupported state version {}",
                self.path.display(),
                state.version
            )));
        }
        Ok(Some(state))
    }

    /// Reads the record for `target`. A missing, unreadable or foreign record
    /// yields `None`: the baseline is an optimisation, never a requirement.
    pub async fn load_for(&self, target: &SyncTarget) -> Option<SyncState> {
        match self.load().await {
            Ok(Some(state)) if state.is_for(target) => Some(state),
            Ok(Some(_)) => {
                debug!(
                    "Ignoring sync state at {}: recorded for another target",
                    self.path.display()
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable sync state: {}", e);
                None
            }
        }
    }

    /// Atomically replaces the record.
    pub async fn save(&self, state: &SyncState) -> SyncResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        files::write_private_atomic(&self.path, &json).await?;
        debug!(
            "Saved sync state with {} checksums to {}",
            state.checksums.len(),
            self.path.display()
        );
        Ok(())
    }
}
