//! Vault client abstraction trait.

use crate::error::SyncResult;
use async_trait::async_trait;
use vaultsync_types::{Reference, SyncTarget, VariableSet};

/// Abstract remote vault interface.
///
/// Implementations report failures with the structured [`SyncError`]
/// variants so the retry layer can tell transient failures from permanent
/// ones.
///
/// [`SyncError`]: crate::SyncError
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Returns the name of the vault backend.
    fn provider_name(&self) -> &'static str;

    /// Reads the variables stored in `target`.
    async fn read_variables(&self, target: &SyncTarget) -> SyncResult<VariableSet>;

    /// Replaces the variables stored in `target` with `variables` in a single
    /// request. Fields outside the target subsection are left untouched.
    async fn write_variables(&self, target: &SyncTarget, variables: &VariableSet)
        -> SyncResult<()>;

    /// Reads the value a reference points at.
    async fn read_reference(&self, reference: &Reference) -> SyncResult<String>;

    /// Drops per-run caches. Called once at the end of every run.
    async fn end_run(&self) {}
}
