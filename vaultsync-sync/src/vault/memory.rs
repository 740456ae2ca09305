//! In-process vault.
//!
//! Holds records in memory. Used by tests and as a stand-in backend when no
//! real vault is configured.

use super::client::VaultClient;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use vaultsync_types::{Reference, SyncTarget, VariableSet};

/// Fields of one record, grouped by subsection (`None` is the top level).
type Record = BTreeMap<Option<String>, VariableSet>;

/// In-memory [`VaultClient`].
#[derive(Debug, Default)]
pub struct MemoryVault {
    vaults: RwLock<HashMap<String, HashMap<String, Record>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryVault {
    /// Creates a vault store with no vaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty vault named `name` if it does not exist.
    pub async fn create_vault(&self, name: &str) {
        self.vaults
            .write()
            .await
            .entry(name.to_string())
            .or_default();
    }

    /// Stores `variables` at `target`, creating the vault and record.
    pub async fn insert(&self, target: &SyncTarget, variables: VariableSet) {
        self.vaults
            .write()
            .await
            .entry(target.vault.clone())
            .or_default()
            .entry(target.record.clone())
            .or_default()
            .insert(target.subsection.clone(), variables);
    }

    /// Returns the variables at `target` without counting a read.
    pub async fn snapshot(&self, target: &SyncTarget) -> Option<VariableSet> {
        self.vaults
            .read()
            .await
            .get(&target.vault)?
            .get(&target.record)?
            .get(&target.subsection)
            .cloned()
    }

    /// Number of `read_variables` calls served.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of `write_variables` calls served.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VaultClient for MemoryVault {
    fn provider_name(&self) -> &'static str {
        "memory"
    }

    async fn read_variables(&self, target: &SyncTarget) -> SyncResult<VariableSet> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let vaults = self.vaults.read().await;
        let records = vaults
            .get(&target.vault)
            .ok_or_else(|| SyncError::NotFound(format!("vault {:?}", target.vault)))?;
        let record = records
            .get(&target.record)
            .ok_or_else(|| SyncError::NotFound(format!("record {target}")))?;
        Ok(record.get(&target.subsection).cloned().unwrap_or_default())
    }

    async fn write_variables(
        &self,
        target: &SyncTarget,
        variables: &VariableSet,
    ) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut vaults = self.vaults.write().await;
        let records = vaults
            .get_mut(&target.vault)
            .ok_or_else(|| SyncError::NotFound(format!("vault {:?}", target.vault)))?;
        records
            .entry(target.record.clone())
            .or_default()
            .insert(target.subsection.clone(), variables.clone());
        Ok(())
    }

    async fn read_reference(&self, reference: &Reference) -> SyncResult<String> {
        let vaults = self.vaults.read().await;
        let record = vaults
            .get(&reference.vault)
            .and_then(|records| records.get(&reference.record))
            .ok_or_else(|| SyncError::NotFound(reference.to_string()))?;

        let value = match &reference.subsection {
            Some(section) => record
                .get(&Some(section.clone()))
                .and_then(|fields| fields.get(&reference.field)),
            None => record
                .get(&None)
                .and_then(|fields| fields.get(&reference.field))
                .or_else(|| record.values().find_map(|fields| fields.get(&reference.field))),
        };

        value
            .map(str::to_string)
            .ok_or_else(|| SyncError::NotFound(reference.to_string()))
    }
}
