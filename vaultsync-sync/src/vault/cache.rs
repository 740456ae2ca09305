//! Per-run lookup cache for vault and record identifiers.
//!
//! Resolving a vault or record name to its id costs a round trip. Within one
//! run the answer does not change, so it is remembered here and dropped by
//! [`LookupCache::clear`] when the run ends.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Name → id lookups remembered for the duration of one run.
#[derive(Debug, Default)]
pub struct LookupCache {
    vaults: RwLock<HashMap<String, String>>,
    records: RwLock<HashMap<(String, String), String>>,
}

impl LookupCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached id of the vault named `name`.
    pub async fn vault_id(&self, name: &str) -> Option<String> {
        self.vaults.read().await.get(name).cloned()
    }

    /// Remembers the id of the vault named `name`.
    pub async fn put_vault_id(&self, name: &str, id: &str) {
        self.vaults
            .write()
            .await
            .insert(name.to_string(), id.to_string());
    }

    /// Cached id of the record titled `title` in vault `vault_id`.
    pub async fn record_id(&self, vault_id: &str, title: &str) -> Option<String> {
        self.records
            .read()
            .await
            .get(&(vault_id.to_string(), title.to_string()))
            .cloned()
    }

    /// Remembers the id of a record.
    pub async fn put_record_id(&self, vault_id: &str, title: &str, id: &str) {
        self.records
            .write()
            .await
            .insert((vault_id.to_string(), title.to_string()), id.to_string());
    }

    /// Number of cached entries.
    pub async fn len(&self) -> usize {
        self.vaults.read().await.len() + self.records.read().await.len()
    }

    /// Returns true if nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Forgets everything.
    pub async fn clear(&self) {
        self.vaults.write().await.clear();
        self.records.write().await.clear();
    }
}
