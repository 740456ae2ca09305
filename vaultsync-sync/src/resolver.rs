//! Bulk resolution of `op://` references into concrete values.
//!
//! Each entry is resolved by its own future, as is each reference inside an
//! entry. All of them are started before any is awaited and every result is
//! collected, so one bad reference never stops or cancels the others.

use crate::error::{SyncError, SyncResult};
use crate::retry::Retrier;
use crate::vault::VaultClient;
use futures::future::join_all;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vaultsync_types::{find_references, VariableSet};

/// Outcome for one entry of a batch.
#[derive(Debug)]
pub struct ResolvedEntry {
    pub key: String,
    pub result: SyncResult<String>,
}

impl ResolvedEntry {
    /// True if the entry resolved.
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Replaces byte ranges of `text` with the given values.
///
/// Ranges must be sorted, non-overlapping, in bounds and on character
/// boundaries. Text outside the ranges is copied byte for byte.
pub fn substitute(text: &str, replacements: &[(Range<usize>, String)]) -> SyncResult<String> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for (range, value) in replacements {
        if range.start < cursor
            || range.end < range.start
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            return Err(SyncError::InvalidInput(format!(
                "invalid substitution range {range:?} for text of length {}",
                text.len()
            )));
        }
        out.push_str(&text[cursor..range.start]);
        out.push_str(value);
        cursor = range.end;
    }
    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Resolves batches of references against a vault.
pub struct BulkResolver {
    vault: Arc<dyn VaultClient>,
    retrier: Retrier,
}

impl BulkResolver {
    /// Creates a resolver.
    pub fn new(vault: Arc<dyn VaultClient>, retrier: Retrier) -> Self {
        Self { vault, retrier }
    }

    /// Resolves every reference embedded in `text`, keeping the text around
    /// them intact.
    pub async fn resolve_text(&self, key: &str, text: &str) -> SyncResult<String> {
        let spans = find_references(text);
        if spans.is_empty() {
            return Ok(text.to_string());
        }

        let mut lookups = Vec::with_capacity(spans.len());
        for span in &spans {
            let reference = span.reference.clone().map_err(SyncError::from)?;
            let range = span.range.clone();
            let operation = format!("resolve {key} ({reference})");
            lookups.push(async move {
                let value = self
                    .retrier
                    .run(&operation, || self.vault.read_reference(&reference))
                    .await
                    .map_err(|e| e.in_operation(operation.clone()))?;
                Ok::<_, SyncError>((range, value))
            });
        }

        // Every lookup runs to completion before the first error is reported.
        let mut replacements = Vec::with_capacity(spans.len());
        let mut first_error = None;
        for result in join_all(lookups).await {
            match result {
                Ok(replacement) => replacements.push(replacement),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(e) => debug!("Further failure resolving {}: {}", key, e),
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        substitute(text, &replacements)
    }

    /// Resolves every `(key, text)` entry concurrently.
    ///
    /// Results come back in input order, one per entry.
    pub async fn resolve_all(&self, entries: Vec<(String, String)>) -> Vec<ResolvedEntry> {
        let total = entries.len();
        let tasks = entries.into_iter().map(|(key, text)| async move {
            let result = self.resolve_text(&key, &text).await;
            if let Err(e) = &result {
                warn!("Failed to resolve {}: {}", key, e);
            }
            ResolvedEntry { key, result }
        });

        let resolved = join_all(tasks).await;
        self.vault.end_run().await;

        let failed = resolved.iter().filter(|r| !r.is_ok()).count();
        info!("Resolved {}/{} references", total - failed, total);
        resolved
    }

    /// Resolves the references inside a whole set.
    ///
    /// Values without references are copied unchanged. Entries that fail
    /// keep their unresolved text in the returned set and are listed with
    /// their error.
    pub async fn resolve_set(&self, set: &VariableSet) -> (VariableSet, Vec<(String, SyncError)>) {
        let pending: Vec<(String, String)> = set
            .iter()
            .filter(|(_, v)| vaultsync_types::Reference::is_embedded_in(v))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        debug!("{} of {} variables hold references", pending.len(), set.len());

        let mut resolved = set.clone();
        let mut failures = Vec::new();
        for entry in self.resolve_all(pending).await {
            match entry.result {
                Ok(value) => {
                    if let Err(e) = resolved.insert(entry.key.clone(), value) {
                        failures.push((entry.key, e.into()));
                    }
                }
                Err(e) => failures.push((entry.key, e)),
            }
        }
        (resolved, failures)
    }
}
