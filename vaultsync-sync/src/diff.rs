//! State comparison between two variable snapshots.
//!
//! Pure and deterministic. Both sets iterate in sorted key order, so the
//! comparison is a single merge-join walk over the two key sequences.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use vaultsync_types::{normalize_value, VariableSet};

/// Outcome of comparing a local snapshot against a remote one.
///
/// Every key of either input lands in exactly one of the four sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Present remotely only.
    pub additions: BTreeSet<String>,
    /// Present locally only.
    pub deletions: BTreeSet<String>,
    /// Present on both sides with differing values.
    pub modifications: BTreeSet<String>,
    /// Present on both sides with equal values.
    pub unchanged: BTreeSet<String>,
}

impl DiffResult {
    /// True when nothing needs reconciling.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }

    /// Number of keys that need reconciling.
    pub fn change_count(&self) -> usize {
        self.additions.len() + self.deletions.len() + self.modifications.len()
    }
}

/// Returns true if two values are equal once their newline encodings agree.
pub fn values_equal(a: &str, b: &str) -> bool {
    a == b || normalize_value(a) == normalize_value(b)
}

/// Compares `local` against `remote`.
pub fn diff(local: &VariableSet, remote: &VariableSet) -> DiffResult {
    let mut result = DiffResult::default();
    let mut left = local.iter().peekable();
    let mut right = remote.iter().peekable();

    loop {
        let order = match (left.peek(), right.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some((lk, _)), Some((rk, _))) => lk.cmp(rk),
        };

        match order {
            Ordering::Less => {
                if let Some((key, _)) = left.next() {
                    result.deletions.insert(key.to_string());
                }
            }
            Ordering::Greater => {
                if let Some((key, _)) = right.next() {
                    result.additions.insert(key.to_string());
                }
            }
            Ordering::Equal => {
                if let (Some((key, lv)), Some((_, rv))) = (left.next(), right.next()) {
                    if values_equal(lv, rv) {
                        result.unchanged.insert(key.to_string());
                    } else {
                        result.modifications.insert(key.to_string());
                    }
                }
            }
        }
    }

    result
}
