//! Flat key/value snapshots.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A snapshot of named variables.
///
/// Keys are unique, non-empty names. Values are arbitrary strings and may
/// contain newlines. Iteration order is sorted by name so that diffs,
/// serialized files and logs are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableSet(BTreeMap<String, String>);

impl VariableSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from name/value pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut set = Self::new();
        for (name, value) in pairs {
            set.insert(name, value)?;
        }
        Ok(set)
    }

    /// Inserts a variable, returning the previous value if any.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Option<String>> {
        let name = name.into();
        if !is_valid_name(&name) {
            return Err(Error::InvalidName(name));
        }
        Ok(self.0.insert(name, value.into()))
    }

    /// Removes a variable, returning its value if it was present.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    /// Gets a variable's value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns whether the set holds the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no variables.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterates name/value pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns the checksum of every value, keyed by name.
    pub fn checksums(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), checksum(v)))
            .collect()
    }
}

impl<'a> IntoIterator for &'a VariableSet {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Returns true if `name` can be a variable name: non-empty, no `=` and no
/// whitespace.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c == '=' || c.is_whitespace())
}

/// Brings a value into the canonical escaping convention used for comparison.
///
/// CRLF line endings become LF and the two-character escape `\n` becomes a
/// real newline, so a value read from a quoted multi-line env entry compares
/// equal to the same value stored remotely with escaped newlines.
pub fn normalize_value(value: &str) -> Cow<'_, str> {
    if !value.contains('\r') && !value.contains("\\n") {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.replace("\r\n", "\n").replace("\\n", "\n"))
}

/// SHA-256 hex digest of a value's normalized form.
pub fn checksum(value: &str) -> String {
    let digest = Sha256::digest(normalize_value(value).as_bytes());
    hex::encode(digest)
}
