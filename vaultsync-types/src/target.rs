//! Remote sync target identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a variable set lives in the vault: a record inside a vault,
/// optionally narrowed to one named subsection of that record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncTarget {
    pub vault: String,
    pub record: String,
    pub subsection: Option<String>,
}

impl SyncTarget {
    /// Creates a target, rejecting empty or slash-containing identifiers.
    pub fn new(
        vault: impl Into<String>,
        record: impl Into<String>,
        subsection: Option<String>,
    ) -> Result<Self> {
        let target = Self {
            vault: vault.into(),
            record: record.into(),
            subsection: subsection.filter(|s| !s.is_empty()),
        };
        for part in [&target.vault, &target.record]
            .into_iter()
            .chain(target.subsection.as_ref())
        {
            if part.trim().is_empty() || part.contains('/') {
                return Err(Error::InvalidTarget(target.to_string()));
            }
        }
        Ok(target)
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subsection {
            Some(section) => write!(f, "{}/{}/{}", self.vault, self.record, section),
            None => write!(f, "{}/{}", self.vault, self.record),
        }
    }
}
