//! Indirect references to vault-held values.
//!
//! A reference has the form `op://<vault>/<record>/<field>` or
//! `op://<vault>/<record>/<subsection>/<field>`. References may appear on
//! their own or embedded in a larger string, e.g. the password segment of a
//! connection URL: `postgres://app:op://prod/db/password@db.internal/app`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Scheme prefix that marks the start of a reference.
pub const REFERENCE_SCHEME: &str = "op://";

/// A parsed pointer to exactly one field in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub vault: String,
    pub record: String,
    pub subsection: Option<String>,
    pub field: String,
}

impl Reference {
    /// Parses a standalone reference string.
    pub fn parse(raw: &str) -> Result<Self> {
        let body = raw
            .strip_prefix(REFERENCE_SCHEME)
            .ok_or_else(|| Error::InvalidReference(raw.to_string()))?;
        let parts: Vec<&str> = body.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::InvalidReference(raw.to_string()));
        }
        match parts.as_slice() {
            [vault, record, field] => Ok(Self {
                vault: (*vault).to_string(),
                record: (*record).to_string(),
                subsection: None,
                field: (*field).to_string(),
            }),
            [vault, record, subsection, field] => Ok(Self {
                vault: (*vault).to_string(),
                record: (*record).to_string(),
                subsection: Some((*subsection).to_string()),
                field: (*field).to_string(),
            }),
            _ => Err(Error::InvalidReference(raw.to_string())),
        }
    }

    /// Returns true if the string contains at least one reference prefix.
    pub fn is_embedded_in(text: &str) -> bool {
        text.contains(REFERENCE_SCHEME)
    }
}

impl FromStr for Reference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REFERENCE_SCHEME}{}/{}/", self.vault, self.record)?;
        if let Some(section) = &self.subsection {
            write!(f, "{section}/")?;
        }
        f.write_str(&self.field)
    }
}

/// A reference located inside a larger string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSpan {
    /// Byte range of the reference within the scanned text.
    pub range: Range<usize>,
    /// The parsed reference, or the parse error for a malformed one.
    pub reference: Result<Reference>,
}

impl ReferenceSpan {
    /// The raw reference text.
    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        &text[self.range.clone()]
    }
}

fn is_delimiter(c: char) -> bool {
    matches!(c, '@' | ':' | '"' | '\'' | '?' | '#') || c.is_whitespace()
}

/// Finds every reference in `text`, in order of appearance.
///
/// A reference starts at the scheme prefix and runs until the next
/// structural delimiter (`@`, `:`, quotes, `?`, `#`, whitespace), the start
/// of another reference, or the end of the string. Spans never overlap.
pub fn find_references(text: &str) -> Vec<ReferenceSpan> {
    let mut spans = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(REFERENCE_SCHEME) {
        let start = cursor + offset;
        let body_start = start + REFERENCE_SCHEME.len();
        let mut end = text.len();
        for (i, c) in text[body_start..].char_indices() {
            let at = body_start + i;
            if is_delimiter(c) || text[at..].starts_with(REFERENCE_SCHEME) {
                end = at;
                break;
            }
        }

        spans.push(ReferenceSpan {
            range: start..end,
            reference: Reference::parse(&text[start..end]),
        });
        cursor = end;
    }

    spans
}
