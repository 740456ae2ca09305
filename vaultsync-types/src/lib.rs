//! Core type definitions for vaultsync.
//!
//! This crate defines the plain data shared by the sync engine:
//! - `VariableSet`, the flat key/value snapshot compared between the local
//!   env file and the remote vault record
//! - `SyncTarget`, the vault/record/subsection triple a sync run points at
//! - `Reference`, an `op://` pointer to a single vault-held value, plus the
//!   span scanner that finds references embedded in larger strings
//!
//! Nothing here performs I/O.

mod reference;
mod target;
mod variables;

pub use reference::{find_references, Reference, ReferenceSpan, REFERENCE_SCHEME};
pub use target::SyncTarget;
pub use variables::{checksum, is_valid_name, normalize_value, VariableSet};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when constructing core types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid variable name: {0:?}")]
    InvalidName(String),

    #[error("invalid sync target: {0}")]
    InvalidTarget(String),

    #[error("malformed reference: {0:?}")]
    InvalidReference(String),
}
