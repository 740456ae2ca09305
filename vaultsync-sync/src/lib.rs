//! Reconciliation engine between a local env file and a remote secret vault.
//!
//! # Architecture
//!
//! A sync run compares two flat key/value snapshots of the same variables:
//! the local env file and a record (optionally one subsection of it) in the
//! vault. Differences are settled per key and the merged result is written
//! back to both sides.
//!
//! ## Components
//!
//! - **Diff**: pure comparison of two snapshots into additions, deletions,
//!   modifications and unchanged keys
//! - **Conflict**: per-key strategy (`interactive`, `ours`, `theirs`, `newest`)
//! - **Engine**: the orchestrator state machine with backup and rollback
//! - **State**: checksum record of the last successful sync, used as the
//!   three-way merge baseline
//! - **Retry**: exponential backoff with jitter around every remote call
//! - **Resolver**: concurrent resolution of `op://` references, including
//!   references embedded in larger strings
//! - **Vault**: the remote client trait and its backends
//!
//! ## Sync Process
//!
//! 1. **Fetch**: read the env file and the vault record concurrently
//! 2. **Diff**: compare the two snapshots
//! 3. **Resolve**: settle each modified key
//! 4. **Merge**: build the merged snapshot
//! 5. **Write back**: back up and rewrite the env file, push one batched
//!    update to the vault
//! 6. **Persist**: record checksums for the next run
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use vaultsync_sync::{ConflictStrategy, MemoryVault, SyncEngine, SyncOptions};
//! use vaultsync_types::SyncTarget;
//!
//! let target = SyncTarget::new("Private", "app-env", None).unwrap();
//! let options = SyncOptions {
//!     strategy: ConflictStrategy::Theirs,
//!     ..Default::default()
//! };
//!
//! let engine = SyncEngine::new(".env", target, Arc::new(MemoryVault::new()), options);
//! assert_eq!(engine.phase(), vaultsync_sync::SyncPhase::Idle);
//! ```

pub mod backup;
pub mod conflict;
pub mod diff;
mod engine;
pub mod envfile;
mod error;
mod files;
pub mod resolver;
pub mod retry;
pub mod state;
pub mod vault;

pub use backup::{backup, restore, BackupHandle};
pub use conflict::{resolve, ConflictPrompt, ConflictStrategy, LinePrompt, Resolution};
pub use diff::{diff, values_equal, DiffResult};
pub use engine::{MergeMode, SyncEngine, SyncOptions, SyncOutcome, SyncPhase, SyncReport};
pub use error::{classify_message, ErrorClass, SyncError, SyncResult};
pub use resolver::{substitute, BulkResolver, ResolvedEntry};
pub use retry::{Retrier, RetryConfig};
pub use state::{SyncState, SyncStateStore, STATE_FORMAT_VERSION};
pub use vault::{ConnectConfig, ConnectVault, LookupCache, MemoryVault, VaultClient};
