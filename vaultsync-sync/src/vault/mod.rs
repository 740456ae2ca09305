//! Remote secret vault access.
//!
//! The engine only needs three remote operations: read a record's
//! variables, replace them in one batched write, and read a single field by
//! reference. [`VaultClient`] captures exactly that; backends live in the
//! submodules.

pub mod cache;
pub mod client;
pub mod connect;
pub mod memory;

pub use cache::LookupCache;
pub use client::VaultClient;
pub use connect::{ConnectConfig, ConnectVault};
pub use memory::MemoryVault;
