//! In-memory multi-version sorted store.
//!
//! The store is the materialized state of the WAL. Each key keeps a short
//! chain of versions so that snapshot readers see a consistent view while
//! writers commit. Durability is the WAL's job; this module only orders and
//! versions.

mod keyspaces;
mod versioned;

pub(crate) use keyspaces::Keyspaces;
pub use versioned::{KvStore, WriteOp};
