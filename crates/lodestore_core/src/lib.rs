//! # LodeStore Core
//!
//! Embedded object store: typed entities persisted under byte-ordered row
//! keys, queried with a small declarative language, inside transactions
//! shared or isolated across nested call chains.
//!
//! This crate provides:
//! - Row key encoding and the storage comparator
//! - Schema registry (stable ids per entity type)
//! - Multi-version sorted store with a write-ahead log
//! - Transaction manager and per-call-chain transaction context
//! - Query parser, compiler and executor
//! - [`Repository`] for CRUD and queries, opened through [`Database`]
//!
//! ```rust
//! use lodestore_core::{Database, TransactionAttribute, TransactionContext};
//!
//! let db = Database::open_in_memory().unwrap();
//! let repo = db.repository();
//! let mut ctx = TransactionContext::new();
//!
//! let types: Vec<String> = repo
//!     .transaction(&mut ctx, TransactionAttribute::RequiredRead, |_ctx| {
//!         repo.list_schema()
//!     })
//!     .unwrap();
//! assert!(types.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod dir;
mod entity;
mod error;
mod registry;
mod repository;
mod types;

pub mod key;
pub mod query;
pub mod store;
pub mod transaction;
pub mod wal;

pub use config::Config;
pub use database::{Database, DatabaseStats, TypeStats};
pub use dir::DatabaseDir;
pub use entity::{decode_entity, encode_entity, Entity, RecordReader};
pub use error::{CoreError, CoreResult, QuerySyntaxError, TransactionError};
pub use key::{PrimaryKey, RowKey, StorageComparator};
pub use query::{QueryCompiler, QueryPlan};
pub use registry::SchemaRegistry;
pub use repository::Repository;
pub use transaction::{
    TransactionAttribute, TransactionContext, TransactionManager, TransactionMode,
    TransactionState,
};
pub use types::{Keyspace, SchemaId, SequenceNumber, TransactionId};
