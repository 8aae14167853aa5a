//! # LodeStore Testkit
//!
//! Test utilities for LodeStore.
//!
//! This crate provides:
//! - Test fixtures and database helpers
//! - Sample entities (`Account`, `Street`, `City`)
//! - A `Bank` service that declares transaction attributes the way
//!   application services do
//! - Property-based test generators using proptest
//! - A storage backend that fails flushes on demand
//!
//! Integration tests for the whole stack live under `tests/`.
//!
//! ## Usage
//!
//! ```rust
//! use lodestore_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let mut ctx = TransactionContext::new();
//!     db.repository().put(&mut ctx, &Account::new("a", 10)).unwrap();
//!     assert_eq!(db.repository().count::<Account>(&mut ctx).unwrap(), 1);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bank;
pub mod entities;
pub mod faults;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bank::*;
    pub use crate::entities::*;
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use lodestore_core::{
        CoreError, Database, Repository, TransactionAttribute, TransactionContext,
        TransactionMode,
    };
}

pub use bank::*;
pub use entities::*;
pub use faults::*;
pub use fixtures::*;
pub use generators::*;
