//! Transactions and transaction-boundary resolution.
//!
//! - [`TransactionManager`] begins, commits and aborts store transactions
//!   and resolves a call's [`TransactionAttribute`] against the caller's
//!   [`TransactionContext`].
//! - [`TransactionContext`] is the explicit per-call-chain stack of open
//!   transactions. The top of the stack is the active transaction.

mod attribute;
mod context;
mod frame;
mod lock;
mod manager;
mod state;

pub use attribute::{Resolution, TransactionAttribute};
pub use context::TransactionContext;
pub use manager::TransactionManager;
pub use state::{Transaction, TransactionMode, TransactionState};
