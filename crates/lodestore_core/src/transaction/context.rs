//! Per-call-chain transaction stack.

use tracing::warn;

use crate::error::{CoreResult, TransactionError};
use crate::transaction::state::Transaction;

/// Ordered stack of open transactions for one logical call chain.
///
/// Pass the same context through every call of a chain; nested calls see
/// the outer transaction at the top. Pushes and pops are strictly nested.
/// A context is not shared between threads; create one per worker.
#[derive(Debug, Default)]
pub struct TransactionContext {
    stack: Vec<Transaction>,
}

impl TransactionContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a transaction, making it active.
    pub fn push(&mut self, txn: Transaction) {
        self.stack.push(txn);
    }

    /// The active transaction.
    pub fn peek(&self) -> Option<&Transaction> {
        self.stack.last()
    }

    /// The active transaction, mutably.
    pub fn peek_mut(&mut self) -> Option<&mut Transaction> {
        self.stack.last_mut()
    }

    /// Removes and returns the active transaction.
    pub fn pop(&mut self) -> Option<Transaction> {
        self.stack.pop()
    }

    /// Drops every open transaction, discarding their writes.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Number of open transactions.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// True if no transaction is open.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// The active transaction, or `NoActiveTransaction`.
    pub fn active(&mut self) -> CoreResult<&mut Transaction> {
        self.stack
            .last_mut()
            .ok_or_else(|| TransactionError::NoActiveTransaction.into())
    }
}

impl Drop for TransactionContext {
    fn drop(&mut self) {
        if !self.stack.is_empty() {
            warn!(
                open = self.stack.len(),
                "transaction context dropped with open transactions; discarding them"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStore;
    use crate::transaction::TransactionManager;
    use crate::wal::WalManager;
    use lodestore_storage::InMemoryBackend;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn stack_is_last_in_first_out() {
        let wal = Arc::new(WalManager::new(Box::new(InMemoryBackend::new()), false));
        let mgr = TransactionManager::new(Arc::new(KvStore::new()), wal, Duration::from_millis(50));
        let mut ctx = TransactionContext::new();
        assert!(ctx.active().is_err());

        let outer = mgr.begin_read().unwrap();
        let inner = mgr.begin_read().unwrap();
        let (outer_id, inner_id) = (outer.id(), inner.id());
        ctx.push(outer);
        ctx.push(inner);

        assert_eq!(ctx.depth(), 2);
        assert_eq!(ctx.peek().map(Transaction::id), Some(inner_id));
        assert_eq!(ctx.pop().map(|t| t.id()), Some(inner_id));
        assert_eq!(ctx.active().unwrap().id(), outer_id);
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
