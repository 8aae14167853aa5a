//! Transaction-boundary attributes.

use crate::transaction::state::{Transaction, TransactionMode};

/// How a call relates to the transaction already on the caller's stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionAttribute {
    /// Always run in a fresh read-only transaction, independent of the stack.
    /// Writes inside it fail with `TransactionError::ReadOnly`; it is never
    /// upgraded.
    RequiresNewRead,
    /// Join the active transaction (upgrading it to read-write if needed),
    /// or start a read-write transaction if there is none.
    RequiredWrite,
    /// Join the active transaction, or start a read-only one.
    #[default]
    RequiredRead,
}

/// What the manager does for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Run inside the top transaction; the call does not own it.
    Join {
        /// The top transaction is read-only and must acquire the writer lock.
        upgrade: bool,
    },
    /// Begin, push and own a new transaction.
    Begin(TransactionMode),
}

impl TransactionAttribute {
    /// Resolves the attribute against the current top of stack.
    pub fn resolve(self, top: Option<&Transaction>) -> Resolution {
        match (self, top) {
            (Self::RequiresNewRead, _) => Resolution::Begin(TransactionMode::ReadOnly),
            (Self::RequiredWrite, Some(top)) => Resolution::Join {
                upgrade: top.is_read_only(),
            },
            (Self::RequiredWrite, None) => Resolution::Begin(TransactionMode::ReadWrite),
            (Self::RequiredRead, Some(_)) => Resolution::Join { upgrade: false },
            (Self::RequiredRead, None) => Resolution::Begin(TransactionMode::ReadOnly),
        }
    }

    /// Whether calls with this attribute may write.
    pub fn is_write(self) -> bool {
        matches!(self, Self::RequiredWrite)
    }
}
