//! Transaction state.

use std::collections::HashSet;
use std::fmt;
use std::ops::Bound;

use tracing::trace;

use crate::error::{CoreResult, TransactionError};
use crate::key::RowKey;
use crate::store::{Keyspaces, WriteOp};
use crate::transaction::lock::{SnapshotGuard, WriterPermit};
use crate::types::{Keyspace, SequenceNumber, TransactionId};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

impl TransactionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Snapshot reads only.
    ReadOnly,
    /// Reads and buffered writes.
    ReadWrite,
}

/// A store transaction.
///
/// Reads see the snapshot taken at begin plus this transaction's own
/// pending writes. Writes are buffered and become visible to others
/// atomically at commit. Dropping an active transaction discards its
/// writes and releases its locks.
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    state: TransactionState,
    writes: Keyspaces<Option<Vec<u8>>>,
    reads: HashSet<(Keyspace, RowKey)>,
    permit: Option<WriterPermit>,
    upgradable: bool,
    snapshot: SnapshotGuard,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        mode: TransactionMode,
        snapshot: SnapshotGuard,
        permit: Option<WriterPermit>,
    ) -> Self {
        Self {
            id,
            mode,
            state: TransactionState::Active,
            writes: Keyspaces::new(),
            reads: HashSet::new(),
            permit,
            upgradable: true,
            snapshot,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the snapshot sequence number.
    #[must_use]
    pub fn snapshot_seq(&self) -> SequenceNumber {
        self.snapshot.seq()
    }

    /// Returns the transaction mode.
    #[must_use]
    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Checks if the transaction is read-only.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.mode == TransactionMode::ReadOnly
    }

    /// Whether this transaction holds the store's writer lock.
    #[must_use]
    pub fn holds_writer_lock(&self) -> bool {
        self.permit.is_some()
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// The pending write for a key: `Some(Some(bytes))` for a put,
    /// `Some(None)` for a delete, `None` if untouched.
    #[must_use]
    pub fn pending_write(&self, keyspace: Keyspace, key: &RowKey) -> Option<Option<&[u8]>> {
        self.writes
            .space(keyspace)
            .get(key)
            .map(|value| value.as_deref())
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(TransactionError::NotActive {
                txn_id: self.id,
                state: self.state.as_str(),
            }
            .into())
        }
    }

    /// Whether a joined write may take the writer lock for this
    /// transaction. Transactions begun by `RequiresNewRead` stay read-only.
    #[must_use]
    pub fn is_upgradable(&self) -> bool {
        self.upgradable
    }

    pub(crate) fn forbid_upgrade(&mut self) {
        self.upgradable = false;
    }

    pub(crate) fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.is_read_only() {
            return Err(TransactionError::ReadOnly { txn_id: self.id }.into());
        }
        Ok(())
    }

    pub(crate) fn put(&mut self, keyspace: Keyspace, key: RowKey, value: Vec<u8>) -> CoreResult<()> {
        self.ensure_writable()?;
        self.writes.space_mut(keyspace).insert(key, Some(value));
        Ok(())
    }

    pub(crate) fn delete(&mut self, keyspace: Keyspace, key: RowKey) -> CoreResult<()> {
        self.ensure_writable()?;
        self.writes.space_mut(keyspace).insert(key, None);
        Ok(())
    }

    /// Records a read of committed data for validation at commit.
    pub(crate) fn record_read(&mut self, keyspace: Keyspace, key: &RowKey) {
        if self.writes.space(keyspace).contains_key(key) {
            return;
        }
        self.reads.insert((keyspace, key.clone()));
    }

    /// Pending writes within `range`, in key order.
    pub(crate) fn pending_range(
        &self,
        keyspace: Keyspace,
        range: (Bound<RowKey>, Bound<RowKey>),
    ) -> impl Iterator<Item = (&RowKey, &Option<Vec<u8>>)> {
        self.writes.space(keyspace).range(range)
    }

    /// Every key read or written, for commit validation.
    pub(crate) fn touched_keys(&self) -> impl Iterator<Item = (Keyspace, &RowKey)> {
        self.reads
            .iter()
            .map(|(ks, key)| (*ks, key))
            .chain(self.writes.iter().map(|(ks, key, _)| (ks, key)))
    }

    pub(crate) fn write_ops(&self) -> Vec<WriteOp> {
        self.writes
            .iter()
            .map(|(keyspace, key, value)| WriteOp {
                keyspace,
                key: key.clone(),
                value: value.clone(),
            })
            .collect()
    }

    pub(crate) fn grant_writer(&mut self, permit: WriterPermit) {
        self.permit = Some(permit);
        self.mode = TransactionMode::ReadWrite;
    }

    /// Marks an optimistic transaction writable without the writer lock.
    pub(crate) fn allow_optimistic_writes(&mut self) {
        self.mode = TransactionMode::ReadWrite;
    }

    pub(crate) fn finish(&mut self, state: TransactionState) {
        self.state = state;
        self.writes.clear();
        self.reads.clear();
        self.permit = None;
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot.seq())
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("writes", &self.writes.len())
            .field("reads", &self.reads.len())
            .field("writer_lock", &self.permit.is_some())
            .finish()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.is_active() {
            trace!(txn = %self.id, writes = self.writes.len(), "dropping active transaction");
        }
    }
}
