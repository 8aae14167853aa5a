//! Transaction manager.

use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{CoreError, CoreResult, TransactionError};
use crate::key::RowKey;
use crate::store::KvStore;
use crate::transaction::attribute::{Resolution, TransactionAttribute};
use crate::transaction::context::TransactionContext;
use crate::transaction::frame::FrameGuard;
use crate::transaction::lock::{SnapshotRegistry, WriterLock};
use crate::transaction::state::{Transaction, TransactionMode, TransactionState};
use crate::types::{Keyspace, SequenceNumber, TransactionId};
use crate::wal::WalManager;

/// Manages transactions with ACID guarantees.
///
/// - Read-only transactions are snapshot reads and never block.
/// - Read-write transactions hold the store's writer lock from begin (or
///   upgrade) until they finish; waits are bounded by the lock timeout.
/// - Optimistic transactions write without the lock and are validated at
///   commit.
/// - Commits are serialized, logged to the WAL and then applied to the
///   store under the next sequence number.
pub struct TransactionManager {
    store: Arc<KvStore>,
    wal: Arc<WalManager>,
    next_txid: AtomicU64,
    committed_seq: AtomicU64,
    writer: Arc<WriterLock>,
    commit_lock: Mutex<()>,
    snapshots: Arc<SnapshotRegistry>,
    lock_timeout: Duration,
}

impl TransactionManager {
    /// Creates a manager over an empty store.
    pub fn new(store: Arc<KvStore>, wal: Arc<WalManager>, lock_timeout: Duration) -> Self {
        Self::with_state(
            store,
            wal,
            lock_timeout,
            TransactionId::new(0),
            SequenceNumber::new(0),
        )
    }

    /// Creates a manager continuing from recovered state.
    pub fn with_state(
        store: Arc<KvStore>,
        wal: Arc<WalManager>,
        lock_timeout: Duration,
        last_txid: TransactionId,
        committed_seq: SequenceNumber,
    ) -> Self {
        Self {
            store,
            wal,
            next_txid: AtomicU64::new(last_txid.as_u64() + 1),
            committed_seq: AtomicU64::new(committed_seq.as_u64()),
            writer: Arc::new(WriterLock::default()),
            commit_lock: Mutex::new(()),
            snapshots: Arc::new(SnapshotRegistry::default()),
            lock_timeout,
        }
    }

    fn next_id(&self) -> TransactionId {
        TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst))
    }

    /// Begins a transaction.
    ///
    /// Read-write transactions wait for the writer lock before taking their
    /// snapshot, so they always start from the latest commit.
    pub fn begin(&self, mode: TransactionMode) -> CoreResult<Transaction> {
        let id = self.next_id();
        let permit = match mode {
            TransactionMode::ReadOnly => None,
            TransactionMode::ReadWrite => Some(self.writer.acquire(id, self.lock_timeout)?),
        };
        let snapshot = self.snapshots.register(&self.committed_seq);
        debug!(txn = %id, ?mode, snapshot = %snapshot.seq(), "begin transaction");
        Ok(Transaction::new(id, mode, snapshot, permit))
    }

    /// Begins a read-only transaction.
    pub fn begin_read(&self) -> CoreResult<Transaction> {
        self.begin(TransactionMode::ReadOnly)
    }

    /// Begins a read-write transaction.
    pub fn begin_write(&self) -> CoreResult<Transaction> {
        self.begin(TransactionMode::ReadWrite)
    }

    /// Begins a writable transaction that does not take the writer lock.
    ///
    /// Conflicts with commits made after its snapshot are detected at
    /// commit; callers retry.
    pub fn begin_optimistic(&self) -> Transaction {
        let id = self.next_id();
        let snapshot = self.snapshots.register(&self.committed_seq);
        trace!(txn = %id, snapshot = %snapshot.seq(), "begin optimistic transaction");
        let mut txn = Transaction::new(id, TransactionMode::ReadOnly, snapshot, None);
        txn.allow_optimistic_writes();
        txn
    }

    /// Upgrades a read-only transaction to read-write.
    ///
    /// On lock timeout the transaction is aborted. A transaction marked
    /// non-upgradable fails with `TransactionError::ReadOnly` and stays
    /// active.
    pub fn upgrade(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_active()?;
        if txn.holds_writer_lock() {
            return Ok(());
        }
        if !txn.is_upgradable() {
            return Err(TransactionError::ReadOnly { txn_id: txn.id() }.into());
        }
        match self.writer.acquire(txn.id(), self.lock_timeout) {
            Ok(permit) => {
                debug!(txn = %txn.id(), "upgraded to read-write");
                txn.grant_writer(permit);
                Ok(())
            }
            Err(err) => {
                txn.finish(TransactionState::Aborted);
                warn!(txn = %txn.id(), error = %err, "upgrade failed, transaction aborted");
                Err(err.into())
            }
        }
    }

    /// Commits a transaction.
    ///
    /// Transactions without writes commit without touching the WAL and
    /// return their snapshot sequence.
    ///
    /// # Errors
    ///
    /// `TransactionError::Conflict` if a key this transaction read or wrote
    /// was committed by someone else after its snapshot. The transaction is
    /// aborted on every error.
    pub fn commit(&self, txn: &mut Transaction) -> CoreResult<SequenceNumber> {
        txn.ensure_active()?;
        if txn.write_count() == 0 {
            txn.finish(TransactionState::Committed);
            trace!(txn = %txn.id(), "committed read-only transaction");
            return Ok(txn.snapshot_seq());
        }

        let result = self.commit_inner(txn);
        match &result {
            Ok(seq) => {
                txn.finish(TransactionState::Committed);
                debug!(txn = %txn.id(), sequence = %seq, "committed transaction");
            }
            Err(err) => {
                txn.finish(TransactionState::Aborted);
                debug!(txn = %txn.id(), error = %err, "commit failed, transaction aborted");
            }
        }
        result
    }

    fn commit_inner(&self, txn: &Transaction) -> CoreResult<SequenceNumber> {
        let _serial = self.commit_lock.lock();

        let snapshot = txn.snapshot_seq();
        for (keyspace, key) in txn.touched_keys() {
            if let Some(committed) = self.store.latest_seq(keyspace, key) {
                if committed > snapshot {
                    return Err(TransactionError::Conflict {
                        txn_id: txn.id(),
                        snapshot,
                        committed,
                    }
                    .into());
                }
            }
        }

        let seq = SequenceNumber::new(self.committed_seq.load(Ordering::Acquire)).next();
        let writes = txn.write_ops();
        self.wal.append_transaction(txn.id(), seq, &writes)?;
        self.store.apply(seq, &writes);
        self.committed_seq.store(seq.as_u64(), Ordering::Release);

        let pruned = self.snapshots.with_oldest(seq, |oldest| {
            self.store
                .prune(writes.iter().map(|w| (w.keyspace, &w.key)), oldest)
        });
        trace!(sequence = %seq, pruned, "applied commit");
        Ok(seq)
    }

    /// Aborts a transaction, discarding its writes.
    pub fn abort(&self, txn: &mut Transaction) -> CoreResult<()> {
        txn.ensure_active()?;
        txn.finish(TransactionState::Aborted);
        debug!(txn = %txn.id(), "aborted transaction");
        Ok(())
    }

    /// Aborts `txn` if it is still active. Returns whether it was.
    pub(crate) fn discard(&self, txn: &mut Transaction) -> bool {
        if !txn.is_active() {
            return false;
        }
        txn.finish(TransactionState::Aborted);
        debug!(txn = %txn.id(), "aborted transaction");
        true
    }

    /// Reads a key through the transaction: pending writes first, then the
    /// snapshot.
    pub fn get(
        &self,
        txn: &mut Transaction,
        keyspace: Keyspace,
        key: &RowKey,
    ) -> CoreResult<Option<Vec<u8>>> {
        txn.ensure_active()?;
        if let Some(pending) = txn.pending_write(keyspace, key) {
            return Ok(pending.map(<[u8]>::to_vec));
        }
        txn.record_read(keyspace, key);
        Ok(self.store.get(keyspace, key, txn.snapshot_seq()))
    }

    /// Scans a key range through the transaction, merging the snapshot
    /// with pending writes. Results are in key order.
    pub fn scan(
        &self,
        txn: &mut Transaction,
        keyspace: Keyspace,
        range: (Bound<RowKey>, Bound<RowKey>),
    ) -> CoreResult<Vec<(RowKey, Vec<u8>)>> {
        txn.ensure_active()?;
        let committed = self
            .store
            .scan(keyspace, range.clone(), txn.snapshot_seq());
        for (key, _) in &committed {
            txn.record_read(keyspace, key);
        }

        let mut merged = std::collections::BTreeMap::new();
        merged.extend(committed);
        for (key, pending) in txn.pending_range(keyspace, range) {
            match pending {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Buffers a put.
    pub fn put(
        &self,
        txn: &mut Transaction,
        keyspace: Keyspace,
        key: RowKey,
        value: Vec<u8>,
    ) -> CoreResult<()> {
        txn.put(keyspace, key, value)
    }

    /// Buffers a delete.
    pub fn delete(&self, txn: &mut Transaction, keyspace: Keyspace, key: RowKey) -> CoreResult<()> {
        txn.delete(keyspace, key)
    }

    /// Runs `f` under the transaction boundary declared by `attribute`.
    ///
    /// - Joined calls run inside the top transaction and never commit,
    ///   abort or pop it.
    /// - Owned calls push a new transaction, commit it when `f` succeeds
    ///   and abort it on error, early return or panic.
    ///
    /// A `RequiredWrite` call joining a read-only top upgrades it first,
    /// unless that top was begun by `RequiresNewRead`: then the call fails
    /// with `TransactionError::ReadOnly` without waiting for the lock.
    pub fn execute<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        attribute: TransactionAttribute,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
        E: From<CoreError>,
    {
        match attribute.resolve(ctx.peek()) {
            Resolution::Join { upgrade } => {
                let top = ctx.active()?;
                trace!(txn = %top.id(), ?attribute, "joining active transaction");
                if upgrade {
                    self.upgrade(top)?;
                }
                f(ctx)
            }
            Resolution::Begin(mode) => {
                let mut frame = FrameGuard::begin(self, ctx, mode)?;
                if attribute == TransactionAttribute::RequiresNewRead {
                    frame.active()?.forbid_upgrade();
                }
                trace!(?attribute, depth = frame.depth(), "owning new transaction");
                let value = f(&mut *frame)?;
                frame.finish()?;
                Ok(value)
            }
        }
    }

    /// Begins a transaction and pushes it on `ctx`; the caller owns it
    /// until [`commit_top`](Self::commit_top) or
    /// [`rollback_top`](Self::rollback_top).
    pub fn begin_in(&self, ctx: &mut TransactionContext, mode: TransactionMode) -> CoreResult<()> {
        let txn = self.begin(mode)?;
        ctx.push(txn);
        Ok(())
    }

    /// Pops and commits the top transaction of `ctx`.
    pub fn commit_top(&self, ctx: &mut TransactionContext) -> CoreResult<SequenceNumber> {
        let mut txn = ctx.pop().ok_or(TransactionError::NoActiveTransaction)?;
        self.commit(&mut txn)
    }

    /// Pops and aborts the top transaction of `ctx`.
    pub fn rollback_top(&self, ctx: &mut TransactionContext) -> CoreResult<()> {
        let mut txn = ctx.pop().ok_or(TransactionError::NoActiveTransaction)?;
        self.discard(&mut txn);
        Ok(())
    }

    /// Returns the last committed sequence number.
    pub fn committed_seq(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::Acquire))
    }

    /// Number of open transactions holding a snapshot.
    pub fn active_count(&self) -> usize {
        self.snapshots.len()
    }

    /// The transaction holding the writer lock, if any.
    pub fn writer(&self) -> Option<TransactionId> {
        self.writer.owner()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// The write-ahead log.
    pub fn wal(&self) -> &Arc<WalManager> {
        &self.wal
    }
}

impl fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("committed_seq", &self.committed_seq())
            .field("active", &self.active_count())
            .field("writer", &self.writer())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrimaryKey;
    use crate::types::SchemaId;
    use lodestore_storage::InMemoryBackend;
    use std::thread;

    fn create_manager() -> TransactionManager {
        create_manager_with_timeout(Duration::from_millis(100))
    }

    fn create_manager_with_timeout(timeout: Duration) -> TransactionManager {
        let wal = Arc::new(WalManager::new(Box::new(InMemoryBackend::new()), false));
        TransactionManager::new(Arc::new(KvStore::new()), wal, timeout)
    }

    fn key(n: i64) -> RowKey {
        RowKey::encode(SchemaId::new(1), &PrimaryKey::Int(n))
    }

    fn write(mgr: &TransactionManager, n: i64, value: &[u8]) -> SequenceNumber {
        let mut txn = mgr.begin_write().unwrap();
        mgr.put(&mut txn, Keyspace::Records, key(n), value.to_vec())
            .unwrap();
        mgr.commit(&mut txn).unwrap()
    }

    #[test]
    fn commit_empty_transaction() {
        let mgr = create_manager();
        let mut txn = mgr.begin_read().unwrap();
        mgr.commit(&mut txn).unwrap();
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(mgr.committed_seq(), SequenceNumber::new(0));
        assert_eq!(mgr.wal().size().unwrap(), 0);
    }

    #[test]
    fn sequence_numbers_increase() {
        let mgr = create_manager();
        assert_eq!(write(&mgr, 1, b"a"), SequenceNumber::new(1));
        assert_eq!(write(&mgr, 2, b"b"), SequenceNumber::new(2));
        assert_eq!(mgr.committed_seq(), SequenceNumber::new(2));
    }

    #[test]
    fn read_only_transaction_rejects_writes() {
        let mgr = create_manager();
        let mut txn = mgr.begin_read().unwrap();
        let err = mgr
            .put(&mut txn, Keyspace::Records, key(1), vec![1])
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transaction(TransactionError::ReadOnly { .. })
        ));
    }

    #[test]
    fn pending_writes_visible_inside_only() {
        let mgr = create_manager();
        let mut writer = mgr.begin_write().unwrap();
        mgr.put(&mut writer, Keyspace::Records, key(1), b"a".to_vec())
            .unwrap();
        assert_eq!(
            mgr.get(&mut writer, Keyspace::Records, &key(1)).unwrap(),
            Some(b"a".to_vec())
        );

        let mut reader = mgr.begin_read().unwrap();
        assert_eq!(mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap(), None);
        mgr.commit(&mut writer).unwrap();

        // Old snapshot still does not see it.
        assert_eq!(mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap(), None);
        let mut fresh = mgr.begin_read().unwrap();
        assert_eq!(
            mgr.get(&mut fresh, Keyspace::Records, &key(1)).unwrap(),
            Some(b"a".to_vec())
        );
    }

    #[test]
    fn reader_keeps_old_version_after_overwrite() {
        let mgr = create_manager();
        write(&mgr, 1, b"old");
        let mut reader = mgr.begin_read().unwrap();
        write(&mgr, 1, b"new");
        write(&mgr, 1, b"newer");
        assert_eq!(
            mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap(),
            Some(b"old".to_vec())
        );
    }

    #[test]
    fn versions_are_pruned_once_readers_finish() {
        let mgr = create_manager();
        for value in [b"a", b"b", b"c", b"d"] {
            write(&mgr, 1, value);
        }
        // The committing writer's own snapshot keeps one older version.
        assert_eq!(mgr.store().version_count(), 2);
    }

    #[test]
    fn scan_merges_pending_writes() {
        let mgr = create_manager();
        write(&mgr, 1, b"a");
        write(&mgr, 2, b"b");

        let mut txn = mgr.begin_write().unwrap();
        mgr.delete(&mut txn, Keyspace::Records, key(1)).unwrap();
        mgr.put(&mut txn, Keyspace::Records, key(3), b"c".to_vec())
            .unwrap();
        let rows = mgr
            .scan(
                &mut txn,
                Keyspace::Records,
                RowKey::group_bounds(SchemaId::new(1)),
            )
            .unwrap();
        let values: Vec<_> = rows.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn aborted_data_not_visible() {
        let mgr = create_manager();
        let mut txn = mgr.begin_write().unwrap();
        mgr.put(&mut txn, Keyspace::Records, key(1), b"a".to_vec())
            .unwrap();
        mgr.abort(&mut txn).unwrap();
        assert!(mgr.writer().is_none());

        let mut reader = mgr.begin_read().unwrap();
        assert_eq!(mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap(), None);
    }

    #[test]
    fn cannot_commit_twice() {
        let mgr = create_manager();
        let mut txn = mgr.begin_read().unwrap();
        mgr.commit(&mut txn).unwrap();
        assert!(matches!(
            mgr.commit(&mut txn),
            Err(CoreError::Transaction(TransactionError::NotActive { .. }))
        ));
    }

    #[test]
    fn optimistic_conflict_is_detected() {
        let mgr = create_manager();
        let mut first = mgr.begin_optimistic();
        let mut second = mgr.begin_optimistic();
        assert_eq!(mgr.get(&mut first, Keyspace::Schema, &key(9)).unwrap(), None);
        assert_eq!(mgr.get(&mut second, Keyspace::Schema, &key(9)).unwrap(), None);
        mgr.put(&mut first, Keyspace::Schema, key(9), vec![1]).unwrap();
        mgr.put(&mut second, Keyspace::Schema, key(9), vec![2]).unwrap();

        mgr.commit(&mut first).unwrap();
        let err = mgr.commit(&mut second).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transaction(TransactionError::Conflict { .. })
        ));
        assert_eq!(second.state(), TransactionState::Aborted);
    }

    #[test]
    fn upgraded_reader_conflicts_on_stale_read() {
        let mgr = create_manager();
        write(&mgr, 1, b"a");
        let mut txn = mgr.begin_read().unwrap();
        mgr.get(&mut txn, Keyspace::Records, &key(1)).unwrap();
        write(&mgr, 1, b"b");

        mgr.upgrade(&mut txn).unwrap();
        mgr.put(&mut txn, Keyspace::Records, key(1), b"c".to_vec())
            .unwrap();
        assert!(matches!(
            mgr.commit(&mut txn),
            Err(CoreError::Transaction(TransactionError::Conflict { .. }))
        ));
    }

    #[test]
    fn second_writer_times_out_and_first_is_unaffected() {
        let mgr = Arc::new(create_manager_with_timeout(Duration::from_millis(30)));
        let mut first = mgr.begin_write().unwrap();

        let other = Arc::clone(&mgr);
        let err = thread::spawn(move || other.begin_write().map(|_| ()))
            .join()
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transaction(TransactionError::LockTimeout { .. })
        ));

        mgr.put(&mut first, Keyspace::Records, key(1), b"a".to_vec())
            .unwrap();
        mgr.commit(&mut first).unwrap();
    }

    #[test]
    fn failed_upgrade_aborts_transaction() {
        let mgr = create_manager_with_timeout(Duration::from_millis(10));
        let _writer = mgr.begin_write().unwrap();
        let mut reader = mgr.begin_read().unwrap();
        assert!(mgr.upgrade(&mut reader).is_err());
        assert_eq!(reader.state(), TransactionState::Aborted);
    }

    #[test]
    fn execute_commits_owned_frame() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        let seq_before = mgr.committed_seq();
        mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |ctx| {
            let txn = ctx.active()?;
            mgr.put(txn, Keyspace::Records, key(1), b"a".to_vec())
        })
        .unwrap();
        assert!(ctx.is_empty());
        assert_eq!(mgr.committed_seq(), seq_before.next());
    }

    #[test]
    fn execute_aborts_on_error() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        let result: CoreResult<()> =
            mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |ctx| {
                let txn = ctx.active()?;
                mgr.put(txn, Keyspace::Records, key(1), b"a".to_vec())?;
                Err(CoreError::invalid_operation("boom"))
            });
        assert!(result.is_err());
        assert!(ctx.is_empty());
        assert!(mgr.writer().is_none());
        assert_eq!(mgr.committed_seq(), SequenceNumber::new(0));
    }

    #[test]
    fn joined_frame_does_not_pop() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |outer| {
            let outer_id = outer.active()?.id();
            mgr.execute(outer, TransactionAttribute::RequiredRead, |inner| {
                assert_eq!(inner.depth(), 1);
                assert_eq!(inner.active()?.id(), outer_id);
                Ok::<_, CoreError>(())
            })
        })
        .unwrap();
    }

    #[test]
    fn requires_new_read_pushes_a_second_frame() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |outer| {
            mgr.execute(outer, TransactionAttribute::RequiresNewRead, |inner| {
                assert_eq!(inner.depth(), 2);
                assert!(inner.active()?.is_read_only());
                Ok::<_, CoreError>(())
            })?;
            assert_eq!(outer.depth(), 1);
            Ok::<_, CoreError>(())
        })
        .unwrap();
    }

    #[test]
    fn required_write_upgrades_read_only_top() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        mgr.execute(&mut ctx, TransactionAttribute::RequiredRead, |outer| {
            assert!(outer.active()?.is_read_only());
            mgr.execute(outer, TransactionAttribute::RequiredWrite, |inner| {
                let txn = inner.active()?;
                assert!(!txn.is_read_only());
                mgr.put(txn, Keyspace::Records, key(4), b"x".to_vec())
            })
        })
        .unwrap();
        let mut reader = mgr.begin_read().unwrap();
        assert!(mgr.get(&mut reader, Keyspace::Records, &key(4)).unwrap().is_some());
    }

    #[test]
    fn requires_new_read_rejects_joined_writes() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        let result: CoreResult<()> =
            mgr.execute(&mut ctx, TransactionAttribute::RequiresNewRead, |outer| {
                assert!(!outer.active()?.is_upgradable());
                mgr.execute(outer, TransactionAttribute::RequiredWrite, |inner| {
                    mgr.put(inner.active()?, Keyspace::Records, key(1), b"x".to_vec())
                })
            });
        assert!(matches!(
            result,
            Err(CoreError::Transaction(TransactionError::ReadOnly { .. }))
        ));
        assert!(ctx.is_empty());
        assert!(mgr.writer().is_none());
        assert_eq!(mgr.committed_seq(), SequenceNumber::new(0));
    }

    #[test]
    fn write_inside_nested_requires_new_read_fails_without_waiting() {
        let mgr = create_manager_with_timeout(Duration::from_secs(5));
        let mut ctx = TransactionContext::new();
        mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |outer| {
            mgr.put(outer.active()?, Keyspace::Records, key(1), b"a".to_vec())?;
            let started = std::time::Instant::now();
            let nested: CoreResult<()> =
                mgr.execute(outer, TransactionAttribute::RequiresNewRead, |reader| {
                    mgr.execute(reader, TransactionAttribute::RequiredWrite, |inner| {
                        mgr.put(inner.active()?, Keyspace::Records, key(2), b"b".to_vec())
                    })
                });
            assert!(matches!(
                nested,
                Err(CoreError::Transaction(TransactionError::ReadOnly { .. }))
            ));
            assert!(started.elapsed() < Duration::from_secs(1));
            assert_eq!(outer.depth(), 1);
            Ok::<_, CoreError>(())
        })
        .unwrap();

        let mut reader = mgr.begin_read().unwrap();
        assert!(mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap().is_some());
        assert!(mgr.get(&mut reader, Keyspace::Records, &key(2)).unwrap().is_none());
    }

    #[test]
    fn discard_leaves_finished_transactions_alone() {
        let mgr = create_manager();
        let mut txn = mgr.begin_write().unwrap();
        assert!(mgr.discard(&mut txn));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(!mgr.discard(&mut txn));
        assert!(mgr.abort(&mut txn).is_err());

        let mut committed = mgr.begin_read().unwrap();
        mgr.commit(&mut committed).unwrap();
        assert!(!mgr.discard(&mut committed));
        assert_eq!(committed.state(), TransactionState::Committed);
    }

    #[test]
    fn frame_closes_quietly_after_its_transaction_was_aborted() {
        let mgr = create_manager_with_timeout(Duration::from_millis(30));
        let mut holder = mgr.begin_write().unwrap();

        let mut ctx = TransactionContext::new();
        let result: CoreResult<()> =
            mgr.execute(&mut ctx, TransactionAttribute::RequiredRead, |outer| {
                let joined = mgr.execute(outer, TransactionAttribute::RequiredWrite, |_| {
                    Ok::<_, CoreError>(())
                });
                assert!(outer.peek().is_some_and(|t| t.state() == TransactionState::Aborted));
                joined
            });
        assert!(matches!(
            result,
            Err(CoreError::Transaction(TransactionError::LockTimeout { .. }))
        ));
        assert!(ctx.is_empty());
        mgr.abort(&mut holder).unwrap();
    }

    #[test]
    fn panic_inside_frame_aborts() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: CoreResult<()> =
                mgr.execute(&mut ctx, TransactionAttribute::RequiredWrite, |_| {
                    panic!("boom")
                });
        }));
        assert!(result.is_err());
        assert!(ctx.is_empty());
        assert!(mgr.writer().is_none());
    }

    #[test]
    fn ad_hoc_begin_commit_rollback() {
        let mgr = create_manager();
        let mut ctx = TransactionContext::new();
        mgr.begin_in(&mut ctx, TransactionMode::ReadWrite).unwrap();
        mgr.put(ctx.active().unwrap(), Keyspace::Records, key(1), vec![1])
            .unwrap();
        mgr.commit_top(&mut ctx).unwrap();

        mgr.begin_in(&mut ctx, TransactionMode::ReadWrite).unwrap();
        mgr.put(ctx.active().unwrap(), Keyspace::Records, key(2), vec![2])
            .unwrap();
        mgr.rollback_top(&mut ctx).unwrap();

        assert!(matches!(
            mgr.commit_top(&mut ctx),
            Err(CoreError::Transaction(TransactionError::NoActiveTransaction))
        ));
        let mut reader = mgr.begin_read().unwrap();
        assert!(mgr.get(&mut reader, Keyspace::Records, &key(1)).unwrap().is_some());
        assert!(mgr.get(&mut reader, Keyspace::Records, &key(2)).unwrap().is_none());
    }
}
