//! Writer lock and snapshot tracking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::TransactionError;
use crate::types::{SequenceNumber, TransactionId};

/// Store-wide exclusive lock held by a read-write transaction from begin
/// (or upgrade) until commit or abort.
///
/// Ownership is recorded by transaction id rather than a guard so that the
/// permit can live inside a [`Transaction`](super::Transaction) that moves
/// between stack frames.
#[derive(Debug, Default)]
pub(crate) struct WriterLock {
    owner: Mutex<Option<TransactionId>>,
    released: Condvar,
}

impl WriterLock {
    /// Waits up to `timeout` for the lock.
    pub(crate) fn acquire(
        self: &Arc<Self>,
        txn_id: TransactionId,
        timeout: Duration,
    ) -> Result<WriterPermit, TransactionError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut owner = self.owner.lock();
        while owner.is_some() {
            let result = self.released.wait_until(&mut owner, deadline);
            if result.timed_out() && owner.is_some() {
                return Err(TransactionError::LockTimeout {
                    txn_id,
                    waited: started.elapsed(),
                });
            }
        }
        *owner = Some(txn_id);
        Ok(WriterPermit {
            lock: Arc::clone(self),
            txn_id,
        })
    }

    /// The transaction currently holding the lock.
    pub(crate) fn owner(&self) -> Option<TransactionId> {
        *self.owner.lock()
    }
}

/// Proof of writer-lock ownership. Releases the lock on drop.
#[derive(Debug)]
pub(crate) struct WriterPermit {
    lock: Arc<WriterLock>,
    txn_id: TransactionId,
}

impl Drop for WriterPermit {
    fn drop(&mut self) {
        let mut owner = self.lock.owner.lock();
        if *owner == Some(self.txn_id) {
            *owner = None;
        }
        drop(owner);
        self.lock.released.notify_one();
    }
}

/// Multiset of snapshot sequences held by open transactions.
#[derive(Debug, Default)]
pub(crate) struct SnapshotRegistry {
    active: Mutex<BTreeMap<SequenceNumber, usize>>,
}

impl SnapshotRegistry {
    /// Takes a snapshot of `committed` and registers it.
    ///
    /// Reading the counter under the registry lock pairs with
    /// [`with_oldest`](Self::with_oldest): a commit either sees this
    /// snapshot registered or this snapshot sees the commit.
    pub(crate) fn register(self: &Arc<Self>, committed: &AtomicU64) -> SnapshotGuard {
        let mut active = self.active.lock();
        let seq = SequenceNumber::new(committed.load(Ordering::Acquire));
        *active.entry(seq).or_insert(0) += 1;
        SnapshotGuard {
            registry: Arc::clone(self),
            seq,
        }
    }

    /// Runs `f` with the oldest sequence any open snapshot can read, while
    /// no new snapshot can be registered.
    pub(crate) fn with_oldest<R>(
        &self,
        committed: SequenceNumber,
        f: impl FnOnce(SequenceNumber) -> R,
    ) -> R {
        let active = self.active.lock();
        let oldest = active
            .keys()
            .next()
            .map_or(committed, |seq| (*seq).min(committed));
        f(oldest)
    }

    /// Number of registered snapshots.
    pub(crate) fn len(&self) -> usize {
        self.active.lock().values().sum()
    }
}

/// Registration of one snapshot. Deregisters on drop.
#[derive(Debug)]
pub(crate) struct SnapshotGuard {
    registry: Arc<SnapshotRegistry>,
    seq: SequenceNumber,
}

impl SnapshotGuard {
    pub(crate) fn seq(&self) -> SequenceNumber {
        self.seq
    }
}

impl Drop for SnapshotGuard {
    fn drop(&mut self) {
        let mut active = self.registry.active.lock();
        if let Some(count) = active.get_mut(&self.seq) {
            *count -= 1;
            if *count == 0 {
                active.remove(&self.seq);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn permit_releases_on_drop() {
        let lock = Arc::new(WriterLock::default());
        let permit = lock.acquire(TransactionId::new(1), Duration::ZERO).unwrap();
        assert_eq!(lock.owner(), Some(TransactionId::new(1)));
        drop(permit);
        assert_eq!(lock.owner(), None);
    }

    #[test]
    fn second_writer_times_out() {
        let lock = Arc::new(WriterLock::default());
        let _held = lock.acquire(TransactionId::new(1), Duration::ZERO).unwrap();
        let err = lock
            .acquire(TransactionId::new(2), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, TransactionError::LockTimeout { txn_id, .. } if txn_id == TransactionId::new(2)));
    }

    #[test]
    fn waiting_writer_gets_lock_after_release() {
        let lock = Arc::new(WriterLock::default());
        let held = lock.acquire(TransactionId::new(1), Duration::ZERO).unwrap();
        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                lock.acquire(TransactionId::new(2), Duration::from_secs(5))
                    .map(|_| ())
            })
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn oldest_snapshot_tracks_registrations() {
        let registry = Arc::new(SnapshotRegistry::default());
        let committed = AtomicU64::new(3);
        let first = registry.register(&committed);
        committed.store(7, Ordering::Release);
        let second = registry.register(&committed);
        assert_eq!(second.seq(), SequenceNumber::new(7));
        assert_eq!(registry.len(), 2);

        registry.with_oldest(SequenceNumber::new(7), |oldest| {
            assert_eq!(oldest, SequenceNumber::new(3));
        });
        drop(first);
        registry.with_oldest(SequenceNumber::new(7), |oldest| {
            assert_eq!(oldest, SequenceNumber::new(7));
        });
        drop(second);
        assert_eq!(registry.len(), 0);
    }
}
