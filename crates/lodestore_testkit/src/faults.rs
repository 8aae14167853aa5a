//! Storage backends that fail on demand.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lodestore_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};

/// An in-memory backend whose next `flush` calls can be made to fail.
///
/// Clones share both the bytes and the failure counter, so a test can keep a
/// handle while the database owns the other one, then reopen a fresh
/// database over [`FlakyBackend::bytes`].
#[derive(Debug, Clone, Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    failing_flushes: Arc<AtomicUsize>,
}

impl FlakyBackend {
    /// Creates an empty backend that never fails until told to.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` flushes fail with an I/O error.
    pub fn fail_next_flushes(&self, count: usize) {
        self.failing_flushes.store(count, Ordering::SeqCst);
    }

    /// A plain backend over the same bytes.
    pub fn bytes(&self) -> InMemoryBackend {
        self.inner.clone()
    }
}

impl StorageBackend for FlakyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        self.inner.append(data)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let armed = self
            .failing_flushes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StorageError::Io(io::Error::other("disk full")));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}
