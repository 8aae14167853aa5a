//! Storage backend trait definition.

use crate::error::StorageResult;

/// An append-only byte store used by the LodeStore write-ahead log.
///
/// # Invariants
///
/// - `append` returns the offset of the first appended byte
/// - `read_at` returns exactly the bytes previously appended at that offset
/// - after `flush` returns, appended bytes survive process exit
/// - implementations are `Send + Sync`; the log serializes access itself
pub trait StorageBackend: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::ReadPastEnd`] when the range is not
    /// fully inside the current size, or with an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the offset it was written at.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Pushes appended data to durable storage.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the current size in bytes (the offset of the next append).
    fn size(&self) -> StorageResult<u64>;

    /// Like [`flush`](Self::flush), but also makes file metadata durable.
    fn sync(&mut self) -> StorageResult<()>;

    /// Discards every byte at or after `new_size`.
    ///
    /// Recovery uses this to cut a torn record off the end of the log.
    ///
    /// # Errors
    ///
    /// Fails when `new_size` is larger than the current size.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
