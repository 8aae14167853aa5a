//! WAL writer and recovery reader.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use lodestore_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult};
use crate::store::WriteOp;
use crate::types::{SequenceNumber, TransactionId};
use crate::wal::record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// A transaction found committed during recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    /// Transaction ID.
    pub txid: TransactionId,
    /// Commit sequence.
    pub sequence: SequenceNumber,
    /// Writes in log order.
    pub writes: Vec<WriteOp>,
}

/// Result of replaying the log.
#[derive(Debug, Default)]
pub struct Recovery {
    /// Committed transactions in commit order.
    pub committed: Vec<CommittedTransaction>,
    /// Transactions that began but never committed.
    pub incomplete: usize,
    /// Bytes cut from a torn tail.
    pub truncated_bytes: u64,
}

impl Recovery {
    /// Highest committed sequence, or zero.
    pub fn last_sequence(&self) -> SequenceNumber {
        self.committed
            .last()
            .map_or(SequenceNumber::new(0), |t| t.sequence)
    }

    /// Highest transaction id seen, or zero.
    pub fn last_txid(&self) -> TransactionId {
        self.committed
            .iter()
            .map(|t| t.txid)
            .max()
            .unwrap_or(TransactionId::new(0))
    }
}

/// Manages WAL appends and replay.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
    /// Set when a failed append could not be cut back off the log.
    failed: AtomicBool,
}

impl WalManager {
    /// Creates a new WAL manager.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
            failed: AtomicBool::new(false),
        }
    }

    /// Whether an earlier failed append left bytes the log could not
    /// remove. No further appends are accepted once this is set.
    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn ensure_usable(&self) -> CoreResult<()> {
        if self.is_failed() {
            return Err(CoreError::wal_corruption(
                "log holds a partially written transaction; reopen the database",
            ));
        }
        Ok(())
    }

    /// Appends a single record. Returns the offset where it was written.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        let mut data = Vec::new();
        encode_envelope(record, &mut data)?;
        let mut backend = self.backend.lock();
        self.ensure_usable()?;
        Ok(backend.append(&data)?)
    }

    /// Appends a whole transaction (`Begin`, writes, `Commit`) in one write
    /// and makes it durable before returning.
    ///
    /// If the append, flush or sync fails, the log is cut back to its size
    /// before the call, so the failed transaction never replays. When that
    /// truncation fails too, the manager refuses all later appends.
    pub fn append_transaction(
        &self,
        txid: TransactionId,
        sequence: SequenceNumber,
        writes: &[WriteOp],
    ) -> CoreResult<u64> {
        let mut data = Vec::new();
        encode_envelope(&WalRecord::Begin { txid }, &mut data)?;
        for write in writes {
            let record = match &write.value {
                Some(value) => WalRecord::Put {
                    txid,
                    keyspace: write.keyspace,
                    key: write.key.clone(),
                    value: value.clone(),
                },
                None => WalRecord::Delete {
                    txid,
                    keyspace: write.keyspace,
                    key: write.key.clone(),
                },
            };
            encode_envelope(&record, &mut data)?;
        }
        encode_envelope(&WalRecord::Commit { txid, sequence }, &mut data)?;

        let mut backend = self.backend.lock();
        self.ensure_usable()?;
        let start = backend.size()?;
        let written = backend.append(&data).and_then(|offset| {
            backend.flush()?;
            if self.sync_on_commit {
                backend.sync()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                match backend.truncate(start) {
                    Ok(()) => warn!(%txid, offset = start, error = %err, "WAL append failed, log cut back"),
                    Err(truncate_err) => {
                        self.failed.store(true, Ordering::Release);
                        error!(
                            %txid,
                            offset = start,
                            error = %err,
                            truncate_error = %truncate_err,
                            "WAL append failed and the log could not be cut back"
                        );
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Flushes buffered writes.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Returns the current WAL size in bytes.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Reads every intact record with its offset.
    ///
    /// Stops silently at a torn tail. Returns the records and the offset
    /// just past the last intact record.
    pub fn read_all(&self) -> CoreResult<(Vec<(u64, WalRecord)>, u64)> {
        let backend = self.backend.lock();
        read_records(&**backend)
    }

    /// Replays the log, truncating a torn tail.
    pub fn recover(&self) -> CoreResult<Recovery> {
        let mut backend = self.backend.lock();
        let (records, valid_len) = read_records(&**backend)?;
        let size = backend.size()?;

        let mut recovery = Recovery::default();
        if valid_len < size {
            warn!(
                valid_len,
                size, "WAL ends with a torn record, truncating"
            );
            backend.truncate(valid_len)?;
            recovery.truncated_bytes = size - valid_len;
        }

        let mut open: HashMap<TransactionId, Vec<WriteOp>> = HashMap::new();
        for (offset, record) in records {
            match record {
                WalRecord::Begin { txid } => {
                    open.insert(txid, Vec::new());
                }
                WalRecord::Put {
                    txid,
                    keyspace,
                    key,
                    value,
                } => writes_for(&mut open, txid, offset)?.push(WriteOp {
                    keyspace,
                    key,
                    value: Some(value),
                }),
                WalRecord::Delete {
                    txid,
                    keyspace,
                    key,
                } => writes_for(&mut open, txid, offset)?.push(WriteOp {
                    keyspace,
                    key,
                    value: None,
                }),
                WalRecord::Commit { txid, sequence } => {
                    let writes = open.remove(&txid).ok_or_else(|| {
                        CoreError::wal_corruption(format!(
                            "commit for {txid} at offset {offset} without begin"
                        ))
                    })?;
                    if sequence <= recovery.last_sequence() {
                        return Err(CoreError::wal_corruption(format!(
                            "commit {sequence} at offset {offset} is not after {}",
                            recovery.last_sequence()
                        )));
                    }
                    recovery.committed.push(CommittedTransaction {
                        txid,
                        sequence,
                        writes,
                    });
                }
            }
        }

        recovery.incomplete = open.len();
        debug!(
            committed = recovery.committed.len(),
            incomplete = recovery.incomplete,
            "WAL replay finished"
        );
        Ok(recovery)
    }
}

impl fmt::Debug for WalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_commit", &self.sync_on_commit)
            .field("failed", &self.is_failed())
            .finish_non_exhaustive()
    }
}

fn writes_for(
    open: &mut HashMap<TransactionId, Vec<WriteOp>>,
    txid: TransactionId,
    offset: u64,
) -> CoreResult<&mut Vec<WriteOp>> {
    open.get_mut(&txid).ok_or_else(|| {
        CoreError::wal_corruption(format!("write for {txid} at offset {offset} without begin"))
    })
}

fn encode_envelope(record: &WalRecord, out: &mut Vec<u8>) -> CoreResult<()> {
    let payload = record.encode_payload()?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::invalid_operation("WAL record payload too large"))?;

    let start = out.len();
    out.extend_from_slice(&WAL_MAGIC);
    out.extend_from_slice(&WAL_VERSION.to_le_bytes());
    out.push(record.record_type().as_byte());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    let crc = compute_crc32(&out[start..]);
    out.extend_from_slice(&crc.to_le_bytes());
    Ok(())
}

fn read_records(backend: &dyn StorageBackend) -> CoreResult<(Vec<(u64, WalRecord)>, u64)> {
    let size = backend.size()?;
    let mut records = Vec::new();
    let mut offset = 0u64;

    while offset < size {
        let remaining = size - offset;
        if remaining < HEADER_SIZE as u64 {
            break;
        }
        let header = backend.read_at(offset, HEADER_SIZE)?;
        if header[0..4] != WAL_MAGIC {
            return Err(CoreError::wal_corruption(format!(
                "bad magic at offset {offset}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != WAL_VERSION {
            return Err(CoreError::wal_corruption(format!(
                "unsupported WAL version {version} at offset {offset}"
            )));
        }
        let record_type = WalRecordType::from_byte(header[6]).ok_or_else(|| {
            CoreError::wal_corruption(format!(
                "unknown record type {} at offset {offset}",
                header[6]
            ))
        })?;
        let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

        let body_len = len + CRC_SIZE;
        if remaining < (HEADER_SIZE + body_len) as u64 {
            break;
        }
        let body = backend.read_at(offset + HEADER_SIZE as u64, body_len)?;
        let (payload, crc_bytes) = body.split_at(len);

        let mut checked = header;
        checked.extend_from_slice(payload);
        let expected = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual = compute_crc32(&checked);
        if expected != actual {
            return Err(CoreError::ChecksumMismatch { expected, actual });
        }

        records.push((offset, WalRecord::decode_payload(record_type, payload)?));
        offset += (HEADER_SIZE + body_len) as u64;
    }

    Ok((records, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{PrimaryKey, RowKey};
    use crate::types::{Keyspace, SchemaId};
    use lodestore_storage::InMemoryBackend;

    fn put(n: i64, value: &[u8]) -> WriteOp {
        WriteOp {
            keyspace: Keyspace::Records,
            key: RowKey::encode(SchemaId::new(1), &PrimaryKey::Int(n)),
            value: Some(value.to_vec()),
        }
    }

    fn wal_over(backend: &InMemoryBackend) -> WalManager {
        WalManager::new(Box::new(backend.clone()), false)
    }

    /// Appends land in `inner`; flush fails while `fail_flush` is set and
    /// truncate fails while `fail_truncate` is set.
    #[derive(Default)]
    struct FailingBackend {
        inner: InMemoryBackend,
        fail_flush: bool,
        fail_truncate: bool,
    }

    fn disk_full() -> lodestore_storage::StorageError {
        std::io::Error::other("disk full").into()
    }

    impl StorageBackend for FailingBackend {
        fn read_at(&self, offset: u64, len: usize) -> lodestore_storage::StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> lodestore_storage::StorageResult<u64> {
            self.inner.append(data)
        }

        fn flush(&mut self) -> lodestore_storage::StorageResult<()> {
            if self.fail_flush {
                return Err(disk_full());
            }
            self.inner.flush()
        }

        fn size(&self) -> lodestore_storage::StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> lodestore_storage::StorageResult<()> {
            self.inner.sync()
        }

        fn truncate(&mut self, new_size: u64) -> lodestore_storage::StorageResult<()> {
            if self.fail_truncate {
                return Err(disk_full());
            }
            self.inner.truncate(new_size)
        }
    }

    #[test]
    fn committed_transactions_are_replayed_in_order() {
        let backend = InMemoryBackend::new();
        let wal = wal_over(&backend);
        wal.append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[put(1, b"a")])
            .unwrap();
        wal.append_transaction(
            TransactionId::new(2),
            SequenceNumber::new(2),
            &[put(2, b"b"), put(3, b"c")],
        )
        .unwrap();

        let recovery = wal_over(&backend).recover().unwrap();
        assert_eq!(recovery.committed.len(), 2);
        assert_eq!(recovery.committed[1].writes.len(), 2);
        assert_eq!(recovery.last_sequence(), SequenceNumber::new(2));
        assert_eq!(recovery.last_txid(), TransactionId::new(2));
    }

    #[test]
    fn uncommitted_transaction_is_ignored() {
        let backend = InMemoryBackend::new();
        let wal = wal_over(&backend);
        wal.append(&WalRecord::Begin {
            txid: TransactionId::new(5),
        })
        .unwrap();

        let recovery = wal.recover().unwrap();
        assert!(recovery.committed.is_empty());
        assert_eq!(recovery.incomplete, 1);
    }

    #[test]
    fn torn_tail_is_truncated() {
        let backend = InMemoryBackend::new();
        let wal = wal_over(&backend);
        wal.append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[put(1, b"a")])
            .unwrap();
        let intact = wal.size().unwrap();
        wal.append_transaction(TransactionId::new(2), SequenceNumber::new(2), &[put(2, b"b")])
            .unwrap();

        // Keep the second transaction's Begin and a few bytes of its Put.
        let begin_len = (HEADER_SIZE + 8 + CRC_SIZE) as u64;
        let mut bytes = backend.data();
        bytes.truncate((intact + begin_len + 5) as usize);
        let torn = InMemoryBackend::with_data(bytes);

        let recovery = wal_over(&torn).recover().unwrap();
        assert_eq!(recovery.committed.len(), 1);
        assert_eq!(recovery.incomplete, 1);
        assert_eq!(recovery.truncated_bytes, 5);
        assert_eq!(torn.data().len() as u64, intact + begin_len);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let backend = InMemoryBackend::new();
        let wal = wal_over(&backend);
        wal.append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[put(1, b"a")])
            .unwrap();
        let mut bytes = backend.data();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let result = wal_over(&InMemoryBackend::with_data(bytes)).recover();
        assert!(matches!(result, Err(CoreError::ChecksumMismatch { .. })));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let backend = InMemoryBackend::with_data(vec![0u8; 32]);
        assert!(matches!(
            wal_over(&backend).recover(),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn failed_flush_cuts_the_transaction_off_the_log() {
        let shared = InMemoryBackend::new();
        let wal = wal_over(&shared);
        wal.append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[put(1, b"a")])
            .unwrap();
        let before = shared.data();

        let failing = FailingBackend {
            inner: shared.clone(),
            fail_flush: true,
            ..FailingBackend::default()
        };
        let wal = WalManager::new(Box::new(failing), false);
        let result =
            wal.append_transaction(TransactionId::new(2), SequenceNumber::new(2), &[put(2, b"b")]);
        assert!(matches!(result, Err(CoreError::Storage(_))));
        assert!(!wal.is_failed());
        assert_eq!(shared.data(), before);

        // The same sequence can be written again and replays once.
        let wal = wal_over(&shared);
        wal.append_transaction(TransactionId::new(3), SequenceNumber::new(2), &[put(2, b"c")])
            .unwrap();
        let recovery = wal.recover().unwrap();
        assert_eq!(recovery.committed.len(), 2);
        assert_eq!(recovery.committed[1].txid, TransactionId::new(3));
    }

    #[test]
    fn failed_cut_back_refuses_later_appends() {
        let failing = FailingBackend {
            fail_flush: true,
            fail_truncate: true,
            ..FailingBackend::default()
        };
        let wal = WalManager::new(Box::new(failing), false);
        assert!(wal
            .append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[put(1, b"a")])
            .is_err());
        assert!(wal.is_failed());

        let result =
            wal.append_transaction(TransactionId::new(2), SequenceNumber::new(1), &[put(1, b"a")]);
        assert!(matches!(result, Err(CoreError::WalCorruption { .. })));
        assert!(matches!(
            wal.append(&WalRecord::Begin {
                txid: TransactionId::new(3)
            }),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn read_all_reports_offsets() {
        let backend = InMemoryBackend::new();
        let wal = wal_over(&backend);
        wal.append_transaction(TransactionId::new(1), SequenceNumber::new(1), &[])
            .unwrap();
        let (records, end) = wal.read_all().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, 0);
        assert_eq!(end, wal.size().unwrap());
    }
}
