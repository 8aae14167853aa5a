//! WAL record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::key::RowKey;
use crate::types::{Keyspace, SequenceNumber, TransactionId};

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"LWAL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// Type of WAL record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Begin a transaction.
    Begin = 1,
    /// Insert or replace a key.
    Put = 2,
    /// Delete a key.
    Delete = 3,
    /// Commit a transaction.
    Commit = 4,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Begin a transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
    },

    /// Insert or replace a key.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Target keyspace.
        keyspace: Keyspace,
        /// Encoded key.
        key: RowKey,
        /// Canonical CBOR record bytes.
        value: Vec<u8>,
    },

    /// Delete a key.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Target keyspace.
        keyspace: Keyspace,
        /// Encoded key.
        key: RowKey,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence number assigned to this commit.
        sequence: SequenceNumber,
    },
}

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Commit { .. } => WalRecordType::Commit,
        }
    }

    /// Returns the transaction ID of the record.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. } => *txid,
        }
    }

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a key or value is longer than `u32::MAX` bytes.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.txid().as_u64().to_le_bytes());

        match self {
            Self::Begin { .. } => {}
            Self::Put {
                keyspace,
                key,
                value,
                ..
            } => {
                buf.push(keyspace.as_byte());
                put_bytes(&mut buf, key.as_bytes())?;
                put_bytes(&mut buf, value)?;
            }
            Self::Delete { keyspace, key, .. } => {
                buf.push(keyspace.as_byte());
                put_bytes(&mut buf, key.as_bytes())?;
            }
            Self::Commit { sequence, .. } => {
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = PayloadReader { payload, cursor: 0 };
        let txid = TransactionId::new(reader.u64()?);

        let record = match record_type {
            WalRecordType::Begin => Self::Begin { txid },
            WalRecordType::Put => {
                let keyspace = reader.keyspace()?;
                let key = RowKey::from_bytes(reader.bytes()?);
                let value = reader.bytes()?;
                Self::Put {
                    txid,
                    keyspace,
                    key,
                    value,
                }
            }
            WalRecordType::Delete => {
                let keyspace = reader.keyspace()?;
                let key = RowKey::from_bytes(reader.bytes()?);
                Self::Delete {
                    txid,
                    keyspace,
                    key,
                }
            }
            WalRecordType::Commit => Self::Commit {
                txid,
                sequence: SequenceNumber::new(reader.u64()?),
            },
        };

        if reader.cursor != payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                reader.cursor,
                payload.len()
            )));
        }
        Ok(record)
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CoreError::invalid_operation(format!("WAL field too large: {} bytes", bytes.len()))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

struct PayloadReader<'a> {
    payload: &'a [u8],
    cursor: usize,
}

impl<'a> PayloadReader<'a> {
    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|end| *end <= self.payload.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
        let payload: &'a [u8] = self.payload;
        let bytes = &payload[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut out = [0u8; 8];
        out.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(out))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut out = [0u8; 4];
        out.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(out))
    }

    fn keyspace(&mut self) -> CoreResult<Keyspace> {
        let byte = self.take(1)?[0];
        Keyspace::from_byte(byte)
            .ok_or_else(|| CoreError::wal_corruption(format!("unknown keyspace {byte}")))
    }

    fn bytes(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Computes the CRC32 (IEEE) checksum of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::PrimaryKey;
    use crate::types::SchemaId;

    fn decode(record: &WalRecord) -> WalRecord {
        let payload = record.encode_payload().unwrap();
        WalRecord::decode_payload(record.record_type(), &payload).unwrap()
    }

    #[test]
    fn put_record_survives_encoding() {
        let record = WalRecord::Put {
            txid: TransactionId::new(9),
            keyspace: Keyspace::Records,
            key: RowKey::encode(SchemaId::new(2), &PrimaryKey::from("k\0ey")),
            value: vec![0xa1, 0x61, b'x', 0x01],
        };
        assert_eq!(decode(&record), record);
    }

    #[test]
    fn commit_record_carries_sequence() {
        let record = WalRecord::Commit {
            txid: TransactionId::new(1),
            sequence: SequenceNumber::new(42),
        };
        assert_eq!(decode(&record), record);
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut payload = WalRecord::Begin {
            txid: TransactionId::new(1),
        }
        .encode_payload()
        .unwrap();
        payload.push(0);
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Begin, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn unknown_keyspace_is_corruption() {
        let mut payload = 1u64.to_le_bytes().to_vec();
        payload.push(7);
        payload.extend_from_slice(&0u32.to_le_bytes());
        assert!(matches!(
            WalRecord::decode_payload(WalRecordType::Delete, &payload),
            Err(CoreError::WalCorruption { .. })
        ));
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }
}
