//! Primary keys and their order-preserving encoding.
//!
//! Layout of an encoded row key:
//!
//! ```text
//! schema id (4 bytes, big-endian) | type tag (1 byte) | payload
//! ```
//!
//! Payloads:
//! - `Int`, `Timestamp`: sign bit flipped, 8 bytes big-endian
//! - `UInt`: 8 bytes big-endian
//! - `Text`, `Bytes`: `0x00` escaped as `0x00 0xFF`, terminated by `0x00 0x00`
//! - `Uuid`: 16 raw bytes

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;

use lodestore_codec::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::key::comparator::StorageComparator;
use crate::types::SchemaId;

const SCHEMA_ID_LEN: usize = 4;
const SIGN_BIT: u64 = 1 << 63;

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum KeyTag {
    Int = 1,
    UInt = 2,
    Timestamp = 3,
    Text = 4,
    Bytes = 5,
    Uuid = 6,
}

impl KeyTag {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(KeyTag::Int),
            2 => Some(KeyTag::UInt),
            3 => Some(KeyTag::Timestamp),
            4 => Some(KeyTag::Text),
            5 => Some(KeyTag::Bytes),
            6 => Some(KeyTag::Uuid),
            _ => None,
        }
    }
}

/// The primary-key value of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimaryKey {
    /// Signed integer key.
    Int(i64),
    /// Unsigned integer key.
    UInt(u64),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    /// UTF-8 text key.
    Text(String),
    /// Opaque byte key.
    Bytes(Vec<u8>),
    /// UUID key.
    Uuid(Uuid),
}

impl PrimaryKey {
    /// The record value that holds this key inside an entity.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Int(n) | Self::Timestamp(n) => Value::Integer(*n),
            Self::UInt(n) => i64::try_from(*n)
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Bytes(n.to_be_bytes().to_vec())),
            Self::Text(s) => Value::Text(s.clone()),
            Self::Bytes(b) => Value::Bytes(b.clone()),
            Self::Uuid(u) => Value::Bytes(u.as_bytes().to_vec()),
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Int(n) => {
                buf.push(KeyTag::Int as u8);
                buf.extend_from_slice(&flip_sign(*n).to_be_bytes());
            }
            Self::UInt(n) => {
                buf.push(KeyTag::UInt as u8);
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Self::Timestamp(ms) => {
                buf.push(KeyTag::Timestamp as u8);
                buf.extend_from_slice(&flip_sign(*ms).to_be_bytes());
            }
            Self::Text(s) => {
                buf.push(KeyTag::Text as u8);
                escape_into(s.as_bytes(), buf);
            }
            Self::Bytes(b) => {
                buf.push(KeyTag::Bytes as u8);
                escape_into(b, buf);
            }
            Self::Uuid(u) => {
                buf.push(KeyTag::Uuid as u8);
                buf.extend_from_slice(u.as_bytes());
            }
        }
    }

    fn decode_from(bytes: &[u8]) -> CoreResult<Self> {
        let (&tag, payload) = bytes
            .split_first()
            .ok_or_else(|| CoreError::invalid_format("row key is missing its type tag"))?;
        let tag = KeyTag::from_u8(tag)
            .ok_or_else(|| CoreError::invalid_format(format!("unknown key type tag {tag:#04x}")))?;

        let key = match tag {
            KeyTag::Int => Self::Int(unflip_sign(fixed::<8>(payload)?)),
            KeyTag::UInt => Self::UInt(u64::from_be_bytes(fixed::<8>(payload)?)),
            KeyTag::Timestamp => Self::Timestamp(unflip_sign(fixed::<8>(payload)?)),
            KeyTag::Text => {
                let raw = unescape(payload)?;
                let text = String::from_utf8(raw)
                    .map_err(|_| CoreError::invalid_format("text key is not valid UTF-8"))?;
                Self::Text(text)
            }
            KeyTag::Bytes => Self::Bytes(unescape(payload)?),
            KeyTag::Uuid => Self::Uuid(Uuid::from_bytes(fixed::<16>(payload)?)),
        };
        Ok(key)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) | Self::Timestamp(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Self::Uuid(u) => write!(f, "{u}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<u64> for PrimaryKey {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<&str> for PrimaryKey {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Uuid> for PrimaryKey {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

/// An encoded row key.
///
/// Immutable. Ordering is [`StorageComparator`] order, so a `BTreeMap`
/// keyed by `RowKey` iterates in the same order the executor scans.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RowKey(Vec<u8>);

impl RowKey {
    /// Encodes a schema id and primary key.
    pub fn encode(schema_id: SchemaId, key: &PrimaryKey) -> Self {
        let mut buf = Vec::with_capacity(SCHEMA_ID_LEN + 1 + 16);
        buf.extend_from_slice(&schema_id.to_be_bytes());
        key.encode_into(&mut buf);
        Self(buf)
    }

    /// Decodes an encoded row key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFormat` on short input, an unknown type tag, a bad
    /// escape sequence or trailing bytes.
    pub fn decode(bytes: &[u8]) -> CoreResult<(SchemaId, PrimaryKey)> {
        let (schema_id, payload) = Self::split(bytes)?;
        Ok((schema_id, PrimaryKey::decode_from(payload)?))
    }

    /// Splits an encoded key into its schema id and raw primary-key bytes.
    pub fn split(bytes: &[u8]) -> CoreResult<(SchemaId, &[u8])> {
        if bytes.len() < SCHEMA_ID_LEN {
            return Err(CoreError::invalid_format(format!(
                "row key too short: {} bytes",
                bytes.len()
            )));
        }
        let (prefix, rest) = bytes.split_at(SCHEMA_ID_LEN);
        let id = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        Ok((SchemaId::new(id), rest))
    }

    /// Wraps bytes that are already an encoded key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// The smallest key of a schema group.
    pub fn prefix(schema_id: SchemaId) -> Self {
        Self(schema_id.to_be_bytes().to_vec())
    }

    /// Scan bounds covering every key of `schema_id` and nothing else.
    pub fn group_bounds(schema_id: SchemaId) -> (Bound<RowKey>, Bound<RowKey>) {
        let start = Bound::Included(Self::prefix(schema_id));
        let end = match schema_id.as_u32().checked_add(1) {
            Some(next) => Bound::Excluded(Self::prefix(SchemaId::new(next))),
            None => Bound::Unbounded,
        };
        (start, end)
    }

    /// The schema id of this key.
    pub fn schema_id(&self) -> CoreResult<SchemaId> {
        Self::split(&self.0).map(|(id, _)| id)
    }

    /// Raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the key, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        StorageComparator::compare(&self.0, &other.0)
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[allow(clippy::cast_sign_loss)]
fn flip_sign(n: i64) -> u64 {
    (n as u64) ^ SIGN_BIT
}

#[allow(clippy::cast_possible_wrap)]
fn unflip_sign(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_BIT) as i64
}

fn fixed<const N: usize>(payload: &[u8]) -> CoreResult<[u8; N]> {
    payload.try_into().map_err(|_| {
        CoreError::invalid_format(format!(
            "expected {N} key payload bytes, found {}",
            payload.len()
        ))
    })
}

fn escape_into(raw: &[u8], buf: &mut Vec<u8>) {
    for &b in raw {
        buf.push(b);
        if b == 0x00 {
            buf.push(0xFF);
        }
    }
    buf.extend_from_slice(&[0x00, 0x00]);
}

fn unescape(payload: &[u8]) -> CoreResult<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        let b = payload[i];
        if b != 0x00 {
            out.push(b);
            i += 1;
            continue;
        }
        match payload.get(i + 1) {
            Some(0xFF) => {
                out.push(0x00);
                i += 2;
            }
            Some(0x00) => {
                if i + 2 != payload.len() {
                    return Err(CoreError::invalid_format(format!(
                        "{} trailing bytes after key terminator",
                        payload.len() - i - 2
                    )));
                }
                return Ok(out);
            }
            Some(other) => {
                return Err(CoreError::invalid_format(format!(
                    "invalid escape 0x00 {other:#04x} in key"
                )))
            }
            None => break,
        }
    }
    Err(CoreError::invalid_format("key is missing its terminator"))
}
