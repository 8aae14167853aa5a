//! Canonical CBOR encoder.

use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// Output is deterministic: map keys are sorted by their encoded form
/// (length first, then bytewise) and integers use the shortest encoding.
/// Every [`Value`] is encodable, so this cannot fail.
pub fn to_canonical_cbor(value: &Value) -> Vec<u8> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value);
    encoder.into_bytes()
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Append the encoding of `value`.
    pub fn encode(&mut self, value: &Value) {
        match value {
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Bytes(b) => {
                self.encode_head(2, b.len() as u64);
                self.buffer.extend_from_slice(b);
            }
            Value::Text(s) => {
                self.encode_head(3, s.len() as u64);
                self.buffer.extend_from_slice(s.as_bytes());
            }
            Value::Array(items) => {
                self.encode_head(4, items.len() as u64);
                for item in items {
                    self.encode(item);
                }
            }
            Value::Map(pairs) => self.encode_map(pairs),
        }
    }

    /// Consume the encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 encodes as 0, -2 as 1, ...
            self.encode_head(1, (-(n + 1)) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, value: u64) {
        let mt = major_type << 5;
        if value < 24 {
            self.buffer.push(mt | value as u8);
        } else if value <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(value as u8);
        } else if value <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer.extend_from_slice(&(value as u16).to_be_bytes());
        } else if value <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer.extend_from_slice(&(value as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&value.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) {
        let mut encoded: Vec<(Vec<u8>, &Value)> = pairs
            .iter()
            .map(|(k, v)| (to_canonical_cbor(k), v))
            .collect();
        encoded.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));

        self.encode_head(5, encoded.len() as u64);
        for (key, value) in encoded {
            self.buffer.extend_from_slice(&key);
            self.encode(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_simple_values() {
        assert_eq!(to_canonical_cbor(&Value::Null), vec![0xf6]);
        assert_eq!(to_canonical_cbor(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(to_canonical_cbor(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(to_canonical_cbor(&Value::Integer(23)), vec![0x17]);
        assert_eq!(to_canonical_cbor(&Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(
            to_canonical_cbor(&Value::Integer(256)),
            vec![0x19, 0x01, 0x00]
        );
        assert_eq!(
            to_canonical_cbor(&Value::Integer(65536)),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(to_canonical_cbor(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(to_canonical_cbor(&Value::Integer(-25)), vec![0x38, 24]);
    }

    #[test]
    fn extreme_integers() {
        let max = to_canonical_cbor(&Value::Integer(i64::MAX));
        assert_eq!(max[0], 0x1b);
        let min = to_canonical_cbor(&Value::Integer(i64::MIN));
        assert_eq!(min[0], 0x3b);
        assert_eq!(&min[1..], &(i64::MAX as u64).to_be_bytes());
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(
            to_canonical_cbor(&Value::text("abc")),
            vec![0x63, b'a', b'b', b'c']
        );
        assert_eq!(
            to_canonical_cbor(&Value::Bytes(vec![1, 2])),
            vec![0x42, 1, 2]
        );
    }

    #[test]
    fn map_order_is_independent_of_construction() {
        let a = Value::Map(vec![
            (Value::text("zz"), Value::Integer(1)),
            (Value::text("a"), Value::Integer(2)),
        ]);
        let b = Value::Map(vec![
            (Value::text("a"), Value::Integer(2)),
            (Value::text("zz"), Value::Integer(1)),
        ]);
        assert_eq!(to_canonical_cbor(&a), to_canonical_cbor(&b));
        assert_eq!(
            to_canonical_cbor(&a),
            vec![0xa2, 0x61, b'a', 0x02, 0x62, b'z', b'z', 0x01]
        );
    }
}
