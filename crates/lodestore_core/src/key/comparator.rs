//! Total order over encoded keys.

use std::cmp::Ordering;

/// Orders encoded row keys.
///
/// Keys are compared as unsigned byte strings. Because the schema id is a
/// fixed-width big-endian prefix, this sorts first by schema id and then by
/// primary key without decoding anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageComparator;

impl StorageComparator {
    /// Compares two encoded keys.
    #[inline]
    pub fn compare(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorter_prefix_sorts_first() {
        assert_eq!(StorageComparator::compare(b"ab", b"abc"), Ordering::Less);
        assert_eq!(StorageComparator::compare(b"abc", b"abc"), Ordering::Equal);
    }

    #[test]
    fn bytes_compare_unsigned() {
        assert_eq!(StorageComparator::compare(&[0x7f], &[0x80]), Ordering::Less);
        assert_eq!(StorageComparator::compare(&[0xff], &[0x00, 0x00]), Ordering::Greater);
    }
}
