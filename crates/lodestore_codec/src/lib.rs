//! # LodeStore Codec
//!
//! Canonical CBOR encoding for LodeStore entity records.
//!
//! Every record stored by LodeStore is a CBOR map produced by this crate.
//! Encoding is deterministic:
//!
//! - Map keys are sorted by their encoded bytes (length first, then bytewise)
//! - Integers use the shortest form
//! - Indefinite-length items and floats are rejected
//!
//! Two equal [`Value`]s always encode to identical bytes, so stored records
//! can be compared byte-for-byte.
//!
//! ## Example
//!
//! ```rust
//! use lodestore_codec::{from_cbor, to_canonical_cbor, Value};
//!
//! let record = Value::map(vec![
//!     (Value::text("name"), Value::text("Main Street")),
//!     (Value::text("number"), Value::Integer(12)),
//! ]);
//! let bytes = to_canonical_cbor(&record);
//! assert_eq!(from_cbor(&bytes).unwrap(), record);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;
