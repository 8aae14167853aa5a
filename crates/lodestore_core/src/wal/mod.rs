//! Write-ahead log.
//!
//! Every committing transaction appends `Begin`, its writes and `Commit` in
//! one batch and flushes before the writes reach the in-memory store. On
//! open the log is replayed; only transactions with a `Commit` record are
//! applied.
//!
//! ## Record envelope
//!
//! ```text
//! magic "LWAL" (4) | version u16 LE | type u8 | payload len u32 LE | payload | crc32 LE
//! ```
//!
//! The CRC covers everything before it.

mod record;
mod writer;

pub use record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
pub use writer::{CommittedTransaction, Recovery, WalManager};
