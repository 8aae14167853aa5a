//! # LodeStore Storage
//!
//! Byte-level storage backends underneath the LodeStore write-ahead log.
//!
//! A backend is an **opaque, append-only byte store**: it never interprets
//! what it holds. The core crate owns the log format, checksums and
//! recovery; a backend only has to return exactly the bytes that were
//! appended at an offset and make them durable on `flush`/`sync`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral storage; clones share one buffer, which
//!   lets tests "reopen" a store over the same bytes
//! - [`FileBackend`] - a single file accessed through OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use lodestore_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"record").unwrap();
//! assert_eq!(backend.read_at(offset, 6).unwrap(), b"record");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
