//! Error types for LodeStore core.

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::{SequenceNumber, TransactionId};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in LodeStore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] lodestore_storage::StorageError),

    /// Record codec error.
    #[error("codec error: {0}")]
    Codec(#[from] lodestore_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed query text. The query never executed.
    #[error(transparent)]
    QuerySyntax(#[from] QuerySyntaxError),

    /// Transaction failure; the owning transaction has been aborted.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Schema id allocation or persistence failed.
    #[error("schema registry error for '{type_name}': {message}")]
    SchemaRegistry {
        /// Entity type being registered.
        type_name: String,
        /// Description of the failure.
        message: String,
    },

    /// WAL is corrupted or invalid.
    #[error("WAL corruption: {message}")]
    WalCorruption {
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },

    /// Entity not found.
    #[error("entity not found: {type_name} with key {key}")]
    EntityNotFound {
        /// Entity type searched.
        type_name: String,
        /// Display form of the primary key.
        key: String,
    },

    /// A stored record does not have the shape its entity type expects.
    #[error("cannot decode {type_name}: {message}")]
    EntityShape {
        /// Entity type being decoded.
        type_name: String,
        /// Description of the mismatch.
        message: String,
    },

    /// Database is already open or locked.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// Invalid database format or key encoding.
    #[error("invalid format: {message}")]
    InvalidFormat {
        /// Description of the format issue.
        message: String,
    },

    /// Operation not permitted in current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why operation is invalid.
        message: String,
    },

    /// Database is closed.
    #[error("database is closed")]
    DatabaseClosed,
}

impl CoreError {
    /// Creates a WAL corruption error.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::WalCorruption {
            message: message.into(),
        }
    }

    /// Creates an invalid format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a schema registry error.
    pub fn schema_registry(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaRegistry {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Creates an entity shape error.
    pub fn entity_shape(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EntityShape {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Returns true if retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SchemaRegistry { .. }
                | Self::Transaction(TransactionError::Conflict { .. })
                | Self::Transaction(TransactionError::LockTimeout { .. })
        )
    }
}

/// Query text could not be parsed or compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("query syntax error at {position}: {message} (near '{fragment}')")]
pub struct QuerySyntaxError {
    /// What was wrong.
    pub message: String,
    /// The offending part of the query text.
    pub fragment: String,
    /// Byte offset of the fragment in the query text.
    pub position: usize,
}

impl QuerySyntaxError {
    /// Creates a syntax error pointing at `fragment` starting at `position`.
    pub fn new(message: impl Into<String>, fragment: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            fragment: fragment.into(),
            position,
        }
    }
}

/// Transaction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The writer lock could not be acquired in time.
    #[error("{txn_id}: timed out after {waited:?} waiting for the writer lock")]
    LockTimeout {
        /// Transaction that waited.
        txn_id: TransactionId,
        /// How long it waited.
        waited: Duration,
    },

    /// Data read or written by the transaction changed after its snapshot.
    #[error("{txn_id}: conflict, a key was committed at {committed} after snapshot {snapshot}")]
    Conflict {
        /// Transaction that failed validation.
        txn_id: TransactionId,
        /// Snapshot the transaction read from.
        snapshot: SequenceNumber,
        /// Newer commit that touched the same key.
        committed: SequenceNumber,
    },

    /// A write was attempted in a read-only transaction.
    #[error("{txn_id}: transaction is read-only")]
    ReadOnly {
        /// Offending transaction.
        txn_id: TransactionId,
    },

    /// The transaction already committed or aborted.
    #[error("{txn_id}: transaction is {state}")]
    NotActive {
        /// Offending transaction.
        txn_id: TransactionId,
        /// Its terminal state.
        state: &'static str,
    },

    /// An operation needed an active transaction but the context is empty.
    #[error("no active transaction in context")]
    NoActiveTransaction,
}
