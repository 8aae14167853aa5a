//! CLI error type.

use lodestore_core::{CoreError, QuerySyntaxError};
use thiserror::Error;

/// Result alias for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Database failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// WAL file could not be opened.
    #[error(transparent)]
    Storage(#[from] lodestore_storage::StorageError),

    /// The query text is malformed.
    #[error("{source}")]
    Query {
        /// The query as given.
        query: String,
        /// Where parsing failed.
        source: QuerySyntaxError,
    },

    /// Output could not be serialized.
    #[error("JSON output failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Output could not be written.
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),

    /// Bad command-line usage.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Attaches the query text to syntax errors so they can be reported
    /// with a pointer into the query.
    pub fn with_query(err: CoreError, query: &str) -> Self {
        match err {
            CoreError::QuerySyntax(source) => Self::Query {
                query: query.to_string(),
                source,
            },
            other => Self::Core(other),
        }
    }
}
