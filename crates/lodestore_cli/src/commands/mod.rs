//! CLI command implementations.

pub mod delete;
pub mod dump_wal;
pub mod get;
pub mod inspect;
pub mod query;
pub mod schema;

use std::path::Path;

use lodestore_core::{Config, Database};

use crate::error::CliResult;

/// Opens an existing database; commands never create one.
pub fn open_existing(path: &Path) -> CliResult<Database> {
    let config = Config::default().create_if_missing(false);
    Ok(Database::open_with_config(path, config)?)
}
