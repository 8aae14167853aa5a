//! Delete command: remove one record.

use std::io::Write;
use std::path::Path;

use lodestore_core::TransactionContext;
use tracing::info;

use super::open_existing;
use crate::error::CliResult;
use crate::json::parse_key;

/// Deletes the record of `type_name` stored under `key`.
pub fn run(path: &Path, type_name: &str, key: &str, out: &mut dyn Write) -> CliResult<()> {
    let db = open_existing(path)?;
    let mut ctx = TransactionContext::new();
    let key = parse_key(key);
    if db.repository().delete_dynamic(&mut ctx, type_name, &key)? {
        info!(type_name, %key, "deleted record");
        writeln!(out, "deleted {type_name} {key}")?;
    } else {
        writeln!(out, "no {type_name} with key {key}")?;
    }
    db.close()?;
    Ok(())
}
