//! Get command: print one record.

use std::io::Write;
use std::path::Path;

use lodestore_core::TransactionContext;

use super::open_existing;
use crate::error::{CliError, CliResult};
use crate::json::{parse_key, value_to_json};

/// Prints the record of `type_name` stored under `key` as JSON.
pub fn run(path: &Path, type_name: &str, key: &str, out: &mut dyn Write) -> CliResult<()> {
    let db = open_existing(path)?;
    let mut ctx = TransactionContext::new();
    let key = parse_key(key);
    let record = db
        .repository()
        .get_dynamic(&mut ctx, type_name, &key)?
        .ok_or_else(|| CliError::Usage(format!("no {type_name} with key {key}")))?;
    writeln!(out, "{}", serde_json::to_string_pretty(&value_to_json(&record))?)?;
    db.close()?;
    Ok(())
}
