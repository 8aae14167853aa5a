//! Query command: run query text and print matches as JSON.

use std::io::Write;
use std::path::Path;

use lodestore_core::TransactionContext;
use serde_json::json;

use super::open_existing;
use crate::error::{CliError, CliResult};
use crate::json::{key_to_json, value_to_json};

/// Runs `text`, which must name its target type, and prints a JSON array
/// of `{ "key": ..., "record": ... }` objects.
pub fn run(path: &Path, text: &str, out: &mut dyn Write) -> CliResult<()> {
    let db = open_existing(path)?;
    let mut ctx = TransactionContext::new();
    let rows = db
        .repository()
        .query_dynamic(&mut ctx, text)
        .map_err(|e| CliError::with_query(e, text))?;

    let output: Vec<_> = rows
        .iter()
        .map(|(key, record)| json!({ "key": key_to_json(key), "record": value_to_json(record) }))
        .collect();
    writeln!(out, "{}", serde_json::to_string_pretty(&output)?)?;
    db.close()?;
    Ok(())
}
