//! Schema command: list registered entity types.

use std::io::Write;
use std::path::Path;

use super::open_existing;
use crate::error::CliResult;

/// Prints every registered type with its schema id.
pub fn run(path: &Path, out: &mut dyn Write) -> CliResult<()> {
    let db = open_existing(path)?;
    let entries = db.repository().schema_entries()?;
    if entries.is_empty() {
        writeln!(out, "no registered types")?;
    }
    for (id, name) in entries {
        writeln!(out, "{:>6}  {name}", id.as_u32())?;
    }
    db.close()?;
    Ok(())
}
