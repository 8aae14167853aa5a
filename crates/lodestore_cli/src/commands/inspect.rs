//! Inspect command implementation.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use super::open_existing;
use crate::error::CliResult;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// WAL file size in bytes.
    pub wal_size: u64,
    /// Last committed sequence number.
    pub committed_seq: u64,
    /// Total live entities.
    pub entity_count: usize,
    /// Per-type statistics.
    pub types: Vec<TypeInfo>,
}

/// Statistics for one entity type.
#[derive(Debug, Serialize)]
pub struct TypeInfo {
    /// Schema id.
    pub id: u32,
    /// Type name.
    pub name: String,
    /// Live entities.
    pub count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str, out: &mut dyn Write) -> CliResult<()> {
    let db = open_existing(path)?;
    let stats = db.stats()?;
    let result = InspectResult {
        path: path.display().to_string(),
        wal_size: stats.wal_size,
        committed_seq: stats.committed_seq.as_u64(),
        entity_count: stats.total_entities(),
        types: stats
            .types
            .into_iter()
            .map(|t| TypeInfo {
                id: t.schema_id.as_u32(),
                name: t.type_name,
                count: t.count,
            })
            .collect(),
    };
    db.close()?;

    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?,
        _ => print_text_output(&result, out)?,
    }
    Ok(())
}

fn print_text_output(result: &InspectResult, out: &mut dyn Write) -> CliResult<()> {
    writeln!(out, "Database: {}", result.path)?;
    writeln!(out, "WAL size: {} bytes", result.wal_size)?;
    writeln!(out, "Committed sequence: {}", result.committed_seq)?;
    writeln!(out, "Entities: {}", result.entity_count)?;
    if !result.types.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:>6}  {:<24} {:>10}", "ID", "TYPE", "COUNT")?;
        for t in &result.types {
            writeln!(out, "{:>6}  {:<24} {:>10}", t.id, t.name, t.count)?;
        }
    }
    Ok(())
}
