//! Dump WAL command implementation.

use std::io::Write;
use std::path::Path;

use lodestore_core::wal::{WalManager, WalRecord};
use lodestore_core::{Keyspace, RowKey, SchemaId};
use lodestore_storage::FileBackend;
use serde::Serialize;

use crate::error::{CliError, CliResult};

/// WAL record representation for output.
#[derive(Debug, Serialize)]
pub struct WalRecordInfo {
    /// Offset in the WAL file.
    pub offset: u64,
    /// Record type.
    pub record_type: &'static str,
    /// Transaction ID.
    pub txid: u64,
    /// Keyspace (puts and deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,
    /// Hex-encoded key (puts and deletes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Schema id decoded from a record key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<u32>,
    /// Commit sequence number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Value size in bytes (puts).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_size: Option<usize>,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn describe(offset: u64, record: &WalRecord) -> WalRecordInfo {
    let mut info = WalRecordInfo {
        offset,
        record_type: "",
        txid: record.txid().as_u64(),
        keyspace: None,
        key: None,
        schema_id: None,
        sequence: None,
        value_size: None,
    };
    let schema_of = |key: &RowKey| key.schema_id().ok().map(SchemaId::as_u32);
    match record {
        WalRecord::Begin { .. } => info.record_type = "BEGIN",
        WalRecord::Put {
            keyspace,
            key,
            value,
            ..
        } => {
            info.record_type = "PUT";
            info.keyspace = Some(keyspace.to_string());
            info.key = Some(hex(key.as_bytes()));
            info.schema_id = schema_of(key).filter(|_| *keyspace == Keyspace::Records);
            info.value_size = Some(value.len());
        }
        WalRecord::Delete { keyspace, key, .. } => {
            info.record_type = "DELETE";
            info.keyspace = Some(keyspace.to_string());
            info.key = Some(hex(key.as_bytes()));
            info.schema_id = schema_of(key).filter(|_| *keyspace == Keyspace::Records);
        }
        WalRecord::Commit { sequence, .. } => {
            info.record_type = "COMMIT";
            info.sequence = Some(sequence.as_u64());
        }
    }
    info
}

/// Runs the dump-wal command. The log is read without recovery, so a torn
/// tail is reported but left in place.
pub fn run(path: &Path, limit: Option<usize>, format: &str, out: &mut dyn Write) -> CliResult<()> {
    let wal_path = path.join("wal.log");
    if !wal_path.exists() {
        return Err(CliError::Usage(format!(
            "WAL file not found at {}",
            wal_path.display()
        )));
    }

    let backend = FileBackend::open(&wal_path)?;
    let wal = WalManager::new(Box::new(backend), false);
    let (records, valid_len) = wal.read_all()?;
    let total = wal.size()?;
    let infos: Vec<_> = records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|(offset, record)| describe(*offset, record))
        .collect();

    match format {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(&infos)?)?,
        _ => {
            for info in &infos {
                write!(out, "{:>10}  {:<6} txid={}", info.offset, info.record_type, info.txid)?;
                if let (Some(keyspace), Some(key)) = (&info.keyspace, &info.key) {
                    write!(out, " {keyspace}:{key}")?;
                }
                if let Some(size) = info.value_size {
                    write!(out, " ({size} bytes)")?;
                }
                if let Some(seq) = info.sequence {
                    write!(out, " seq={seq}")?;
                }
                writeln!(out)?;
            }
            writeln!(out, "{} of {} records shown", infos.len(), records.len())?;
            if valid_len < total {
                writeln!(out, "torn tail: {} trailing bytes", total - valid_len)?;
            }
        }
    }
    Ok(())
}
