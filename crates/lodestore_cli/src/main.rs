//! LodeStore CLI
//!
//! Command-line tools for LodeStore databases.
//!
//! # Commands
//!
//! - `schema` - List registered entity types
//! - `get` - Print one record as JSON
//! - `query` - Run query text and print matches as JSON
//! - `delete` - Delete one record
//! - `inspect` - Display database statistics
//! - `dump-wal` - Dump WAL records for debugging

mod commands;
mod error;
mod json;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::error::{CliError, CliResult};

/// LodeStore command-line database tools.
#[derive(Parser)]
#[command(name = "lodestore")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the database directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered entity types with their schema ids
    Schema,

    /// Print one record as JSON
    Get {
        /// Entity type name
        type_name: String,
        /// Primary key (integer if it parses as one, text otherwise)
        key: String,
    },

    /// Run a query; the text must name its target type
    Query {
        /// Query text, e.g. "filter name startsWith 'K' limit 5 'Street'"
        text: String,
    },

    /// Delete one record
    Delete {
        /// Entity type name
        type_name: String,
        /// Primary key (integer if it parses as one, text otherwise)
        key: String,
    },

    /// Display database statistics
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump WAL records for debugging
    DumpWal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn run(cli: Cli) -> CliResult<()> {
    let path = cli
        .path
        .ok_or_else(|| CliError::Usage("database path required (--path <dir>)".into()))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Schema => commands::schema::run(&path, &mut out),
        Commands::Get { type_name, key } => commands::get::run(&path, &type_name, &key, &mut out),
        Commands::Query { text } => commands::query::run(&path, &text, &mut out),
        Commands::Delete { type_name, key } => {
            commands::delete::run(&path, &type_name, &key, &mut out)
        }
        Commands::Inspect { format } => commands::inspect::run(&path, &format, &mut out),
        Commands::DumpWal { limit, format } => {
            commands::dump_wal::run(&path, limit, &format, &mut out)
        }
    }
}

fn report(err: &CliError) {
    if let CliError::Query { query, source } = err {
        let mut stderr = io::stderr().lock();
        let width = source.fragment.chars().count().max(1);
        let _ = writeln!(stderr, "error: {}", source.message);
        let _ = writeln!(stderr, "  {query}");
        let _ = writeln!(
            stderr,
            "  {}{}",
            " ".repeat(query.get(..source.position).map_or(0, |s| s.chars().count())),
            "^".repeat(width)
        );
        let _ = writeln!(stderr, "near '{}' at offset {}", source.fragment, source.position);
        return;
    }

    let mut chain = err.to_string();
    let mut cause = std::error::Error::source(err);
    while let Some(inner) = cause {
        let text = inner.to_string();
        if !chain.ends_with(&text) {
            chain.push_str(": ");
            chain.push_str(&text);
        }
        cause = inner.source();
    }
    error!("{chain}");
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}
