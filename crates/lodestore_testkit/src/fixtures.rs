//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up test databases
//! and common test scenarios.

use std::path::{Path, PathBuf};
use std::sync::Once;

use lodestore_core::{Config, Database};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default().sync_on_commit(false))
    }

    /// Creates an in-memory test database with a custom configuration.
    pub fn memory_with_config(config: Config) -> Self {
        init_test_logging();
        let backend = lodestore_storage::InMemoryBackend::new();
        Self {
            db: Database::open_with_backend(config, Box::new(backend))
                .expect("Failed to open in-memory database"),
            temp_dir: None,
        }
    }

    /// Creates a new file-based test database in a temporary directory.
    pub fn file() -> Self {
        init_test_logging();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(temp_dir.path()).expect("Failed to open file database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Closes and reopens a file-based database over the same directory.
    pub fn reopen(self) -> Self {
        let Self { db, temp_dir } = self;
        let temp_dir = temp_dir.expect("Only file databases can be reopened");
        drop(db);
        let db = Database::open(temp_dir.path()).expect("Failed to reopen database");
        Self {
            db,
            temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a temporary file-based database and its directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("File database should have a path");
    f(&test_db.db, &path)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use crate::entities::{Account, City, Street};
    use lodestore_core::TransactionContext;

    /// A database holding accounts with the given `(id, balance)` pairs.
    pub fn bank_database(accounts: &[(&str, i64)]) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let mut ctx = TransactionContext::new();
        for (id, balance) in accounts {
            test_db
                .repository()
                .put(&mut ctx, &Account::new(*id, *balance))
                .expect("Failed to put account");
        }
        test_db
    }

    /// Streets in a few cities; key 6 has no city.
    pub fn sample_streets() -> Vec<Street> {
        let stockholm = City::new("Stockholm");
        let holmsund = City::new("Holmsund");
        let malmo = City::new("Malmö");
        vec![
            Street::new(1, "Storgatan", 12).with_city(stockholm.clone()),
            Street::new(2, "Kungsgatan", 4).with_city(malmo.clone()),
            Street::new(3, "Drottninggatan", 7).with_city(stockholm.clone()),
            Street::new(4, "Kungsgatan", 2).with_city(stockholm),
            Street::new(5, "Blockgatan", 9).with_city(holmsund),
            Street::new(6, "Strandvägen", 1),
            Street::new(7, "Almgatan", 3).with_city(malmo),
        ]
    }

    /// A database holding [`sample_streets`].
    pub fn street_database() -> TestDatabase {
        let test_db = TestDatabase::memory();
        let mut ctx = TransactionContext::new();
        for street in sample_streets() {
            test_db
                .repository()
                .put(&mut ctx, &street)
                .expect("Failed to put street");
        }
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Account;
    use lodestore_core::TransactionContext;

    #[test]
    fn memory_database_is_open() {
        let test_db = TestDatabase::memory();
        assert!(test_db.is_open());
        assert!(test_db.path().is_none());
    }

    #[test]
    fn file_database_reopens_with_data() {
        let test_db = TestDatabase::file();
        let mut ctx = TransactionContext::new();
        test_db
            .repository()
            .put(&mut ctx, &Account::new("a", 1))
            .unwrap();
        let test_db = test_db.reopen();
        assert_eq!(
            test_db
                .repository()
                .get::<Account>(&mut ctx, "a")
                .unwrap()
                .map(|a| a.balance),
            Some(1)
        );
    }

    #[test]
    fn with_file_db_exposes_directory() {
        with_file_db(|db, path| {
            assert!(db.is_open());
            assert!(path.join("wal.log").exists());
        });
    }

    #[test]
    fn bank_scenario_populates_accounts() {
        let test_db = scenarios::bank_database(&[("a", 1), ("b", 2)]);
        let mut ctx = TransactionContext::new();
        assert_eq!(test_db.repository().count::<Account>(&mut ctx).unwrap(), 2);
    }
}
