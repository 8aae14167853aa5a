//! Database facade and recovery.

use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lodestore_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tracing::{debug, info};

use crate::config::Config;
use crate::dir::DatabaseDir;
use crate::error::{CoreError, CoreResult};
use crate::key::RowKey;
use crate::registry::SchemaRegistry;
use crate::repository::Repository;
use crate::store::KvStore;
use crate::transaction::TransactionManager;
use crate::types::{Keyspace, SchemaId, SequenceNumber};
use crate::wal::WalManager;

/// Per-type entity count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeStats {
    /// Schema id of the type.
    pub schema_id: SchemaId,
    /// Registered type name.
    pub type_name: String,
    /// Live entities as of the last commit.
    pub count: usize,
}

/// Point-in-time database statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Entity counts ordered by schema id.
    pub types: Vec<TypeStats>,
    /// WAL size in bytes.
    pub wal_size: u64,
    /// Last committed sequence number.
    pub committed_seq: SequenceNumber,
    /// Open transactions holding a snapshot.
    pub active_transactions: usize,
}

impl DatabaseStats {
    /// Total entities across all types.
    pub fn total_entities(&self) -> usize {
        self.types.iter().map(|t| t.count).sum()
    }
}

/// The main database handle.
///
/// Opening a database recovers committed transactions from the WAL,
/// loads the schema registry and hands out a [`Repository`] for entity
/// access.
///
/// ```rust
/// use lodestore_core::Database;
///
/// let db = Database::open_in_memory().unwrap();
/// assert!(db.repository().list_schema().unwrap().is_empty());
/// db.close().unwrap();
/// ```
pub struct Database {
    config: Config,
    /// Held for the exclusive lock; `None` for backend-only databases.
    dir: Option<DatabaseDir>,
    wal: Arc<WalManager>,
    manager: Arc<TransactionManager>,
    repository: Repository,
    open: Arc<AtomicBool>,
}

impl Database {
    /// Opens or creates a database in directory `path`.
    pub fn open(path: &Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a database directory with custom configuration.
    ///
    /// # Errors
    ///
    /// - `DatabaseLocked` if another handle holds the directory
    /// - `InvalidFormat` if `create_if_missing`/`error_if_exists` rule the
    ///   open out, or the WAL is unreadable
    /// - `WalCorruption` / `ChecksumMismatch` on a damaged log
    pub fn open_with_config(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = DatabaseDir::open(path, config.create_if_missing)?;

        if !config.create_if_missing && dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database does not exist and create_if_missing is false",
            ));
        }
        if config.error_if_exists && !dir.is_new_database() {
            return Err(CoreError::invalid_format(
                "database already exists and error_if_exists is true",
            ));
        }

        let backend = FileBackend::open_with_create_dirs(&dir.wal_path())?;
        let mut db = Self::open_with_backend(config, Box::new(backend))?;
        debug!(path = %dir.path().display(), "opened database directory");
        db.dir = Some(dir);
        Ok(db)
    }

    /// Opens a database over an arbitrary WAL backend.
    pub fn open_with_backend(config: Config, backend: Box<dyn StorageBackend>) -> CoreResult<Self> {
        let wal = Arc::new(WalManager::new(backend, config.sync_on_commit));
        let store = Arc::new(KvStore::new());

        let recovery = wal.recover()?;
        for txn in &recovery.committed {
            store.apply(txn.sequence, &txn.writes);
        }
        info!(
            committed = recovery.committed.len(),
            incomplete = recovery.incomplete,
            truncated_bytes = recovery.truncated_bytes,
            "recovered from WAL"
        );

        let manager = Arc::new(TransactionManager::with_state(
            store,
            Arc::clone(&wal),
            config.lock_timeout,
            recovery.last_txid(),
            recovery.last_sequence(),
        ));
        let registry = Arc::new(SchemaRegistry::open(
            Arc::clone(&manager),
            config.registry_retry_limit,
        )?);
        let open = Arc::new(AtomicBool::new(true));
        let repository = Repository::new(
            Arc::clone(&manager),
            registry,
            config.plan_cache_capacity,
            Arc::clone(&open),
        );

        Ok(Self {
            config,
            dir: None,
            wal,
            manager,
            repository,
            open,
        })
    }

    /// Opens a fresh, non-persistent database.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(
            Config::default().sync_on_commit(false),
            Box::new(InMemoryBackend::new()),
        )
    }

    /// The entity repository.
    #[must_use]
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// The transaction manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Returns database configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The database directory, if file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(DatabaseDir::path)
    }

    /// Returns the last committed sequence number.
    #[must_use]
    pub fn committed_seq(&self) -> SequenceNumber {
        self.manager.committed_seq()
    }

    /// Collects entity counts per type and WAL statistics.
    pub fn stats(&self) -> CoreResult<DatabaseStats> {
        self.ensure_open()?;
        let snapshot = self.manager.committed_seq();
        let store = self.manager.store();
        let types = self
            .repository
            .registry()
            .entries()
            .into_iter()
            .map(|(schema_id, type_name)| TypeStats {
                count: store.count(Keyspace::Records, RowKey::group_bounds(schema_id), snapshot),
                schema_id,
                type_name,
            })
            .collect();
        Ok(DatabaseStats {
            types,
            wal_size: self.wal.size()?,
            committed_seq: snapshot,
            active_transactions: self.manager.active_count(),
        })
    }

    /// Closes the database, flushing the WAL. Closing twice is a no-op.
    ///
    /// Later operations through the repository fail with `DatabaseClosed`.
    pub fn close(&self) -> CoreResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.wal.flush()?;
        debug!(committed_seq = %self.committed_seq(), "closed database");
        Ok(())
    }

    /// Checks if the database is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("is_open", &self.is_open())
            .field("committed_seq", &self.committed_seq())
            .finish_non_exhaustive()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;
    use crate::error::TransactionError;
    use crate::key::PrimaryKey;
    use crate::transaction::{TransactionAttribute, TransactionContext, TransactionMode};
    use crate::RecordReader;
    use lodestore_codec::Value;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: i64,
        body: String,
    }

    impl Entity for Note {
        const TYPE_NAME: &'static str = "Note";

        fn primary_key(&self) -> PrimaryKey {
            PrimaryKey::Int(self.id)
        }

        fn to_value(&self) -> Value {
            Value::map(vec![
                (Value::text("id"), Value::Integer(self.id)),
                (Value::text("body"), Value::text(&self.body)),
            ])
        }

        fn from_value(value: &Value) -> CoreResult<Self> {
            let record = RecordReader::new(Self::TYPE_NAME, value)?;
            Ok(Self {
                id: record.integer("id")?,
                body: record.text("body")?,
            })
        }
    }

    fn note(id: i64, body: &str) -> Note {
        Note {
            id,
            body: body.to_string(),
        }
    }

    #[test]
    fn put_get_delete() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository();
        let mut ctx = TransactionContext::new();

        assert_eq!(repo.get::<Note>(&mut ctx, 1_i64).unwrap(), None);
        repo.put(&mut ctx, &note(1, "first")).unwrap();
        assert_eq!(repo.get::<Note>(&mut ctx, 1_i64).unwrap(), Some(note(1, "first")));

        repo.put(&mut ctx, &note(1, "replaced")).unwrap();
        assert_eq!(repo.require::<Note>(&mut ctx, 1_i64).unwrap().body, "replaced");
        assert_eq!(repo.count::<Note>(&mut ctx).unwrap(), 1);

        assert!(repo.delete::<Note>(&mut ctx, 1_i64).unwrap());
        assert!(!repo.delete::<Note>(&mut ctx, 1_i64).unwrap());
        assert!(matches!(
            repo.require::<Note>(&mut ctx, 1_i64),
            Err(CoreError::EntityNotFound { .. })
        ));
        assert!(ctx.is_empty());
    }

    #[test]
    fn delete_all_and_stats() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository();
        let mut ctx = TransactionContext::new();
        for i in 0..5 {
            repo.put(&mut ctx, &note(i, "x")).unwrap();
        }

        let stats = db.stats().unwrap();
        assert_eq!(stats.types.len(), 1);
        assert_eq!(stats.types[0].type_name, "Note");
        assert_eq!(stats.total_entities(), 5);
        assert!(stats.wal_size > 0);

        assert_eq!(repo.delete_all::<Note>(&mut ctx).unwrap(), 5);
        assert_eq!(db.stats().unwrap().total_entities(), 0);
    }

    #[test]
    fn query_typed_and_dynamic() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository();
        let mut ctx = TransactionContext::new();
        for (i, body) in ["alpha", "beta", "gamma"].iter().enumerate() {
            repo.put(&mut ctx, &note(i as i64, body)).unwrap();
        }

        let hits: Vec<Note> = repo.query(&mut ctx, "filter body contains 'a' reversed").unwrap();
        assert_eq!(hits.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1, 0]);

        let rows = repo
            .query_dynamic(&mut ctx, "filter id > 0 limit 1 'Note'")
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, PrimaryKey::Int(1));

        assert!(repo.query_dynamic(&mut ctx, "'Ghost'").unwrap().is_empty());
        assert!(matches!(
            repo.query::<Note>(&mut ctx, "'Other'"),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert_eq!(repo.cached_plans(), 3);
    }

    #[test]
    fn explicit_transaction_rollback() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository();
        let mut ctx = TransactionContext::new();

        repo.begin_transaction(&mut ctx, TransactionMode::ReadWrite)
            .unwrap();
        repo.put(&mut ctx, &note(1, "draft")).unwrap();
        assert!(repo.get::<Note>(&mut ctx, 1_i64).unwrap().is_some());
        repo.rollback(&mut ctx).unwrap();

        assert!(repo.get::<Note>(&mut ctx, 1_i64).unwrap().is_none());
        // the type stays registered
        assert_eq!(repo.list_schema().unwrap(), vec!["Note"]);
    }

    #[test]
    fn read_only_explicit_transaction_is_upgraded_by_writes() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository();
        let mut ctx = TransactionContext::new();

        repo.begin_transaction(&mut ctx, TransactionMode::ReadOnly)
            .unwrap();
        repo.put(&mut ctx, &note(1, "x")).unwrap();
        assert!(!ctx.peek().unwrap().is_read_only());
        repo.commit(&mut ctx).unwrap();
        assert!(repo.get::<Note>(&mut ctx, 1_i64).unwrap().is_some());
    }

    #[test]
    fn commit_without_transaction_fails() {
        let db = Database::open_in_memory().unwrap();
        let mut ctx = TransactionContext::new();
        assert!(matches!(
            db.repository().commit(&mut ctx),
            Err(CoreError::Transaction(TransactionError::NoActiveTransaction))
        ));
    }

    #[test]
    fn closed_database_rejects_operations() {
        let db = Database::open_in_memory().unwrap();
        let repo = db.repository().clone();
        let mut ctx = TransactionContext::new();
        db.close().unwrap();
        db.close().unwrap();
        assert!(!db.is_open());

        assert!(matches!(
            repo.put(&mut ctx, &note(1, "x")),
            Err(CoreError::DatabaseClosed)
        ));
        assert!(matches!(
            repo.get::<Note>(&mut ctx, 1_i64),
            Err(CoreError::DatabaseClosed)
        ));
        let outcome: CoreResult<()> =
            repo.transaction(&mut ctx, TransactionAttribute::RequiredWrite, |_| Ok(()));
        assert!(matches!(outcome, Err(CoreError::DatabaseClosed)));
        assert!(matches!(db.stats(), Err(CoreError::DatabaseClosed)));
    }

    #[test]
    fn reopen_recovers_entities_and_schema() {
        let temp = tempdir().unwrap();
        {
            let db = Database::open(temp.path()).unwrap();
            let mut ctx = TransactionContext::new();
            db.repository().put(&mut ctx, &note(7, "kept")).unwrap();
            db.close().unwrap();
        }

        let db = Database::open(temp.path()).unwrap();
        let mut ctx = TransactionContext::new();
        assert_eq!(db.repository().list_schema().unwrap(), vec!["Note"]);
        assert_eq!(
            db.repository().get::<Note>(&mut ctx, 7_i64).unwrap(),
            Some(note(7, "kept"))
        );
        assert!(db.committed_seq() > SequenceNumber::new(0));
    }

    #[test]
    fn second_open_is_locked() {
        let temp = tempdir().unwrap();
        let _db = Database::open(temp.path()).unwrap();
        assert!(matches!(
            Database::open(temp.path()),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn create_and_exists_flags() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("missing");
        assert!(Database::open_with_config(&missing, Config::default().create_if_missing(false)).is_err());

        {
            let db = Database::open(temp.path()).unwrap();
            let mut ctx = TransactionContext::new();
            db.repository().put(&mut ctx, &note(1, "x")).unwrap();
        }
        assert!(matches!(
            Database::open_with_config(temp.path(), Config::default().error_if_exists(true)),
            Err(CoreError::InvalidFormat { .. })
        ));
    }
}
