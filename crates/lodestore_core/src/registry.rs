//! Schema registry: stable small integer ids for entity type names.
//!
//! Mappings live in the `Schema` keyspace:
//!
//! ```text
//! "n/" ++ name          -> id (4 bytes, big-endian)
//! "i/" ++ id (4 bytes)  -> name (UTF-8)
//! "next"                -> next unallocated id (4 bytes, big-endian)
//! ```
//!
//! Allocation runs in its own optimistic transaction, never in the
//! caller's, so a user rollback cannot un-register a type and a caller
//! holding the writer lock cannot deadlock against it.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult, TransactionError};
use crate::key::RowKey;
use crate::transaction::TransactionManager;
use crate::types::{Keyspace, SchemaId};

const NAME_PREFIX: &[u8] = b"n/";
const ID_PREFIX: &[u8] = b"i/";
const NEXT_ID_KEY: &[u8] = b"next";

/// First id handed out.
const FIRST_ID: u32 = 1;

fn name_key(name: &str) -> RowKey {
    let mut bytes = NAME_PREFIX.to_vec();
    bytes.extend_from_slice(name.as_bytes());
    RowKey::from_bytes(bytes)
}

fn id_key(id: SchemaId) -> RowKey {
    let mut bytes = ID_PREFIX.to_vec();
    bytes.extend_from_slice(&id.to_be_bytes());
    RowKey::from_bytes(bytes)
}

fn decode_id(bytes: &[u8]) -> CoreResult<SchemaId> {
    let raw: [u8; 4] = bytes
        .try_into()
        .map_err(|_| CoreError::invalid_format("schema id must be 4 bytes"))?;
    Ok(SchemaId::new(u32::from_be_bytes(raw)))
}

#[derive(Debug, Default)]
struct RegistryCache {
    by_name: HashMap<String, SchemaId>,
    by_id: BTreeMap<SchemaId, String>,
}

impl RegistryCache {
    fn insert(&mut self, name: &str, id: SchemaId) {
        self.by_name.insert(name.to_string(), id);
        self.by_id.insert(id, name.to_string());
    }
}

/// Assigns and persists schema ids.
#[derive(Debug)]
pub struct SchemaRegistry {
    manager: Arc<TransactionManager>,
    cache: RwLock<RegistryCache>,
    retry_limit: u32,
}

impl SchemaRegistry {
    /// Opens the registry, loading every persisted mapping.
    pub fn open(manager: Arc<TransactionManager>, retry_limit: u32) -> CoreResult<Self> {
        let registry = Self {
            manager,
            cache: RwLock::new(RegistryCache::default()),
            retry_limit,
        };
        registry.load()?;
        Ok(registry)
    }

    fn load(&self) -> CoreResult<()> {
        let mut txn = self.manager.begin_read()?;
        let mut end = NAME_PREFIX.to_vec();
        if let Some(last) = end.last_mut() {
            *last += 1;
        }
        let rows = self.manager.scan(
            &mut txn,
            Keyspace::Schema,
            (
                Bound::Included(RowKey::from_bytes(NAME_PREFIX)),
                Bound::Excluded(RowKey::from_bytes(end)),
            ),
        )?;
        self.manager.commit(&mut txn)?;

        let mut cache = self.cache.write();
        for (key, value) in rows {
            let name = std::str::from_utf8(&key.as_bytes()[NAME_PREFIX.len()..])
                .map_err(|_| CoreError::invalid_format("schema name is not valid UTF-8"))?;
            cache.insert(name, decode_id(&value)?);
        }
        debug!(types = cache.by_id.len(), "loaded schema registry");
        Ok(())
    }

    /// Returns the id of `type_name`, allocating and persisting one if the
    /// name is new.
    ///
    /// # Errors
    ///
    /// `SchemaRegistry` when persistence fails or conflicting allocations
    /// exhaust the retry limit.
    pub fn id_for(&self, type_name: &str) -> CoreResult<SchemaId> {
        if let Some(id) = self.lookup(type_name) {
            return Ok(id);
        }

        let attempts = self.retry_limit.max(1);
        for attempt in 1..=attempts {
            match self.try_allocate(type_name) {
                Ok(id) => {
                    self.cache.write().insert(type_name, id);
                    return Ok(id);
                }
                Err(CoreError::Transaction(TransactionError::Conflict { .. })) => {
                    debug!(type_name, attempt, "schema allocation conflicted, retrying");
                    std::thread::yield_now();
                }
                Err(err) => return Err(CoreError::schema_registry(type_name, err.to_string())),
            }
        }
        Err(CoreError::schema_registry(
            type_name,
            format!("allocation still conflicting after {attempts} attempts"),
        ))
    }

    fn try_allocate(&self, type_name: &str) -> CoreResult<SchemaId> {
        let mut txn = self.manager.begin_optimistic();
        let name_key = name_key(type_name);

        // Another allocator may have committed this name since the cache miss.
        if let Some(existing) = self.manager.get(&mut txn, Keyspace::Schema, &name_key)? {
            self.manager.commit(&mut txn)?;
            return decode_id(&existing);
        }

        let next_key = RowKey::from_bytes(NEXT_ID_KEY);
        let id = match self.manager.get(&mut txn, Keyspace::Schema, &next_key)? {
            Some(bytes) => decode_id(&bytes)?,
            None => SchemaId::new(FIRST_ID),
        };
        let following = id
            .as_u32()
            .checked_add(1)
            .ok_or_else(|| CoreError::schema_registry(type_name, "schema ids exhausted"))?;

        self.manager
            .put(&mut txn, Keyspace::Schema, name_key, id.to_be_bytes().to_vec())?;
        self.manager.put(
            &mut txn,
            Keyspace::Schema,
            id_key(id),
            type_name.as_bytes().to_vec(),
        )?;
        self.manager.put(
            &mut txn,
            Keyspace::Schema,
            next_key,
            following.to_be_bytes().to_vec(),
        )?;
        self.manager.commit(&mut txn)?;

        info!(type_name, id = id.as_u32(), "registered entity type");
        Ok(id)
    }

    /// Returns the id of `type_name` without allocating.
    pub fn lookup(&self, type_name: &str) -> Option<SchemaId> {
        self.cache.read().by_name.get(type_name).copied()
    }

    /// Returns the type name registered under `id`.
    pub fn name_for(&self, id: SchemaId) -> Option<String> {
        self.cache.read().by_id.get(&id).cloned()
    }

    /// Registered type names ordered by id.
    pub fn list(&self) -> Vec<String> {
        self.cache.read().by_id.values().cloned().collect()
    }

    /// Registered `(id, name)` pairs ordered by id.
    pub fn entries(&self) -> Vec<(SchemaId, String)> {
        self.cache
            .read()
            .by_id
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KvStore;
    use crate::wal::WalManager;
    use lodestore_storage::InMemoryBackend;
    use std::thread;
    use std::time::Duration;

    fn manager_over(backend: &InMemoryBackend) -> Arc<TransactionManager> {
        let wal = Arc::new(WalManager::new(Box::new(backend.clone()), false));
        let store = Arc::new(KvStore::new());
        let recovery = wal.recover().unwrap();
        let mgr = TransactionManager::with_state(
            Arc::clone(&store),
            Arc::clone(&wal),
            Duration::from_secs(1),
            recovery.last_txid(),
            recovery.last_sequence(),
        );
        for txn in &recovery.committed {
            store.apply(txn.sequence, &txn.writes);
        }
        Arc::new(mgr)
    }

    #[test]
    fn ids_are_stable_and_sequential() {
        let backend = InMemoryBackend::new();
        let registry = SchemaRegistry::open(manager_over(&backend), 8).unwrap();
        let account = registry.id_for("Account").unwrap();
        let street = registry.id_for("Street").unwrap();
        assert_eq!(account, SchemaId::new(1));
        assert_eq!(street, SchemaId::new(2));
        assert_eq!(registry.id_for("Account").unwrap(), account);
        assert_eq!(registry.name_for(street).as_deref(), Some("Street"));
        assert_eq!(registry.list(), vec!["Account", "Street"]);
    }

    #[test]
    fn lookup_does_not_allocate() {
        let backend = InMemoryBackend::new();
        let registry = SchemaRegistry::open(manager_over(&backend), 8).unwrap();
        assert_eq!(registry.lookup("Ghost"), None);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn mappings_survive_reopen() {
        let backend = InMemoryBackend::new();
        {
            let registry = SchemaRegistry::open(manager_over(&backend), 8).unwrap();
            registry.id_for("Account").unwrap();
            registry.id_for("City").unwrap();
        }
        let registry = SchemaRegistry::open(manager_over(&backend), 8).unwrap();
        assert_eq!(registry.lookup("City"), Some(SchemaId::new(2)));
        assert_eq!(registry.id_for("Street").unwrap(), SchemaId::new(3));
    }

    #[test]
    fn allocation_ignores_callers_writer_lock() {
        let backend = InMemoryBackend::new();
        let mgr = manager_over(&backend);
        let registry = SchemaRegistry::open(Arc::clone(&mgr), 8).unwrap();
        let mut user = mgr.begin_write().unwrap();
        let id = registry.id_for("Account").unwrap();
        mgr.abort(&mut user).unwrap();
        assert_eq!(registry.lookup("Account"), Some(id));
    }

    #[test]
    fn concurrent_allocation_never_duplicates() {
        let backend = InMemoryBackend::new();
        let registry = Arc::new(SchemaRegistry::open(manager_over(&backend), 64).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let shared = registry.id_for("Shared").unwrap();
                    let own = registry.id_for(&format!("Type{i}")).unwrap();
                    (shared, own)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let shared = results[0].0;
        assert!(results.iter().all(|(s, _)| *s == shared));
        let mut ids: Vec<_> = results.iter().map(|(_, own)| *own).collect();
        ids.push(shared);
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 9);
    }
}
