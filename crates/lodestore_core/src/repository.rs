//! Repository: CRUD and query entry point.
//!
//! Every call declares a transaction attribute and runs through
//! [`TransactionManager::execute`] against the caller's
//! [`TransactionContext`]. Reads use `RequiredRead`, writes use
//! `RequiredWrite`, so a call joins the caller's active transaction or owns
//! a short one of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use lodestore_codec::{from_cbor, Value};
use tracing::trace;

use crate::entity::{decode_entity, encode_entity, Entity};
use crate::error::{CoreError, CoreResult};
use crate::key::{PrimaryKey, RowKey};
use crate::query::{PlanCache, QueryExecutor, QueryPlan};
use crate::registry::SchemaRegistry;
use crate::transaction::{TransactionAttribute, TransactionContext, TransactionManager, TransactionMode};
use crate::types::{Keyspace, SchemaId, SequenceNumber};

/// Entity store façade over the transaction manager, schema registry and
/// query engine.
///
/// Cloning is cheap; clones share state.
#[derive(Debug, Clone)]
pub struct Repository {
    manager: Arc<TransactionManager>,
    registry: Arc<SchemaRegistry>,
    plans: Arc<PlanCache>,
    open: Arc<AtomicBool>,
}

impl Repository {
    pub(crate) fn new(
        manager: Arc<TransactionManager>,
        registry: Arc<SchemaRegistry>,
        plan_cache_capacity: usize,
        open: Arc<AtomicBool>,
    ) -> Self {
        Self {
            manager,
            registry,
            plans: Arc::new(PlanCache::new(plan_cache_capacity)),
            open,
        }
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }

    /// Runs `f` under the transaction boundary `attribute`.
    ///
    /// Services use this to declare how their call chain participates in
    /// the caller's transaction. Repository calls made inside `f` with the
    /// same context join the resulting transaction.
    pub fn transaction<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        attribute: TransactionAttribute,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionContext) -> Result<T, E>,
        E: From<CoreError>,
    {
        self.ensure_open()?;
        self.manager.execute(ctx, attribute, f)
    }

    /// Begins a caller-owned transaction on `ctx`.
    pub fn begin_transaction(
        &self,
        ctx: &mut TransactionContext,
        mode: TransactionMode,
    ) -> CoreResult<()> {
        self.ensure_open()?;
        self.manager.begin_in(ctx, mode)
    }

    /// Commits the caller-owned transaction on top of `ctx`.
    pub fn commit(&self, ctx: &mut TransactionContext) -> CoreResult<SequenceNumber> {
        self.ensure_open()?;
        self.manager.commit_top(ctx)
    }

    /// Rolls back the caller-owned transaction on top of `ctx`.
    pub fn rollback(&self, ctx: &mut TransactionContext) -> CoreResult<()> {
        self.manager.rollback_top(ctx)
    }

    /// Loads an entity by primary key.
    pub fn get<T: Entity>(
        &self,
        ctx: &mut TransactionContext,
        key: impl Into<PrimaryKey>,
    ) -> CoreResult<Option<T>> {
        let key = key.into();
        self.transaction(ctx, TransactionAttribute::RequiredRead, |ctx| {
            let Some(schema_id) = self.registry.lookup(T::TYPE_NAME) else {
                return Ok(None);
            };
            let txn = ctx.active()?;
            let row = RowKey::encode(schema_id, &key);
            self.manager
                .get(txn, Keyspace::Records, &row)?
                .map(|bytes| decode_entity::<T>(&bytes))
                .transpose()
        })
    }

    /// Loads an entity that must exist.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` when no entity has `key`.
    pub fn require<T: Entity>(
        &self,
        ctx: &mut TransactionContext,
        key: impl Into<PrimaryKey>,
    ) -> CoreResult<T> {
        let key = key.into();
        self.get::<T>(ctx, key.clone())?
            .ok_or_else(|| CoreError::EntityNotFound {
                type_name: T::TYPE_NAME.to_string(),
                key: key.to_string(),
            })
    }

    /// Inserts or replaces an entity under its primary key.
    pub fn put<T: Entity>(&self, ctx: &mut TransactionContext, entity: &T) -> CoreResult<()> {
        self.ensure_open()?;
        let schema_id = self.registry.id_for(T::TYPE_NAME)?;
        let row = RowKey::encode(schema_id, &entity.primary_key());
        let bytes = encode_entity(entity);
        self.transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
            let txn = ctx.active()?;
            trace!(txn = %txn.id(), type_name = T::TYPE_NAME, "put entity");
            self.manager.put(txn, Keyspace::Records, row, bytes)
        })
    }

    /// Deletes an entity. Returns whether it existed.
    pub fn delete<T: Entity>(
        &self,
        ctx: &mut TransactionContext,
        key: impl Into<PrimaryKey>,
    ) -> CoreResult<bool> {
        self.delete_row(ctx, T::TYPE_NAME, &key.into())
    }

    /// Deletes every entity of a type. Returns how many were deleted.
    pub fn delete_all<T: Entity>(&self, ctx: &mut TransactionContext) -> CoreResult<usize> {
        self.transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
            let Some(schema_id) = self.registry.lookup(T::TYPE_NAME) else {
                return Ok(0);
            };
            let txn = ctx.active()?;
            let rows = self
                .manager
                .scan(txn, Keyspace::Records, RowKey::group_bounds(schema_id))?;
            let deleted = rows.len();
            for (row, _) in rows {
                self.manager.delete(txn, Keyspace::Records, row)?;
            }
            Ok(deleted)
        })
    }

    /// Number of stored entities of a type.
    pub fn count<T: Entity>(&self, ctx: &mut TransactionContext) -> CoreResult<usize> {
        self.count_type(ctx, T::TYPE_NAME)
    }

    /// Number of stored entities of the named type.
    pub fn count_type(&self, ctx: &mut TransactionContext, type_name: &str) -> CoreResult<usize> {
        self.transaction(ctx, TransactionAttribute::RequiredRead, |ctx| {
            let Some(schema_id) = self.registry.lookup(type_name) else {
                return Ok(0);
            };
            let txn = ctx.active()?;
            let rows = self
                .manager
                .scan(txn, Keyspace::Records, RowKey::group_bounds(schema_id))?;
            Ok(rows.len())
        })
    }

    /// Compiles (or fetches from cache) the plan for `text` targeting `T`.
    pub fn prepare<T: Entity>(&self, text: &str) -> CoreResult<Arc<QueryPlan>> {
        self.plans.get_or_compile(Some(T::TYPE_NAME), text)
    }

    /// Runs a query and decodes the matches as `T`.
    ///
    /// The query text may omit the type name; if it names one, it must be
    /// `T`'s.
    pub fn query<T: Entity>(&self, ctx: &mut TransactionContext, text: &str) -> CoreResult<Vec<T>> {
        self.ensure_open()?;
        let plan = self.prepare::<T>(text)?;
        self.execute::<T>(ctx, &plan)
    }

    /// Runs a compiled plan and decodes the matches as `T`.
    pub fn execute<T: Entity>(
        &self,
        ctx: &mut TransactionContext,
        plan: &QueryPlan,
    ) -> CoreResult<Vec<T>> {
        if plan.type_name() != T::TYPE_NAME {
            return Err(CoreError::invalid_operation(format!(
                "plan targets '{}', not '{}'",
                plan.type_name(),
                T::TYPE_NAME
            )));
        }
        self.run_plan(ctx, plan)?
            .iter()
            .map(|(_, value)| T::from_value(value))
            .collect()
    }

    /// Runs a query that names its target type and returns raw records.
    pub fn query_dynamic(
        &self,
        ctx: &mut TransactionContext,
        text: &str,
    ) -> CoreResult<Vec<(PrimaryKey, Value)>> {
        self.ensure_open()?;
        let plan = self.plans.get_or_compile(None, text)?;
        self.run_plan(ctx, &plan)
    }

    fn run_plan(
        &self,
        ctx: &mut TransactionContext,
        plan: &QueryPlan,
    ) -> CoreResult<Vec<(PrimaryKey, Value)>> {
        self.transaction(ctx, TransactionAttribute::RequiredRead, |ctx| {
            let Some(schema_id) = self.registry.lookup(plan.type_name()) else {
                return Ok(Vec::new());
            };
            let txn = ctx.active()?;
            QueryExecutor::new(&self.manager).execute(txn, schema_id, plan)
        })
    }

    /// Loads a raw record by type name and primary key.
    pub fn get_dynamic(
        &self,
        ctx: &mut TransactionContext,
        type_name: &str,
        key: &PrimaryKey,
    ) -> CoreResult<Option<Value>> {
        self.transaction(ctx, TransactionAttribute::RequiredRead, |ctx| {
            let Some(schema_id) = self.registry.lookup(type_name) else {
                return Ok(None);
            };
            let txn = ctx.active()?;
            let row = RowKey::encode(schema_id, key);
            self.manager
                .get(txn, Keyspace::Records, &row)?
                .map(|bytes| from_cbor(&bytes).map_err(CoreError::from))
                .transpose()
        })
    }

    /// Deletes a record by type name and primary key. Returns whether it
    /// existed.
    pub fn delete_dynamic(
        &self,
        ctx: &mut TransactionContext,
        type_name: &str,
        key: &PrimaryKey,
    ) -> CoreResult<bool> {
        self.delete_row(ctx, type_name, key)
    }

    fn delete_row(
        &self,
        ctx: &mut TransactionContext,
        type_name: &str,
        key: &PrimaryKey,
    ) -> CoreResult<bool> {
        self.transaction(ctx, TransactionAttribute::RequiredWrite, |ctx| {
            let Some(schema_id) = self.registry.lookup(type_name) else {
                return Ok(false);
            };
            let txn = ctx.active()?;
            let row = RowKey::encode(schema_id, key);
            if self.manager.get(txn, Keyspace::Records, &row)?.is_none() {
                return Ok(false);
            }
            self.manager.delete(txn, Keyspace::Records, row)?;
            Ok(true)
        })
    }

    /// Registered type names ordered by schema id.
    pub fn list_schema(&self) -> CoreResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self.registry.list())
    }

    /// Registered `(id, type name)` pairs ordered by id.
    pub fn schema_entries(&self) -> CoreResult<Vec<(SchemaId, String)>> {
        self.ensure_open()?;
        Ok(self.registry.entries())
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The transaction manager.
    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    /// Number of cached query plans.
    pub fn cached_plans(&self) -> usize {
        self.plans.len()
    }
}
