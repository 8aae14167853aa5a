//! Compiled plan cache.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::compiler::QueryCompiler;
use super::plan::QueryPlan;
use crate::error::CoreResult;

type CacheKey = (Option<String>, String);

#[derive(Default)]
struct CacheInner {
    plans: HashMap<CacheKey, Arc<QueryPlan>>,
    insertion_order: VecDeque<CacheKey>,
}

/// Caches compiled plans per (requested type, query text).
///
/// Eviction is first-in first-out once `capacity` plans are held. A
/// capacity of zero disables caching.
pub struct PlanCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl PlanCache {
    /// Creates a cache holding at most `capacity` plans.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            capacity,
        }
    }

    /// Returns the cached plan or compiles and caches it.
    ///
    /// Compilation errors are not cached.
    pub fn get_or_compile(&self, requested: Option<&str>, text: &str) -> CoreResult<Arc<QueryPlan>> {
        if self.capacity == 0 {
            return QueryCompiler::compile(text, requested).map(Arc::new);
        }

        let key = (requested.map(str::to_string), text.to_string());
        if let Some(plan) = self.inner.lock().plans.get(&key) {
            trace!(query = text, "plan cache hit");
            return Ok(Arc::clone(plan));
        }

        let plan = Arc::new(QueryCompiler::compile(text, requested)?);
        let mut inner = self.inner.lock();
        if !inner.plans.contains_key(&key) {
            while inner.plans.len() >= self.capacity {
                let Some(oldest) = inner.insertion_order.pop_front() else {
                    break;
                };
                inner.plans.remove(&oldest);
            }
            inner.insertion_order.push_back(key.clone());
            inner.plans.insert(key, Arc::clone(&plan));
        }
        Ok(plan)
    }

    /// Number of cached plans.
    pub fn len(&self) -> usize {
        self.inner.lock().plans.len()
    }

    /// Returns true if no plans are cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached plan.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.plans.clear();
        inner.insertion_order.clear();
    }
}

impl std::fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}
