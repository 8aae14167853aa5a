//! One sorted map per keyspace.

use std::collections::BTreeMap;

use crate::key::RowKey;
use crate::types::Keyspace;

/// A pair of sorted maps indexed by [`Keyspace`].
#[derive(Debug, Clone)]
pub(crate) struct Keyspaces<V> {
    schema: BTreeMap<RowKey, V>,
    records: BTreeMap<RowKey, V>,
}

impl<V> Keyspaces<V> {
    pub(crate) fn new() -> Self {
        Self {
            schema: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    pub(crate) fn space(&self, keyspace: Keyspace) -> &BTreeMap<RowKey, V> {
        match keyspace {
            Keyspace::Schema => &self.schema,
            Keyspace::Records => &self.records,
        }
    }

    pub(crate) fn space_mut(&mut self, keyspace: Keyspace) -> &mut BTreeMap<RowKey, V> {
        match keyspace {
            Keyspace::Schema => &mut self.schema,
            Keyspace::Records => &mut self.records,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.schema.is_empty() && self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.schema.len() + self.records.len()
    }

    /// Iterates every entry, schema keyspace first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (Keyspace, &RowKey, &V)> {
        self.schema
            .iter()
            .map(|(k, v)| (Keyspace::Schema, k, v))
            .chain(self.records.iter().map(|(k, v)| (Keyspace::Records, k, v)))
    }

    pub(crate) fn clear(&mut self) {
        self.schema.clear();
        self.records.clear();
    }
}

impl<V> Default for Keyspaces<V> {
    fn default() -> Self {
        Self::new()
    }
}
