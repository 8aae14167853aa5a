//! Versioned key-value map.

use std::ops::Bound;

use parking_lot::RwLock;

use crate::key::RowKey;
use crate::store::Keyspaces;
use crate::types::{Keyspace, SequenceNumber};

/// A single write applied at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    /// Target keyspace.
    pub keyspace: Keyspace,
    /// Target key.
    pub key: RowKey,
    /// New value, or `None` for a delete.
    pub value: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
struct Version {
    seq: SequenceNumber,
    value: Option<Vec<u8>>,
}

/// Versions of one key, oldest first.
type Chain = Vec<Version>;

fn visible(chain: &Chain, snapshot: SequenceNumber) -> Option<&Version> {
    chain.iter().rev().find(|v| v.seq <= snapshot)
}

/// Multi-version sorted map keyed by `(Keyspace, RowKey)`.
///
/// Readers pass a snapshot sequence and see the newest version committed at
/// or before it. Writers are serialized by the transaction manager; this
/// type only guards its map with a read-write lock.
#[derive(Debug, Default)]
pub struct KvStore {
    data: RwLock<Keyspaces<Chain>>,
}

impl KvStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `key` as of `snapshot`.
    pub fn get(&self, keyspace: Keyspace, key: &RowKey, snapshot: SequenceNumber) -> Option<Vec<u8>> {
        let data = self.data.read();
        let chain = data.space(keyspace).get(key)?;
        visible(chain, snapshot).and_then(|v| v.value.clone())
    }

    /// Sequence of the newest committed version of `key`, including deletes.
    pub fn latest_seq(&self, keyspace: Keyspace, key: &RowKey) -> Option<SequenceNumber> {
        let data = self.data.read();
        data.space(keyspace)
            .get(key)
            .and_then(|chain| chain.last())
            .map(|v| v.seq)
    }

    /// Live entries in `range` as of `snapshot`, in key order.
    pub fn scan(
        &self,
        keyspace: Keyspace,
        range: (Bound<RowKey>, Bound<RowKey>),
        snapshot: SequenceNumber,
    ) -> Vec<(RowKey, Vec<u8>)> {
        let data = self.data.read();
        data.space(keyspace)
            .range(range)
            .filter_map(|(key, chain)| {
                visible(chain, snapshot)
                    .and_then(|v| v.value.as_ref())
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Number of live keys in `range` as of `snapshot`.
    pub fn count(
        &self,
        keyspace: Keyspace,
        range: (Bound<RowKey>, Bound<RowKey>),
        snapshot: SequenceNumber,
    ) -> usize {
        let data = self.data.read();
        data.space(keyspace)
            .range(range)
            .filter(|(_, chain)| visible(chain, snapshot).is_some_and(|v| v.value.is_some()))
            .count()
    }

    /// Appends a new version for every write at sequence `seq`.
    ///
    /// `seq` must be greater than every sequence already applied.
    pub fn apply(&self, seq: SequenceNumber, writes: &[WriteOp]) {
        let mut data = self.data.write();
        for write in writes {
            data.space_mut(write.keyspace)
                .entry(write.key.clone())
                .or_default()
                .push(Version {
                    seq,
                    value: write.value.clone(),
                });
        }
    }

    /// Drops versions of the given keys that no snapshot at or after
    /// `oldest_visible` can read.
    ///
    /// A key whose only remaining version is a visible delete is removed.
    pub fn prune<'a>(
        &self,
        keys: impl IntoIterator<Item = (Keyspace, &'a RowKey)>,
        oldest_visible: SequenceNumber,
    ) -> usize {
        let mut data = self.data.write();
        let mut removed = 0;
        for (keyspace, key) in keys {
            let space = data.space_mut(keyspace);
            let Some(chain) = space.get_mut(key) else {
                continue;
            };
            // Keep the newest version visible at `oldest_visible` and all later ones.
            if let Some(keep_from) = chain.iter().rposition(|v| v.seq <= oldest_visible) {
                removed += keep_from;
                chain.drain(..keep_from);
            }
            if chain.len() == 1 && chain[0].value.is_none() && chain[0].seq <= oldest_visible {
                space.remove(key);
                removed += 1;
            }
        }
        removed
    }

    /// Total number of stored versions, live or not.
    pub fn version_count(&self) -> usize {
        self.data.read().iter().map(|(_, _, chain)| chain.len()).sum()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.data.write().clear();
    }
}
