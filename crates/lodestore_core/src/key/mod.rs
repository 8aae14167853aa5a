//! Row keys: the byte-ordered encoding of (schema id, primary key).
//!
//! Every record lives under a [`RowKey`] whose bytes sort the way the
//! entity's primary keys sort, grouped by schema id. The
//! [`StorageComparator`] defines that order for the store, the scan bounds
//! and the `Ord` of [`RowKey`] alike.

mod codec;
mod comparator;

pub use codec::{PrimaryKey, RowKey};
pub use comparator::StorageComparator;
