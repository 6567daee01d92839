//! # Memtable
//!
//! An in-memory, ordered write buffer for the LSM storage engine core.
//!
//! Every write lands here first (after being made durable in the
//! [`wal`](https://docs.rs/wal)): `put` and `delete` both go through the
//! same `BTreeMap`, with deletes recorded as tombstones rather than
//! removed outright, so a delete can shadow an older value that already
//! lives in a flushed SSTable. When [`Memtable::size_bytes`] crosses the
//! configured threshold, [`Memtable::iter`] hands the engine a sorted
//! snapshot to flush, after which [`Memtable::clear`] resets the buffer.
//!
//! ## Key properties
//!
//! - **Sorted order**: entries are always in strictly ascending key order
//!   (required for SSTable flush — the two orderings must coincide).
//! - **Tombstones as a tagged variant**: [`Value::Tombstone`] is a distinct
//!   enum case, not a nullable value, so "deleted" and "empty" can never be
//!   confused.
//! - **Approximate size tracking**: an integer byte counter drives the
//!   flush-threshold decision; see [`Memtable::size_bytes`] for exactly
//!   what it counts.
//!
//! ## Example
//!
//! ```rust
//! use memtable::{Memtable, Lookup};
//!
//! let mut m = Memtable::with_default_size();
//! m.put(b"hello".to_vec(), b"world".to_vec());
//! assert_eq!(m.get(b"hello"), Lookup::Found(b"world".to_vec()));
//!
//! m.delete(b"hello".to_vec());
//! assert_eq!(m.get(b"hello"), Lookup::Tombstone);
//! ```

use std::collections::BTreeMap;

/// Default flush threshold: 4 MiB, per the reference implementation.
pub const DEFAULT_MAX_SIZE_BYTES: u64 = 4 * 1024 * 1024;

/// Fixed per-entry bookkeeping overhead folded into [`Memtable::size_bytes`].
///
/// Not part of the contract — only that `size_bytes()` monotonically
/// tracks live content well enough to drive a flush decision. This value
/// matches the reference implementation's `SortedDict` node-overhead
/// estimate.
const PER_ENTRY_OVERHEAD: u64 = 48;

/// The minimal "value_bytes" contribution of a tombstone to the size
/// estimate, standing in for the wire format's sentinel marker.
const TOMBSTONE_VALUE_BYTES: u64 = 4;

/// The value half of a memtable entry: either a live payload or a
/// tombstone recording a delete.
///
/// Kept as a tagged enum rather than `Option<Vec<u8>>` so the type system
/// — not a caller's diligence — prevents confusing "empty value" with
/// "deleted key."
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A live value. May be empty; that is distinct from a tombstone.
    Live(Vec<u8>),
    /// A delete marker, shadowing any older value for this key.
    Tombstone,
}

impl Value {
    fn size_contribution(&self) -> u64 {
        match self {
            Value::Live(v) => v.len() as u64,
            Value::Tombstone => TOMBSTONE_VALUE_BYTES,
        }
    }
}

/// The result of a point lookup against a [`Memtable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The key is present with a live value.
    Found(Vec<u8>),
    /// The key is present but has been deleted.
    Tombstone,
    /// The key has never been written (or its entry was cleared).
    Absent,
}

impl Lookup {
    /// Collapses `Tombstone` into `Absent`, for callers that only care
    /// about "present in store" semantics.
    pub fn into_option(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Tombstone | Lookup::Absent => None,
        }
    }
}

fn entry_size(key: &[u8], value: &Value) -> u64 {
    key.len() as u64 + value.size_contribution() + PER_ENTRY_OVERHEAD
}

/// An ordered, in-memory write buffer backed by a `BTreeMap`.
///
/// `put` and `delete` both overwrite unconditionally: the memtable has no
/// notion of a caller-supplied sequence number gating writes, unlike the
/// WAL's timestamp (which is informational only). The engine is
/// responsible for applying writes to the memtable in the same order it
/// appended them to the WAL.
#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<Vec<u8>, Value>,
    size_bytes: u64,
    max_size_bytes: u64,
}

impl Memtable {
    /// Creates a new, empty memtable that flushes once `size_bytes()`
    /// reaches `max_size_bytes`.
    pub fn new(max_size_bytes: u64) -> Self {
        Self {
            map: BTreeMap::new(),
            size_bytes: 0,
            max_size_bytes,
        }
    }

    /// Creates a new, empty memtable with the default 4 MiB flush threshold.
    pub fn with_default_size() -> Self {
        Self::new(DEFAULT_MAX_SIZE_BYTES)
    }

    /// Inserts or overwrites `key` with a live `value`.
    ///
    /// The empty value is legal and distinct from a tombstone.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.insert(key, Value::Live(value));
    }

    /// Inserts or overwrites the entry for `key` with a tombstone.
    ///
    /// Deleting a key that was never written still inserts a tombstone:
    /// that is what lets the delete shadow an older value living in a
    /// previously flushed SSTable.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.insert(key, Value::Tombstone);
    }

    fn insert(&mut self, key: Vec<u8>, value: Value) {
        let old_size = self
            .map
            .get(&key)
            .map(|old| entry_size(&key, old))
            .unwrap_or(0);
        let new_size = entry_size(&key, &value);
        self.map.insert(key, value);
        self.size_bytes = self.size_bytes.saturating_add(new_size).saturating_sub(old_size);
    }

    /// Returns the value for `key`: [`Lookup::Found`], [`Lookup::Tombstone`],
    /// or [`Lookup::Absent`].
    pub fn get(&self, key: &[u8]) -> Lookup {
        match self.map.get(key) {
            Some(Value::Live(v)) => Lookup::Found(v.clone()),
            Some(Value::Tombstone) => Lookup::Tombstone,
            None => Lookup::Absent,
        }
    }

    /// Returns `true` if the key has any entry (live or tombstone).
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.map.contains_key(key)
    }

    /// Returns a snapshot iterator over all entries in strictly increasing
    /// key order, including tombstones.
    ///
    /// This ordering is the same total order an [`sstable`] writer
    /// validates against; the two must coincide exactly or a flush will
    /// fail with an ordering error.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Value)> {
        self.map.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// The current accumulated byte estimate used to trigger a flush.
    ///
    /// Per entry this counts `len(key) + value_bytes + per_entry_overhead`,
    /// where `value_bytes` is the live value's length or a small constant
    /// for a tombstone, and `per_entry_overhead` is a fixed, documented
    /// constant (not part of the contract — only the monotonic tracking
    /// behavior is).
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// `true` iff `size_bytes() >= max_size_bytes`.
    pub fn is_full(&self) -> bool {
        self.size_bytes >= self.max_size_bytes
    }

    /// The number of entries, including tombstones.
    pub fn num_entries(&self) -> usize {
        self.map.len()
    }

    /// `true` if the memtable holds no entries.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Resets the memtable to empty and zero size, reusing its allocation.
    pub fn clear(&mut self) {
        self.map.clear();
        self.size_bytes = 0;
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::with_default_size()
    }
}

#[cfg(test)]
mod tests;
