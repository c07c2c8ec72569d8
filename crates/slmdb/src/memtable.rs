//! The memtable: an ordered, in-memory buffer of recent writes.
//!
//! The spec treats the memtable as an external collaborator and only fixes its contract
//! (`Add`, `Get`, `ApproximateMemoryUsage`, ordered iteration). We implement that contract with
//! an ordered map behind a lock rather than pulling in a standalone skiplist crate, since nothing
//! outside this module depends on the memtable's internal data structure.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::format::{self, EntryType, InternalKeyRef, SequenceNumber};

/// The outcome of a memtable probe for a specific user key at a snapshot sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemtableLookup {
    NotFound,
    Deleted,
    Found(Vec<u8>),
}

/// Wraps an encoded internal key with the comparator that orders it, so a key orders the way
/// the spec requires: user key ascending per the configured comparator, then sequence number
/// descending, then value before deletion.
#[derive(Clone)]
struct InternalKeyOrd(Vec<u8>, Arc<dyn Comparator>);

impl std::fmt::Debug for InternalKeyOrd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("InternalKeyOrd").field(&self.0).finish()
    }
}

impl PartialEq for InternalKeyOrd {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InternalKeyOrd {}

impl PartialOrd for InternalKeyOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKeyOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        format::compare_internal_keys(&|a, b| self.1.cmp(a, b), &self.0, &other.0)
    }
}

pub(crate) struct Memtable {
    entries: RwLock<BTreeMap<InternalKeyOrd, Vec<u8>>>,
    approx_bytes: AtomicUsize,
    comparator: Arc<dyn Comparator>,
}

impl std::fmt::Debug for Memtable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memtable")
            .field("entries", &self.entries)
            .field("approx_bytes", &self.approx_bytes)
            .field("comparator", &self.comparator.id())
            .finish()
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparator))
    }
}

impl Memtable {
    #[must_use]
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        Self { entries: RwLock::new(BTreeMap::new()), approx_bytes: AtomicUsize::new(0), comparator }
    }

    pub fn add(&self, sequence: SequenceNumber, entry_type: EntryType, user_key: &[u8], value: &[u8]) {
        let key = format::encode_internal_key(user_key, sequence, entry_type);
        let added = key.len() + value.len();
        self.entries.write().insert(InternalKeyOrd(key, Arc::clone(&self.comparator)), value.to_vec());
        self.approx_bytes.fetch_add(added, AtomicOrdering::Relaxed);
    }

    /// Returns the record with the largest sequence `<= lookup_sequence` for `user_key`, if any
    /// record for that key is present in this memtable at all.
    #[must_use]
    pub fn get(&self, user_key: &[u8], lookup_sequence: SequenceNumber) -> MemtableLookup {
        let probe = InternalKeyOrd(format::lookup_key(user_key, lookup_sequence), Arc::clone(&self.comparator));
        let entries = self.entries.read();

        let Some((found_key, value)) = entries.range(probe..).next() else {
            return MemtableLookup::NotFound;
        };

        let parsed = InternalKeyRef::parse(&found_key.0).expect("memtable keys are well-formed");
        if parsed.user_key != user_key {
            return MemtableLookup::NotFound;
        }

        match parsed.entry_type {
            EntryType::Value => MemtableLookup::Found(value.clone()),
            EntryType::Deletion => MemtableLookup::Deleted,
        }
    }

    #[must_use]
    pub fn approximate_memory_usage(&self) -> usize {
        self.approx_bytes.load(AtomicOrdering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Entries in internal-key order: `(encoded_internal_key, value)`.
    pub fn snapshot_entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_newest_record_at_or_below_snapshot() {
        let table = Memtable::default();
        table.add(1, EntryType::Value, b"k", b"v1");
        table.add(3, EntryType::Value, b"k", b"v3");
        table.add(5, EntryType::Value, b"k", b"v5");

        assert_eq!(table.get(b"k", 0), MemtableLookup::NotFound);
        assert_eq!(table.get(b"k", 2), MemtableLookup::Found(b"v1".to_vec()));
        assert_eq!(table.get(b"k", 4), MemtableLookup::Found(b"v3".to_vec()));
        assert_eq!(table.get(b"k", 10), MemtableLookup::Found(b"v5".to_vec()));
    }

    #[test]
    fn deletion_shadows_earlier_value() {
        let table = Memtable::default();
        table.add(1, EntryType::Value, b"k", b"v1");
        table.add(2, EntryType::Deletion, b"k", b"");

        assert_eq!(table.get(b"k", 2), MemtableLookup::Deleted);
        assert_eq!(table.get(b"k", 1), MemtableLookup::Found(b"v1".to_vec()));
    }

    #[test]
    fn unrelated_key_does_not_match() {
        let table = Memtable::default();
        table.add(1, EntryType::Value, b"a", b"va");
        assert_eq!(table.get(b"b", 10), MemtableLookup::NotFound);
    }
}
