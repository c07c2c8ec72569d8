//! Forward iteration over the merged view of the memtable and the zero-level file population.
//!
//! The secondary index does not support range scans over blocks the way a sorted-string-table
//! iterator would, so a `DbIterator` materializes the keys visible at its snapshot once, at
//! construction, rather than merging several lazy sub-iterators on every `next`. This trades
//! "start scanning before the whole keyspace is known" for a much simpler implementation; the
//! spec's own read path already goes through the index for point lookups; only multi-key scans
//! pay this cost.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::format::{self, InternalKeyRef, SequenceNumber, UserKeyOrd};
use crate::memtable::Memtable;
use crate::nvm_pool::InMemoryNvmPool;
use crate::table_cache::TableCache;
use crate::version::Version;

/// A snapshot-consistent forward iterator over the database's key space.
pub struct DbIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    position: usize,
}

impl DbIterator {
    pub(crate) fn new(
        memtable: &Memtable,
        version: &Version,
        table_cache: &TableCache,
        comparator: &Arc<dyn Comparator>,
        nvm_pool: Option<&InMemoryNvmPool>,
        snapshot_sequence: SequenceNumber,
    ) -> crate::error::Result<Self> {
        // Newest-wins merge keyed by user key; memtable entries are inserted after file entries
        // so they take priority for a given user key at an equal-or-newer sequence.
        let mut newest_by_user_key: BTreeMap<UserKeyOrd, (SequenceNumber, Option<Vec<u8>>)> =
            BTreeMap::new();

        for file in version.files() {
            let bytes = std::fs::read(table_cache.record_file_path(file.file_number()))?;
            for scanned in crate::record_file::scan_records(&bytes) {
                let (_, _, record) = scanned?;
                let entry_type = InternalKeyRef::parse(&record.internal_key).map(|p| p.entry_type);
                let value = match entry_type {
                    Some(format::EntryType::Value) => {
                        Some(crate::db::decode_stored_value(nvm_pool, &record.value)?)
                    }
                    _ => None,
                };
                merge_in(&mut newest_by_user_key, &record.internal_key, value, comparator, snapshot_sequence);
            }
        }

        for (key, value) in memtable.snapshot_entries() {
            merge_in(&mut newest_by_user_key, &key, Some(value), comparator, snapshot_sequence);
        }

        let entries = newest_by_user_key
            .into_iter()
            .filter_map(|(user_key, (_, value))| value.map(|v| (user_key.0, v)))
            .collect();

        Ok(Self { entries, position: 0 })
    }

    #[must_use]
    pub fn valid(&self) -> bool {
        self.position < self.entries.len()
    }

    pub fn seek_to_first(&mut self) {
        self.position = 0;
    }

    /// Positions at the first entry with a user key `>= target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.position = self.entries.partition_point(|(key, _)| key.as_slice() < target);
    }

    pub fn next(&mut self) {
        if self.valid() {
            self.position += 1;
        }
    }

    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        self.entries.get(self.position).map(|(k, _)| k.as_slice())
    }

    #[must_use]
    pub fn value(&self) -> Option<&[u8]> {
        self.entries.get(self.position).map(|(_, v)| v.as_slice())
    }
}

fn merge_in(
    into: &mut BTreeMap<UserKeyOrd, (SequenceNumber, Option<Vec<u8>>)>,
    internal_key: &[u8],
    value: Option<Vec<u8>>,
    comparator: &Arc<dyn Comparator>,
    snapshot_sequence: SequenceNumber,
) {
    let Some(parsed) = InternalKeyRef::parse(internal_key) else { return };
    if parsed.sequence > snapshot_sequence {
        return;
    }

    let stored_value = match parsed.entry_type {
        format::EntryType::Value => value,
        format::EntryType::Deletion => None,
    };

    let key = UserKeyOrd::new(parsed.user_key, comparator);
    match into.get(&key) {
        Some((existing_seq, _)) if *existing_seq >= parsed.sequence => {}
        _ => {
            into.insert(key, (parsed.sequence, stored_value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytewise() -> Arc<dyn Comparator> {
        Arc::new(crate::comparator::BytewiseComparator)
    }

    #[test]
    fn merge_in_keeps_newest_sequence_per_user_key() {
        let mut map = BTreeMap::new();
        let cmp = bytewise();
        merge_in(&mut map, &format::encode_internal_key(b"k", 1, format::EntryType::Value), Some(b"v1".to_vec()), &cmp, 10);
        merge_in(&mut map, &format::encode_internal_key(b"k", 5, format::EntryType::Value), Some(b"v5".to_vec()), &cmp, 10);
        merge_in(&mut map, &format::encode_internal_key(b"k", 2, format::EntryType::Value), Some(b"v2".to_vec()), &cmp, 10);

        assert_eq!(map.get(&UserKeyOrd::new(b"k", &cmp)).unwrap().1, Some(b"v5".to_vec()));
    }

    #[test]
    fn merge_in_respects_snapshot_bound() {
        let mut map = BTreeMap::new();
        let cmp = bytewise();
        merge_in(&mut map, &format::encode_internal_key(b"k", 1, format::EntryType::Value), Some(b"v1".to_vec()), &cmp, 3);
        merge_in(&mut map, &format::encode_internal_key(b"k", 5, format::EntryType::Value), Some(b"v5".to_vec()), &cmp, 3);

        assert_eq!(map.get(&UserKeyOrd::new(b"k", &cmp)).unwrap().1, Some(b"v1".to_vec()));
    }
}
