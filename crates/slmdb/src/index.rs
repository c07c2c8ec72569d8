//! The secondary index: an in-memory map from user key to the physical location of the newest
//! on-disk record for that key.
//!
//! Unlike a classical LSM-tree, a point read never needs to probe multiple sorted runs: the
//! index always names the single zero-level file (and offset within it) holding the newest
//! flushed or compacted version of a key, so a lookup that misses the memtable is one index
//! probe plus one file read. Multiple historical versions of a key are not retained once
//! compacted; snapshot reads older than the oldest entry still in the memtable are out of scope,
//! the same limitation the original design accepted in exchange for this index's simplicity.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::comparator::{BytewiseComparator, Comparator};
use crate::format::UserKeyOrd;

/// Where a record lives on disk: which file, at what byte offset, and how many bytes it spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordLocator {
    pub file_number: u64,
    pub offset: u64,
    pub size: u32,
}

impl RecordLocator {
    pub const fn new(file_number: u64, offset: u64, size: u32) -> Self {
        Self { file_number, offset, size }
    }
}

/// The secondary B-tree index over user keys.
pub(crate) struct Index {
    entries: RwLock<BTreeMap<UserKeyOrd, RecordLocator>>,
    approximate_entries: AtomicU64,
    comparator: Arc<dyn Comparator>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new(Arc::new(BytewiseComparator))
    }
}

impl Index {
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        Self { entries: RwLock::new(BTreeMap::new()), approximate_entries: AtomicU64::new(0), comparator }
    }

    fn key(&self, user_key: &[u8]) -> UserKeyOrd {
        UserKeyOrd::new(user_key, &self.comparator)
    }

    /// Points `user_key` at `locator`, overwriting whatever it pointed at before. Returns the
    /// previous locator, if any, so the caller can mark that file's record superseded.
    pub fn insert(&self, user_key: &[u8], locator: RecordLocator) -> Option<RecordLocator> {
        let mut entries = self.entries.write();
        let previous = entries.insert(self.key(user_key), locator);
        if previous.is_none() {
            self.approximate_entries.fetch_add(1, Ordering::Relaxed);
        }
        previous
    }

    pub fn get(&self, user_key: &[u8]) -> Option<RecordLocator> {
        self.entries.read().get(&self.key(user_key)).copied()
    }

    pub fn erase(&self, user_key: &[u8]) -> Option<RecordLocator> {
        let mut entries = self.entries.write();
        let removed = entries.remove(&self.key(user_key));
        if removed.is_some() {
            self.approximate_entries.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Replaces many entries atomically: used by the compactor to swap stale locators for the
    /// freshly-written ones in one pass, so a concurrent reader never observes a half-updated
    /// index.
    ///
    /// An entry is only actually replaced if its current locator still matches `expect_current`
    /// (compare-and-swap semantics per key), since a concurrent write may have superseded it
    /// again while the compaction was in flight.
    pub fn bulk_replace_if_unchanged(&self, updates: Vec<(Vec<u8>, RecordLocator, RecordLocator)>) {
        let mut entries = self.entries.write();
        for (user_key, expect_current, new_locator) in updates {
            let key = self.key(&user_key);
            match entries.get(&key) {
                Some(current) if *current == expect_current => {
                    entries.insert(key, new_locator);
                }
                _ => {}
            }
        }
    }

    pub fn len(&self) -> u64 {
        self.approximate_entries.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A consistent point-in-time copy of every `(user_key, locator)` pair, for startup recovery
    /// bookkeeping and tests.
    pub fn snapshot(&self) -> Vec<(Vec<u8>, RecordLocator)> {
        self.entries.read().iter().map(|(k, v)| (k.0.clone(), *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_overwrites_and_returns_previous_locator() {
        let index = Index::default();
        assert_eq!(index.insert(b"k", RecordLocator::new(1, 0, 10)), None);
        assert_eq!(index.insert(b"k", RecordLocator::new(2, 0, 10)), Some(RecordLocator::new(1, 0, 10)));
        assert_eq!(index.get(b"k"), Some(RecordLocator::new(2, 0, 10)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn erase_removes_the_entry() {
        let index = Index::default();
        index.insert(b"k", RecordLocator::new(1, 0, 10));
        assert_eq!(index.erase(b"k"), Some(RecordLocator::new(1, 0, 10)));
        assert_eq!(index.get(b"k"), None);
        assert!(index.is_empty());
    }

    #[test]
    fn bulk_replace_skips_entries_that_changed_concurrently() {
        let index = Index::default();
        index.insert(b"k", RecordLocator::new(1, 0, 10));
        index.insert(b"k", RecordLocator::new(2, 0, 10)); // concurrent write after compaction read it

        index.bulk_replace_if_unchanged(vec![(
            b"k".to_vec(),
            RecordLocator::new(1, 0, 10), // stale "what compaction thought it was"
            RecordLocator::new(9, 100, 10),
        )]);

        // Unchanged, since current locator no longer matches the expected stale one.
        assert_eq!(index.get(b"k"), Some(RecordLocator::new(2, 0, 10)));
    }
}
