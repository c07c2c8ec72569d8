//! Snapshots: a handle pinning a sequence number so that reads through it never observe writes
//! made afterward, and so the compactor knows not to drop a record some live snapshot still
//! needs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::format::SequenceNumber;

#[derive(Debug, Default)]
struct SnapshotListInner {
    /// Reference counts per outstanding sequence number. A sequence number present here, however
    /// many snapshots reference it, is "pinned": the compactor must not drop it.
    refs: std::collections::BTreeMap<SequenceNumber, usize>,
}

/// Tracks every outstanding [`Snapshot`] so the compactor can find the oldest pinned sequence
/// number before deciding a record is safe to drop.
#[derive(Debug, Default)]
pub(crate) struct SnapshotList {
    inner: Mutex<SnapshotListInner>,
}

impl SnapshotList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(self: &Arc<Self>, sequence: SequenceNumber) -> Snapshot {
        *self.inner.lock().refs.entry(sequence).or_insert(0) += 1;
        Snapshot { sequence, list: Arc::clone(self) }
    }

    fn release(&self, sequence: SequenceNumber) {
        let mut inner = self.inner.lock();
        if let Some(count) = inner.refs.get_mut(&sequence) {
            *count -= 1;
            if *count == 0 {
                inner.refs.remove(&sequence);
            }
        }
    }

    /// The oldest sequence number some live snapshot still pins, if any. The compactor may
    /// freely drop superseded records with a sequence number strictly newer than this (or any
    /// record at all, if `None`).
    pub fn oldest_pinned(&self) -> Option<SequenceNumber> {
        self.inner.lock().refs.keys().next().copied()
    }
}

/// A read-only view of the database as of the moment the snapshot was taken.
#[derive(Debug, Clone)]
pub struct Snapshot {
    sequence: SequenceNumber,
    list: Arc<SnapshotList>,
}

impl Snapshot {
    #[must_use]
    pub(crate) fn sequence_number(&self) -> SequenceNumber {
        self.sequence
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.list.release(self.sequence);
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence && Arc::ptr_eq(&self.list, &other.list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_pinned_tracks_outstanding_snapshots() {
        let list = SnapshotList::new();
        assert_eq!(list.oldest_pinned(), None);

        let s1 = list.take(5);
        let s2 = list.take(10);
        assert_eq!(list.oldest_pinned(), Some(5));

        drop(s1);
        assert_eq!(list.oldest_pinned(), Some(10));

        drop(s2);
        assert_eq!(list.oldest_pinned(), None);
    }

    #[test]
    fn multiple_snapshots_at_same_sequence_share_a_slot() {
        let list = SnapshotList::new();
        let s1 = list.take(5);
        let s2 = list.take(5);
        drop(s1);
        assert_eq!(list.oldest_pinned(), Some(5));
        drop(s2);
        assert_eq!(list.oldest_pinned(), None);
    }
}
