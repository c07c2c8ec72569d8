//! Internal key encoding.
//!
//! An internal key is a user key followed by an 8-byte little-endian tag packing a 56-bit
//! sequence number and an 8-bit entry type. Ordering internal keys by their raw bytes is *not*
//! what we want (ties on the tag would have to be resolved specially), so [`InternalKeyRef`]
//! and [`compare_internal_keys`] are the primitives the rest of the crate should use instead of
//! comparing encoded bytes directly.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;

/// Monotonically increasing per-process write counter. Defines snapshot order.
pub type SequenceNumber = u64;

pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum EntryType {
    /// Ordered below `Value` so that, at equal sequence numbers, a value record sorts before
    /// a deletion record (the tiebreak the spec calls for).
    Deletion = 0,
    Value = 1,
}

impl EntryType {
    #[must_use]
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Deletion),
            1 => Some(Self::Value),
            _ => None,
        }
    }
}

#[inline]
#[must_use]
fn pack_tag(sequence: SequenceNumber, entry_type: EntryType) -> u64 {
    (sequence << 8) | entry_type as u64
}

#[inline]
#[must_use]
fn unpack_tag(tag: u64) -> (SequenceNumber, EntryType) {
    let sequence = tag >> 8;
    // Only values 0 and 1 are ever packed by `pack_tag`, so this cannot fail for tags we wrote.
    let entry_type = EntryType::from_u8((tag & 0xff) as u8).unwrap_or(EntryType::Deletion);
    (sequence, entry_type)
}

/// Encode `(user_key, sequence, entry_type)` into the on-disk/in-memory internal key form.
#[must_use]
pub fn encode_internal_key(user_key: &[u8], sequence: SequenceNumber, entry_type: EntryType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + 8);
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&pack_tag(sequence, entry_type).to_le_bytes());
    buf
}

/// A parsed view over an encoded internal key.
#[derive(Debug, Clone, Copy)]
pub struct InternalKeyRef<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub entry_type: EntryType,
}

impl<'a> InternalKeyRef<'a> {
    /// Parses an encoded internal key. Returns `None` if `encoded` is shorter than the 8-byte
    /// tag, which can only happen for corrupted data.
    #[must_use]
    pub fn parse(encoded: &'a [u8]) -> Option<Self> {
        let split_at = encoded.len().checked_sub(8)?;
        let (user_key, tag_bytes) = encoded.split_at(split_at);
        let tag_bytes: [u8; 8] = tag_bytes.try_into().ok()?;
        let (sequence, entry_type) = unpack_tag(u64::from_le_bytes(tag_bytes));
        Some(Self { user_key, sequence, entry_type })
    }
}

/// Orders internal keys as required by the spec: user key ascending (via `user_cmp`), then
/// sequence descending, then type with value before deletion at equal sequence.
#[must_use]
pub fn compare_internal_keys(
    user_cmp: &dyn Fn(&[u8], &[u8]) -> Ordering,
    a: &[u8],
    b: &[u8],
) -> Ordering {
    let a = InternalKeyRef::parse(a).expect("internal key too short");
    let b = InternalKeyRef::parse(b).expect("internal key too short");

    user_cmp(a.user_key, b.user_key).then_with(|| {
        // Larger tag (greater sequence, then Value > Deletion) sorts first.
        pack_tag(b.sequence, b.entry_type).cmp(&pack_tag(a.sequence, a.entry_type))
    })
}

/// Packs `(user_key, snapshot_sequence)` into the internal-key prefix used to probe ordered
/// structures: any probe returns the record with the largest sequence `<= snapshot` for that
/// user key.
#[must_use]
pub fn lookup_key(user_key: &[u8], snapshot: SequenceNumber) -> Vec<u8> {
    // `EntryType::Value` is the type with the numerically largest packed tag at a given sequence
    // number, so seeking to this encoding lands just at or before any real entry with the same
    // user key and a sequence number `<= snapshot`.
    encode_internal_key(user_key, snapshot, EntryType::Value)
}

/// A user key paired with the comparator that orders it, so it can be used directly as a
/// `BTreeMap` key: `std`'s ordered containers have no hook for a runtime comparator, so the
/// comparator travels with each key instead.
#[derive(Clone)]
pub(crate) struct UserKeyOrd(pub Vec<u8>, pub Arc<dyn Comparator>);

impl UserKeyOrd {
    pub fn new(user_key: &[u8], comparator: &Arc<dyn Comparator>) -> Self {
        Self(user_key.to_vec(), Arc::clone(comparator))
    }
}

impl PartialEq for UserKeyOrd {
    fn eq(&self, other: &Self) -> bool {
        self.1.cmp(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for UserKeyOrd {}

impl PartialOrd for UserKeyOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UserKeyOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.1.cmp(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytewise(a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    #[test]
    fn orders_by_user_key_then_sequence_desc() {
        let a = encode_internal_key(b"k1", 5, EntryType::Value);
        let b = encode_internal_key(b"k2", 1, EntryType::Value);
        assert_eq!(compare_internal_keys(&bytewise, &a, &b), Ordering::Less);

        let newer = encode_internal_key(b"k1", 9, EntryType::Value);
        let older = encode_internal_key(b"k1", 3, EntryType::Value);
        assert_eq!(compare_internal_keys(&bytewise, &newer, &older), Ordering::Less);
    }

    #[test]
    fn value_before_deletion_at_equal_sequence() {
        let value = encode_internal_key(b"k", 7, EntryType::Value);
        let deletion = encode_internal_key(b"k", 7, EntryType::Deletion);
        assert_eq!(compare_internal_keys(&bytewise, &value, &deletion), Ordering::Less);
    }

    #[test]
    fn round_trips_through_parse() {
        let encoded = encode_internal_key(b"hello", 42, EntryType::Deletion);
        let parsed = InternalKeyRef::parse(&encoded).unwrap();
        assert_eq!(parsed.user_key, b"hello");
        assert_eq!(parsed.sequence, 42);
        assert_eq!(parsed.entry_type, EntryType::Deletion);
    }
}
