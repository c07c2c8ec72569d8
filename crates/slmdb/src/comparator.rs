//! User-key comparator: a total order over raw user key bytes, consumed everywhere internal
//! keys are ordered.

use std::cmp::Ordering;
use std::sync::Arc;

pub trait Comparator: Send + Sync {
    /// Identifies the comparator so that a database cannot accidentally be reopened with a
    /// comparator that orders keys differently than the one it was created with.
    fn id(&self) -> &'static str;

    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Returns a short key in `[from, to)`, used to keep index separator keys small. The default
    /// implementation is always correct, just not maximally short.
    fn find_shortest_separator(&self, from: &[u8], _to: &[u8]) -> Vec<u8> {
        from.to_vec()
    }

    /// Returns a short key `>= key`. The default implementation is always correct.
    fn find_shortest_successor(&self, key: &[u8]) -> Vec<u8> {
        key.to_vec()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    #[inline]
    fn id(&self) -> &'static str {
        "slmdb.BytewiseComparator"
    }

    #[inline]
    fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }

    fn find_shortest_separator(&self, from: &[u8], to: &[u8]) -> Vec<u8> {
        let common = from.iter().zip(to).take_while(|(a, b)| a == b).count();

        if common == from.len() || common >= to.len() {
            return from.to_vec();
        }

        let mut shortened = from[..=common].to_vec();
        let can_bump = shortened[common] < 0xff && shortened[common] + 1 < to[common];
        if can_bump {
            shortened[common] += 1;
            shortened
        } else {
            from.to_vec()
        }
    }

    fn find_shortest_successor(&self, key: &[u8]) -> Vec<u8> {
        for (i, &byte) in key.iter().enumerate() {
            if byte != 0xff {
                let mut successor = key[..=i].to_vec();
                successor[i] += 1;
                return successor;
            }
        }
        key.to_vec()
    }
}

macro_rules! forward_comparator {
    ($wrapper:ty) => {
        impl Comparator for $wrapper {
            #[inline]
            fn id(&self) -> &'static str {
                self.as_ref().id()
            }

            #[inline]
            fn cmp(&self, a: &[u8], b: &[u8]) -> Ordering {
                self.as_ref().cmp(a, b)
            }

            #[inline]
            fn find_shortest_separator(&self, from: &[u8], to: &[u8]) -> Vec<u8> {
                self.as_ref().find_shortest_separator(from, to)
            }

            #[inline]
            fn find_shortest_successor(&self, key: &[u8]) -> Vec<u8> {
                self.as_ref().find_shortest_successor(key)
            }
        }
    };
}

forward_comparator!(Box<dyn Comparator>);
forward_comparator!(Arc<dyn Comparator>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytewise_orders_lexicographically() {
        let cmp = BytewiseComparator;
        assert_eq!(cmp.cmp(b"a", b"b"), Ordering::Less);
        assert_eq!(cmp.cmp(b"ab", b"a"), Ordering::Greater);
        assert_eq!(cmp.cmp(b"x", b"x"), Ordering::Equal);
    }

    #[test]
    fn separator_stays_in_range() {
        let cmp = BytewiseComparator;
        let sep = cmp.find_shortest_separator(b"abc", b"abd");
        assert!(sep.as_slice() >= b"abc".as_slice());
        assert!(sep.as_slice() < b"abd".as_slice());
    }
}
