//! The NVM small-value pool.
//!
//! Values below [`Options::nvm_small_value_threshold`] bypass the zero-level record files
//! entirely and live in a pool meant to sit on byte-addressable non-volatile memory. This crate
//! does not bind to a specific NVM allocator library (that binding is the embedding
//! application's concern, the same way the spec treats the memtable and write-ahead log as
//! external collaborators); instead it defines the allocator contract and ships an in-process
//! stand-in so the engine is fully usable without one.
//!
//! [`Options::nvm_small_value_threshold`]: crate::options::Options::nvm_small_value_threshold

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// An opaque handle to a value stored in the pool. Durable across process restarts only if the
/// [`NvmAllocator`] backing the pool is itself durable; the in-memory stand-in is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NvmHandle(u64);

impl NvmHandle {
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }
}

/// The contract an NVM-backed small-value store must satisfy. A production deployment would
/// implement this against a PMDK-style allocator; tests and non-NVM deployments use
/// [`InMemoryNvmPool`].
pub(crate) trait NvmAllocator: Send + Sync {
    fn put(&self, value: &[u8]) -> NvmHandle;
    fn get(&self, handle: NvmHandle) -> Option<Vec<u8>>;
    fn free(&self, handle: NvmHandle);
}

/// A process-local stand-in for an NVM allocator, backed by an ordinary heap map. Correct but
/// offers none of the durability or byte-addressability an actual NVM pool would.
#[derive(Debug, Default)]
pub(crate) struct InMemoryNvmPool {
    next_handle: AtomicU64,
    slots: RwLock<std::collections::HashMap<u64, Vec<u8>>>,
}

impl InMemoryNvmPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NvmAllocator for InMemoryNvmPool {
    fn put(&self, value: &[u8]) -> NvmHandle {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.slots.write().insert(id, value.to_vec());
        NvmHandle(id)
    }

    fn get(&self, handle: NvmHandle) -> Option<Vec<u8>> {
        self.slots.read().get(&handle.0).cloned()
    }

    fn free(&self, handle: NvmHandle) {
        self.slots.write().remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_free_round_trip() {
        let pool = InMemoryNvmPool::new();
        let handle = pool.put(b"small value");
        assert_eq!(pool.get(handle), Some(b"small value".to_vec()));
        pool.free(handle);
        assert_eq!(pool.get(handle), None);
    }
}
