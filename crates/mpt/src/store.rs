//! The backing-store contract consumed by the trie, and the in-memory
//! implementation. Disk engines (LevelDB, RocksDB) live behind the same four
//! operations and are supplied by the embedding process.

use crate::{StoreError, StoreResult};
use alloy_primitives::B256;
use std::{collections::HashMap, sync::RwLock};

/// A content-addressed byte store: keys are 32-byte hashes, values arbitrary
/// bytes. Implementations must be safe for concurrent `get` and for batched
/// `put`, and durable once `put` returns.
pub trait TrieStore: Send + Sync {
    /// Fetches the value at `key`, if present.
    fn get(&self, key: &B256) -> StoreResult<Option<Vec<u8>>>;

    /// Stores `value` at `key`.
    fn put(&self, key: B256, value: Vec<u8>) -> StoreResult<()>;

    /// Fetches the value at `key`, failing with [StoreError::KeyNotFound] when
    /// absent.
    fn get_or_raise(&self, key: &B256) -> StoreResult<Vec<u8>> {
        self.get(key)?.ok_or(StoreError::KeyNotFound(*key))
    }

    /// Stores every pair, flushing in chunks of `chunk` entries.
    fn batch_put(&self, items: Vec<(B256, Vec<u8>)>, chunk: usize) -> StoreResult<()> {
        for piece in items.chunks(chunk.max(1)) {
            for (key, value) in piece {
                self.put(*key, value.clone())?;
            }
        }
        Ok(())
    }
}

/// A hash-table store. The default backing for tests and `--datadir`-less runs.
#[derive(Debug, Default)]
pub struct MemoryTrieStore {
    inner: RwLock<HashMap<B256, Vec<u8>>>,
}

impl MemoryTrieStore {
    /// Constructs an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of persisted entries.
    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").len()
    }

    /// True when nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrieStore for MemoryTrieStore {
    fn get(&self, key: &B256) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.read().expect("store lock poisoned").get(key).cloned())
    }

    fn put(&self, key: B256, value: Vec<u8>) -> StoreResult<()> {
        self.inner.write().expect("store lock poisoned").insert(key, value);
        Ok(())
    }

    fn batch_put(&self, items: Vec<(B256, Vec<u8>)>, _chunk: usize) -> StoreResult<()> {
        self.inner.write().expect("store lock poisoned").extend(items);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use alloy_primitives::keccak256;

    #[test]
    fn test_get_or_raise() {
        let store = MemoryTrieStore::new();
        let key = keccak256(b"missing");
        assert_eq!(store.get_or_raise(&key), Err(StoreError::KeyNotFound(key)));

        store.put(key, b"present".to_vec()).unwrap();
        assert_eq!(store.get_or_raise(&key).unwrap(), b"present");
    }

    #[test]
    fn test_batch_put() {
        let store = MemoryTrieStore::new();
        let items: Vec<_> =
            (0u8..10).map(|i| (keccak256([i]), vec![i])).collect();
        store.batch_put(items, 3).unwrap();
        assert_eq!(store.len(), 10);
        assert_eq!(store.get(&keccak256([7u8])).unwrap(), Some(vec![7]));
    }
}
