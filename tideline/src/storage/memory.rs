//! In-memory storage backend.

use dashmap::DashMap;

use super::{BoxFuture, Storage, StorageError};

/// A [`Storage`] backend over a concurrent hash map.
///
/// Nothing survives a restart; this backend exists for tests and for
/// embedders that want the runtime's caching and queueing semantics without
/// durability (kiosk displays, short-lived sessions).
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn set(&self, key: &str, value: Vec<u8>) -> BoxFuture<'_, Result<(), StorageError>> {
        let key = key.to_string();
        Box::pin(async move {
            self.entries.insert(key, value);
            Ok(())
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Option<Vec<u8>>, StorageError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.get(&key).map(|v| v.value().clone())) })
    }

    fn delete(&self, key: &str) -> BoxFuture<'_, Result<bool, StorageError>> {
        let key = key.to_string();
        Box::pin(async move { Ok(self.entries.remove(&key).is_some()) })
    }
}
