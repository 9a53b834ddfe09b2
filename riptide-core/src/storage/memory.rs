//! In-memory object store
//!
//! Backing store for tests and local smoke runs. Counts `get` calls
//! so cache behavior in front of it can be asserted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::ObjectStore;
use crate::error::{Result, RiptideError};

/// Map-backed object store
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Bytes>>,
    get_calls: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            get_calls: AtomicU64::new(0),
        }
    }

    /// Insert an object without going through the async interface
    pub fn insert(&self, key: impl Into<String>, data: Bytes) {
        self.objects.write().insert(key.into(), data);
    }

    /// Number of `get` calls served so far
    pub fn get_calls(&self) -> u64 {
        self.get_calls.load(Ordering::Relaxed)
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.get_calls.fetch_add(1, Ordering::Relaxed);
        self.objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| RiptideError::ObjectNotFound { key: key.into() })
    }

    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.objects.write().insert(key.into(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, prefix: &str) -> Result<()> {
        self.objects.write().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_counts_calls() {
        let store = MemoryStore::new();
        store.insert("a", Bytes::from_static(b"1"));

        assert_eq!(store.get_calls(), 0);
        store.get("a").await.unwrap();
        store.get("a").await.unwrap();
        assert_eq!(store.get_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_key() {
        let store = MemoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, RiptideError::ObjectNotFound { .. }));
    }

    #[tokio::test]
    async fn test_list_and_delete_by_prefix() {
        let store = MemoryStore::new();
        store.insert("data/train/a", Bytes::from_static(b"1"));
        store.insert("data/train/b", Bytes::from_static(b"2"));
        store.insert("data/valid/c", Bytes::from_static(b"3"));

        let keys = store.list("data/train/").await.unwrap();
        assert_eq!(keys, vec!["data/train/a", "data/train/b"]);

        store.delete("data/train/").await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.exists("data/valid/c").await.unwrap());
    }
}
