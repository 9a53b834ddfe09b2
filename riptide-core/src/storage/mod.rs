//! Object storage backends
//!
//! Key-addressable blob stores behind the [`ObjectStore`] trait, plus
//! the per-worker connection policy: every reader worker owns its own
//! client, obtained through a [`StoreProvider`].

pub mod memory;
pub mod s3;

pub use memory::MemoryStore;
pub use s3::{S3Client, S3Config};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Key-addressable blob store
///
/// Keys are POSIX-style paths rooted at the configured bucket. `get`
/// is a single blocking call with no partial-range reads; any retry
/// policy lives behind this trait, not in front of it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Store an object
    async fn put(&self, key: &str, data: Bytes) -> Result<()>;

    /// Check whether an object exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// List object keys under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete every object under a prefix
    async fn delete(&self, prefix: &str) -> Result<()>;
}

/// Hands each worker its own store connection
///
/// Connections are never shared across workers; each worker's client
/// and decode cache are private to it.
pub trait StoreProvider: Send + Sync {
    /// Build or hand out a store for the given worker
    fn connect(&self, worker_id: i32) -> Result<Arc<dyn ObjectStore>>;
}

/// Builds a fresh [`S3Client`] per worker
pub struct S3StoreProvider {
    config: S3Config,
}

impl S3StoreProvider {
    /// Create a provider from client configuration
    pub fn new(config: S3Config) -> Self {
        Self { config }
    }
}

impl StoreProvider for S3StoreProvider {
    fn connect(&self, _worker_id: i32) -> Result<Arc<dyn ObjectStore>> {
        Ok(Arc::new(S3Client::new(self.config.clone())?))
    }
}

/// Hands the same store to every worker
///
/// For in-memory stores and tests, where a shared backend is the
/// point rather than a hazard.
pub struct SharedStoreProvider {
    store: Arc<dyn ObjectStore>,
}

impl SharedStoreProvider {
    /// Wrap an existing store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

impl StoreProvider for SharedStoreProvider {
    fn connect(&self, _worker_id: i32) -> Result<Arc<dyn ObjectStore>> {
        Ok(self.store.clone())
    }
}
