//! Remote object readers
//!
//! A reader fetches one object at a time from the blob store, decodes
//! it through the sample codec, and serves intra-object samples out of
//! the decoded cache. The cache holds exactly the current object:
//! consecutive same-object reads cost one fetch, and unrelated samples
//! evict it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::codec::{NpzCodec, SampleArray, SampleCodec};
use crate::config::FormatKind;
use crate::error::{Result, RiptideError};
use crate::metrics::ThroughputTracker;
use crate::storage::ObjectStore;

/// Per-format sample reader
///
/// State machine per object: Closed → Open → Closed. `get_sample`
/// requires a preceding `open` for the same key; `close` is a no-op
/// when nothing matching is open.
#[async_trait]
pub trait SampleReader: Send {
    /// Fetch and decode an object, reusing the cache when the key is
    /// already open
    async fn open(&mut self, key: &str) -> Result<()>;

    /// The decoded sample at `offset` within an open object
    fn get_sample(&mut self, key: &str, offset: usize) -> Result<Bytes>;

    /// Release the cache entry for `key`
    fn close(&mut self, key: &str);
}

/// Build the reader for a declared object format
pub fn reader_for(
    format: FormatKind,
    store: Arc<dyn ObjectStore>,
    tracker: Arc<ThroughputTracker>,
) -> Box<dyn SampleReader> {
    match format {
        FormatKind::Npz => Box::new(NpzObjectReader::new(store, NpzCodec::default(), tracker)),
    }
}

struct CachedObject {
    key: String,
    array: SampleArray,
}

/// Reader for NPZ objects held in a blob store
pub struct NpzObjectReader {
    store: Arc<dyn ObjectStore>,
    codec: NpzCodec,
    tracker: Arc<ThroughputTracker>,
    cached: Option<CachedObject>,
}

impl NpzObjectReader {
    /// Create a reader over the given store
    pub fn new(
        store: Arc<dyn ObjectStore>,
        codec: NpzCodec,
        tracker: Arc<ThroughputTracker>,
    ) -> Self {
        Self {
            store,
            codec,
            tracker,
            cached: None,
        }
    }
}

#[async_trait]
impl SampleReader for NpzObjectReader {
    async fn open(&mut self, key: &str) -> Result<()> {
        if self.cached.as_ref().is_some_and(|c| c.key == key) {
            return Ok(());
        }

        let started = Instant::now();
        // Fetch failures propagate unmodified; retry policy, if any,
        // lives in the store
        let raw = self.store.get(key).await?;
        self.tracker
            .record_fetch(started.elapsed().as_secs_f64(), raw.len() as u64);

        let array = self.codec.decode(key, &raw)?;
        debug!(
            "Opened {} ({} bytes, {} samples)",
            key,
            array.nbytes(),
            array.num_samples()
        );
        self.cached = Some(CachedObject {
            key: key.into(),
            array,
        });
        Ok(())
    }

    fn get_sample(&mut self, key: &str, offset: usize) -> Result<Bytes> {
        let cached = self
            .cached
            .as_ref()
            .filter(|c| c.key == key)
            .ok_or_else(|| RiptideError::ObjectNotOpen { key: key.into() })?;

        let data = cached
            .array
            .sample(offset)
            .ok_or_else(|| RiptideError::ResolutionError {
                key: key.into(),
                offset,
                available: cached.array.num_samples(),
            })?;

        self.tracker.record_sample(data.len() as u64);
        Ok(data)
    }

    fn close(&mut self, key: &str) {
        if self.cached.as_ref().is_some_and(|c| c.key == key) {
            self.cached = None;
        }
    }
}
