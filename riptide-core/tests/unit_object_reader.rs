//! Unit tests for the NPZ object reader's cache and failure semantics

use std::sync::Arc;

use bytes::Bytes;
use riptide_core::data::{reader_for, NpzCodec, SampleArray};
use riptide_core::storage::MemoryStore;
use riptide_core::{FormatKind, RiptideError, ThroughputTracker};

/// Encode an object of `samples` samples, `rows` bytes each
fn npz_object(rows: usize, samples: usize) -> Bytes {
    let data: Vec<u8> = (0..rows * samples).map(|i| i as u8).collect();
    let array = SampleArray::from_parts(Bytes::from(data), vec![rows, samples], 1).unwrap();
    NpzCodec::default().encode(&array).unwrap()
}

fn store_with(key: &str, object: Bytes) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(key, object);
    store
}

#[tokio::test]
async fn test_reopen_same_object_fetches_once() {
    let store = store_with("obj", npz_object(8, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store.clone(), tracker);

    reader.open("obj").await.unwrap();
    reader.open("obj").await.unwrap();
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test]
async fn test_colocated_samples_cost_one_fetch() {
    let store = store_with("obj", npz_object(8, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store.clone(), tracker);

    for offset in 0..4 {
        reader.open("obj").await.unwrap();
        let sample = reader.get_sample("obj", offset).unwrap();
        assert_eq!(sample.len(), 8);
    }
    assert_eq!(store.get_calls(), 1);
}

#[tokio::test]
async fn test_switching_objects_replaces_cache() {
    let store = Arc::new(MemoryStore::new());
    store.insert("a", npz_object(4, 2));
    store.insert("b", npz_object(4, 2));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store.clone(), tracker);

    reader.open("a").await.unwrap();
    reader.open("b").await.unwrap();
    assert_eq!(store.get_calls(), 2);

    // 'a' was evicted; coming back costs another fetch
    reader.open("a").await.unwrap();
    assert_eq!(store.get_calls(), 3);
}

#[tokio::test]
async fn test_offset_out_of_bounds() {
    let store = store_with("obj", npz_object(8, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store, tracker);

    reader.open("obj").await.unwrap();
    let err = reader.get_sample("obj", 4).unwrap_err();
    match err {
        RiptideError::ResolutionError {
            offset, available, ..
        } => {
            assert_eq!(offset, 4);
            assert_eq!(available, 4);
        }
        other => panic!("expected ResolutionError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_get_sample_requires_open() {
    let store = store_with("obj", npz_object(8, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store, tracker);

    let err = reader.get_sample("obj", 0).unwrap_err();
    assert!(matches!(err, RiptideError::ObjectNotOpen { .. }));
}

#[tokio::test]
async fn test_close_releases_cache() {
    let store = store_with("obj", npz_object(8, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store.clone(), tracker);

    // Closing something never opened is a no-op
    reader.close("obj");

    reader.open("obj").await.unwrap();
    reader.close("obj");
    let err = reader.get_sample("obj", 0).unwrap_err();
    assert!(matches!(err, RiptideError::ObjectNotOpen { .. }));

    reader.open("obj").await.unwrap();
    assert_eq!(store.get_calls(), 2);
}

#[tokio::test]
async fn test_undecodable_object_is_a_codec_error() {
    let store = store_with("obj", Bytes::from_static(b"not an archive"));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store, tracker);

    let err = reader.open("obj").await.unwrap_err();
    assert!(matches!(err, RiptideError::CodecError { .. }));
    assert!(err.is_corruption());
}

#[tokio::test]
async fn test_missing_object_propagates_fetch_error() {
    let store = Arc::new(MemoryStore::new());
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store, tracker);

    let err = reader.open("gone").await.unwrap_err();
    assert!(matches!(err, RiptideError::ObjectNotFound { .. }));
    assert!(err.is_fetch());
}

#[tokio::test]
async fn test_tracker_observes_sample_bytes() {
    let store = store_with("obj", npz_object(16, 4));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut reader = reader_for(FormatKind::Npz, store, tracker.clone());

    reader.open("obj").await.unwrap();
    reader.get_sample("obj", 0).unwrap();
    reader.get_sample("obj", 1).unwrap();

    assert_eq!(tracker.samples_read(), 2);
    assert_eq!(tracker.sample_bytes_read(), 32);
    assert_eq!(tracker.object_fetches(), 1);
}
