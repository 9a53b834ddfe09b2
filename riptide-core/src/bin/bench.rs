//! Benchmark driver binary
//!
//! `riptide-bench [bench|generate]`, configured through `RIPTIDE_*`
//! and S3 environment variables. `generate` seeds the bucket with
//! uniform NPZ objects; `bench` (the default) reads the dataset for
//! the configured number of epochs and reports throughput.

use std::sync::Arc;

use bytes::Bytes;
use riptide_core::data::{NpzCodec, SampleArray, SampleIndexer};
use riptide_core::storage::{ObjectStore, S3Client, S3Config, S3StoreProvider};
use riptide_core::{BatchLoader, BenchConfig, ThroughputTracker};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mode = std::env::args().nth(1).unwrap_or_else(|| "bench".into());
    let config = BenchConfig::from_env();
    config.validate()?;
    let s3_config = S3Config::from_env(&config.storage_root);

    let run_id = uuid::Uuid::new_v4();
    info!(
        "Starting riptide {} run {} against {}",
        mode, run_id, s3_config.endpoint
    );

    match mode.as_str() {
        "generate" => generate(&config, s3_config).await?,
        "bench" => bench(config, s3_config).await?,
        other => return Err(format!("unknown mode {}", other).into()),
    }

    Ok(())
}

/// Seed the bucket with uniform NPZ objects
async fn generate(
    config: &BenchConfig,
    s3_config: S3Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = S3Client::new(s3_config)?;
    let indexer = SampleIndexer::new(config)?;
    let codec = NpzCodec::default();
    let num_objects = indexer.num_objects();
    let samples_per_object = indexer.samples_per_object() as usize;

    info!(
        "Generating {} objects of {} samples x {} bytes",
        num_objects, samples_per_object, config.record_bytes
    );

    for object_index in 0..num_objects {
        let total = config.record_bytes * samples_per_object;
        let data: Vec<u8> = (0..total).map(|i| (object_index as usize + i) as u8).collect();
        let array = SampleArray::from_parts(
            Bytes::from(data),
            vec![config.record_bytes, samples_per_object],
            1,
        )?;
        let encoded = codec.encode(&array)?;

        let key = indexer.object_key(object_index);
        store.put(&key, encoded).await?;

        if (object_index + 1) % 100 == 0 || object_index + 1 == num_objects {
            info!("Generated {}/{} objects", object_index + 1, num_objects);
        }
    }

    Ok(())
}

/// Read the dataset for the configured epochs and report throughput
async fn bench(config: BenchConfig, s3_config: S3Config) -> Result<(), Box<dyn std::error::Error>> {
    let provider = Arc::new(S3StoreProvider::new(s3_config));
    let tracker = Arc::new(ThroughputTracker::new());
    let mut loader = BatchLoader::new(config.clone(), provider, tracker.clone())?;

    let budget = config.step_budget();

    for epoch in 0..config.epochs {
        loader.set_epoch(epoch);
        loader.read()?;

        let mut batches = 0u64;
        loop {
            match loader.next_batch().await? {
                Some(batch) => {
                    batches += 1;
                    debug!(
                        "Epoch {} batch {} ({} samples, {} bytes)",
                        epoch,
                        batch.batch_idx,
                        batch.len(),
                        batch.nbytes()
                    );
                    if budget > 0 && batches >= budget {
                        loader.finalize();
                        break;
                    }
                }
                None => break,
            }
        }
        info!("Epoch {} read {} batches", epoch, batches);
    }

    let summary = tracker.summary();
    info!("Run complete: {}", summary);
    debug!("Metrics:\n{}", tracker.to_prometheus());
    println!("{}", summary);

    Ok(())
}
