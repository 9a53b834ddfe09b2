//! Reader workers
//!
//! Each worker starts from a configuration snapshot, rebuilds its own
//! view of the shard plan, and reads its assigned batches through a
//! private store connection and decode cache.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, Instrument};

use super::batch::{Sample, SampleBatch};
use super::indexer::SampleIndexer;
use super::reader::{reader_for, SampleReader};
use super::sampler::ShardSampler;
use crate::config::{BenchConfig, ConfigSnapshot};
use crate::error::{Result, RiptideError};
use crate::metrics::ThroughputTracker;
use crate::storage::StoreProvider;

/// Per-epoch shard assignment computed by the orchestrator
///
/// Workers recompute their sub-shard from the restored snapshot and
/// validate it against this record; a disagreement means the snapshot
/// is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardPlan {
    pub epoch: u64,
    pub rank: u32,
    pub comm_size: u32,
    pub num_samples: u64,
    pub batch_size: usize,
    pub num_workers: usize,
    pub fingerprint: u32,
}

impl ShardPlan {
    /// Full batches in the rank's shard (drop-last)
    pub fn num_batches(&self) -> u64 {
        if self.comm_size == 0 || self.batch_size == 0 {
            return 0;
        }
        (self.num_samples / self.comm_size as u64) / self.batch_size as u64
    }
}

/// State owned by one reader worker for its process lifetime
pub struct WorkerState {
    worker_id: i32,
    config: BenchConfig,
    plan: ShardPlan,
    shard: Vec<u64>,
    indexer: SampleIndexer,
    reader: Box<dyn SampleReader>,
    tracker: Arc<ThroughputTracker>,
    samples_read: u64,
    last_key: Option<String>,
}

impl std::fmt::Debug for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerState")
            .field("worker_id", &self.worker_id)
            .field("shard_len", &self.shard.len())
            .field("samples_read", &self.samples_read)
            .field("last_key", &self.last_key)
            .finish_non_exhaustive()
    }
}

impl WorkerState {
    /// Samples in this rank's shard
    pub fn shard_len(&self) -> usize {
        self.shard.len()
    }

    /// Samples this worker has read so far
    pub fn samples_read(&self) -> u64 {
        self.samples_read
    }

    /// Step implied by this worker's read count
    pub fn current_step(&self) -> u64 {
        self.samples_read.div_ceil(self.config.batch_size as u64)
    }

    /// Read one sample by its global index
    pub async fn read_index(&mut self, global_index: u64) -> Result<Sample> {
        let (key, offset) = self.indexer.resolve(global_index)?;

        self.samples_read += 1;
        self.tracker
            .update_step(self.current_step(), self.plan.epoch);
        debug!("Reading sample {}", global_index);

        self.reader.open(&key).await?;
        self.last_key = Some(key.clone());
        let data = self.reader.get_sample(&key, offset)?;

        Ok(Sample {
            index: global_index,
            object_key: key,
            data,
        })
    }

    /// Assemble the shard batch at `batch_idx`
    pub async fn read_batch(&mut self, batch_idx: u64) -> Result<SampleBatch> {
        let batch_size = self.plan.batch_size;
        let start = batch_idx as usize * batch_size;
        debug_assert!(start + batch_size <= self.shard.len());

        let mut samples = Vec::with_capacity(batch_size);
        for position in start..start + batch_size {
            let sample = self.read_index(self.shard[position]).await?;
            samples.push(sample);
        }

        self.tracker.record_batch();
        Ok(SampleBatch {
            batch_idx,
            epoch: self.plan.epoch,
            samples,
        })
    }

    /// Release the decode cache and flush the worker's log context
    pub fn finalize(&mut self) {
        if let Some(key) = self.last_key.take() {
            self.reader.close(&key);
        }
        debug!(
            "Worker {} finalized after {} samples",
            self.worker_id, self.samples_read
        );
    }
}

/// Initialize one worker from a configuration snapshot
///
/// Called exactly once per worker at task start; with zero workers
/// the orchestrator calls it inline with the sentinel id before
/// iteration begins. Restores the configuration, validates it against
/// the shard plan, and builds the worker-owned store and reader.
pub fn worker_init(
    snapshot: &ConfigSnapshot,
    plan: &ShardPlan,
    worker_id: i32,
    provider: &dyn StoreProvider,
    tracker: Arc<ThroughputTracker>,
) -> Result<WorkerState> {
    let config = snapshot.restore()?;

    if snapshot.fingerprint() != plan.fingerprint {
        return Err(RiptideError::ConfigMismatch {
            reason: format!(
                "snapshot fingerprint {:08x} does not match plan fingerprint {:08x}",
                snapshot.fingerprint(),
                plan.fingerprint
            ),
        });
    }
    if config.my_rank != plan.rank
        || config.comm_size != plan.comm_size
        || config.num_samples != plan.num_samples
        || config.batch_size != plan.batch_size
        || config.read_threads != plan.num_workers
    {
        return Err(RiptideError::ConfigMismatch {
            reason: format!(
                "restored config (rank {}/{}, {} samples, batch {}) disagrees with plan \
                 (rank {}/{}, {} samples, batch {})",
                config.my_rank,
                config.comm_size,
                config.num_samples,
                config.batch_size,
                plan.rank,
                plan.comm_size,
                plan.num_samples,
                plan.batch_size,
            ),
        });
    }

    let sampler = ShardSampler::from_config(&config)?;
    let shard = sampler.shard_for(plan.rank, plan.epoch)?;
    let indexer = SampleIndexer::new(&config)?;
    let store = provider.connect(worker_id)?;
    let reader = reader_for(config.format, store, tracker.clone());

    debug!(
        "Worker {} initialized with format {:?} ({} shard samples)",
        worker_id,
        config.format,
        shard.len()
    );

    Ok(WorkerState {
        worker_id,
        config,
        plan: plan.clone(),
        shard,
        indexer,
        reader,
        tracker,
        samples_read: 0,
        last_key: None,
    })
}

/// Worker task body: read assigned batches in order and send them to
/// the orchestrator
///
/// Batch `b` of the rank's shard belongs to worker `b % num_workers`.
/// The bounded channel is the prefetch window: a worker stalls once it
/// is `prefetch_depth` batches ahead of consumption. A failed send
/// means the consumer is gone and the worker stops quietly; a read
/// error is forwarded and ends the worker.
pub async fn run_worker(
    worker_id: i32,
    snapshot: ConfigSnapshot,
    plan: ShardPlan,
    provider: Arc<dyn StoreProvider>,
    tracker: Arc<ThroughputTracker>,
    tx: mpsc::Sender<Result<SampleBatch>>,
) {
    let span = tracing::info_span!("reader_worker", worker_id);
    async move {
        let mut state =
            match worker_init(&snapshot, &plan, worker_id, provider.as_ref(), tracker) {
                Ok(state) => state,
                Err(e) => {
                    error!("Worker {} failed to initialize: {}", worker_id, e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

        let num_batches = plan.num_batches();
        let stride = plan.num_workers.max(1) as u64;
        let mut batch_idx = worker_id as u64;

        while batch_idx < num_batches {
            match state.read_batch(batch_idx).await {
                Ok(batch) => {
                    if tx.send(Ok(batch)).await.is_err() {
                        debug!("Worker {}: consumer dropped, stopping", worker_id);
                        return;
                    }
                }
                Err(e) => {
                    error!("Worker {} failed on batch {}: {}", worker_id, batch_idx, e);
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            batch_idx += stride;
        }

        state.finalize();
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SharedStoreProvider};

    fn plan_for(config: &BenchConfig, snapshot: &ConfigSnapshot) -> ShardPlan {
        ShardPlan {
            epoch: 0,
            rank: config.my_rank,
            comm_size: config.comm_size,
            num_samples: config.num_samples,
            batch_size: config.batch_size,
            num_workers: config.read_threads,
            fingerprint: snapshot.fingerprint(),
        }
    }

    #[test]
    fn test_worker_init_accepts_matching_snapshot() {
        let config = BenchConfig {
            num_samples: 16,
            samples_per_object: 4,
            batch_size: 4,
            read_threads: 1,
            ..Default::default()
        };
        let snapshot = ConfigSnapshot::capture(&config).unwrap();
        let plan = plan_for(&config, &snapshot);
        let provider = SharedStoreProvider::new(Arc::new(MemoryStore::new()));

        let state = worker_init(
            &snapshot,
            &plan,
            0,
            &provider,
            Arc::new(ThroughputTracker::new()),
        )
        .unwrap();
        assert_eq!(state.shard_len(), 16);
        assert_eq!(state.samples_read(), 0);
    }

    #[test]
    fn test_worker_init_rejects_stale_snapshot() {
        let config = BenchConfig {
            num_samples: 16,
            ..Default::default()
        };
        let snapshot = ConfigSnapshot::capture(&config).unwrap();
        let mut plan = plan_for(&config, &snapshot);
        // A plan computed from some other configuration
        plan.fingerprint ^= 1;

        let provider = SharedStoreProvider::new(Arc::new(MemoryStore::new()));
        let err = worker_init(
            &snapshot,
            &plan,
            0,
            &provider,
            Arc::new(ThroughputTracker::new()),
        )
        .unwrap_err();
        assert!(matches!(err, RiptideError::ConfigMismatch { .. }));
    }

    #[test]
    fn test_plan_batches_drop_last() {
        let plan = ShardPlan {
            epoch: 0,
            rank: 0,
            comm_size: 2,
            num_samples: 107,
            batch_size: 10,
            num_workers: 2,
            fingerprint: 0,
        };
        // 53 samples per rank, 5 full batches
        assert_eq!(plan.num_batches(), 5);
    }
}
