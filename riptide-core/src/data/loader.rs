//! Batch loading orchestration
//!
//! The loader owns one epoch at a time: `read` captures a
//! configuration snapshot, computes the shard plan, and launches the
//! worker pool; `next_batch` drains ready batches in global batch
//! order; `finalize` tears everything down. The sequence is lazy,
//! finite, and non-restartable: a fresh epoch needs a fresh `read`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::batch::SampleBatch;
use super::worker::{run_worker, worker_init, ShardPlan, WorkerState};
use crate::config::{BenchConfig, ConfigSnapshot};
use crate::error::{Result, RiptideError};
use crate::metrics::ThroughputTracker;
use crate::storage::StoreProvider;
use crate::{DEFAULT_PREFETCH_DEPTH, INLINE_WORKER_ID};

/// Per-worker prefetch depth from the configured in-flight sample
/// budget
///
/// The budget is divided across workers; a resolved depth of zero
/// falls back to [`DEFAULT_PREFETCH_DEPTH`].
pub fn resolve_prefetch_depth(prefetch_size: usize, read_threads: usize) -> usize {
    let depth = if read_threads >= 1 {
        prefetch_size.div_ceil(read_threads)
    } else {
        prefetch_size
    };
    if depth == 0 {
        DEFAULT_PREFETCH_DEPTH
    } else {
        depth
    }
}

struct WorkerHandle {
    rx: mpsc::Receiver<Result<SampleBatch>>,
    handle: JoinHandle<()>,
}

enum RunMode {
    /// `read_threads == 0`: fetch on the calling task
    Inline { state: WorkerState },
    /// Parallel workers feeding bounded channels
    Pool { workers: Vec<WorkerHandle> },
}

struct RunState {
    mode: RunMode,
    num_batches: u64,
    next_batch: u64,
}

/// Orchestrates parallel reader workers into an ordered batch stream
pub struct BatchLoader {
    config: BenchConfig,
    provider: Arc<dyn StoreProvider>,
    tracker: Arc<ThroughputTracker>,
    epoch: u64,
    run: Option<RunState>,
}

impl BatchLoader {
    /// Create a loader; validates the configuration up front
    pub fn new(
        config: BenchConfig,
        provider: Arc<dyn StoreProvider>,
        tracker: Arc<ThroughputTracker>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            provider,
            tracker,
            epoch: 0,
            run: None,
        })
    }

    /// Current epoch number
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Position the loader at a specific epoch before `read`
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    /// Build the shard plan and worker pool for the current epoch
    ///
    /// Must run inside a tokio runtime. Any previous run is torn down
    /// and rebuilt wholesale; the snapshot is captured fresh so every
    /// worker observes the configuration the plan was computed from.
    pub fn read(&mut self) -> Result<()> {
        self.teardown_run();

        let snapshot = ConfigSnapshot::capture(&self.config)?;
        let plan = ShardPlan {
            epoch: self.epoch,
            rank: self.config.my_rank,
            comm_size: self.config.comm_size,
            num_samples: self.config.num_samples,
            batch_size: self.config.batch_size,
            num_workers: self.config.read_threads,
            fingerprint: snapshot.fingerprint(),
        };
        let num_batches = plan.num_batches();
        debug!(
            "Rank {} will read {} batches of {} in epoch {} (step budget {})",
            plan.rank,
            num_batches,
            plan.batch_size,
            plan.epoch,
            self.config.step_budget()
        );

        let mode = if self.config.read_threads == 0 {
            let state = worker_init(
                &snapshot,
                &plan,
                INLINE_WORKER_ID,
                self.provider.as_ref(),
                self.tracker.clone(),
            )?;
            RunMode::Inline { state }
        } else {
            let depth =
                resolve_prefetch_depth(self.config.prefetch_size, self.config.read_threads);
            debug!(
                "Launching {} workers with prefetch depth {}",
                self.config.read_threads, depth
            );

            let mut workers = Vec::with_capacity(self.config.read_threads);
            for worker_id in 0..self.config.read_threads {
                let (tx, rx) = mpsc::channel(depth);
                let handle = tokio::spawn(run_worker(
                    worker_id as i32,
                    snapshot.clone(),
                    plan.clone(),
                    self.provider.clone(),
                    self.tracker.clone(),
                    tx,
                ));
                workers.push(WorkerHandle { rx, handle });
            }
            RunMode::Pool { workers }
        };

        self.run = Some(RunState {
            mode,
            num_batches,
            next_batch: 0,
        });
        Ok(())
    }

    /// The next batch of the epoch, or `Ok(None)` once the shard is
    /// exhausted
    ///
    /// Batches arrive in global batch order, round-robined across
    /// workers. The first worker error ends the read: it is returned
    /// here, the pool is torn down, and no further batches are
    /// yielded. Exhaustion advances the epoch number.
    pub async fn next_batch(&mut self) -> Result<Option<SampleBatch>> {
        let Some(run) = self.run.as_mut() else {
            return Err(RiptideError::DataExhausted);
        };

        if run.next_batch >= run.num_batches {
            self.teardown_run();
            self.epoch += 1;
            debug!("Epoch {} complete", self.epoch - 1);
            return Ok(None);
        }

        let outcome = match &mut run.mode {
            RunMode::Inline { state } => state.read_batch(run.next_batch).await,
            RunMode::Pool { workers } => {
                let worker = (run.next_batch % workers.len() as u64) as usize;
                match workers[worker].rx.recv().await {
                    Some(result) => result,
                    None => Err(RiptideError::Internal {
                        message: format!("worker {} terminated unexpectedly", worker),
                    }),
                }
            }
        };
        let outcome = outcome.map(|batch| {
            debug_assert_eq!(batch.batch_idx, run.next_batch);
            run.next_batch += 1;
            batch
        });

        match outcome {
            Ok(batch) => Ok(Some(batch)),
            Err(e) => {
                self.teardown_run();
                Err(e)
            }
        }
    }

    /// Release all worker resources
    ///
    /// Best-effort cleanup with no ordering guarantee against in-flight
    /// work; safe to call at any point, including mid-epoch.
    pub fn finalize(&mut self) {
        self.teardown_run();
        debug!("Loader finalized");
    }

    fn teardown_run(&mut self) {
        if let Some(run) = self.run.take() {
            match run.mode {
                RunMode::Inline { mut state } => state.finalize(),
                RunMode::Pool { workers } => {
                    for worker in workers {
                        worker.handle.abort();
                    }
                }
            }
        }
    }
}

impl Drop for BatchLoader {
    fn drop(&mut self) {
        self.teardown_run();
    }
}
