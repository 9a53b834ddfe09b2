//! Data loading pipeline
//!
//! Index resolution, shard sampling, object reading, and batch
//! orchestration.

pub mod batch;
pub mod codec;
pub mod indexer;
pub mod loader;
pub mod reader;
pub mod sampler;
pub mod worker;

pub use batch::{Sample, SampleBatch};
pub use codec::{NpzCodec, SampleArray, SampleCodec};
pub use indexer::SampleIndexer;
pub use loader::{resolve_prefetch_depth, BatchLoader};
pub use reader::{reader_for, NpzObjectReader, SampleReader};
pub use sampler::ShardSampler;
pub use worker::{worker_init, ShardPlan, WorkerState};
