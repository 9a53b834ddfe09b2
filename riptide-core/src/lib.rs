//! Riptide Core - sharded remote-object data loading
//!
//! This crate emulates the I/O access pattern of distributed ML
//! training against an object store:
//! - Deterministic sharding of a sample index space across ranks
//! - Parallel per-rank reader workers with bounded prefetch
//! - Object fetch + decode with same-object caching
//! - Step/epoch accounting and throughput reporting

pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod storage;

pub use config::{BenchConfig, ConfigSnapshot, DatasetType, FormatKind};
pub use data::BatchLoader;
pub use error::{Result, RiptideError};
pub use metrics::ThroughputTracker;

/// Prefetch depth used when the configured budget resolves to zero
pub const DEFAULT_PREFETCH_DEPTH: usize = 2;

/// Worker id reported when fetching inline on the calling task
pub const INLINE_WORKER_ID: i32 = -1;
