//! Benchmark configuration
//!
//! One immutable configuration value drives the orchestrator and every
//! reader worker. Workers never see the orchestrator's copy directly:
//! they restore their own from a [`ConfigSnapshot`] captured before the
//! workers are launched, so shard boundaries and codec choice are
//! consistent across workers and ranks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, RiptideError};

/// Which split of the dataset a loader reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetType {
    Train,
    Valid,
}

impl DatasetType {
    /// Path segment used in object keys
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::Train => "train",
            DatasetType::Valid => "valid",
        }
    }
}

/// Container format of the remote objects
///
/// Selects the reader implementation; the NPZ archive format is the
/// only variant currently wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Npz,
}

/// Benchmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Bucket holding the dataset
    pub storage_root: String,
    /// Key prefix under the bucket
    pub data_folder: String,
    /// Object container format
    pub format: FormatKind,
    /// Split to read
    pub dataset_type: DatasetType,
    /// This process's rank
    pub my_rank: u32,
    /// Number of ranks reading the dataset
    pub comm_size: u32,
    /// Logical dataset size in samples
    pub num_samples: u64,
    /// Samples stored per object; uniform across the dataset
    pub samples_per_object: u64,
    /// Bytes per sample, fixed by the dataset-generation step
    pub record_bytes: usize,
    /// Parallel reader workers per rank (0 = fetch inline)
    pub read_threads: usize,
    /// Target total in-flight samples across workers
    pub prefetch_size: usize,
    /// Samples per emitted batch
    pub batch_size: usize,
    /// Epochs to run
    pub epochs: u64,
    /// Per-epoch batch budget for the train split (0 = whole shard)
    pub training_steps: u64,
    /// Per-epoch batch budget for the valid split (0 = whole shard)
    pub eval_steps: u64,
    /// Shuffle each rank's shard per epoch
    pub shuffle: bool,
    /// Base seed for epoch-seeded shuffling
    pub seed: u64,
    /// Object filename pattern; `{index}` and `{total}` placeholders
    pub object_pattern: Option<String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            storage_root: "riptide".into(),
            data_folder: "data".into(),
            format: FormatKind::Npz,
            dataset_type: DatasetType::Train,
            my_rank: 0,
            comm_size: 1,
            num_samples: 0,
            samples_per_object: 1,
            record_bytes: 256 * 1024,
            read_threads: 4,
            prefetch_size: 8,
            batch_size: 8,
            epochs: 1,
            training_steps: 0,
            eval_steps: 0,
            shuffle: false,
            seed: 42,
            object_pattern: None,
        }
    }
}

impl BenchConfig {
    /// Build a configuration from `RIPTIDE_*` environment variables,
    /// falling back to defaults for anything unset or unparsable
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RIPTIDE_STORAGE_ROOT") {
            config.storage_root = val;
        }
        if let Ok(val) = std::env::var("RIPTIDE_DATA_FOLDER") {
            config.data_folder = val;
        }
        if let Ok(val) = std::env::var("RIPTIDE_FORMAT") {
            if val.eq_ignore_ascii_case("npz") {
                config.format = FormatKind::Npz;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_DATASET_TYPE") {
            match val.to_lowercase().as_str() {
                "train" => config.dataset_type = DatasetType::Train,
                "valid" | "eval" => config.dataset_type = DatasetType::Valid,
                _ => {}
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_MY_RANK") {
            if let Ok(v) = val.parse() {
                config.my_rank = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_COMM_SIZE") {
            if let Ok(v) = val.parse() {
                config.comm_size = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_NUM_SAMPLES") {
            if let Ok(v) = val.parse() {
                config.num_samples = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_SAMPLES_PER_OBJECT") {
            if let Ok(v) = val.parse() {
                config.samples_per_object = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_RECORD_BYTES") {
            if let Ok(v) = val.parse() {
                config.record_bytes = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_READ_THREADS") {
            if let Ok(v) = val.parse() {
                config.read_threads = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_PREFETCH_SIZE") {
            if let Ok(v) = val.parse() {
                config.prefetch_size = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_BATCH_SIZE") {
            if let Ok(v) = val.parse() {
                config.batch_size = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_EPOCHS") {
            if let Ok(v) = val.parse() {
                config.epochs = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_TRAINING_STEPS") {
            if let Ok(v) = val.parse() {
                config.training_steps = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_EVAL_STEPS") {
            if let Ok(v) = val.parse() {
                config.eval_steps = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_SHUFFLE") {
            if let Ok(v) = val.parse() {
                config.shuffle = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_SEED") {
            if let Ok(v) = val.parse() {
                config.seed = v;
            }
        }
        if let Ok(val) = std::env::var("RIPTIDE_OBJECT_PATTERN") {
            config.object_pattern = Some(val);
        }

        config
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage_root.is_empty() {
            return Err(RiptideError::ConfigError {
                reason: "storage_root must not be empty".into(),
            });
        }
        if self.comm_size == 0 {
            return Err(RiptideError::ConfigError {
                reason: "comm_size must be greater than 0".into(),
            });
        }
        if self.my_rank >= self.comm_size {
            return Err(RiptideError::ConfigError {
                reason: format!(
                    "my_rank {} out of range for comm_size {}",
                    self.my_rank, self.comm_size
                ),
            });
        }
        if self.batch_size == 0 {
            return Err(RiptideError::ConfigError {
                reason: "batch_size must be greater than 0".into(),
            });
        }
        if self.samples_per_object == 0 {
            return Err(RiptideError::ConfigError {
                reason: "samples_per_object must be greater than 0".into(),
            });
        }
        if self.record_bytes == 0 {
            return Err(RiptideError::ConfigError {
                reason: "record_bytes must be greater than 0".into(),
            });
        }
        let cpus = num_cpus::get();
        if self.read_threads > cpus {
            warn!(
                "read_threads {} exceeds available cores {}",
                self.read_threads, cpus
            );
        }
        Ok(())
    }

    /// Samples assigned to each rank (drop-last across ranks)
    pub fn shard_len(&self) -> u64 {
        self.num_samples / self.comm_size as u64
    }

    /// Objects backing the dataset
    pub fn num_objects(&self) -> u64 {
        self.num_samples.div_ceil(self.samples_per_object)
    }

    /// Per-epoch batch budget for the configured split
    pub fn step_budget(&self) -> u64 {
        match self.dataset_type {
            DatasetType::Train => self.training_steps,
            DatasetType::Valid => self.eval_steps,
        }
    }
}

/// Immutable serialized copy of [`BenchConfig`]
///
/// Captured once per `read()` invocation by the orchestrator and
/// restored exactly once per worker start. The fingerprint ties a
/// worker's restored configuration to the shard plan the orchestrator
/// computed from the same bytes.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    payload: Bytes,
    fingerprint: u32,
}

impl ConfigSnapshot {
    /// Serialize a configuration into a snapshot
    pub fn capture(config: &BenchConfig) -> Result<Self> {
        let payload = serde_json::to_vec(config).map_err(|e| RiptideError::SnapshotError {
            reason: format!("failed to serialize config: {}", e),
        })?;
        let fingerprint = crc32c::crc32c(&payload);
        Ok(Self {
            payload: Bytes::from(payload),
            fingerprint,
        })
    }

    /// Reconstruct the configuration carried by this snapshot
    pub fn restore(&self) -> Result<BenchConfig> {
        serde_json::from_slice(&self.payload).map_err(|e| RiptideError::SnapshotError {
            reason: format!("failed to deserialize config: {}", e),
        })
    }

    /// Checksum of the serialized payload
    pub fn fingerprint(&self) -> u32 {
        self.fingerprint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_validates() {
        assert!(BenchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_comm_size() {
        let config = BenchConfig {
            comm_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_rank_out_of_range() {
        let config = BenchConfig {
            my_rank: 2,
            comm_size: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let config = BenchConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shard_len_drops_remainder() {
        let config = BenchConfig {
            num_samples: 100,
            comm_size: 3,
            ..Default::default()
        };
        assert_eq!(config.shard_len(), 33);
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let config = BenchConfig {
            num_samples: 1000,
            comm_size: 4,
            my_rank: 2,
            ..Default::default()
        };
        let snapshot = ConfigSnapshot::capture(&config).unwrap();
        let restored = snapshot.restore().unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn test_snapshot_fingerprint_is_stable() {
        let config = BenchConfig::default();
        let a = ConfigSnapshot::capture(&config).unwrap();
        let b = ConfigSnapshot::capture(&config).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_snapshot_fingerprint_tracks_config() {
        let a = ConfigSnapshot::capture(&BenchConfig::default()).unwrap();
        let b = ConfigSnapshot::capture(&BenchConfig {
            num_samples: 7,
            ..Default::default()
        })
        .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
