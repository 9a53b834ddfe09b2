//! Sample index resolution
//!
//! Stable mapping from a global sample index to the object holding it
//! and the sample's offset inside that object.

use crate::config::BenchConfig;
use crate::error::{Result, RiptideError};

/// Default object filename convention, shared with the dataset
/// generator
pub const DEFAULT_OBJECT_PATTERN: &str = "img_{index}_of_{total}.npz";

/// Maps global sample indices to (object key, intra-object offset)
///
/// Assumes every object holds the same number of samples. This is a
/// deliberate restriction, not an oversight: the dataset-generation
/// step guarantees uniformity, and resolution stays pure index
/// arithmetic because of it. Variable-length objects would need a
/// manifest lookup instead.
#[derive(Debug, Clone)]
pub struct SampleIndexer {
    num_samples: u64,
    samples_per_object: u64,
    num_objects: u64,
    key_prefix: String,
    pattern: String,
}

impl SampleIndexer {
    /// Build an indexer for the configured dataset
    pub fn new(config: &BenchConfig) -> Result<Self> {
        if config.samples_per_object == 0 {
            return Err(RiptideError::InvalidShardSpec {
                reason: "samples_per_object must be greater than 0".into(),
            });
        }
        Ok(Self {
            num_samples: config.num_samples,
            samples_per_object: config.samples_per_object,
            num_objects: config.num_objects(),
            key_prefix: format!("{}/{}", config.data_folder, config.dataset_type.as_str()),
            pattern: config
                .object_pattern
                .clone()
                .unwrap_or_else(|| DEFAULT_OBJECT_PATTERN.into()),
        })
    }

    /// Objects backing the dataset
    pub fn num_objects(&self) -> u64 {
        self.num_objects
    }

    /// Samples held by every object
    pub fn samples_per_object(&self) -> u64 {
        self.samples_per_object
    }

    /// Key of the object at `object_index`
    pub fn object_key(&self, object_index: u64) -> String {
        let name = self
            .pattern
            .replace("{index}", &format!("{:07}", object_index))
            .replace("{total}", &format!("{:07}", self.num_objects));
        format!("{}/{}", self.key_prefix, name)
    }

    /// Resolve a global sample index to its object key and offset
    pub fn resolve(&self, global_index: u64) -> Result<(String, usize)> {
        if global_index >= self.num_samples {
            return Err(RiptideError::SampleOutOfRange {
                index: global_index,
                num_samples: self.num_samples,
            });
        }
        let object_index = global_index / self.samples_per_object;
        let offset = (global_index % self.samples_per_object) as usize;
        Ok((self.object_key(object_index), offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatasetType;

    fn indexer(num_samples: u64, samples_per_object: u64) -> SampleIndexer {
        SampleIndexer::new(&BenchConfig {
            num_samples,
            samples_per_object,
            data_folder: "data".into(),
            dataset_type: DatasetType::Train,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_resolve_offsets() {
        let idx = indexer(16, 4);
        assert_eq!(idx.num_objects(), 4);

        let (key, offset) = idx.resolve(0).unwrap();
        assert_eq!(key, "data/train/img_0000000_of_0000004.npz");
        assert_eq!(offset, 0);

        let (key, offset) = idx.resolve(6).unwrap();
        assert_eq!(key, "data/train/img_0000001_of_0000004.npz");
        assert_eq!(offset, 2);

        let (key, offset) = idx.resolve(15).unwrap();
        assert_eq!(key, "data/train/img_0000003_of_0000004.npz");
        assert_eq!(offset, 3);
    }

    #[test]
    fn test_colocated_samples_share_a_key() {
        let idx = indexer(8, 4);
        let keys: Vec<String> = (0..4).map(|i| idx.resolve(i).unwrap().0).collect();
        assert!(keys.iter().all(|k| k == &keys[0]));
        let offsets: Vec<usize> = (0..4).map(|i| idx.resolve(i).unwrap().1).collect();
        assert_eq!(offsets, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_resolve_out_of_range() {
        let idx = indexer(8, 4);
        let err = idx.resolve(8).unwrap_err();
        assert!(matches!(err, RiptideError::SampleOutOfRange { .. }));
    }

    #[test]
    fn test_partial_last_object() {
        // 10 samples at 4 per object occupy 3 objects
        let idx = indexer(10, 4);
        assert_eq!(idx.num_objects(), 3);
        let (key, offset) = idx.resolve(9).unwrap();
        assert_eq!(key, "data/train/img_0000002_of_0000003.npz");
        assert_eq!(offset, 1);
    }

    #[test]
    fn test_custom_pattern() {
        let idx = SampleIndexer::new(&BenchConfig {
            num_samples: 4,
            samples_per_object: 2,
            object_pattern: Some("part-{index}.npz".into()),
            ..Default::default()
        })
        .unwrap();
        let (key, _) = idx.resolve(2).unwrap();
        assert_eq!(key, "data/train/part-0000001.npz");
    }
}
