//! Samples and batches

use bytes::Bytes;

/// One decoded training sample
#[derive(Debug, Clone)]
pub struct Sample {
    /// Global sample index
    pub index: u64,
    /// Key of the object the sample came from
    pub object_key: String,
    /// Decoded sample bytes
    pub data: Bytes,
}

impl Sample {
    /// Decoded size in bytes
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }
}

/// A fixed-size ordered collection of samples
///
/// Every emitted batch holds exactly the configured batch size; a
/// shard's trailing remainder is dropped, never padded or emitted
/// short.
#[derive(Debug)]
pub struct SampleBatch {
    /// Position of this batch within the rank's epoch sequence
    pub batch_idx: u64,
    /// Epoch the batch belongs to
    pub epoch: u64,
    /// Samples in shard order
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total decoded bytes across the batch
    pub fn nbytes(&self) -> usize {
        self.samples.iter().map(Sample::nbytes).sum()
    }
}
