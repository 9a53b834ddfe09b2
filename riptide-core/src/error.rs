//! Error types for riptide
//!
//! Flat taxonomy covering storage fetches, sample decoding, index
//! resolution, and snapshot handoff failures.

use thiserror::Error;

/// Primary error type for all riptide operations
#[derive(Debug, Error)]
pub enum RiptideError {
    // ========== Storage Errors ==========

    /// Object store operation failed
    #[error("Storage operation failed: {message}")]
    StorageError { message: String },

    /// Object not found in storage
    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    // ========== Data Errors ==========

    /// Object bytes could not be decoded into a sample array
    #[error("Undecodable object {key}: {reason}")]
    CodecError { key: String, reason: String },

    /// Intra-object sample offset out of the decoded array's bounds
    #[error("Sample offset {offset} out of range for {key} ({available} samples)")]
    ResolutionError {
        key: String,
        offset: usize,
        available: usize,
    },

    /// Global sample index beyond the dataset
    #[error("Sample index {index} out of range (dataset has {num_samples})")]
    SampleOutOfRange { index: u64, num_samples: u64 },

    /// `get_sample` called for an object that was never opened
    #[error("Object not open: {key}")]
    ObjectNotOpen { key: String },

    /// Invalid rank / comm size / batch parameters
    #[error("Invalid shard spec: {reason}")]
    InvalidShardSpec { reason: String },

    /// Iteration continued past the end of the epoch sequence
    #[error("Data exhausted for current epoch")]
    DataExhausted,

    // ========== Configuration Errors ==========

    /// Worker snapshot inconsistent with the shard plan it was assigned
    #[error("Config mismatch: {reason}")]
    ConfigMismatch { reason: String },

    /// Snapshot capture or restore failed
    #[error("Snapshot error: {reason}")]
    SnapshotError { reason: String },

    /// Invalid configuration value
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    // ========== Runtime Errors ==========

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RiptideError {
    /// Returns true if this error originated in the remote fetch path
    pub fn is_fetch(&self) -> bool {
        matches!(
            self,
            RiptideError::StorageError { .. } | RiptideError::ObjectNotFound { .. }
        )
    }

    /// Returns true if this error indicates a corrupt or inconsistent dataset
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            RiptideError::CodecError { .. } | RiptideError::ResolutionError { .. }
        )
    }
}

/// Result type alias for riptide operations
pub type Result<T> = std::result::Result<T, RiptideError>;
