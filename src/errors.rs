use std::fmt;
use std::io;

use thiserror::Error;

use crate::types::{SampleIndex, SourceId};

/// Stage of the cache pipeline that failed while handling one entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStage {
    /// Writing a freshly computed sample to its entry file.
    Persist,
    /// Reading and decoding an existing entry file.
    Restore,
}

impl fmt::Display for CacheStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStage::Persist => f.write_str("persist"),
            CacheStage::Restore => f.write_str("restore"),
        }
    }
}

/// Error type for source access, slicing, and cache persistence failures.
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("index {index} is out of range for length {len}")]
    IndexOutOfRange { index: SampleIndex, len: usize },
    #[error("sample source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: SourceId, reason: String },
    #[error("sample source '{source_id}' returned inconsistent state: {details}")]
    SourceInconsistent {
        source_id: SourceId,
        details: String,
    },
    #[error("failed to {stage} cache entry for index {index}: {reason}")]
    Serialization {
        index: SampleIndex,
        stage: CacheStage,
        reason: String,
    },
    #[error("cache store failure: {0}")]
    CacheStore(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("transform failed: {0}")]
    Transform(String),
}
