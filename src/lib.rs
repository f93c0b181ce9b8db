#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Read-through disk cache over any sample source.
pub mod cache;
/// Cache configuration types.
pub mod config;
/// Centralized constants used across the cache, slicing, and sources.
pub mod constants;
/// Sample, piece, and event types.
pub mod data;
/// Reusable example runners shared by demos and downstream crates.
pub mod example_apps;
mod hash;
/// Cache hit/miss counters.
pub mod metrics;
/// Slicing recordings into windows and persisting slice metadata.
pub mod slicing;
/// Sample source trait and built-in sources.
pub mod source;
/// Post-retrieval transforms.
pub mod transforms;
/// Entry storage transports (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cache::CachedSource;
pub use config::CacheConfig;
pub use data::{Array, Event, Piece, Sample, Tensor, TensorData};
pub use errors::{CacheStage, DatasetError};
pub use metrics::CacheStats;
pub use slicing::{
    FileSliceMetadataStore, InMemorySliceMetadataStore, SliceByEventCount, SliceByTime,
    SliceMetadataStore, SliceRange, SlicedSource, Slicer,
};
pub use source::{InMemorySource, SampleSource, SyntheticRecordings};
pub use transforms::{Compose, SharedTransform, Transform};
pub use types::{CopyIndex, FieldName, Fingerprint, SampleIndex, SourceId, Timestamp};
