/// Constants used by the on-disk sample cache layout and encoding.
pub mod cache {
    /// Default directory for cache entries when none is configured.
    pub const DEFAULT_CACHE_DIR: &str = "cache";
    /// File extension for per-index cache entries (`<index>_<copy>.sample`).
    pub const ENTRY_EXTENSION: &str = "sample";
    /// Separator between index and copy in entry file stems.
    pub const ENTRY_COPY_SEPARATOR: char = '_';
    /// Filename of the cache manifest stored alongside the entries.
    pub const MANIFEST_FILENAME: &str = "manifest.bin";
    /// Version tag for persisted sample entries.
    pub const ENTRY_RECORD_VERSION: u8 = 1;
    /// Version tag for the persisted cache manifest.
    pub const MANIFEST_RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Number of striped locks guarding per-index computation.
    pub const INDEX_LOCK_STRIPES: usize = 64;
    /// Synthetic source id reported when a cache has no backing source.
    pub const CACHE_ONLY_SOURCE_ID: &str = "cache_only";
}

/// Constants used by slicing policies and slice-metadata persistence.
pub mod slicing {
    /// Key used for slice-metadata store global metadata.
    pub const META_KEY: &[u8] = b"__meta__";
    /// Key prefix for per-recording slice ranges.
    pub const SLICES_PREFIX: &[u8] = b"slices:";
    /// Version tag for slice-metadata store compatibility checks.
    pub const STORE_VERSION: u8 = 1;
    /// Version tag for persisted slice-range records.
    pub const SLICE_RECORD_VERSION: u8 = 1;
    /// Default filename for persisted slice-metadata stores.
    pub const DEFAULT_METADATA_FILENAME: &str = "slice_metadata.bin";
    /// Fingerprint salt distinguishing time-window slicing.
    pub const SLICE_BY_TIME_TAG: &str = "slice_by_time";
    /// Fingerprint salt distinguishing event-count slicing.
    pub const SLICE_BY_EVENT_COUNT_TAG: &str = "slice_by_event_count";
}

/// Constants used by the synthetic recording generator.
pub mod synthetic {
    /// Default sensor width in pixels.
    pub const DEFAULT_SENSOR_WIDTH: u16 = 34;
    /// Default sensor height in pixels.
    pub const DEFAULT_SENSOR_HEIGHT: u16 = 34;
    /// Default number of target classes.
    pub const DEFAULT_CLASSES: i64 = 10;
    /// Upper bound on the gap between consecutive synthetic events (µs).
    pub const MAX_EVENT_GAP_US: u64 = 200;
    /// Offset mixed into per-recording seeds.
    pub const RECORDING_SEED_OFFSET: u64 = 0xB4C3_5EED;
}
