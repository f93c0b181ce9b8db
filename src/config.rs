use std::path::PathBuf;

use crate::constants::cache::DEFAULT_CACHE_DIR;
use crate::errors::DatasetError;

/// Controls where and how `CachedSource` persists samples.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Directory holding entry files and the manifest; created if absent.
    pub cache_root_path: PathBuf,
    /// Remove existing entries (and the manifest) when the cache is opened.
    pub reset_cache: bool,
    /// Number of independently cached computations kept per index.
    ///
    /// Values above 1 only make sense for sources with random augmentation;
    /// each read picks one copy uniformly at random.
    pub num_copies: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root_path: PathBuf::from(DEFAULT_CACHE_DIR),
            reset_cache: false,
            num_copies: 1,
        }
    }
}

impl CacheConfig {
    /// Config rooted at `cache_root_path` with all other options defaulted.
    pub fn at(cache_root_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_root_path: cache_root_path.into(),
            ..Self::default()
        }
    }

    /// Set `reset_cache`.
    pub fn with_reset(mut self, reset_cache: bool) -> Self {
        self.reset_cache = reset_cache;
        self
    }

    /// Set `num_copies`.
    pub fn with_num_copies(mut self, num_copies: usize) -> Self {
        self.num_copies = num_copies;
        self
    }

    /// Validate option ranges.
    pub fn validated(self) -> Result<Self, DatasetError> {
        if self.num_copies == 0 {
            return Err(DatasetError::Configuration(
                "num_copies must be at least 1".to_string(),
            ));
        }
        if self.cache_root_path.as_os_str().is_empty() {
            return Err(DatasetError::Configuration(
                "cache_root_path must not be empty".to_string(),
            ));
        }
        Ok(self)
    }
}
