//! Read-through, disk-backed sample cache.
//!
//! `CachedSource` wraps any `SampleSource`. The first `get` for an index
//! computes the sample through the inner source and persists it as one entry
//! file under the cache root; every later `get` for that index decodes the
//! entry instead. Transforms attached to the cache run after retrieval and are
//! never written to disk.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::constants::cache::{CACHE_ONLY_SOURCE_ID, INDEX_LOCK_STRIPES, MANIFEST_FILENAME};
use crate::data::Sample;
use crate::errors::{CacheStage, DatasetError};
use crate::metrics::{CacheCounters, CacheStats};
use crate::source::{SampleSource, check_index};
use crate::transforms::{SharedTransform, Transform, apply_optional};
use crate::transport::fs::EntryDirectory;
use crate::types::{CopyIndex, SampleIndex, SourceId};

mod codec;

use codec::{CacheManifest, decode_entry, decode_manifest, encode_entry, encode_manifest};

/// Striped mutexes serializing the check-compute-write sequence per entry.
struct EntryLocks {
    stripes: Vec<Mutex<()>>,
}

impl EntryLocks {
    fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    fn lock(&self, key: usize) -> Result<MutexGuard<'_, ()>, DatasetError> {
        self.stripes[key % self.stripes.len()]
            .lock()
            .map_err(|_| DatasetError::CacheStore("entry lock poisoned".into()))
    }
}

/// Sample source that persists every computed sample and serves repeats from disk.
pub struct CachedSource {
    id: SourceId,
    source: Option<Box<dyn SampleSource>>,
    len: usize,
    config: CacheConfig,
    entries: EntryDirectory,
    transform: Option<SharedTransform>,
    target_transform: Option<SharedTransform>,
    locks: EntryLocks,
    counters: CacheCounters,
}

impl CachedSource {
    /// Wrap `source`, storing entries under `config.cache_root_path`.
    ///
    /// Fails when the directory holds a manifest recorded for a different
    /// source length or copy count, unless `config.reset_cache` is set.
    pub fn new(
        source: impl SampleSource + 'static,
        config: CacheConfig,
    ) -> Result<Self, DatasetError> {
        Self::open(Some(Box::new(source)), config)
    }

    /// Open an existing cache directory without a backing source.
    ///
    /// The length comes from the manifest when present, otherwise from the
    /// number of entry files divided by `num_copies`. Requests for indices
    /// that were never cached fail with `SourceUnavailable`.
    pub fn from_cache_dir(config: CacheConfig) -> Result<Self, DatasetError> {
        Self::open(None, config)
    }

    fn open(
        source: Option<Box<dyn SampleSource>>,
        config: CacheConfig,
    ) -> Result<Self, DatasetError> {
        let config = config.validated()?;
        let entries = EntryDirectory::open(&config.cache_root_path)?;
        let manifest_path = entries.root().join(MANIFEST_FILENAME);
        if config.reset_cache {
            let removed = entries.remove_entries()?;
            if manifest_path.exists() {
                std::fs::remove_file(&manifest_path)?;
            }
            info!(
                cache_root = %entries.root().display(),
                removed,
                "reset sample cache"
            );
        }

        let manifest = match entries.read(&manifest_path)? {
            Some(bytes) => Some(decode_manifest(&bytes)?),
            None => None,
        };
        if let Some(manifest) = &manifest {
            manifest.verify_layout(config.num_copies)?;
        }

        let len = match (&source, manifest) {
            (Some(source), Some(manifest)) => {
                manifest.verify_len(source.len())?;
                source.len()
            }
            (Some(source), None) => {
                let manifest = CacheManifest::new(source.len(), config.num_copies);
                entries.write_atomic(&manifest_path, &encode_manifest(&manifest))?;
                source.len()
            }
            (None, Some(manifest)) => manifest.len as usize,
            (None, None) => entries.count_entries()? / config.num_copies,
        };

        let id = source
            .as_ref()
            .map(|source| source.id().to_string())
            .unwrap_or_else(|| CACHE_ONLY_SOURCE_ID.to_string());
        debug!(
            source_id = %id,
            len,
            num_copies = config.num_copies,
            cache_root = %entries.root().display(),
            "opened sample cache"
        );
        Ok(Self {
            id,
            source,
            len,
            config,
            entries,
            transform: None,
            target_transform: None,
            locks: EntryLocks::new(INDEX_LOCK_STRIPES),
            counters: CacheCounters::default(),
        })
    }

    /// Apply `transform` to sample data after every retrieval.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Apply `transform` to sample targets after every retrieval.
    pub fn with_target_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.target_transform = Some(Arc::new(transform));
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Directory holding the entries.
    pub fn cache_root(&self) -> &Path {
        self.entries.root()
    }

    /// Returns `true` when a backing source can fill missing entries.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Number of entry files currently on disk.
    pub fn entry_count(&self) -> Result<usize, DatasetError> {
        Ok(self.entries.count_entries()?)
    }

    /// Hit/miss counters since construction.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Return the sample at `index` without running any attached transform.
    pub fn get_untransformed(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        check_index(index, self.len)?;
        let copy = self.pick_copy();
        self.fetch(index, copy)
    }

    /// Populate every `(index, copy)` entry, computing missing ones in parallel.
    ///
    /// Returns the number of entries written by this call.
    pub fn warm(&self) -> Result<usize, DatasetError> {
        let written = AtomicUsize::new(0);
        (0..self.len).into_par_iter().try_for_each(|index| {
            for copy in 0..self.config.num_copies {
                if self.ensure_entry(index, copy)? {
                    written.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok::<(), DatasetError>(())
        })?;
        let written = written.into_inner();
        info!(source_id = %self.id, written, "warmed sample cache");
        Ok(written)
    }

    fn pick_copy(&self) -> CopyIndex {
        if self.config.num_copies <= 1 {
            0
        } else {
            rand::rng().random_range(0..self.config.num_copies)
        }
    }

    fn lock_key(&self, index: SampleIndex, copy: CopyIndex) -> usize {
        index
            .wrapping_mul(self.config.num_copies)
            .wrapping_add(copy)
    }

    fn fetch(&self, index: SampleIndex, copy: CopyIndex) -> Result<Sample, DatasetError> {
        let path = self.entries.entry_path(index, copy);
        if let Some(sample) = self.restore(index, &path)? {
            self.counters.record_hit();
            return Ok(sample);
        }
        let _guard = self.locks.lock(self.lock_key(index, copy))?;
        // Another caller may have written the entry while we waited.
        if let Some(sample) = self.restore(index, &path)? {
            self.counters.record_hit();
            return Ok(sample);
        }
        let sample = self.compute(index, copy, &path)?;
        self.persist(index, &path, &sample)?;
        self.counters.record_miss();
        Ok(sample)
    }

    fn ensure_entry(&self, index: SampleIndex, copy: CopyIndex) -> Result<bool, DatasetError> {
        let path = self.entries.entry_path(index, copy);
        if path.is_file() {
            return Ok(false);
        }
        let _guard = self.locks.lock(self.lock_key(index, copy))?;
        if path.is_file() {
            return Ok(false);
        }
        let sample = self.compute(index, copy, &path)?;
        self.persist(index, &path, &sample)?;
        self.counters.record_miss();
        Ok(true)
    }

    fn compute(
        &self,
        index: SampleIndex,
        copy: CopyIndex,
        path: &Path,
    ) -> Result<Sample, DatasetError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| DatasetError::SourceUnavailable {
                source_id: self.id.clone(),
                reason: format!("index {index} is not cached and no source is attached"),
            })?;
        debug!(
            source_id = %self.id,
            index,
            copy,
            path = %path.display(),
            "sample not in cache, generating it now"
        );
        source.get(index)
    }

    fn restore(&self, index: SampleIndex, path: &Path) -> Result<Option<Sample>, DatasetError> {
        let bytes = self
            .entries
            .read(path)
            .map_err(|err| DatasetError::Serialization {
                index,
                stage: CacheStage::Restore,
                reason: err.to_string(),
            })?;
        bytes.map(|bytes| decode_entry(index, &bytes)).transpose()
    }

    fn persist(&self, index: SampleIndex, path: &Path, sample: &Sample) -> Result<(), DatasetError> {
        self.entries
            .write_atomic(path, &encode_entry(sample))
            .map_err(|err| DatasetError::Serialization {
                index,
                stage: CacheStage::Persist,
                reason: err.to_string(),
            })
    }
}

impl SampleSource for CachedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        let Sample { data, target } = self.get_untransformed(index)?;
        let data = apply_optional(self.transform.as_ref(), data)?;
        let target = apply_optional(self.target_transform.as_ref(), target)?;
        Ok(Sample { data, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Piece;
    use crate::source::InMemorySource;
    use crate::transport::fs::entry_file_name;
    use std::fs;
    use tempfile::tempdir;

    /// Source returning `(i, i % 2)` and counting computations.
    struct CountingSource {
        len: usize,
        calls: Arc<AtomicUsize>,
    }

    impl SampleSource for CountingSource {
        fn id(&self) -> &str {
            "counting"
        }

        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
            check_index(index, self.len)?;
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Sample::new(index as i64, index as i64 % 2))
        }
    }

    fn counting(len: usize) -> (CountingSource, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            CountingSource {
                len,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }

    #[test]
    fn miss_then_hit_updates_stats_and_writes_one_entry() {
        let dir = tempdir().unwrap();
        let (source, calls) = counting(3);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path())).unwrap();

        assert_eq!(cache.get(1).unwrap(), Sample::new(1i64, 1i64));
        assert_eq!(cache.get(1).unwrap(), Sample::new(1i64, 1i64));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count().unwrap(), 1);
        assert!(dir.path().join(entry_file_name(1, 0)).is_file());
        assert!(dir.path().join(MANIFEST_FILENAME).is_file());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!(cache.has_source());
        assert_eq!(cache.id(), "counting");
    }

    #[test]
    fn cache_only_mode_serves_entries_and_reports_missing_ones() {
        let dir = tempdir().unwrap();
        let (source, _) = counting(4);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path())).unwrap();
        cache.get(0).unwrap();
        cache.get(2).unwrap();
        drop(cache);

        let reopened = CachedSource::from_cache_dir(CacheConfig::at(dir.path())).unwrap();
        assert!(!reopened.has_source());
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.id(), CACHE_ONLY_SOURCE_ID);
        assert_eq!(reopened.get(2).unwrap(), Sample::new(2i64, 0i64));
        assert!(matches!(
            reopened.get(1),
            Err(DatasetError::SourceUnavailable { ref reason, .. }) if reason.contains("index 1")
        ));
    }

    #[test]
    fn cache_only_mode_without_manifest_counts_entries() {
        let dir = tempdir().unwrap();
        let (source, _) = counting(6);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path())).unwrap();
        for idx in 0..3 {
            cache.get(idx).unwrap();
        }
        drop(cache);
        fs::remove_file(dir.path().join(MANIFEST_FILENAME)).unwrap();

        let reopened = CachedSource::from_cache_dir(CacheConfig::at(dir.path())).unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn manifest_mismatch_is_rejected_unless_reset() {
        let dir = tempdir().unwrap();
        let (source, _) = counting(5);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path())).unwrap();
        cache.get(0).unwrap();
        drop(cache);

        let (shorter, _) = counting(4);
        let err = CachedSource::new(shorter, CacheConfig::at(dir.path()))
            .err()
            .expect("length mismatch should fail");
        assert!(matches!(err, DatasetError::CacheStore(ref msg) if msg.contains("length mismatch")));

        let (more_copies, _) = counting(5);
        let err = CachedSource::new(more_copies, CacheConfig::at(dir.path()).with_num_copies(2))
            .err()
            .expect("copies mismatch should fail");
        assert!(matches!(err, DatasetError::CacheStore(ref msg) if msg.contains("copies mismatch")));

        let (shorter, calls) = counting(4);
        let cache =
            CachedSource::new(shorter, CacheConfig::at(dir.path()).with_reset(true)).unwrap();
        assert_eq!(cache.entry_count().unwrap(), 0);
        cache.get(0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn corrupt_entry_surfaces_restore_error_without_recomputing() {
        let dir = tempdir().unwrap();
        let (source, calls) = counting(2);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path())).unwrap();
        fs::write(dir.path().join(entry_file_name(0, 0)), b"garbage").unwrap();

        let err = cache.get(0).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Serialization {
                index: 0,
                stage: CacheStage::Restore,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn persist_failure_reports_persist_stage() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let (source, calls) = counting(2);
        let cache = CachedSource::new(source, CacheConfig::at(&root)).unwrap();
        fs::remove_dir_all(&root).unwrap();

        let err = cache.get(1).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Serialization {
                index: 1,
                stage: CacheStage::Persist,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(cache.entry_count(), Err(DatasetError::Io(_))));
    }

    #[test]
    fn source_errors_propagate_unchanged_and_are_not_cached() {
        struct Failing;
        impl SampleSource for Failing {
            fn id(&self) -> &str {
                "failing"
            }
            fn len(&self) -> usize {
                2
            }
            fn get(&self, _index: SampleIndex) -> Result<Sample, DatasetError> {
                Err(DatasetError::SourceUnavailable {
                    source_id: "failing".into(),
                    reason: "device offline".into(),
                })
            }
        }

        let dir = tempdir().unwrap();
        let cache = CachedSource::new(Failing, CacheConfig::at(dir.path())).unwrap();
        let err = cache.get(0).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::SourceUnavailable { ref reason, .. } if reason == "device offline"
        ));
        assert_eq!(cache.entry_count().unwrap(), 0);
    }

    #[test]
    fn multiple_copies_are_cached_independently() {
        let dir = tempdir().unwrap();
        let (source, calls) = counting(2);
        let cache =
            CachedSource::new(source, CacheConfig::at(dir.path()).with_num_copies(3)).unwrap();

        assert_eq!(cache.warm().unwrap(), 6);
        assert_eq!(cache.entry_count().unwrap(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert_eq!(cache.warm().unwrap(), 0);

        for _ in 0..10 {
            assert_eq!(cache.get(1).unwrap(), Sample::new(1i64, 1i64));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn target_transform_only_touches_targets() {
        let dir = tempdir().unwrap();
        let source = InMemorySource::new("memory", vec![Sample::new(5i64, 1i64)]);
        let cache = CachedSource::new(source, CacheConfig::at(dir.path()))
            .unwrap()
            .with_target_transform(
                |_target: Vec<Piece>| -> Result<Vec<Piece>, DatasetError> {
                    Ok(vec![Piece::from(-1i64)])
                },
            );
        let sample = cache.get(0).unwrap();
        assert_eq!(sample, Sample::new(5i64, -1i64));
        assert_eq!(cache.get_untransformed(0).unwrap(), Sample::new(5i64, 1i64));
    }

    #[test]
    fn invalid_config_is_rejected_before_touching_disk() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("never_created");
        let (source, _) = counting(1);
        let err = CachedSource::new(source, CacheConfig::at(&root).with_num_copies(0))
            .err()
            .expect("zero copies should fail");
        assert!(matches!(err, DatasetError::Configuration(_)));
        assert!(!root.exists());
    }
}
