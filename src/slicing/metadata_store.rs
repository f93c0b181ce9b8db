use simd_r_drive::storage_engine::DataStore;
use simd_r_drive::storage_engine::traits::{DataStoreReader, DataStoreWriter};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

use crate::constants::cache::BITCODE_PREFIX;
use crate::constants::slicing::{
    DEFAULT_METADATA_FILENAME, META_KEY, SLICE_RECORD_VERSION, SLICES_PREFIX, STORE_VERSION,
};
use crate::errors::DatasetError;
use crate::slicing::SliceRange;
use crate::types::{Fingerprint, SampleIndex};

type SliceMap = HashMap<(Fingerprint, SampleIndex), Vec<SliceRange>>;

/// Persisted slice ranges for one recording.
#[derive(Clone, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
pub struct PersistedSlices {
    /// Fingerprint of the slicer and source the ranges were computed for.
    pub fingerprint: Fingerprint,
    /// Recording index within the source.
    pub recording: u64,
    /// Ranges in slice order.
    pub ranges: Vec<SliceRange>,
}

/// Persistence backend for per-recording slice metadata.
///
/// Entries are keyed by `(fingerprint, recording)`, so metadata computed under
/// different slicer parameters or a different source never collides.
pub trait SliceMetadataStore: Send + Sync {
    /// Load ranges for `recording` under `fingerprint`, if stored.
    fn load_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
    ) -> Result<Option<Vec<SliceRange>>, DatasetError>;
    /// Persist ranges for `recording` under `fingerprint`.
    fn store_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
        ranges: &[SliceRange],
    ) -> Result<(), DatasetError>;
}

/// In-memory slice metadata store.
#[derive(Default)]
pub struct InMemorySliceMetadataStore {
    slices: RwLock<SliceMap>,
}

impl InMemorySliceMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored recordings across all fingerprints.
    pub fn len(&self) -> usize {
        self.slices.read().map(|guard| guard.len()).unwrap_or(0)
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SliceMetadataStore for InMemorySliceMetadataStore {
    fn load_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
    ) -> Result<Option<Vec<SliceRange>>, DatasetError> {
        Ok(read_map(&self.slices)?
            .get(&(fingerprint, recording))
            .cloned())
    }

    fn store_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
        ranges: &[SliceRange],
    ) -> Result<(), DatasetError> {
        write_map(&self.slices)?.insert((fingerprint, recording), ranges.to_vec());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, bitcode::Encode, bitcode::Decode)]
/// Versioned metadata header stored in file-backed slice metadata stores.
struct StoreMeta {
    version: u8,
}

/// File-backed slice metadata store for persistent runs.
///
/// Backed by a single `simd-r-drive` datastore file. Records whose payload no
/// longer decodes are reported as missing so callers recompute and overwrite
/// them.
pub struct FileSliceMetadataStore {
    store: DataStore,
    path: PathBuf,
}

impl fmt::Debug for FileSliceMetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSliceMetadataStore")
            .field("path", &self.path)
            .finish()
    }
}

impl FileSliceMetadataStore {
    /// Open (or create) a slice metadata store at `path`.
    ///
    /// A directory path resolves to `<dir>/slice_metadata.bin`.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self, DatasetError> {
        let path = coerce_store_path(path.into());
        ensure_parent_dir(&path)?;
        let store = DataStore::open(path.as_path()).map_err(map_store_err)?;
        let store = Self { store, path };
        store.verify_metadata()?;
        Ok(store)
    }

    /// Default store file path inside `dir`.
    pub fn default_path_in_dir<P: AsRef<Path>>(dir: P) -> PathBuf {
        dir.as_ref().join(DEFAULT_METADATA_FILENAME)
    }

    /// Path of the backing datastore file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn verify_metadata(&self) -> Result<(), DatasetError> {
        match read_bytes(&self.store, META_KEY)? {
            Some(bytes) => {
                let meta = decode_store_meta(&bytes)?;
                if meta.version != STORE_VERSION {
                    return Err(DatasetError::CacheStore(format!(
                        "slice metadata store version mismatch (expected {}, found {})",
                        STORE_VERSION, meta.version
                    )));
                }
            }
            None => {
                let meta = StoreMeta {
                    version: STORE_VERSION,
                };
                write_bytes(
                    &self.store,
                    META_KEY,
                    &encode_bitcode_payload(&bitcode::encode(&meta)),
                )?;
            }
        }
        Ok(())
    }
}

impl SliceMetadataStore for FileSliceMetadataStore {
    fn load_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
    ) -> Result<Option<Vec<SliceRange>>, DatasetError> {
        let key = slices_key(fingerprint, recording);
        let Some(bytes) = read_bytes(&self.store, &key)? else {
            return Ok(None);
        };
        match decode_slices(&bytes) {
            Ok(record)
                if record.fingerprint == fingerprint && record.recording == recording as u64 =>
            {
                Ok(Some(record.ranges))
            }
            Ok(_) => {
                warn!(recording, "slice record key mismatch, recomputing");
                Ok(None)
            }
            Err(err) => {
                warn!(recording, error = %err, "unreadable slice record, recomputing");
                Ok(None)
            }
        }
    }

    fn store_slices(
        &self,
        fingerprint: Fingerprint,
        recording: SampleIndex,
        ranges: &[SliceRange],
    ) -> Result<(), DatasetError> {
        let key = slices_key(fingerprint, recording);
        let payload = encode_slices(&PersistedSlices {
            fingerprint,
            recording: recording as u64,
            ranges: ranges.to_vec(),
        });
        write_bytes(&self.store, &key, &payload)
    }
}

fn read_map(slices: &RwLock<SliceMap>) -> Result<RwLockReadGuard<'_, SliceMap>, DatasetError> {
    slices
        .read()
        .map_err(|_| DatasetError::CacheStore("slice metadata lock poisoned".into()))
}

fn write_map(slices: &RwLock<SliceMap>) -> Result<RwLockWriteGuard<'_, SliceMap>, DatasetError> {
    slices
        .write()
        .map_err(|_| DatasetError::CacheStore("slice metadata lock poisoned".into()))
}

fn slices_key(fingerprint: Fingerprint, recording: SampleIndex) -> Vec<u8> {
    let mut key = Vec::with_capacity(SLICES_PREFIX.len() + 16);
    key.extend_from_slice(SLICES_PREFIX);
    key.extend_from_slice(&fingerprint.to_le_bytes());
    key.extend_from_slice(&(recording as u64).to_le_bytes());
    key
}

fn encode_slices(record: &PersistedSlices) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(record));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(SLICE_RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_slices(bytes: &[u8]) -> Result<PersistedSlices, DatasetError> {
    match bytes.first() {
        None => Err(DatasetError::CacheStore("empty slice record".into())),
        Some(&SLICE_RECORD_VERSION) => {
            let raw = decode_bitcode_payload(&bytes[1..])?;
            bitcode::decode(raw)
                .map_err(|err| DatasetError::CacheStore(format!("corrupt slice record: {err}")))
        }
        Some(_) => Err(DatasetError::CacheStore(
            "slice record version mismatch".into(),
        )),
    }
}

fn decode_store_meta(bytes: &[u8]) -> Result<StoreMeta, DatasetError> {
    let raw = decode_bitcode_payload(bytes)?;
    bitcode::decode(raw).map_err(|err| {
        DatasetError::CacheStore(format!("failed to decode slice metadata store header: {err}"))
    })
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<&[u8], DatasetError> {
    match bytes.split_first() {
        Some((&BITCODE_PREFIX, raw)) => Ok(raw),
        _ => Err(DatasetError::CacheStore(
            "bitcode payload missing expected prefix".into(),
        )),
    }
}

fn read_bytes(store: &DataStore, key: &[u8]) -> Result<Option<Vec<u8>>, DatasetError> {
    store
        .read(key)
        .map_err(map_store_err)?
        .map(|entry| Ok(entry.as_ref().to_vec()))
        .transpose()
}

fn write_bytes(store: &DataStore, key: &[u8], payload: &[u8]) -> Result<(), DatasetError> {
    store.write(key, payload).map_err(map_store_err)?;
    Ok(())
}

fn coerce_store_path(path: PathBuf) -> PathBuf {
    if path.is_dir() {
        return path.join(DEFAULT_METADATA_FILENAME);
    }
    path
}

fn ensure_parent_dir(path: &Path) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn map_store_err(err: io::Error) -> DatasetError {
    DatasetError::CacheStore(err.to_string())
}
