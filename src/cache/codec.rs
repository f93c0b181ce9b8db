use crate::constants::cache::{
    BITCODE_PREFIX, ENTRY_RECORD_VERSION, MANIFEST_RECORD_VERSION,
};
use crate::data::Sample;
use crate::errors::{CacheStage, DatasetError};
use crate::types::SampleIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
/// Versioned header describing what a cache directory was built from.
pub(crate) struct CacheManifest {
    pub(crate) version: u8,
    pub(crate) len: u64,
    pub(crate) num_copies: u64,
}

impl CacheManifest {
    pub(crate) fn new(len: usize, num_copies: usize) -> Self {
        Self {
            version: MANIFEST_RECORD_VERSION,
            len: len as u64,
            num_copies: num_copies as u64,
        }
    }

    /// Reject manifests written by another store version or copy layout.
    pub(crate) fn verify_layout(&self, num_copies: usize) -> Result<(), DatasetError> {
        if self.version != MANIFEST_RECORD_VERSION {
            return Err(DatasetError::CacheStore(format!(
                "cache manifest version mismatch (expected {}, found {})",
                MANIFEST_RECORD_VERSION, self.version
            )));
        }
        if self.num_copies != num_copies as u64 {
            return Err(DatasetError::CacheStore(format!(
                "cache manifest copies mismatch (expected {}, found {})",
                num_copies, self.num_copies
            )));
        }
        Ok(())
    }

    /// Reject manifests recorded for a source of a different length.
    pub(crate) fn verify_len(&self, len: usize) -> Result<(), DatasetError> {
        if self.len != len as u64 {
            return Err(DatasetError::CacheStore(format!(
                "cache manifest length mismatch (expected {}, found {})",
                len, self.len
            )));
        }
        Ok(())
    }
}

pub(crate) fn encode_manifest(manifest: &CacheManifest) -> Vec<u8> {
    encode_bitcode_payload(&bitcode::encode(manifest))
}

pub(crate) fn decode_manifest(bytes: &[u8]) -> Result<CacheManifest, DatasetError> {
    let raw = decode_bitcode_payload(bytes).map_err(DatasetError::CacheStore)?;
    bitcode::decode(raw).map_err(|err| {
        DatasetError::CacheStore(format!("failed to decode cache manifest: {err}"))
    })
}

pub(crate) fn encode_entry(sample: &Sample) -> Vec<u8> {
    let payload = encode_bitcode_payload(&bitcode::encode(sample));
    let mut buf = Vec::with_capacity(1 + payload.len());
    buf.push(ENTRY_RECORD_VERSION);
    buf.extend_from_slice(&payload);
    buf
}

pub(crate) fn decode_entry(index: SampleIndex, bytes: &[u8]) -> Result<Sample, DatasetError> {
    let restore_err = |reason: String| DatasetError::Serialization {
        index,
        stage: CacheStage::Restore,
        reason,
    };
    match bytes.first() {
        None => return Err(restore_err("empty cache entry".into())),
        Some(&ENTRY_RECORD_VERSION) => {}
        Some(_) => return Err(restore_err("cache entry record version mismatch".into())),
    }
    let raw = decode_bitcode_payload(&bytes[1..]).map_err(restore_err)?;
    let sample: Sample =
        bitcode::decode(raw).map_err(|err| restore_err(format!("corrupt cache entry: {err}")))?;
    sample
        .validate()
        .map_err(|err| restore_err(format!("invalid cache entry: {err}")))?;
    Ok(sample)
}

fn encode_bitcode_payload(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + bytes.len());
    out.push(BITCODE_PREFIX);
    out.extend_from_slice(bytes);
    out
}

fn decode_bitcode_payload(bytes: &[u8]) -> Result<&[u8], String> {
    if bytes.first().copied() != Some(BITCODE_PREFIX) {
        return Err("bitcode payload missing expected prefix".into());
    }
    Ok(&bytes[1..])
}
