//! Sample source interfaces and simple built-in sources.
//!
//! Ownership model:
//! - `SampleSource` is the index-addressable interface every layer consumes and
//!   exposes (raw recordings, slicing adapters, caches).
//! - Wrappers own their inner source; share one through `Arc` when a caller
//!   needs to keep a handle (for example to inspect a call counter).

use std::sync::Arc;

use crate::data::Sample;
use crate::errors::DatasetError;
use crate::types::{SampleIndex, SourceId};

/// Deterministic synthetic event recordings.
pub mod synthetic;

pub use synthetic::SyntheticRecordings;

/// Index-addressable sample source.
///
/// `len` must be stable for the lifetime of the source, and `get` must map each
/// index in `0..len` to the same logical sample on every call.
pub trait SampleSource: Send + Sync {
    /// Stable source identifier used in errors, logs, and fingerprints.
    fn id(&self) -> &str;
    /// Number of addressable samples.
    fn len(&self) -> usize;
    /// Returns `true` when the source has no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Produce the sample at `index`.
    ///
    /// Fails with `DatasetError::IndexOutOfRange` when `index >= len()`.
    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError>;
}

impl<T: SampleSource + ?Sized> SampleSource for Arc<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        (**self).get(index)
    }
}

impl<T: SampleSource + ?Sized> SampleSource for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        (**self).get(index)
    }
}

/// Fail with `IndexOutOfRange` unless `index < len`.
pub fn check_index(index: SampleIndex, len: usize) -> Result<(), DatasetError> {
    if index >= len {
        return Err(DatasetError::IndexOutOfRange { index, len });
    }
    Ok(())
}

/// In-memory sample source for tests and small datasets.
pub struct InMemorySource {
    id: SourceId,
    samples: Arc<Vec<Sample>>,
}

impl InMemorySource {
    /// Create an in-memory source from prebuilt samples.
    pub fn new(id: impl Into<SourceId>, samples: Vec<Sample>) -> Self {
        Self {
            id: id.into(),
            samples: Arc::new(samples),
        }
    }
}

impl SampleSource for InMemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        check_index(index, self.samples.len())?;
        Ok(self.samples[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_source_serves_samples_and_rejects_out_of_range() {
        let source = InMemorySource::new(
            "memory",
            (0..3).map(|idx| Sample::new(idx as i64, 0i64)).collect(),
        );
        assert_eq!(source.id(), "memory");
        assert_eq!(source.len(), 3);
        assert!(!source.is_empty());
        assert_eq!(source.get(2).unwrap(), Sample::new(2i64, 0i64));

        let err = source.get(3).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::IndexOutOfRange { index: 3, len: 3 }
        ));
    }

    #[test]
    fn shared_and_boxed_sources_delegate() {
        let shared: Arc<InMemorySource> =
            Arc::new(InMemorySource::new("shared", vec![Sample::new(7i64, 1i64)]));
        assert_eq!(SampleSource::len(&shared), 1);
        assert_eq!(SampleSource::id(&shared), "shared");

        let boxed: Box<dyn SampleSource> = Box::new(Arc::clone(&shared));
        assert_eq!(boxed.get(0).unwrap().label(), Some(1));
        assert!(InMemorySource::new("empty", Vec::new()).is_empty());
    }
}
