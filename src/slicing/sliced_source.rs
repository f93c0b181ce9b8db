use std::hash::Hash;
use std::sync::Arc;

use tracing::{debug, info};

use crate::data::{Array, Event, Piece, Sample};
use crate::errors::DatasetError;
use crate::hash::stable_hash_with;
use crate::slicing::{SliceMetadataStore, SliceRange, Slicer};
use crate::source::{SampleSource, check_index};
use crate::transforms::{SharedTransform, Transform, apply_optional};
use crate::types::{Fingerprint, SampleIndex, SourceId};

/// Sample source exposing every slice of every recording of an inner source.
///
/// Construction reads each recording once to compute slice ranges and builds a
/// flat `index -> (recording, slice)` map. `get` re-reads the recording and
/// cuts the events of its first data piece to the requested slice; the target
/// is carried over unchanged.
pub struct SlicedSource<S: SampleSource, L: Slicer> {
    id: SourceId,
    source: S,
    slicer: L,
    slice_map: Vec<(SampleIndex, usize)>,
    metadata: Vec<Vec<SliceRange>>,
    transform: Option<SharedTransform>,
    target_transform: Option<SharedTransform>,
}

impl<S: SampleSource, L: Slicer> SlicedSource<S, L> {
    /// Slice every recording of `source`, computing metadata in memory.
    pub fn new(source: S, slicer: L) -> Result<Self, DatasetError> {
        let metadata = (0..source.len())
            .map(|recording| compute_slices(&source, &slicer, recording))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_metadata(source, slicer, metadata))
    }

    /// Slice every recording, reusing ranges persisted in `store` and saving new ones.
    pub fn with_metadata_store(
        source: S,
        slicer: L,
        store: &dyn SliceMetadataStore,
    ) -> Result<Self, DatasetError> {
        let fingerprint = metadata_fingerprint(&source, &slicer);
        let mut computed = 0usize;
        let mut metadata = Vec::with_capacity(source.len());
        for recording in 0..source.len() {
            let ranges = match store.load_slices(fingerprint, recording)? {
                Some(ranges) => ranges,
                None => {
                    let ranges = compute_slices(&source, &slicer, recording)?;
                    store.store_slices(fingerprint, recording, &ranges)?;
                    computed += 1;
                    ranges
                }
            };
            metadata.push(ranges);
        }
        info!(
            source_id = %source.id(),
            slicer = slicer.name(),
            recordings = source.len(),
            computed,
            "loaded slice metadata"
        );
        Ok(Self::from_metadata(source, slicer, metadata))
    }

    fn from_metadata(source: S, slicer: L, metadata: Vec<Vec<SliceRange>>) -> Self {
        let slice_map = metadata
            .iter()
            .enumerate()
            .flat_map(|(recording, ranges)| (0..ranges.len()).map(move |slice| (recording, slice)))
            .collect::<Vec<_>>();
        let id = format!("{}::{}", source.id(), slicer.name());
        debug!(source_id = %id, slices = slice_map.len(), "built slice map");
        Self {
            id,
            source,
            slicer,
            slice_map,
            metadata,
            transform: None,
            target_transform: None,
        }
    }

    /// Apply `transform` to sliced data on every `get`.
    pub fn with_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Apply `transform` to targets on every `get`.
    pub fn with_target_transform(mut self, transform: impl Transform + 'static) -> Self {
        self.target_transform = Some(Arc::new(transform));
        self
    }

    /// Slicing policy in use.
    pub fn slicer(&self) -> &L {
        &self.slicer
    }

    /// Inner recording source.
    pub fn inner(&self) -> &S {
        &self.source
    }

    /// Slice ranges computed for `recording`.
    pub fn slices_for(&self, recording: SampleIndex) -> Option<&[SliceRange]> {
        self.metadata.get(recording).map(Vec::as_slice)
    }

    /// `(recording, slice)` position behind a flat index.
    pub fn locate(&self, index: SampleIndex) -> Option<(SampleIndex, usize)> {
        self.slice_map.get(index).copied()
    }
}

impl<S: SampleSource, L: Slicer> SampleSource for SlicedSource<S, L> {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> usize {
        self.slice_map.len()
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        check_index(index, self.slice_map.len())?;
        let (recording, slice) = self.slice_map[index];
        let range = self.metadata[recording][slice];
        let Sample { mut data, target } = self.source.get(recording)?;
        let events = recording_events(self.source.id(), recording, &data)?;
        let sliced = range.apply(events).to_vec();
        data[0] = replace_events(&data[0], sliced);
        let data = apply_optional(self.transform.as_ref(), data)?;
        let target = apply_optional(self.target_transform.as_ref(), target)?;
        Ok(Sample { data, target })
    }
}

fn metadata_fingerprint<S: SampleSource, L: Slicer>(source: &S, slicer: &L) -> Fingerprint {
    stable_hash_with(|hasher| {
        slicer.fingerprint().hash(hasher);
        source.id().hash(hasher);
        source.len().hash(hasher);
    })
}

fn compute_slices<S: SampleSource, L: Slicer>(
    source: &S,
    slicer: &L,
    recording: SampleIndex,
) -> Result<Vec<SliceRange>, DatasetError> {
    let sample = source.get(recording)?;
    let events = recording_events(source.id(), recording, &sample.data)?;
    slicer.slice_metadata(events)
}

fn recording_events<'a>(
    source_id: &str,
    recording: SampleIndex,
    data: &'a [Piece],
) -> Result<&'a [Event], DatasetError> {
    let events = match data.first() {
        Some(Piece::Array(array)) => array.as_events(),
        Some(piece @ Piece::Fields(_)) => piece.field("events").and_then(Array::as_events),
        None => None,
    };
    events.ok_or_else(|| DatasetError::SourceInconsistent {
        source_id: source_id.to_string(),
        details: format!("recording {recording} has no event stream in its first data piece"),
    })
}

/// Rebuild the first data piece with `events` in place of its event stream.
fn replace_events(piece: &Piece, events: Vec<Event>) -> Piece {
    match piece {
        Piece::Array(_) => Piece::Array(Array::Events(events)),
        Piece::Fields(fields) => {
            let mut events = Some(events);
            Piece::Fields(
                fields
                    .iter()
                    .map(|(name, array)| match (name.as_str(), array) {
                        ("events", Array::Events(_)) => match events.take() {
                            Some(events) => (name.clone(), Array::Events(events)),
                            None => (name.clone(), array.clone()),
                        },
                        _ => (name.clone(), array.clone()),
                    })
                    .collect(),
            )
        }
    }
}
