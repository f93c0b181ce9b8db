use std::hash::Hash;

use crate::constants::synthetic::{
    DEFAULT_CLASSES, DEFAULT_SENSOR_HEIGHT, DEFAULT_SENSOR_WIDTH, MAX_EVENT_GAP_US,
    RECORDING_SEED_OFFSET,
};
use crate::data::{Event, Sample};
use crate::errors::DatasetError;
use crate::hash::stable_hash_with;
use crate::source::{SampleSource, check_index};
use crate::types::{SampleIndex, SourceId};

#[derive(Debug, Clone)]
/// Small deterministic RNG used for reproducible synthetic recordings.
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut z = self.state.wrapping_add(0x9E3779B97F4A7C15);
        self.state = z;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    fn below(&mut self, bound: u64) -> u64 {
        self.next_u64() % bound.max(1)
    }
}

/// Deterministic stand-in for a downloaded event-camera dataset.
///
/// Recording `i` holds `events_per_recording` time-ordered events on a
/// `width x height` sensor with two polarities, labeled `i % classes`.
/// The same seed always produces the same recordings.
#[derive(Clone, Debug)]
pub struct SyntheticRecordings {
    id: SourceId,
    recordings: usize,
    events_per_recording: usize,
    width: u16,
    height: u16,
    classes: i64,
    seed: u64,
}

impl SyntheticRecordings {
    /// Create `recordings` synthetic recordings of `events_per_recording` events each.
    pub fn new(
        id: impl Into<SourceId>,
        recordings: usize,
        events_per_recording: usize,
        seed: u64,
    ) -> Self {
        Self {
            id: id.into(),
            recordings,
            events_per_recording,
            width: DEFAULT_SENSOR_WIDTH,
            height: DEFAULT_SENSOR_HEIGHT,
            classes: DEFAULT_CLASSES,
            seed,
        }
    }

    /// Override the sensor resolution.
    pub fn with_sensor_size(mut self, width: u16, height: u16) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    /// Override the number of label classes.
    pub fn with_classes(mut self, classes: i64) -> Self {
        self.classes = classes.max(1);
        self
    }

    /// Sensor size as `(width, height, polarities)`.
    pub fn sensor_size(&self) -> (u16, u16, u8) {
        (self.width, self.height, 2)
    }

    fn recording_seed(&self, index: SampleIndex) -> u64 {
        stable_hash_with(|hasher| {
            self.seed.hash(hasher);
            index.hash(hasher);
        }) ^ RECORDING_SEED_OFFSET
    }
}

impl SampleSource for SyntheticRecordings {
    fn id(&self) -> &str {
        &self.id
    }

    fn len(&self) -> usize {
        self.recordings
    }

    fn get(&self, index: SampleIndex) -> Result<Sample, DatasetError> {
        check_index(index, self.recordings)?;
        let mut rng = DeterministicRng::new(self.recording_seed(index));
        let mut t = 0i64;
        let events = (0..self.events_per_recording)
            .map(|_| {
                t += (1 + rng.below(MAX_EVENT_GAP_US)) as i64;
                Event {
                    t,
                    x: rng.below(self.width as u64) as u16,
                    y: rng.below(self.height as u64) as u16,
                    p: rng.below(2) as u8,
                }
            })
            .collect::<Vec<_>>();
        Ok(Sample::new(events, index as i64 % self.classes))
    }
}
