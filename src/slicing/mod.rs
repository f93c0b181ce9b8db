//! Slicing policies that cut one event recording into ordered sub-samples.
//!
//! A `Slicer` only computes metadata (half-open event index ranges); cutting
//! the events is a cheap slice of the recording, so `SlicedSource` can store
//! the metadata once and re-slice recordings on demand.

use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::constants::slicing::{SLICE_BY_EVENT_COUNT_TAG, SLICE_BY_TIME_TAG};
use crate::data::Event;
use crate::errors::DatasetError;
use crate::hash::stable_hash_with;
use crate::types::{Fingerprint, Timestamp};

/// Slice-metadata persistence backends.
pub mod metadata_store;
/// Slicing adapter exposing sub-samples as a `SampleSource`.
pub mod sliced_source;

pub use metadata_store::{FileSliceMetadataStore, InMemorySliceMetadataStore, SliceMetadataStore};
pub use sliced_source::SlicedSource;

/// Half-open range `start..end` of event positions within one recording.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bitcode::Encode,
    bitcode::Decode,
)]
pub struct SliceRange {
    /// First event position (inclusive).
    pub start: usize,
    /// One past the last event position.
    pub end: usize,
}

impl SliceRange {
    /// Number of events covered by the range.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` when the range covers no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the covered events, clamped to `events.len()`.
    pub fn apply<'a>(&self, events: &'a [Event]) -> &'a [Event] {
        let end = self.end.min(events.len());
        let start = self.start.min(end);
        &events[start..end]
    }
}

/// Policy that decomposes a recording into ordered slices.
pub trait Slicer: Send + Sync {
    /// Short name used in source ids and logs.
    fn name(&self) -> &str;
    /// Compute slice ranges for a time-ordered event stream.
    fn slice_metadata(&self, events: &[Event]) -> Result<Vec<SliceRange>, DatasetError>;
    /// Stable hash of the policy parameters; changes whenever output could change.
    fn fingerprint(&self) -> Fingerprint;
}

/// Fixed-duration windows over event timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceByTime {
    /// Window length in microseconds.
    pub time_window: Timestamp,
    /// Overlap between consecutive windows in microseconds.
    pub overlap: Timestamp,
    /// Keep a trailing window that extends past the last event.
    pub include_incomplete: bool,
}

impl SliceByTime {
    /// Non-overlapping windows of `time_window` microseconds, dropping the incomplete tail.
    pub fn new(time_window: Timestamp) -> Self {
        Self {
            time_window,
            overlap: 0,
            include_incomplete: false,
        }
    }

    /// Set the window overlap.
    pub fn with_overlap(mut self, overlap: Timestamp) -> Self {
        self.overlap = overlap;
        self
    }

    /// Keep or drop the incomplete trailing window.
    pub fn with_include_incomplete(mut self, include_incomplete: bool) -> Self {
        self.include_incomplete = include_incomplete;
        self
    }

    fn stride(&self) -> Result<Timestamp, DatasetError> {
        match self.time_window.checked_sub(self.overlap) {
            Some(stride) if self.time_window > 0 && stride > 0 => Ok(stride),
            _ => Err(DatasetError::Configuration(format!(
                "time_window ({}) must be positive and exceed overlap ({})",
                self.time_window, self.overlap
            ))),
        }
    }
}

impl Slicer for SliceByTime {
    fn name(&self) -> &str {
        SLICE_BY_TIME_TAG
    }

    fn slice_metadata(&self, events: &[Event]) -> Result<Vec<SliceRange>, DatasetError> {
        let stride = self.stride()?;
        let (Some(first), Some(last)) = (events.first(), events.last()) else {
            return Ok(Vec::new());
        };
        let span = last.t - first.t;
        let n_slices = window_count(span - self.time_window, stride, self.include_incomplete);
        let ranges = (0..n_slices)
            .map(|slice| {
                let window_start = first.t + slice as Timestamp * stride;
                let window_end = window_start + self.time_window;
                SliceRange {
                    start: events.partition_point(|event| event.t < window_start),
                    end: events.partition_point(|event| event.t < window_end),
                }
            })
            .collect();
        Ok(ranges)
    }

    fn fingerprint(&self) -> Fingerprint {
        stable_hash_with(|hasher| {
            SLICE_BY_TIME_TAG.hash(hasher);
            self.time_window.hash(hasher);
            self.overlap.hash(hasher);
            self.include_incomplete.hash(hasher);
        })
    }
}

/// Windows holding a fixed number of events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceByEventCount {
    /// Events per slice; clamped to the recording length.
    pub event_count: usize,
    /// Events shared by consecutive slices.
    pub overlap: usize,
    /// Keep a trailing slice shorter than `event_count`.
    pub include_incomplete: bool,
}

impl SliceByEventCount {
    /// Non-overlapping slices of `event_count` events, dropping the incomplete tail.
    pub fn new(event_count: usize) -> Self {
        Self {
            event_count,
            overlap: 0,
            include_incomplete: false,
        }
    }

    /// Set the slice overlap.
    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Keep or drop the incomplete trailing slice.
    pub fn with_include_incomplete(mut self, include_incomplete: bool) -> Self {
        self.include_incomplete = include_incomplete;
        self
    }
}

impl Slicer for SliceByEventCount {
    fn name(&self) -> &str {
        SLICE_BY_EVENT_COUNT_TAG
    }

    fn slice_metadata(&self, events: &[Event]) -> Result<Vec<SliceRange>, DatasetError> {
        let n_events = events.len();
        if n_events == 0 {
            return Ok(Vec::new());
        }
        let event_count = self.event_count.min(n_events);
        if event_count <= self.overlap {
            return Err(DatasetError::Configuration(format!(
                "event_count ({event_count}) must exceed overlap ({})",
                self.overlap
            )));
        }
        let stride = (event_count - self.overlap) as i64;
        let n_slices = window_count(
            (n_events - event_count) as i64,
            stride,
            self.include_incomplete,
        );
        let ranges = (0..n_slices)
            .map(|slice| {
                let start = slice * stride as usize;
                SliceRange {
                    start,
                    end: (start + event_count).min(n_events),
                }
            })
            .collect();
        Ok(ranges)
    }

    fn fingerprint(&self) -> Fingerprint {
        stable_hash_with(|hasher| {
            SLICE_BY_EVENT_COUNT_TAG.hash(hasher);
            self.event_count.hash(hasher);
            self.overlap.hash(hasher);
            self.include_incomplete.hash(hasher);
        })
    }
}

/// `floor(excess / stride) + 1` (or `ceil` when incomplete windows count), at least 1.
fn window_count(excess: i64, stride: i64, include_incomplete: bool) -> usize {
    let steps = if include_incomplete {
        -(-excess).div_euclid(stride)
    } else {
        excess.div_euclid(stride)
    };
    (steps + 1).max(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events_at(times: &[Timestamp]) -> Vec<Event> {
        times.iter().map(|&t| Event::new(t, 0, 0, 1)).collect()
    }

    fn ranges(pairs: &[(usize, usize)]) -> Vec<SliceRange> {
        pairs
            .iter()
            .map(|&(start, end)| SliceRange { start, end })
            .collect()
    }

    #[test]
    fn window_count_floors_or_ceils_and_never_drops_below_one() {
        assert_eq!(window_count(90, 10, false), 10);
        assert_eq!(window_count(95, 10, false), 10);
        assert_eq!(window_count(95, 10, true), 11);
        assert_eq!(window_count(90, 10, true), 10);
        assert_eq!(window_count(-5, 10, false), 1);
        assert_eq!(window_count(-5, 10, true), 1);
        assert_eq!(window_count(-50, 10, false), 1);
    }

    #[test]
    fn slice_by_time_cuts_fixed_windows() {
        let events = events_at(&[0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        let slicer = SliceByTime::new(25);
        // span 100, window 25 -> floor(75 / 25) + 1 = 4 windows
        assert_eq!(
            slicer.slice_metadata(&events).unwrap(),
            ranges(&[(0, 3), (3, 5), (5, 8), (8, 10)])
        );

        let with_tail = slicer.with_include_incomplete(true);
        assert_eq!(
            with_tail.slice_metadata(&events).unwrap(),
            ranges(&[(0, 3), (3, 5), (5, 8), (8, 10)])
        );

        let uneven = SliceByTime::new(30).with_include_incomplete(true);
        // ceil(70 / 30) + 1 = 4 windows: [0,30) [30,60) [60,90) [90,120)
        assert_eq!(
            uneven.slice_metadata(&events).unwrap(),
            ranges(&[(0, 3), (3, 6), (6, 9), (9, 11)])
        );
        let uneven_dropped = SliceByTime::new(30);
        assert_eq!(uneven_dropped.slice_metadata(&events).unwrap().len(), 3);
    }

    #[test]
    fn slice_by_time_overlap_and_offsets() {
        let events = events_at(&[1_000, 1_005, 1_010, 1_015, 1_020]);
        let slicer = SliceByTime::new(10).with_overlap(5);
        // span 20, stride 5 -> floor(10 / 5) + 1 = 3 windows starting at t0
        assert_eq!(
            slicer.slice_metadata(&events).unwrap(),
            ranges(&[(0, 2), (1, 3), (2, 4)])
        );
    }

    #[test]
    fn slice_by_time_short_and_empty_recordings() {
        let events = events_at(&[0, 5]);
        assert_eq!(
            SliceByTime::new(1_000).slice_metadata(&events).unwrap(),
            ranges(&[(0, 2)])
        );
        assert!(SliceByTime::new(10).slice_metadata(&[]).unwrap().is_empty());
    }

    #[test]
    fn slice_by_time_rejects_non_positive_stride() {
        let events = events_at(&[0, 1]);
        for slicer in [
            SliceByTime::new(0),
            SliceByTime::new(10).with_overlap(10),
            SliceByTime::new(10).with_overlap(i64::MIN),
            SliceByTime::new(-1).with_overlap(i64::MAX),
        ] {
            assert!(matches!(
                slicer.slice_metadata(&events),
                Err(DatasetError::Configuration(ref msg)) if msg.contains("overlap")
            ));
        }
    }

    #[test]
    fn slice_by_event_count_cuts_fixed_counts() {
        let events = events_at(&(0..10).collect::<Vec<_>>());
        assert_eq!(
            SliceByEventCount::new(3).slice_metadata(&events).unwrap(),
            ranges(&[(0, 3), (3, 6), (6, 9)])
        );
        assert_eq!(
            SliceByEventCount::new(3)
                .with_include_incomplete(true)
                .slice_metadata(&events)
                .unwrap(),
            ranges(&[(0, 3), (3, 6), (6, 9), (9, 10)])
        );
        assert_eq!(
            SliceByEventCount::new(4)
                .with_overlap(2)
                .slice_metadata(&events)
                .unwrap(),
            ranges(&[(0, 4), (2, 6), (4, 8), (6, 10)])
        );
        assert_eq!(
            SliceByEventCount::new(50).slice_metadata(&events).unwrap(),
            ranges(&[(0, 10)])
        );
        assert!(
            SliceByEventCount::new(3)
                .slice_metadata(&[])
                .unwrap()
                .is_empty()
        );
        assert!(matches!(
            SliceByEventCount::new(3).with_overlap(3).slice_metadata(&events),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn fingerprints_track_parameters() {
        let base = SliceByTime::new(1_000);
        assert_eq!(base.fingerprint(), SliceByTime::new(1_000).fingerprint());
        assert_ne!(base.fingerprint(), base.with_overlap(10).fingerprint());
        assert_ne!(
            base.fingerprint(),
            base.with_include_incomplete(true).fingerprint()
        );
        assert_ne!(
            SliceByEventCount::new(1_000).fingerprint(),
            base.fingerprint()
        );
    }

    #[test]
    fn slice_range_apply_clamps() {
        let events = events_at(&[1, 2, 3]);
        let range = SliceRange { start: 1, end: 10 };
        assert_eq!(range.apply(&events).len(), 2);
        assert_eq!(range.len(), 9);
        let empty = SliceRange { start: 5, end: 5 };
        assert!(empty.is_empty());
        assert!(empty.apply(&events).is_empty());
    }
}
