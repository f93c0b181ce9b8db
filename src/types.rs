/// Position of a sample within a source's index space (`0..len`).
/// Example: `42`
pub type SampleIndex = usize;
/// Which of the `num_copies` cached computations of an index is addressed.
/// Example: `0`
pub type CopyIndex = usize;
/// Identifier for the source that produced a sample.
/// Examples: `synthetic`, `synthetic::slice_by_time`
pub type SourceId = String;
/// Key of a named array inside a dictionary-like sample piece.
/// Examples: `events`, `imu`, `frames`
pub type FieldName = String;
/// Event timestamp in microseconds.
/// Example: `1_250_000`
pub type Timestamp = i64;
/// Stable fingerprint mixing slicer parameters with the source identity.
/// Example: `0x5f3a_91c2_0b7e_44d1`
pub type Fingerprint = u64;
