use serde::{Deserialize, Serialize};

use crate::errors::DatasetError;
use crate::types::{FieldName, Timestamp};

pub use crate::types::{SampleIndex, SourceId};

/// A single sensor event: timestamp, pixel coordinates, and polarity.
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
pub struct Event {
    /// Timestamp in microseconds.
    pub t: Timestamp,
    /// Horizontal pixel coordinate.
    pub x: u16,
    /// Vertical pixel coordinate.
    pub y: u16,
    /// Polarity channel (typically `0` or `1`).
    pub p: u8,
}

impl Event {
    /// Build an event from its fields.
    pub fn new(t: Timestamp, x: u16, y: u16, p: u8) -> Self {
        Self { t, x, y, p }
    }
}

/// Flat element storage for a `Tensor`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum TensorData {
    /// Integer elements (counts, class ids, pixel values).
    Int(Vec<i64>),
    /// Floating-point elements.
    Float(Vec<f64>),
}

impl TensorData {
    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            TensorData::Int(values) => values.len(),
            TensorData::Float(values) => values.len(),
        }
    }

    /// Returns `true` when no elements are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense row-major multi-dimensional array.
///
/// Every construction path, deserialization included, checks that `shape`
/// covers exactly `data.len()` elements.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
#[serde(try_from = "RawTensor")]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

/// Unchecked wire form of a `Tensor`.
#[derive(Deserialize)]
struct RawTensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl TryFrom<RawTensor> for Tensor {
    type Error = DatasetError;

    fn try_from(raw: RawTensor) -> Result<Self, Self::Error> {
        Tensor::new(raw.shape, raw.data)
    }
}

impl Tensor {
    /// Build a tensor, validating that `shape` covers exactly `data.len()` elements.
    pub fn new(shape: Vec<usize>, data: TensorData) -> Result<Self, DatasetError> {
        let tensor = Self { shape, data };
        tensor.validate()?;
        Ok(tensor)
    }

    /// Integer tensor filled with zeros.
    ///
    /// Fails when the element count overflows `usize`.
    pub fn zeros(shape: Vec<usize>) -> Result<Self, DatasetError> {
        let len = element_count(&shape)?;
        Ok(Self {
            shape,
            data: TensorData::Int(vec![0; len]),
        })
    }

    /// Build a tensor without checking the shape.
    #[cfg(test)]
    pub(crate) fn unchecked(shape: Vec<usize>, data: TensorData) -> Self {
        Self { shape, data }
    }

    /// Check that the shape matches the stored element count.
    pub fn validate(&self) -> Result<(), DatasetError> {
        let expected = element_count(&self.shape)?;
        if expected != self.data.len() {
            return Err(DatasetError::Configuration(format!(
                "tensor shape {:?} expects {expected} elements, got {}",
                self.shape,
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Tensor dimensions.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Flat element storage.
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Consume the tensor, returning its shape and storage.
    pub fn into_parts(self) -> (Vec<usize>, TensorData) {
        (self.shape, self.data)
    }
}

fn element_count(shape: &[usize]) -> Result<usize, DatasetError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            DatasetError::Configuration(format!("tensor shape {shape:?} overflows usize"))
        })
}

/// One array-like value stored in a sample piece.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum Array {
    /// Scalar integer (e.g. a class label).
    Int(i64),
    /// Scalar float.
    Float(f64),
    /// Dense tensor (e.g. accumulated frames).
    Tensor(Tensor),
    /// Time-ordered event stream.
    Events(Vec<Event>),
}

impl Array {
    /// Borrow the event stream when this array holds one.
    pub fn as_events(&self) -> Option<&[Event]> {
        match self {
            Array::Events(events) => Some(events),
            _ => None,
        }
    }

    /// Check tensor consistency; other variants are always valid.
    pub fn validate(&self) -> Result<(), DatasetError> {
        match self {
            Array::Tensor(tensor) => tensor.validate(),
            _ => Ok(()),
        }
    }

    /// Scalar integer value, if this array is one.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Array::Int(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<i64> for Array {
    fn from(value: i64) -> Self {
        Array::Int(value)
    }
}

impl From<f64> for Array {
    fn from(value: f64) -> Self {
        Array::Float(value)
    }
}

impl From<Tensor> for Array {
    fn from(value: Tensor) -> Self {
        Array::Tensor(value)
    }
}

impl From<Vec<Event>> for Array {
    fn from(value: Vec<Event>) -> Self {
        Array::Events(value)
    }
}

/// One element of a sample's data or target tuple.
///
/// A piece is either a single array or an ordered set of named arrays
/// (for example `events`, `imu`, and `gps` recorded together).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub enum Piece {
    /// A single array.
    Array(Array),
    /// Named arrays in insertion order.
    Fields(Vec<(FieldName, Array)>),
}

impl Piece {
    /// Borrow the single array of this piece, if it is not a field set.
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Piece::Array(array) => Some(array),
            Piece::Fields(_) => None,
        }
    }

    /// Look up a named field of a field-set piece.
    pub fn field(&self, name: &str) -> Option<&Array> {
        match self {
            Piece::Fields(fields) => fields
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, array)| array),
            Piece::Array(_) => None,
        }
    }
}

impl From<Array> for Piece {
    fn from(value: Array) -> Self {
        Piece::Array(value)
    }
}

impl From<i64> for Piece {
    fn from(value: i64) -> Self {
        Piece::Array(Array::Int(value))
    }
}

impl From<f64> for Piece {
    fn from(value: f64) -> Self {
        Piece::Array(Array::Float(value))
    }
}

impl From<Tensor> for Piece {
    fn from(value: Tensor) -> Self {
        Piece::Array(Array::Tensor(value))
    }
}

impl From<Vec<Event>> for Piece {
    fn from(value: Vec<Event>) -> Self {
        Piece::Array(Array::Events(value))
    }
}

/// Immutable (data, target) pair produced by a sample source at one index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, bitcode::Encode, bitcode::Decode)]
pub struct Sample {
    /// Data tuple; most samples carry exactly one piece.
    pub data: Vec<Piece>,
    /// Target/label tuple; empty when the sample has no target.
    pub target: Vec<Piece>,
}

impl Sample {
    /// Build a sample with a single data piece and a single target piece.
    pub fn new(data: impl Into<Piece>, target: impl Into<Piece>) -> Self {
        Self {
            data: vec![data.into()],
            target: vec![target.into()],
        }
    }

    /// Build a sample with a single data piece and no target.
    pub fn unlabeled(data: impl Into<Piece>) -> Self {
        Self {
            data: vec![data.into()],
            target: Vec::new(),
        }
    }

    /// Build a sample from explicit data and target tuples.
    pub fn from_parts(data: Vec<Piece>, target: Vec<Piece>) -> Self {
        Self { data, target }
    }

    /// Borrow the event stream stored in the first data piece.
    ///
    /// Field-set pieces are searched for an `events` field.
    pub fn events(&self) -> Option<&[Event]> {
        match self.data.first()? {
            Piece::Array(array) => array.as_events(),
            piece @ Piece::Fields(_) => piece.field("events")?.as_events(),
        }
    }

    /// Scalar integer label stored as the first target piece.
    pub fn label(&self) -> Option<i64> {
        self.target.first()?.as_array()?.as_int()
    }

    /// Check every tensor in the data and target tuples.
    pub fn validate(&self) -> Result<(), DatasetError> {
        for piece in self.data.iter().chain(&self.target) {
            match piece {
                Piece::Array(array) => array.validate()?,
                Piece::Fields(fields) => {
                    for (_, array) in fields {
                        array.validate()?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_new_rejects_mismatched_shape() {
        let err = Tensor::new(vec![2, 3], TensorData::Int(vec![1, 2, 3])).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Configuration(ref msg) if msg.contains("expects 6 elements")
        ));

        let tensor = Tensor::new(vec![2, 2], TensorData::Float(vec![0.0; 4])).unwrap();
        assert_eq!(tensor.shape(), &[2, 2]);
        assert_eq!(tensor.data().len(), 4);
        assert_eq!(Tensor::zeros(vec![0, 3]).unwrap().data().len(), 0);
        let (shape, data) = tensor.into_parts();
        assert_eq!(shape, vec![2, 2]);
        assert_eq!(data, TensorData::Float(vec![0.0; 4]));
    }

    #[test]
    fn tensor_shapes_that_overflow_are_rejected() {
        let err = Tensor::new(vec![usize::MAX, 2], TensorData::Int(vec![])).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::Configuration(ref msg) if msg.contains("overflows")
        ));
        assert!(matches!(
            Tensor::zeros(vec![usize::MAX, 2]),
            Err(DatasetError::Configuration(_))
        ));
    }

    #[test]
    fn tensor_deserialization_enforces_shape() {
        let err = serde_json::from_str::<Tensor>(r#"{"shape":[3],"data":{"Int":[1]}}"#)
            .unwrap_err();
        assert!(err.to_string().contains("expects 3 elements"));

        let tensor: Tensor =
            serde_json::from_str(r#"{"shape":[1,2],"data":{"Float":[0.5,1.5]}}"#).unwrap();
        assert_eq!(tensor.shape(), &[1, 2]);
        let json = serde_json::to_string(&tensor).unwrap();
        assert_eq!(serde_json::from_str::<Tensor>(&json).unwrap(), tensor);
    }

    #[test]
    fn sample_validate_checks_nested_tensors() {
        let good = Tensor::new(vec![2], TensorData::Int(vec![1, 2])).unwrap();
        let bad = Tensor {
            shape: vec![4],
            data: TensorData::Int(vec![1]),
        };
        let sample = Sample::from_parts(
            vec![Piece::Fields(vec![("frames".to_string(), Array::Tensor(good.clone()))])],
            vec![Piece::from(1i64)],
        );
        sample.validate().unwrap();

        let broken = Sample::from_parts(
            vec![Piece::from(good)],
            vec![Piece::Fields(vec![("mask".to_string(), Array::Tensor(bad))])],
        );
        assert!(matches!(
            broken.validate(),
            Err(DatasetError::Configuration(ref msg)) if msg.contains("expects 4 elements")
        ));
    }

    #[test]
    fn sample_accessors_cover_array_and_field_pieces() {
        let events = vec![Event::new(1, 2, 3, 1), Event::new(5, 0, 0, 0)];
        let plain = Sample::new(events.clone(), 4i64);
        assert_eq!(plain.events(), Some(events.as_slice()));
        assert_eq!(plain.label(), Some(4));

        let fields = Sample::from_parts(
            vec![Piece::Fields(vec![
                ("imu".to_string(), Array::Float(0.5)),
                ("events".to_string(), Array::Events(events.clone())),
            ])],
            Vec::new(),
        );
        assert_eq!(fields.events(), Some(events.as_slice()));
        assert_eq!(fields.label(), None);

        let scalar = Sample::unlabeled(3i64);
        assert!(scalar.events().is_none());
        assert!(scalar.target.is_empty());
    }
}
