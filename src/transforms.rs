//! Post-retrieval transforms applied to sample data or targets.
//!
//! Transforms run after a sample leaves the cache (or a slicing source) and are
//! never persisted. Any `Fn(Vec<Piece>) -> Result<Vec<Piece>, DatasetError>` is a
//! transform; `Compose` chains several in order.

use std::fmt;
use std::sync::Arc;

use crate::data::Piece;
use crate::errors::DatasetError;

/// Pure function from a sample tuple to a sample tuple.
pub trait Transform: Send + Sync {
    /// Apply the transform to a data or target tuple.
    fn apply(&self, pieces: Vec<Piece>) -> Result<Vec<Piece>, DatasetError>;
}

impl<F> Transform for F
where
    F: Fn(Vec<Piece>) -> Result<Vec<Piece>, DatasetError> + Send + Sync,
{
    fn apply(&self, pieces: Vec<Piece>) -> Result<Vec<Piece>, DatasetError> {
        self(pieces)
    }
}

/// Shared handle to a transform, as stored by sources.
pub type SharedTransform = Arc<dyn Transform>;

/// Sequential composition of transforms.
#[derive(Clone, Default)]
pub struct Compose {
    steps: Vec<SharedTransform>,
}

impl Compose {
    /// Empty composition (identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: impl Transform + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append an already shared step.
    pub fn then_shared(mut self, step: SharedTransform) -> Self {
        self.steps.push(step);
        self
    }

    /// Number of chained steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when no steps are chained.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose")
            .field("steps", &self.steps.len())
            .finish()
    }
}

impl Transform for Compose {
    fn apply(&self, pieces: Vec<Piece>) -> Result<Vec<Piece>, DatasetError> {
        self.steps
            .iter()
            .try_fold(pieces, |pieces, step| step.apply(pieces))
    }
}

/// Apply an optional transform, passing the tuple through when unset.
pub(crate) fn apply_optional(
    transform: Option<&SharedTransform>,
    pieces: Vec<Piece>,
) -> Result<Vec<Piece>, DatasetError> {
    match transform {
        Some(transform) => transform.apply(pieces),
        None => Ok(pieces),
    }
}
