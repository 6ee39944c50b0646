//! Error types for `petal-core`.

use thiserror::Error;

use crate::embedding::EmbeddingKind;

#[derive(Debug, Error)]
pub enum Error {
  /// Input rejected before any side effect took place.
  #[error("validation error: {0}")]
  Validation(String),

  #[error("unknown event type: {0:?}")]
  UnknownEventType(String),

  #[error("unknown recommendation context: {0:?}")]
  UnknownContext(String),

  #[error("unknown relationship type: {0:?}")]
  UnknownRelationshipType(String),

  /// The embedding encoder or vector index could not serve the request.
  #[error("dependency unavailable: {0}")]
  DependencyUnavailable(String),

  #[error("{kind} embedding has dimension {got}, expected {expected}")]
  DimensionMismatch {
    kind:     EmbeddingKind,
    expected: usize,
    got:      usize,
  },

  #[error("cannot compare a {left} embedding with a {right} embedding")]
  KindMismatch {
    left:  EmbeddingKind,
    right: EmbeddingKind,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Whether the caller sent something unacceptable, as opposed to the
  /// engine failing to serve a valid request.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::Validation(_)
        | Self::UnknownEventType(_)
        | Self::UnknownContext(_)
        | Self::UnknownRelationshipType(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
