//! Embeddings and the external encoder seam.
//!
//! Text and image vectors live in different spaces. The kind is part of the
//! value's type so the two can never be compared by accident.

use std::future::Future;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmbeddingKind {
  Text,
  Image,
}

/// A fixed-dimension vector tagged with the space it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "vector", rename_all = "snake_case")]
pub enum Embedding {
  Text(Vec<f32>),
  Image(Vec<f32>),
}

impl Embedding {
  pub fn new(kind: EmbeddingKind, vector: Vec<f32>) -> Self {
    match kind {
      EmbeddingKind::Text => Self::Text(vector),
      EmbeddingKind::Image => Self::Image(vector),
    }
  }

  pub fn kind(&self) -> EmbeddingKind {
    match self {
      Self::Text(_) => EmbeddingKind::Text,
      Self::Image(_) => EmbeddingKind::Image,
    }
  }

  pub fn vector(&self) -> &[f32] {
    match self {
      Self::Text(v) | Self::Image(v) => v,
    }
  }

  pub fn into_vector(self) -> Vec<f32> {
    match self {
      Self::Text(v) | Self::Image(v) => v,
    }
  }

  pub fn dim(&self) -> usize { self.vector().len() }

  /// Cosine similarity with another embedding of the same kind.
  pub fn cosine_similarity(&self, other: &Embedding) -> Result<f32> {
    if self.kind() != other.kind() {
      return Err(Error::KindMismatch {
        left:  self.kind(),
        right: other.kind(),
      });
    }
    Ok(cosine_similarity(self.vector(), other.vector()))
  }
}

/// Cosine similarity of two raw vectors. Mismatched lengths and zero vectors
/// score `0.0`.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() || a.is_empty() {
    return 0.0;
  }
  let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
  let norm_a = norm(a);
  let norm_b = norm(b);
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a * norm_b)
}

pub(crate) fn norm(v: &[f32]) -> f32 { v.iter().map(|x| x * x).sum::<f32>().sqrt() }

/// Encode the fixed-size vector into little-endian bytes for storage.
pub fn vector_to_bytes(v: &[f32]) -> Vec<u8> {
  v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Inverse of [`vector_to_bytes`]. Trailing partial floats are rejected.
pub fn vector_from_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
  if bytes.len() % 4 != 0 {
    return Err(Error::Validation(format!(
      "embedding blob of {} bytes is not a whole number of f32s",
      bytes.len()
    )));
  }
  Ok(
    bytes
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect(),
  )
}

// ─── Dimensions ──────────────────────────────────────────────────────────────

/// The fixed dimension of each embedding space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
  pub text:  usize,
  pub image: usize,
}

impl Default for Dimensions {
  fn default() -> Self { Self { text: 384, image: 512 } }
}

impl Dimensions {
  pub fn of(&self, kind: EmbeddingKind) -> usize {
    match kind {
      EmbeddingKind::Text => self.text,
      EmbeddingKind::Image => self.image,
    }
  }

  /// Reject vectors whose length does not match their space.
  pub fn check(&self, embedding: &Embedding) -> Result<()> {
    let expected = self.of(embedding.kind());
    if embedding.dim() != expected {
      return Err(Error::DimensionMismatch {
        kind: embedding.kind(),
        expected,
        got: embedding.dim(),
      });
    }
    Ok(())
  }
}

// ─── Encoder ─────────────────────────────────────────────────────────────────

/// The external embedding service. The engine never computes embeddings
/// itself.
///
/// Implementations return [`Error::DependencyUnavailable`] when the service
/// cannot be reached so callers can degrade.
pub trait Encoder: Send + Sync {
  /// Encode free text into an [`Embedding::Text`].
  fn encode_text(
    &self,
    text: String,
  ) -> impl Future<Output = Result<Embedding>> + Send + '_;

  /// Encode raw image bytes into an [`Embedding::Image`].
  fn encode_image(
    &self,
    image: Bytes,
  ) -> impl Future<Output = Result<Embedding>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cosine_of_parallel_vectors_is_one() {
    let s = cosine_similarity(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
    assert!((s - 1.0).abs() < 1e-6);
  }

  #[test]
  fn cosine_of_zero_vector_is_zero() {
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
  }

  #[test]
  fn text_and_image_never_compare() {
    let t = Embedding::Text(vec![1.0, 0.0]);
    let i = Embedding::Image(vec![1.0, 0.0]);
    assert!(matches!(t.cosine_similarity(&i), Err(Error::KindMismatch { .. })));
  }

  #[test]
  fn dimension_check() {
    let dims = Dimensions { text: 3, image: 2 };
    assert!(dims.check(&Embedding::Text(vec![0.1, 0.2, 0.3])).is_ok());
    assert!(matches!(
      dims.check(&Embedding::Image(vec![0.1, 0.2, 0.3])),
      Err(Error::DimensionMismatch { expected: 2, got: 3, .. })
    ));
  }

  #[test]
  fn bytes_round_trip() {
    let v = vec![0.5_f32, -1.25, 3.0];
    assert_eq!(vector_from_bytes(&vector_to_bytes(&v)).unwrap(), v);
    assert!(vector_from_bytes(&[0, 1, 2]).is_err());
  }
}
