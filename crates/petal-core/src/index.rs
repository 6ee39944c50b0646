//! In-memory nearest-neighbour index over product embeddings.
//!
//! Vectors are normalised once on insert and packed row-major per kind, so a
//! query is a dot product per row plus a bounded top-k heap. The store keeps
//! the index in sync with the persisted embeddings; request paths never read
//! vectors from the database.

use std::{
  cmp::Ordering,
  collections::{BinaryHeap, HashMap},
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Result,
  embedding::{Dimensions, Embedding, EmbeddingKind, norm},
};

/// A product and its cosine similarity to the query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
  pub product_id: Uuid,
  pub similarity: f32,
}

/// Min-heap entry: the weakest of the current top-k sits on top.
struct Ranked(Neighbor);

impl PartialEq for Ranked {
  fn eq(&self, other: &Self) -> bool { self.cmp(other) == Ordering::Equal }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for Ranked {
  fn cmp(&self, other: &Self) -> Ordering {
    // Reverse on similarity; ties keep the lower product id.
    other
      .0
      .similarity
      .total_cmp(&self.0.similarity)
      .then_with(|| self.0.product_id.cmp(&other.0.product_id))
  }
}

#[derive(Debug, Default)]
struct Space {
  ids:   Vec<Uuid>,
  slots: HashMap<Uuid, usize>,
  rows:  Vec<f32>,
}

impl Space {
  fn upsert(&mut self, product_id: Uuid, unit: Vec<f32>, dim: usize) {
    if let Some(&slot) = self.slots.get(&product_id) {
      self.rows[slot * dim..(slot + 1) * dim].copy_from_slice(&unit);
      return;
    }
    self.slots.insert(product_id, self.ids.len());
    self.ids.push(product_id);
    self.rows.extend(unit);
  }

  fn remove(&mut self, product_id: Uuid, dim: usize) -> bool {
    let Some(slot) = self.slots.remove(&product_id) else {
      return false;
    };
    let last = self.ids.len() - 1;
    if slot != last {
      let moved = self.ids[last];
      self.ids.swap(slot, last);
      let (head, tail) = self.rows.split_at_mut(last * dim);
      head[slot * dim..(slot + 1) * dim].copy_from_slice(&tail[..dim]);
      self.slots.insert(moved, slot);
    }
    self.ids.pop();
    self.rows.truncate(last * dim);
    true
  }

  fn row(&self, slot: usize, dim: usize) -> &[f32] { &self.rows[slot * dim..(slot + 1) * dim] }
}

/// Per-kind packed vectors with exact cosine top-k search.
#[derive(Debug)]
pub struct FlatIndex {
  dims:  Dimensions,
  text:  Space,
  image: Space,
}

impl FlatIndex {
  pub fn new(dims: Dimensions) -> Self {
    Self {
      dims,
      text: Space::default(),
      image: Space::default(),
    }
  }

  pub fn dimensions(&self) -> Dimensions { self.dims }

  fn space(&self, kind: EmbeddingKind) -> &Space {
    match kind {
      EmbeddingKind::Text => &self.text,
      EmbeddingKind::Image => &self.image,
    }
  }

  fn space_mut(&mut self, kind: EmbeddingKind) -> &mut Space {
    match kind {
      EmbeddingKind::Text => &mut self.text,
      EmbeddingKind::Image => &mut self.image,
    }
  }

  /// Insert or replace the embedding of `kind` for `product_id`.
  pub fn upsert(&mut self, product_id: Uuid, embedding: &Embedding) -> Result<()> {
    self.dims.check(embedding)?;
    let dim = embedding.dim();
    let unit = normalized(embedding.vector());
    self.space_mut(embedding.kind()).upsert(product_id, unit, dim);
    Ok(())
  }

  pub fn remove(&mut self, product_id: Uuid, kind: EmbeddingKind) -> bool {
    let dim = self.dims.of(kind);
    self.space_mut(kind).remove(product_id, dim)
  }

  pub fn len(&self, kind: EmbeddingKind) -> usize { self.space(kind).ids.len() }

  pub fn is_empty(&self) -> bool { self.text.ids.is_empty() && self.image.ids.is_empty() }

  /// The stored (unit-length) vector for `product_id`, if any.
  pub fn get(&self, product_id: Uuid, kind: EmbeddingKind) -> Option<Embedding> {
    let space = self.space(kind);
    let slot = *space.slots.get(&product_id)?;
    Some(Embedding::new(kind, space.row(slot, self.dims.of(kind)).to_vec()))
  }

  /// The `k` stored products most similar to `query` within its own kind,
  /// most similar first.
  pub fn nearest(&self, query: &Embedding, k: usize) -> Result<Vec<Neighbor>> {
    self.dims.check(query)?;
    let kind = query.kind();
    let dim = self.dims.of(kind);
    let q = normalized(query.vector());
    if k == 0 || q.iter().all(|x| *x == 0.0) {
      return Ok(Vec::new());
    }

    let space = self.space(kind);
    let mut heap: BinaryHeap<Ranked> = BinaryHeap::with_capacity(k + 1);
    for (slot, product_id) in space.ids.iter().enumerate() {
      let row = space.row(slot, dim);
      let similarity: f32 = row.iter().zip(&q).map(|(a, b)| a * b).sum();
      heap.push(Ranked(Neighbor { product_id: *product_id, similarity }));
      if heap.len() > k {
        heap.pop();
      }
    }

    // `into_sorted_vec` is ascending by `Ord`, i.e. most similar first.
    Ok(heap.into_sorted_vec().into_iter().map(|r| r.0).collect())
  }
}

fn normalized(v: &[f32]) -> Vec<f32> {
  let n = norm(v);
  if n <= f32::EPSILON {
    return vec![0.0; v.len()];
  }
  v.iter().map(|x| x / n).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::Error;

  fn dims() -> Dimensions { Dimensions { text: 2, image: 3 } }

  #[test]
  fn nearest_orders_by_similarity() {
    let mut index = FlatIndex::new(dims());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    index.upsert(a, &Embedding::Image(vec![1.0, 0.0, 0.0])).unwrap();
    index.upsert(b, &Embedding::Image(vec![0.9, 0.1, 0.0])).unwrap();
    index.upsert(c, &Embedding::Image(vec![0.0, 0.0, 1.0])).unwrap();

    let hits = index.nearest(&Embedding::Image(vec![2.0, 0.0, 0.0]), 2).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].product_id, a);
    assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].product_id, b);
  }

  #[test]
  fn kinds_are_separate_spaces() {
    let mut index = FlatIndex::new(dims());
    let a = Uuid::new_v4();
    index.upsert(a, &Embedding::Text(vec![1.0, 0.0])).unwrap();
    let hits = index.nearest(&Embedding::Image(vec![1.0, 0.0, 0.0]), 5).unwrap();
    assert!(hits.is_empty());
    assert_eq!(index.len(EmbeddingKind::Text), 1);
    assert_eq!(index.len(EmbeddingKind::Image), 0);
  }

  #[test]
  fn wrong_dimension_is_rejected() {
    let mut index = FlatIndex::new(dims());
    let err = index
      .upsert(Uuid::new_v4(), &Embedding::Text(vec![1.0, 0.0, 0.0]))
      .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
  }

  #[test]
  fn upsert_replaces_and_remove_compacts() {
    let mut index = FlatIndex::new(dims());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    index.upsert(a, &Embedding::Text(vec![1.0, 0.0])).unwrap();
    index.upsert(b, &Embedding::Text(vec![0.0, 1.0])).unwrap();
    index.upsert(a, &Embedding::Text(vec![0.0, 3.0])).unwrap();
    assert_eq!(index.len(EmbeddingKind::Text), 2);

    assert!(index.remove(a, EmbeddingKind::Text));
    assert!(!index.remove(a, EmbeddingKind::Text));
    let hits = index.nearest(&Embedding::Text(vec![0.0, 1.0]), 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].product_id, b);
    assert_eq!(index.get(b, EmbeddingKind::Text), Some(Embedding::Text(vec![0.0, 1.0])));
  }

  #[test]
  fn zero_query_matches_nothing() {
    let mut index = FlatIndex::new(dims());
    index.upsert(Uuid::new_v4(), &Embedding::Text(vec![1.0, 0.0])).unwrap();
    assert!(index.nearest(&Embedding::Text(vec![0.0, 0.0]), 3).unwrap().is_empty());
  }
}
