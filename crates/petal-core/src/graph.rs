//! The weighted product-relationship graph and the batch aggregation that
//! builds it.
//!
//! Aggregation is an explicit two-pass computation: pass one groups raw
//! `(basket, product)` rows into distinct baskets and fixes the denominator;
//! pass two counts canonical pairs and derives each confidence from that
//! single denominator.

use std::{
  collections::{BTreeMap, BTreeSet},
  str::FromStr,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RelationshipType {
  FrequentlyBoughtTogether,
  ViewedTogether,
  Alternative,
  Upgrade,
}

impl RelationshipType {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownRelationshipType(s.to_owned()))
  }
}

/// An unordered product pair in canonical form (`a < b`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductPair {
  a: Uuid,
  b: Uuid,
}

impl ProductPair {
  /// Canonicalise `x` and `y`. Returns `None` for a self-pair.
  pub fn new(x: Uuid, y: Uuid) -> Option<Self> {
    match x.cmp(&y) {
      std::cmp::Ordering::Less => Some(Self { a: x, b: y }),
      std::cmp::Ordering::Greater => Some(Self { a: y, b: x }),
      std::cmp::Ordering::Equal => None,
    }
  }

  pub fn a(&self) -> Uuid { self.a }

  pub fn b(&self) -> Uuid { self.b }
}

/// One weighted edge. At most one edge exists per canonical pair and
/// relationship type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEdge {
  pub product_a_id:      Uuid,
  pub product_b_id:      Uuid,
  pub relationship_type: RelationshipType,
  /// Occurrences over total opportunities, in `[0, 1]`.
  pub confidence_score:  f64,
  pub occurrence_count:  u64,
  pub updated_at:        DateTime<Utc>,
}

impl RelationshipEdge {
  /// The endpoint opposite `product_id`, if the edge touches it.
  pub fn other(&self, product_id: Uuid) -> Option<Uuid> {
    if self.product_a_id == product_id {
      Some(self.product_b_id)
    } else if self.product_b_id == product_id {
      Some(self.product_a_id)
    } else {
      None
    }
  }
}

/// Minimum co-occurrence counts below which a pair is treated as noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphThresholds {
  pub min_order_cooccurrence:   u64,
  pub min_session_cooccurrence: u64,
}

impl Default for GraphThresholds {
  fn default() -> Self {
    Self {
      min_order_cooccurrence:   3,
      min_session_cooccurrence: 5,
    }
  }
}

/// The full output of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct GraphBuild {
  pub edges:          Vec<RelationshipEdge>,
  /// Distinct completed orders containing at least one product.
  pub total_orders:   u64,
  /// Distinct sessions with at least one product view.
  pub total_sessions: u64,
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

/// Build both co-purchase and co-view edges.
///
/// `order_items` yields `(order_id, product_id)` for completed orders;
/// `session_views` yields `(session_id, product_id)` for `view` events.
/// Repeated rows are harmless: each basket is reduced to a set first.
/// Output is sorted, so identical input always produces identical edges.
pub fn build_graph<O, V>(
  order_items: O,
  session_views: V,
  thresholds: GraphThresholds,
  now: DateTime<Utc>,
) -> GraphBuild
where
  O: IntoIterator<Item = (Uuid, Uuid)>,
  V: IntoIterator<Item = (String, Uuid)>,
{
  let (mut edges, total_orders) = cooccurrence(
    order_items,
    RelationshipType::FrequentlyBoughtTogether,
    thresholds.min_order_cooccurrence,
    now,
  );
  let (view_edges, total_sessions) = cooccurrence(
    session_views,
    RelationshipType::ViewedTogether,
    thresholds.min_session_cooccurrence,
    now,
  );
  edges.extend(view_edges);

  GraphBuild { edges, total_orders, total_sessions }
}

/// Count pair co-occurrence across distinct baskets keyed by `K`.
fn cooccurrence<K, I>(
  rows: I,
  relationship_type: RelationshipType,
  min_occurrences: u64,
  now: DateTime<Utc>,
) -> (Vec<RelationshipEdge>, u64)
where
  K: Ord,
  I: IntoIterator<Item = (K, Uuid)>,
{
  // Pass 1: distinct baskets and the global denominator.
  let mut baskets: BTreeMap<K, BTreeSet<Uuid>> = BTreeMap::new();
  for (key, product) in rows {
    baskets.entry(key).or_default().insert(product);
  }
  let denominator = baskets.len() as u64;

  // Pass 2: canonical pair counts, confidence from the fixed denominator.
  let mut counts: BTreeMap<ProductPair, u64> = BTreeMap::new();
  for products in baskets.values() {
    let products: Vec<Uuid> = products.iter().copied().collect();
    for (i, x) in products.iter().enumerate() {
      for y in &products[i + 1..] {
        if let Some(pair) = ProductPair::new(*x, *y) {
          *counts.entry(pair).or_insert(0) += 1;
        }
      }
    }
  }

  let edges = counts
    .into_iter()
    .filter(|(_, n)| *n >= min_occurrences.max(1))
    .map(|(pair, n)| RelationshipEdge {
      product_a_id: pair.a(),
      product_b_id: pair.b(),
      relationship_type,
      confidence_score: n as f64 / denominator as f64,
      occurrence_count: n,
      updated_at: now,
    })
    .collect();

  (edges, denominator)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ids(n: usize) -> Vec<Uuid> {
    let mut v: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
    v.sort();
    v
  }

  #[test]
  fn pair_is_canonical() {
    let p = ids(2);
    let forward = ProductPair::new(p[0], p[1]).unwrap();
    let backward = ProductPair::new(p[1], p[0]).unwrap();
    assert_eq!(forward, backward);
    assert!(forward.a() < forward.b());
    assert!(ProductPair::new(p[0], p[0]).is_none());
  }

  #[test]
  fn co_purchase_confidence_uses_distinct_orders() {
    let p = ids(3);
    let orders: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
    // Three orders contain A and B, the fourth only C.
    let mut rows = Vec::new();
    for order in &orders[..3] {
      rows.push((*order, p[1]));
      rows.push((*order, p[0]));
      // Duplicate line items must not inflate counts.
      rows.push((*order, p[0]));
    }
    rows.push((orders[3], p[2]));

    let build = build_graph(rows, Vec::new(), GraphThresholds::default(), Utc::now());
    assert_eq!(build.total_orders, 4);
    assert_eq!(build.edges.len(), 1);
    let edge = &build.edges[0];
    assert_eq!(edge.product_a_id, p[0]);
    assert_eq!(edge.product_b_id, p[1]);
    assert_eq!(edge.occurrence_count, 3);
    assert!((edge.confidence_score - 0.75).abs() < 1e-12);
    assert_eq!(edge.relationship_type, RelationshipType::FrequentlyBoughtTogether);
  }

  #[test]
  fn below_threshold_pairs_are_dropped() {
    let p = ids(2);
    let rows: Vec<(Uuid, Uuid)> = (0..2)
      .flat_map(|_| {
        let o = Uuid::new_v4();
        [(o, p[0]), (o, p[1])]
      })
      .collect();
    let build = build_graph(rows, Vec::new(), GraphThresholds::default(), Utc::now());
    assert!(build.edges.is_empty());
    assert_eq!(build.total_orders, 2);
  }

  #[test]
  fn view_threshold_is_five_sessions() {
    let p = ids(2);
    let sessions = |n: usize| -> Vec<(String, Uuid)> {
      (0..n)
        .flat_map(|i| [(format!("s{i}"), p[0]), (format!("s{i}"), p[1])])
        .collect()
    };

    let four = build_graph(Vec::new(), sessions(4), GraphThresholds::default(), Utc::now());
    assert!(four.edges.is_empty());

    let five = build_graph(Vec::new(), sessions(5), GraphThresholds::default(), Utc::now());
    assert_eq!(five.edges.len(), 1);
    assert_eq!(five.edges[0].relationship_type, RelationshipType::ViewedTogether);
    assert_eq!(five.total_sessions, 5);
    assert!((five.edges[0].confidence_score - 1.0).abs() < 1e-12);
  }

  #[test]
  fn aggregation_is_deterministic() {
    let p = ids(4);
    let rows: Vec<(Uuid, Uuid)> = (0..6)
      .flat_map(|i| {
        let o = Uuid::new_v4();
        vec![(o, p[i % 4]), (o, p[(i + 1) % 4]), (o, p[(i + 2) % 4])]
      })
      .collect();
    let now = Utc::now();
    let thresholds = GraphThresholds { min_order_cooccurrence: 1, ..Default::default() };
    let first = build_graph(rows.clone(), Vec::new(), thresholds, now);
    let second = build_graph(rows, Vec::new(), thresholds, now);
    assert_eq!(first.edges, second.edges);
  }

  #[test]
  fn other_endpoint() {
    let p = ids(3);
    let edge = RelationshipEdge {
      product_a_id:      p[0],
      product_b_id:      p[1],
      relationship_type: RelationshipType::ViewedTogether,
      confidence_score:  0.5,
      occurrence_count:  5,
      updated_at:        Utc::now(),
    };
    assert_eq!(edge.other(p[0]), Some(p[1]));
    assert_eq!(edge.other(p[1]), Some(p[0]));
    assert_eq!(edge.other(p[2]), None);
  }
}
