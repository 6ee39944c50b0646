//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with fixed microsecond precision and a
//! `Z` suffix, so lexical order equals chronological order and window
//! predicates can compare strings directly. Lists and intents are compact
//! JSON. UUIDs are hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, SecondsFormat, Utc};
use petal_core::{
  catalog::Product,
  embedding::{Embedding, EmbeddingKind, vector_from_bytes},
  event::{EventPayload, InteractionEvent},
  feedback::{Algorithm, Context, RecommendationImpression, SearchQuery},
  graph::{RelationshipEdge, RelationshipType},
  store::{BuildStatus, GraphBuildRun},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_ids(ids: &[Uuid]) -> Result<String> { Ok(serde_json::to_string(ids)?) }

pub fn decode_ids(s: &str) -> Result<Vec<Uuid>> { Ok(serde_json::from_str(s)?) }

pub fn encode_strings(items: &[String]) -> Result<String> { Ok(serde_json::to_string(items)?) }

pub fn decode_strings(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

/// Counts are stored as SQLite INTEGER (i64).
pub fn decode_count(column: &'static str, n: i64) -> Result<u64> {
  u64::try_from(n).map_err(|_| Error::Corrupt {
    column,
    value: n.to_string(),
  })
}

pub fn decode_kind(s: &str) -> Result<EmbeddingKind> {
  EmbeddingKind::from_str(s).map_err(|_| Error::Corrupt {
    column: "kind",
    value:  s.to_owned(),
  })
}

pub fn encode_build_status(status: BuildStatus) -> &'static str {
  match status {
    BuildStatus::Succeeded => "succeeded",
    BuildStatus::Failed => "failed",
  }
}

pub fn decode_build_status(s: &str) -> Result<BuildStatus> {
  match s {
    "succeeded" => Ok(BuildStatus::Succeeded),
    "failed" => Ok(BuildStatus::Failed),
    other => Err(Error::Corrupt {
      column: "status",
      value:  other.to_owned(),
    }),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns selected by [`PRODUCT_COLUMNS`], in order.
pub const PRODUCT_COLUMNS: &str = "
  p.product_id, p.name, p.name_en, p.description, p.price, p.sale_price,
  p.stock, p.is_published, p.is_featured, p.category_id, c.slug,
  p.districts, p.tags, p.created_at";

pub struct RawProduct {
  pub product_id:    String,
  pub name:          String,
  pub name_en:       Option<String>,
  pub description:   Option<String>,
  pub price:         i64,
  pub sale_price:    Option<i64>,
  pub stock:         Option<i64>,
  pub is_published:  bool,
  pub is_featured:   bool,
  pub category_id:   Option<String>,
  pub category_slug: Option<String>,
  pub districts:     String,
  pub tags:          String,
  pub created_at:    String,
}

impl RawProduct {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      product_id:    row.get(0)?,
      name:          row.get(1)?,
      name_en:       row.get(2)?,
      description:   row.get(3)?,
      price:         row.get(4)?,
      sale_price:    row.get(5)?,
      stock:         row.get(6)?,
      is_published:  row.get(7)?,
      is_featured:   row.get(8)?,
      category_id:   row.get(9)?,
      category_slug: row.get(10)?,
      districts:     row.get(11)?,
      tags:          row.get(12)?,
      created_at:    row.get(13)?,
    })
  }

  pub fn into_product(self) -> Result<Product> {
    Ok(Product {
      product_id:    decode_uuid(&self.product_id)?,
      name:          self.name,
      name_en:       self.name_en,
      description:   self.description,
      price:         self.price,
      sale_price:    self.sale_price,
      stock:         self.stock,
      is_published:  self.is_published,
      is_featured:   self.is_featured,
      category_id:   decode_opt_uuid(self.category_id)?,
      category_slug: self.category_slug,
      districts:     decode_strings(&self.districts)?,
      tags:          decode_strings(&self.tags)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub const EVENT_COLUMNS: &str =
  "event_id, user_id, session_id, product_id, category_id, event_type, metadata, created_at";

pub struct RawEvent {
  pub event_id:    String,
  pub user_id:     Option<String>,
  pub session_id:  String,
  pub product_id:  Option<String>,
  pub category_id: Option<String>,
  pub event_type:  String,
  pub metadata:    String,
  pub created_at:  String,
}

impl RawEvent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:    row.get(0)?,
      user_id:     row.get(1)?,
      session_id:  row.get(2)?,
      product_id:  row.get(3)?,
      category_id: row.get(4)?,
      event_type:  row.get(5)?,
      metadata:    row.get(6)?,
      created_at:  row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<InteractionEvent> {
    let metadata: serde_json::Value = serde_json::from_str(&self.metadata)?;
    Ok(InteractionEvent {
      event_id:    decode_uuid(&self.event_id)?,
      user_id:     self.user_id,
      session_id:  self.session_id,
      product_id:  decode_opt_uuid(self.product_id)?,
      category_id: decode_opt_uuid(self.category_id)?,
      payload:     EventPayload::from_parts(&self.event_type, metadata)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const EDGE_COLUMNS: &str =
  "product_a_id, product_b_id, relationship_type, confidence_score, occurrence_count, updated_at";

pub struct RawEdge {
  pub product_a_id:      String,
  pub product_b_id:      String,
  pub relationship_type: String,
  pub confidence_score:  f64,
  pub occurrence_count:  i64,
  pub updated_at:        String,
}

impl RawEdge {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      product_a_id:      row.get(0)?,
      product_b_id:      row.get(1)?,
      relationship_type: row.get(2)?,
      confidence_score:  row.get(3)?,
      occurrence_count:  row.get(4)?,
      updated_at:        row.get(5)?,
    })
  }

  pub fn into_edge(self) -> Result<RelationshipEdge> {
    Ok(RelationshipEdge {
      product_a_id:      decode_uuid(&self.product_a_id)?,
      product_b_id:      decode_uuid(&self.product_b_id)?,
      relationship_type: RelationshipType::parse(&self.relationship_type)?,
      confidence_score:  self.confidence_score,
      occurrence_count:  decode_count("occurrence_count", self.occurrence_count)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawBuild {
  pub build_id:       String,
  pub started_at:     String,
  pub finished_at:    String,
  pub status:         String,
  pub edge_count:     i64,
  pub total_orders:   i64,
  pub total_sessions: i64,
  pub error:          Option<String>,
}

impl RawBuild {
  pub fn into_run(self) -> Result<GraphBuildRun> {
    Ok(GraphBuildRun {
      build_id:       decode_uuid(&self.build_id)?,
      started_at:     decode_dt(&self.started_at)?,
      finished_at:    decode_dt(&self.finished_at)?,
      status:         decode_build_status(&self.status)?,
      edge_count:     decode_count("edge_count", self.edge_count)? as usize,
      total_orders:   decode_count("total_orders", self.total_orders)?,
      total_sessions: decode_count("total_sessions", self.total_sessions)?,
      error:          self.error,
    })
  }
}

pub struct RawImpression {
  pub impression_id:        String,
  pub user_id:              Option<String>,
  pub session_id:           String,
  pub recommended_products: String,
  pub context:              String,
  pub algorithm:            String,
  pub created_at:           String,
}

impl RawImpression {
  pub fn into_impression(self) -> Result<RecommendationImpression> {
    Ok(RecommendationImpression {
      impression_id:        decode_uuid(&self.impression_id)?,
      user_id:              self.user_id,
      session_id:           self.session_id,
      recommended_products: decode_ids(&self.recommended_products)?,
      context:              Context::parse(&self.context)?,
      algorithm:            Algorithm::parse(&self.algorithm)?,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSearch {
  pub search_id:          String,
  pub user_id:            Option<String>,
  pub session_id:         String,
  pub query_text:         String,
  pub parsed_intent:      String,
  pub results_count:      i64,
  pub clicked_product_id: Option<String>,
  pub clicked_position:   Option<i64>,
  pub created_at:         String,
}

impl RawSearch {
  pub fn into_search(self) -> Result<SearchQuery> {
    Ok(SearchQuery {
      search_id:          decode_uuid(&self.search_id)?,
      user_id:            self.user_id,
      session_id:         self.session_id,
      query_text:         self.query_text,
      parsed_intent:      serde_json::from_str(&self.parsed_intent)?,
      results_count:      decode_count("results_count", self.results_count)? as usize,
      clicked_product_id: decode_opt_uuid(self.clicked_product_id)?,
      clicked_position:   self
        .clicked_position
        .map(|p| decode_count("clicked_position", p).map(|p| p as usize))
        .transpose()?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

/// Rebuild an embedding from its stored kind and blob.
pub fn decode_embedding(kind: &str, blob: &[u8]) -> Result<Embedding> {
  Ok(Embedding::new(decode_kind(kind)?, vector_from_bytes(blob)?))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let early = DateTime::parse_from_rfc3339("2026-01-01T09:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let late = early + chrono::Duration::milliseconds(1500);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(encode_dt(early), "2026-01-01T09:00:00.000000Z");
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }
}
