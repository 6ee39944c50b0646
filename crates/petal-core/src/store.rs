//! The `EngineStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `petal-store-sqlite`).
//! The engine and API layers depend on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  embedding::{Embedding, EmbeddingKind},
  event::{EventType, InteractionEvent, Visitor},
  feedback::{QueryHistoryEntry, RecommendationClick, RecommendationImpression, SearchQuery},
  graph::{GraphBuild, RelationshipEdge},
  index::Neighbor,
};

// ─── Query / record types ────────────────────────────────────────────────────

/// Number of `view` events for one product inside a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCount {
  pub product_id: Uuid,
  pub view_count: u64,
}

/// Outcome of one relationship-graph build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
  Succeeded,
  Failed,
}

/// The audit record of one builder run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphBuildRun {
  pub build_id:       Uuid,
  pub started_at:     DateTime<Utc>,
  pub finished_at:    DateTime<Utc>,
  pub status:         BuildStatus,
  pub edge_count:     usize,
  pub total_orders:   u64,
  pub total_sessions: u64,
  pub error:          Option<String>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Persistence for everything the engine owns: the interaction log, the
/// relationship graph, impressions, clicks, search rows and embeddings.
///
/// Interaction, impression and click writes are append-only. The graph is
/// replaced wholesale by [`EngineStore::replace_graph`]; readers never see a
/// partially rebuilt graph.
pub trait EngineStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Interaction log ───────────────────────────────────────────────────

  /// Append one event. Never updates an existing row.
  fn append_interaction(
    &self,
    event: InteractionEvent,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The visitor's most recent events of the given types, newest first.
  /// Matches the visitor's session, plus any event carrying their `user_id`
  /// when signed in.
  fn recent_interactions<'a>(
    &'a self,
    visitor: &'a Visitor,
    kinds: &'a [EventType],
    limit: usize,
  ) -> impl Future<Output = Result<Vec<InteractionEvent>, Self::Error>> + Send + 'a;

  /// Products ordered by `view` count since `since`, descending; ties go to
  /// the most recently viewed. Optionally restricted to one category.
  fn view_counts(
    &self,
    since: DateTime<Utc>,
    category_id: Option<Uuid>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ViewCount>, Self::Error>> + Send + '_;

  /// `(session_id, product_id)` for every `view` event that names a product.
  fn session_views(
    &self,
  ) -> impl Future<Output = Result<Vec<(String, Uuid)>, Self::Error>> + Send + '_;

  /// Retention: delete events older than `before`. Returns rows removed.
  fn prune_interactions(
    &self,
    before: DateTime<Utc>,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Relationship graph ────────────────────────────────────────────────

  /// Stage `build` and swap it into the serving graph atomically. Edges
  /// absent from `build` are gone afterwards. Returns the edge count.
  fn replace_graph(
    &self,
    build: GraphBuild,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Edges touching `product_id`, by confidence then occurrence count,
  /// descending.
  fn edges_for(
    &self,
    product_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RelationshipEdge>, Self::Error>> + Send + '_;

  /// Every serving edge, in canonical order.
  fn all_edges(
    &self,
  ) -> impl Future<Output = Result<Vec<RelationshipEdge>, Self::Error>> + Send + '_;

  fn record_build(
    &self,
    run: GraphBuildRun,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The most recent builder run, if any.
  fn last_build(
    &self,
  ) -> impl Future<Output = Result<Option<GraphBuildRun>, Self::Error>> + Send + '_;

  // ── Feedback ──────────────────────────────────────────────────────────

  fn append_impression(
    &self,
    impression: RecommendationImpression,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_impression(
    &self,
    impression_id: Uuid,
  ) -> impl Future<Output = Result<Option<RecommendationImpression>, Self::Error>> + Send + '_;

  fn append_click(
    &self,
    click: RecommendationClick,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn append_search(
    &self,
    query: SearchQuery,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_search(
    &self,
    search_id: Uuid,
  ) -> impl Future<Output = Result<Option<SearchQuery>, Self::Error>> + Send + '_;

  /// Fill the click fields of a search row. Returns `false` if the row does
  /// not exist or already carries a click.
  fn report_search_click(
    &self,
    search_id: Uuid,
    product_id: Uuid,
    position: usize,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Past queries whose text starts with `prefix` (case-insensitive),
  /// newest first.
  fn query_history_with_prefix(
    &self,
    prefix: String,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<QueryHistoryEntry>, Self::Error>> + Send + '_;

  // ── Embeddings ────────────────────────────────────────────────────────

  /// Persist an embedding and make it searchable.
  fn put_embedding(
    &self,
    product_id: Uuid,
    embedding: Embedding,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_embedding(
    &self,
    product_id: Uuid,
    kind: EmbeddingKind,
  ) -> impl Future<Output = Result<Option<Embedding>, Self::Error>> + Send + '_;

  /// Nearest neighbours of `query` among embeddings of the same kind, most
  /// similar first.
  fn nearest(
    &self,
    query: Embedding,
    k: usize,
  ) -> impl Future<Output = Result<Vec<Neighbor>, Self::Error>> + Send + '_;
}
