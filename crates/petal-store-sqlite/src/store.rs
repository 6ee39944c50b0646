//! [`SqliteStore`]: the SQLite implementation of [`EngineStore`] and
//! [`Catalog`].

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rusqlite::OptionalExtension as _;
use tracing::{info, warn};
use uuid::Uuid;

use petal_core::{
  catalog::{Catalog, Product, ProductFilter},
  embedding::{Dimensions, Embedding, EmbeddingKind, vector_to_bytes},
  event::{EventType, InteractionEvent, Visitor},
  feedback::{QueryHistoryEntry, RecommendationClick, RecommendationImpression, SearchQuery},
  graph::{GraphBuild, RelationshipEdge},
  index::{FlatIndex, Neighbor},
  store::{EngineStore, GraphBuildRun, ViewCount},
};

use crate::{
  Error, Result,
  encode::{
    EDGE_COLUMNS, EVENT_COLUMNS, PRODUCT_COLUMNS, RawBuild, RawEdge, RawEvent, RawImpression,
    RawProduct, RawSearch, decode_count, decode_dt, decode_embedding, decode_uuid, encode_build_status,
    encode_dt, encode_ids, encode_strings, encode_uuid,
  },
  schema::SCHEMA,
};

/// Order status whose lines feed the co-purchase graph.
pub const COMPLETED_STATUS: &str = "completed";

// ─── Catalog mirror records ──────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CategoryRecord {
  pub category_id: Uuid,
  pub slug:        String,
  pub name:        String,
}

#[derive(Debug, Clone)]
pub struct OrderRecord {
  pub order_id:    Uuid,
  pub status:      String,
  pub created_at:  DateTime<Utc>,
  pub product_ids: Vec<Uuid>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// The petal engine store backed by a single SQLite file.
///
/// Cloning is cheap; the connection and the vector index are shared.
#[derive(Clone)]
pub struct SqliteStore {
  conn:  tokio_rusqlite::Connection,
  index: Arc<RwLock<FlatIndex>>,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation and load
  /// persisted embeddings into the vector index.
  pub async fn open(path: impl AsRef<Path>, dims: Dimensions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, dims).await
  }

  /// Open an in-memory store; useful for testing.
  pub async fn open_in_memory(dims: Dimensions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, dims).await
  }

  async fn init(conn: tokio_rusqlite::Connection, dims: Dimensions) -> Result<Self> {
    let store = Self {
      conn,
      index: Arc::new(RwLock::new(FlatIndex::new(dims))),
    };
    store.init_schema().await?;
    store.load_index().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Rows whose dimension no longer matches the configured space are
  /// skipped, not fatal: they are re-indexed on the next encode.
  async fn load_index(&self) -> Result<()> {
    let rows: Vec<(String, String, Vec<u8>)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT product_id, kind, vector FROM product_embeddings")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut loaded = 0usize;
    let mut index = self.index.write();
    for (product_id, kind, blob) in rows {
      let product_id = decode_uuid(&product_id)?;
      let embedding = decode_embedding(&kind, &blob)?;
      match index.upsert(product_id, &embedding) {
        Ok(()) => loaded += 1,
        Err(e) => warn!(%product_id, error = %e, "skipping stored embedding"),
      }
    }
    if loaded > 0 {
      info!(loaded, "vector index loaded");
    }
    Ok(())
  }

  /// The dimensions the vector index was opened with.
  pub fn dimensions(&self) -> Dimensions { self.index.read().dimensions() }

  // ── Catalog mirror writes ─────────────────────────────────────────────
  //
  // The storefront's CRUD side owns these rows; the engine only mirrors
  // them for its own queries.

  pub async fn put_category(&self, category: CategoryRecord) -> Result<()> {
    let id = encode_uuid(category.category_id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO categories (category_id, slug, name) VALUES (?1, ?2, ?3)
           ON CONFLICT (category_id) DO UPDATE SET slug = excluded.slug, name = excluded.name",
          rusqlite::params![id, category.slug, category.name],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or replace a product. `category_slug` is derived from the
  /// category row and ignored here.
  pub async fn put_product(&self, product: &Product) -> Result<()> {
    let product_id  = encode_uuid(product.product_id);
    let name        = product.name.clone();
    let name_folded = product.name.to_lowercase();
    let name_en     = product.name_en.clone();
    let description = product.description.clone();
    let price       = product.price;
    let sale_price  = product.sale_price;
    let stock       = product.stock;
    let published   = product.is_published;
    let featured    = product.is_featured;
    let category_id = product.category_id.map(encode_uuid);
    let districts   = encode_strings(&product.districts)?;
    let tags        = encode_strings(&product.tags)?;
    let created_at  = encode_dt(product.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO products (
             product_id, name, name_folded, name_en, description, price,
             sale_price, stock, is_published, is_featured, category_id,
             districts, tags, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          rusqlite::params![
            product_id,
            name,
            name_folded,
            name_en,
            description,
            price,
            sale_price,
            stock,
            published,
            featured,
            category_id,
            districts,
            tags,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub async fn put_order(&self, order: OrderRecord) -> Result<()> {
    let order_id   = encode_uuid(order.order_id);
    let created_at = encode_dt(order.created_at);
    let items: Vec<String> = order.product_ids.into_iter().map(encode_uuid).collect();
    let status = order.status;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO orders (order_id, status, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (order_id) DO UPDATE SET status = excluded.status",
          rusqlite::params![order_id, status, created_at],
        )?;
        tx.execute(
          "DELETE FROM order_items WHERE order_id = ?1",
          rusqlite::params![order_id],
        )?;
        {
          let mut stmt =
            tx.prepare("INSERT INTO order_items (order_id, product_id) VALUES (?1, ?2)")?;
          for product_id in &items {
            stmt.execute(rusqlite::params![order_id, product_id])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn query_products(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<Product>> {
    let raws: Vec<RawProduct> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawProduct::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProduct::into_product).collect()
  }

  async fn query_edges(
    &self,
    sql: String,
    params: Vec<rusqlite::types::Value>,
  ) -> Result<Vec<RelationshipEdge>> {
    let raws: Vec<RawEdge> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), RawEdge::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEdge::into_edge).collect()
  }
}

fn sql_limit(limit: usize) -> i64 { i64::try_from(limit).unwrap_or(i64::MAX) }

fn text(s: String) -> rusqlite::types::Value { rusqlite::types::Value::Text(s) }

fn int(n: i64) -> rusqlite::types::Value { rusqlite::types::Value::Integer(n) }

fn opt<T>(v: Option<T>, f: impl FnOnce(T) -> rusqlite::types::Value) -> rusqlite::types::Value {
  v.map_or(rusqlite::types::Value::Null, f)
}

// ─── EngineStore impl ────────────────────────────────────────────────────────

impl EngineStore for SqliteStore {
  type Error = Error;

  // ── Interaction log ───────────────────────────────────────────────────────

  async fn append_interaction(&self, event: InteractionEvent) -> Result<()> {
    let event_id    = encode_uuid(event.event_id);
    let event_type  = event.event_type().as_ref().to_owned();
    let metadata    = event.payload.to_json()?.to_string();
    let product_id  = event.product_id.map(encode_uuid);
    let category_id = event.category_id.map(encode_uuid);
    let created_at  = encode_dt(event.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO interactions (
             event_id, user_id, session_id, product_id, category_id,
             event_type, metadata, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            event_id,
            event.user_id,
            event.session_id,
            product_id,
            category_id,
            event_type,
            metadata,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn recent_interactions(
    &self,
    visitor: &Visitor,
    kinds: &[EventType],
    limit: usize,
  ) -> Result<Vec<InteractionEvent>> {
    if kinds.is_empty() || limit == 0 {
      return Ok(Vec::new());
    }
    // Event types come from a closed enum, so inlining them is safe.
    let kinds_sql = kinds
      .iter()
      .map(|k| format!("'{}'", k.as_ref()))
      .collect::<Vec<_>>()
      .join(", ");
    let session_id = visitor.session_id.clone();
    let user_id = visitor.user_id.clone();
    let sql = format!(
      "SELECT {EVENT_COLUMNS} FROM interactions
       WHERE (session_id = ?1 OR (?2 IS NOT NULL AND user_id = ?2))
         AND event_type IN ({kinds_sql})
       ORDER BY created_at DESC
       LIMIT ?3"
    );
    let limit = sql_limit(limit);

    let raws: Vec<RawEvent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![session_id, user_id, limit], RawEvent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEvent::into_event).collect()
  }

  async fn view_counts(
    &self,
    since: DateTime<Utc>,
    category_id: Option<Uuid>,
    limit: usize,
  ) -> Result<Vec<ViewCount>> {
    let since = encode_dt(since);
    let category = category_id.map(encode_uuid);
    let limit = sql_limit(limit);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT i.product_id, COUNT(*) AS views, MAX(i.created_at) AS last_seen
           FROM interactions i
           WHERE i.event_type = 'view'
             AND i.product_id IS NOT NULL
             AND i.created_at >= ?1
             AND (?2 IS NULL OR i.product_id IN
                   (SELECT product_id FROM products WHERE category_id = ?2))
           GROUP BY i.product_id
           ORDER BY views DESC, last_seen DESC, i.product_id ASC
           LIMIT ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![since, category, limit], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(id, n)| {
        Ok(ViewCount {
          product_id: decode_uuid(&id)?,
          view_count: decode_count("views", n)?,
        })
      })
      .collect()
  }

  async fn session_views(&self) -> Result<Vec<(String, Uuid)>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT session_id, product_id FROM interactions
           WHERE event_type = 'view' AND product_id IS NOT NULL",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(session, product)| Ok((session, decode_uuid(&product)?)))
      .collect()
  }

  async fn prune_interactions(&self, before: DateTime<Utc>) -> Result<u64> {
    let before = encode_dt(before);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM interactions WHERE created_at < ?1",
          rusqlite::params![before],
        )?)
      })
      .await?;
    Ok(removed as u64)
  }

  // ── Relationship graph ────────────────────────────────────────────────────

  async fn replace_graph(&self, build: GraphBuild) -> Result<usize> {
    let rows: Vec<(String, String, String, f64, i64, String)> = build
      .edges
      .iter()
      .map(|e| {
        (
          encode_uuid(e.product_a_id),
          encode_uuid(e.product_b_id),
          e.relationship_type.as_ref().to_owned(),
          e.confidence_score,
          i64::try_from(e.occurrence_count).unwrap_or(i64::MAX),
          encode_dt(e.updated_at),
        )
      })
      .collect();

    let count = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM product_relationships_staging", [])?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO product_relationships_staging (
               product_a_id, product_b_id, relationship_type,
               confidence_score, occurrence_count, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (product_a_id, product_b_id, relationship_type) DO UPDATE SET
               confidence_score = excluded.confidence_score,
               occurrence_count = excluded.occurrence_count,
               updated_at       = excluded.updated_at",
          )?;
          for (a, b, kind, confidence, occurrences, at) in &rows {
            stmt.execute(rusqlite::params![a, b, kind, confidence, occurrences, at])?;
          }
        }
        tx.execute("DELETE FROM product_relationships", [])?;
        let swapped = tx.execute(
          "INSERT INTO product_relationships SELECT * FROM product_relationships_staging",
          [],
        )?;
        tx.execute("DELETE FROM product_relationships_staging", [])?;
        tx.commit()?;
        Ok(swapped)
      })
      .await?;
    Ok(count)
  }

  async fn edges_for(&self, product_id: Uuid, limit: usize) -> Result<Vec<RelationshipEdge>> {
    let sql = format!(
      "SELECT {EDGE_COLUMNS} FROM product_relationships
       WHERE product_a_id = ?1 OR product_b_id = ?1
       ORDER BY confidence_score DESC, occurrence_count DESC
       LIMIT ?2"
    );
    self
      .query_edges(sql, vec![text(encode_uuid(product_id)), int(sql_limit(limit))])
      .await
  }

  async fn all_edges(&self) -> Result<Vec<RelationshipEdge>> {
    let sql = format!(
      "SELECT {EDGE_COLUMNS} FROM product_relationships
       ORDER BY product_a_id, product_b_id, relationship_type"
    );
    self.query_edges(sql, Vec::new()).await
  }

  async fn record_build(&self, run: GraphBuildRun) -> Result<()> {
    let build_id    = encode_uuid(run.build_id);
    let started_at  = encode_dt(run.started_at);
    let finished_at = encode_dt(run.finished_at);
    let status      = encode_build_status(run.status);
    let edge_count  = i64::try_from(run.edge_count).unwrap_or(i64::MAX);
    let orders      = i64::try_from(run.total_orders).unwrap_or(i64::MAX);
    let sessions    = i64::try_from(run.total_sessions).unwrap_or(i64::MAX);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO graph_builds (
             build_id, started_at, finished_at, status, edge_count,
             total_orders, total_sessions, error
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            build_id, started_at, finished_at, status, edge_count, orders, sessions, run.error,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn last_build(&self) -> Result<Option<GraphBuildRun>> {
    let raw: Option<RawBuild> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT build_id, started_at, finished_at, status, edge_count,
                      total_orders, total_sessions, error
               FROM graph_builds
               ORDER BY finished_at DESC
               LIMIT 1",
              [],
              |row| {
                Ok(RawBuild {
                  build_id:       row.get(0)?,
                  started_at:     row.get(1)?,
                  finished_at:    row.get(2)?,
                  status:         row.get(3)?,
                  edge_count:     row.get(4)?,
                  total_orders:   row.get(5)?,
                  total_sessions: row.get(6)?,
                  error:          row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawBuild::into_run).transpose()
  }

  // ── Feedback ──────────────────────────────────────────────────────────────

  async fn append_impression(&self, impression: RecommendationImpression) -> Result<()> {
    let impression_id = encode_uuid(impression.impression_id);
    let products      = encode_ids(&impression.recommended_products)?;
    let context       = impression.context.as_ref().to_owned();
    let algorithm     = impression.algorithm.as_ref().to_owned();
    let created_at    = encode_dt(impression.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recommendation_impressions (
             impression_id, user_id, session_id, recommended_products,
             context, algorithm, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            impression_id,
            impression.user_id,
            impression.session_id,
            products,
            context,
            algorithm,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_impression(&self, impression_id: Uuid) -> Result<Option<RecommendationImpression>> {
    let id = encode_uuid(impression_id);
    let raw: Option<RawImpression> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT impression_id, user_id, session_id, recommended_products,
                      context, algorithm, created_at
               FROM recommendation_impressions WHERE impression_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(RawImpression {
                  impression_id:        row.get(0)?,
                  user_id:              row.get(1)?,
                  session_id:           row.get(2)?,
                  recommended_products: row.get(3)?,
                  context:              row.get(4)?,
                  algorithm:            row.get(5)?,
                  created_at:           row.get(6)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawImpression::into_impression).transpose()
  }

  async fn append_click(&self, click: RecommendationClick) -> Result<()> {
    let click_id      = encode_uuid(click.click_id);
    let impression_id = click.impression_id.map(encode_uuid);
    let products      = encode_ids(&click.recommended_products)?;
    let clicked       = encode_uuid(click.clicked_product_id);
    let context       = click.context.as_ref().to_owned();
    let algorithm     = click.algorithm.as_ref().to_owned();
    let position      = i64::try_from(click.position).unwrap_or(i64::MAX);
    let created_at    = encode_dt(click.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO recommendation_clicks (
             click_id, impression_id, user_id, session_id, recommended_products,
             clicked_product_id, context, algorithm, position, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            click_id,
            impression_id,
            click.user_id,
            click.session_id,
            products,
            clicked,
            context,
            algorithm,
            position,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn append_search(&self, query: SearchQuery) -> Result<()> {
    let search_id     = encode_uuid(query.search_id);
    let folded        = query.query_text.trim().to_lowercase();
    let intent        = serde_json::to_string(&query.parsed_intent)?;
    let results_count = i64::try_from(query.results_count).unwrap_or(i64::MAX);
    let clicked       = query.clicked_product_id.map(encode_uuid);
    let position      = query
      .clicked_position
      .map(|p| i64::try_from(p).unwrap_or(i64::MAX));
    let created_at    = encode_dt(query.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO search_queries (
             search_id, user_id, session_id, query_text, query_folded,
             parsed_intent, results_count, clicked_product_id,
             clicked_position, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            search_id,
            query.user_id,
            query.session_id,
            query.query_text,
            folded,
            intent,
            results_count,
            clicked,
            position,
            created_at,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_search(&self, search_id: Uuid) -> Result<Option<SearchQuery>> {
    let id = encode_uuid(search_id);
    let raw: Option<RawSearch> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT search_id, user_id, session_id, query_text, parsed_intent,
                      results_count, clicked_product_id, clicked_position, created_at
               FROM search_queries WHERE search_id = ?1",
              rusqlite::params![id],
              |row| {
                Ok(RawSearch {
                  search_id:          row.get(0)?,
                  user_id:            row.get(1)?,
                  session_id:         row.get(2)?,
                  query_text:         row.get(3)?,
                  parsed_intent:      row.get(4)?,
                  results_count:      row.get(5)?,
                  clicked_product_id: row.get(6)?,
                  clicked_position:   row.get(7)?,
                  created_at:         row.get(8)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSearch::into_search).transpose()
  }

  async fn report_search_click(
    &self,
    search_id: Uuid,
    product_id: Uuid,
    position: usize,
  ) -> Result<bool> {
    let id       = encode_uuid(search_id);
    let product  = encode_uuid(product_id);
    let position = i64::try_from(position).unwrap_or(i64::MAX);

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE search_queries
           SET clicked_product_id = ?2, clicked_position = ?3
           WHERE search_id = ?1 AND clicked_product_id IS NULL",
          rusqlite::params![id, product, position],
        )?)
      })
      .await?;
    Ok(updated == 1)
  }

  async fn query_history_with_prefix(
    &self,
    prefix: String,
    limit: usize,
  ) -> Result<Vec<QueryHistoryEntry>> {
    let prefix = prefix.trim().to_lowercase();
    let limit = sql_limit(limit);

    let rows: Vec<(String, i64, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT query_text, results_count, created_at
           FROM search_queries
           WHERE substr(query_folded, 1, length(?1)) = ?1
           ORDER BY created_at DESC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![prefix, limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(query_text, n, at)| {
        Ok(QueryHistoryEntry {
          query_text,
          results_count: decode_count("results_count", n)? as usize,
          created_at: decode_dt(&at)?,
        })
      })
      .collect()
  }

  // ── Embeddings ────────────────────────────────────────────────────────────

  async fn put_embedding(&self, product_id: Uuid, embedding: Embedding) -> Result<()> {
    self.index.read().dimensions().check(&embedding)?;

    let id         = encode_uuid(product_id);
    let kind       = embedding.kind().as_ref().to_owned();
    let dim        = i64::try_from(embedding.dim()).unwrap_or(i64::MAX);
    let blob       = vector_to_bytes(embedding.vector());
    let updated_at = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO product_embeddings (product_id, kind, dim, vector, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (product_id, kind) DO UPDATE SET
             dim = excluded.dim, vector = excluded.vector, updated_at = excluded.updated_at",
          rusqlite::params![id, kind, dim, blob, updated_at],
        )?;
        Ok(())
      })
      .await?;

    self.index.write().upsert(product_id, &embedding)?;
    Ok(())
  }

  async fn get_embedding(&self, product_id: Uuid, kind: EmbeddingKind) -> Result<Option<Embedding>> {
    let id = encode_uuid(product_id);
    let kind_str = kind.as_ref().to_owned();

    let blob: Option<Vec<u8>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT vector FROM product_embeddings WHERE product_id = ?1 AND kind = ?2",
              rusqlite::params![id, kind_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    blob
      .map(|b| decode_embedding(kind.as_ref(), &b))
      .transpose()
  }

  async fn nearest(&self, query: Embedding, k: usize) -> Result<Vec<Neighbor>> {
    Ok(self.index.read().nearest(&query, k)?)
  }
}

// ─── Catalog impl ────────────────────────────────────────────────────────────

impl Catalog for SqliteStore {
  type Error = Error;

  async fn get_products(&self, ids: Vec<Uuid>) -> Result<Vec<Product>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let placeholders = (1..=ids.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let sql = format!(
      "SELECT {PRODUCT_COLUMNS}
       FROM products p LEFT JOIN categories c ON c.category_id = p.category_id
       WHERE p.product_id IN ({placeholders})"
    );
    let params = ids.into_iter().map(|id| text(encode_uuid(id))).collect();
    self.query_products(sql, params).await
  }

  async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
    let sql = format!(
      "SELECT {PRODUCT_COLUMNS}
       FROM products p LEFT JOIN categories c ON c.category_id = p.category_id
       WHERE p.is_published = 1
         AND (?1 IS NULL OR COALESCE(p.sale_price, p.price) >= ?1)
         AND (?2 IS NULL OR COALESCE(p.sale_price, p.price) <= ?2)
         AND (?3 IS NULL OR c.slug = ?3)
         AND (?4 IS NULL OR EXISTS (
               SELECT 1 FROM json_each(p.districts) d WHERE d.value = ?4))
       ORDER BY p.is_featured DESC, p.created_at DESC
       LIMIT ?5"
    );
    let params = vec![
      opt(filter.price_min, int),
      opt(filter.price_max, int),
      opt(filter.category_slug.clone(), text),
      opt(filter.district.clone(), text),
      int(filter.limit.map_or(-1, sql_limit)),
    ];
    self.query_products(sql, params).await
  }

  async fn products_in_category(&self, category_id: Uuid, limit: usize) -> Result<Vec<Product>> {
    let sql = format!(
      "SELECT {PRODUCT_COLUMNS}
       FROM products p LEFT JOIN categories c ON c.category_id = p.category_id
       WHERE p.is_published = 1 AND p.category_id = ?1
       ORDER BY p.is_featured DESC, p.created_at DESC
       LIMIT ?2"
    );
    let params = vec![text(encode_uuid(category_id)), int(sql_limit(limit))];
    self.query_products(sql, params).await
  }

  async fn featured_products(&self, limit: usize) -> Result<Vec<Product>> {
    let sql = format!(
      "SELECT {PRODUCT_COLUMNS}
       FROM products p LEFT JOIN categories c ON c.category_id = p.category_id
       WHERE p.is_published = 1 AND p.is_featured = 1
       ORDER BY p.created_at DESC
       LIMIT ?1"
    );
    self.query_products(sql, vec![int(sql_limit(limit))]).await
  }

  async fn product_names_with_prefix(&self, prefix: String, limit: usize) -> Result<Vec<String>> {
    let prefix = prefix.trim().to_lowercase();
    let limit = sql_limit(limit);

    let names = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT name FROM products
           WHERE is_published = 1 AND substr(name_folded, 1, length(?1)) = ?1
           ORDER BY is_featured DESC, name ASC
           LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![prefix, limit], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(names)
  }

  async fn completed_order_items(&self) -> Result<Vec<(Uuid, Uuid)>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT oi.order_id, oi.product_id
           FROM order_items oi JOIN orders o ON o.order_id = oi.order_id
           WHERE o.status = ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![COMPLETED_STATUS], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(order, product)| Ok((decode_uuid(&order)?, decode_uuid(&product)?)))
      .collect()
  }
}
