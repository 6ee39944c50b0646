//! Handlers for `/search` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/search` | Body: [`SearchRequest`]; empty query returns trending |
//! | `GET`  | `/search/suggestions` | `?q` prefix, optional `limit` |
//! | `POST` | `/search/click` | Body: [`SearchClickBody`]; first click only |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State, rejection::JsonRejection},
};
use petal_core::embedding::Encoder;
use petal_engine::{Backend, Engine, SearchRequest, SearchResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Ack, error::ApiError};

/// `POST /search`
pub async fn search<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  body: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let Json(request) = body?;
  Ok(Json(engine.search(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
  #[serde(default)]
  pub q:     String,
  pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Suggestions {
  pub suggestions: Vec<String>,
}

/// `GET /search/suggestions?q=<prefix>[&limit=...]`
pub async fn suggestions<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  Query(params): Query<SuggestParams>,
) -> Result<Json<Suggestions>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let suggestions = engine.suggest(&params.q, params.limit.unwrap_or(8)).await?;
  Ok(Json(Suggestions { suggestions }))
}

#[derive(Debug, Deserialize)]
pub struct SearchClickBody {
  pub search_id:  Uuid,
  pub product_id: Uuid,
  pub position:   usize,
}

/// `POST /search/click`
///
/// A search accepts one click. Unknown searches and repeat clicks answer
/// `404`.
pub async fn click<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  body: Result<Json<SearchClickBody>, JsonRejection>,
) -> Result<Json<Ack>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let Json(click) = body?;
  if !engine
    .report_search_click(click.search_id, click.product_id, click.position)
    .await?
  {
    return Err(ApiError::NotFound(format!(
      "search {} is unknown or already has a click",
      click.search_id
    )));
  }
  Ok(Json(Ack::ok()))
}
