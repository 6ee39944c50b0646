//! Handlers for `/recommendations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/recommendations` | Body: [`RecommendRequest`]; logs an impression |
//! | `GET`  | `/recommendations/trending` | Optional `?limit` |
//! | `GET`  | `/recommendations/related/{id}` | Optional `?limit`; no impression |
//! | `POST` | `/recommendations/track-click` | Body: [`RecommendationClickRequest`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State, rejection::JsonRejection},
};
use petal_core::{catalog::Product, embedding::Encoder};
use petal_engine::{
  Backend, Engine, RecommendRequest, RecommendationClickRequest, Recommendations, Trending,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Ack, error::ApiError};

/// `POST /recommendations`
pub async fn recommend<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  body: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<Recommendations>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let Json(request) = body?;
  Ok(Json(engine.recommend(request).await?))
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
  pub limit: Option<usize>,
}

/// `GET /recommendations/trending[?limit=...]`
pub async fn trending<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  Query(params): Query<LimitParams>,
) -> Result<Json<Trending>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  Ok(Json(engine.trending(params.limit.unwrap_or(10)).await?))
}

#[derive(Debug, Serialize)]
pub struct Related {
  pub related_products: Vec<Product>,
}

/// `GET /recommendations/related/{id}[?limit=...]`
pub async fn related<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  Path(product_id): Path<Uuid>,
  Query(params): Query<LimitParams>,
) -> Result<Json<Related>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let related_products = engine.related(product_id, params.limit.unwrap_or(6)).await?;
  Ok(Json(Related { related_products }))
}

/// `POST /recommendations/track-click`
pub async fn track_click<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  body: Result<Json<RecommendationClickRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let Json(click) = body?;
  engine.track_recommendation_click(click).await?;
  Ok(Json(Ack::ok()))
}
