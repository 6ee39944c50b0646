//! Handlers for `/admin` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/admin/rebuild-graph` | Runs a build now; `409` while one is running |
//! | `POST` | `/admin/embeddings/{id}/text` | Re-encodes the product's name and description |
//! | `POST` | `/admin/embeddings/{id}/image` | Raw image body; `Content-Type` must be `image/*` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State, rejection::BytesRejection},
  http::{HeaderMap, StatusCode, header::CONTENT_TYPE},
};
use bytes::Bytes;
use petal_core::{embedding::Encoder, store::GraphBuildRun};
use petal_engine::{Backend, Engine};
use uuid::Uuid;

use crate::error::ApiError;

/// `POST /admin/rebuild-graph`
pub async fn rebuild_graph<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
) -> Result<Json<GraphBuildRun>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  Ok(Json(engine.rebuild_graph().await?))
}

/// `POST /admin/embeddings/{id}/text`
pub async fn index_text<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  Path(product_id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  engine.index_product_text(product_id).await?;
  Ok(StatusCode::NO_CONTENT)
}

/// `POST /admin/embeddings/{id}/image`
pub async fn index_image<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  Path(product_id): Path<Uuid>,
  headers: HeaderMap,
  image: Result<Bytes, BytesRejection>,
) -> Result<StatusCode, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let image = image?;
  let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
  engine
    .index_product_image(product_id, image, content_type)
    .await?;
  Ok(StatusCode::NO_CONTENT)
}
