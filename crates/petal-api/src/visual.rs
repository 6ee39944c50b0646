//! Handler for `POST /visual-search`.
//!
//! Takes `multipart/form-data` with an `image` file part and optional
//! `limit` and `min_similarity` text parts.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Multipart, State},
};
use bytes::Bytes;
use petal_core::embedding::Encoder;
use petal_engine::{Backend, Engine, VisualQuery, VisualResults};

use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 10;
const DEFAULT_MIN_SIMILARITY: f32 = 0.3;

/// `POST /visual-search`
pub async fn search<S, E>(
  State(engine): State<Arc<Engine<S, E>>>,
  mut multipart: Multipart,
) -> Result<Json<VisualResults>, ApiError>
where
  S: Backend,
  E: Encoder + 'static,
{
  let mut image: Option<(Bytes, Option<String>)> = None;
  let mut limit = DEFAULT_LIMIT;
  let mut min_similarity = DEFAULT_MIN_SIMILARITY;

  while let Some(field) = multipart.next_field().await? {
    let name = field.name().unwrap_or_default().to_owned();
    match name.as_str() {
      "image" => {
        let content_type = field.content_type().map(str::to_owned);
        image = Some((field.bytes().await?, content_type));
      }
      "limit" => {
        let raw = field.text().await?;
        limit = raw
          .trim()
          .parse()
          .map_err(|_| ApiError::BadRequest(format!("limit must be a positive integer, got {raw:?}")))?;
      }
      "min_similarity" => {
        let raw = field.text().await?;
        min_similarity = raw
          .trim()
          .parse()
          .map_err(|_| ApiError::BadRequest(format!("min_similarity must be a number, got {raw:?}")))?;
      }
      _ => {}
    }
  }

  let (image, content_type) =
    image.ok_or_else(|| ApiError::BadRequest("missing `image` part".into()))?;
  let results = engine
    .visual_search(VisualQuery {
      image,
      content_type,
      limit,
      min_similarity,
    })
    .await?;
  Ok(Json(results))
}
