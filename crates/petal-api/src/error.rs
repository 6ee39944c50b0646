//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::{
    multipart::MultipartError,
    rejection::{BytesRejection, JsonRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("payload too large: {0}")]
  PayloadTooLarge(String),

  #[error("unsupported media type: {0}")]
  UnsupportedMedia(String),

  #[error("service unavailable: {0}")]
  Unavailable(String),

  #[error("timed out: {0}")]
  Timeout(String),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<petal_engine::Error> for ApiError {
  fn from(e: petal_engine::Error) -> Self {
    use petal_engine::Error as Engine;
    let message = e.to_string();
    match e {
      Engine::Validation(m) => Self::BadRequest(m),
      Engine::NotFound(m) => Self::NotFound(m),
      Engine::PayloadTooLarge { .. } => Self::PayloadTooLarge(message),
      Engine::UnsupportedMedia(m) => Self::UnsupportedMedia(m),
      Engine::Unavailable(m) => Self::Unavailable(m),
      Engine::Busy => Self::Unavailable(message),
      Engine::Timeout(m) => Self::Timeout(m),
      Engine::BuildInProgress => Self::Conflict(message),
      other @ (Engine::Store(_) | Engine::Join(_)) => Self::Internal(Box::new(other)),
    }
  }
}

impl From<petal_core::Error> for ApiError {
  fn from(e: petal_core::Error) -> Self { petal_engine::Error::from(e).into() }
}

impl From<JsonRejection> for ApiError {
  fn from(e: JsonRejection) -> Self { Self::BadRequest(e.body_text()) }
}

impl From<BytesRejection> for ApiError {
  fn from(e: BytesRejection) -> Self {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      Self::PayloadTooLarge(e.body_text())
    } else {
      Self::BadRequest(e.body_text())
    }
  }
}

impl From<MultipartError> for ApiError {
  fn from(e: MultipartError) -> Self {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
      Self::PayloadTooLarge(e.body_text())
    } else {
      Self::BadRequest(e.body_text())
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m.clone()),
      ApiError::UnsupportedMedia(m) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Timeout(m) => (StatusCode::GATEWAY_TIMEOUT, m.clone()),
      ApiError::Internal(e) => {
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_owned())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
