//! JSON REST API for petal.
//!
//! Exposes an axum [`Router`] backed by a shared [`Engine`]. Auth, TLS,
//! and transport concerns are the caller's responsibility; the `/admin`
//! routes in particular should sit behind whatever protects the operator
//! surface.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", petal_api::api_router(engine.clone()))
//! ```

pub mod admin;
pub mod error;
pub mod recommendations;
pub mod search;
pub mod track;
pub mod visual;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post},
};
use petal_core::embedding::Encoder;
use petal_engine::{Backend, Engine};
use serde::Serialize;

pub use error::ApiError;

/// Multipart framing allowance on top of the image itself, so the size
/// check in the engine is the one that reports an oversized image.
const UPLOAD_OVERHEAD: usize = 64 * 1024;

/// Acknowledgement body for write-only endpoints.
#[derive(Debug, Serialize)]
pub struct Ack {
  pub success: bool,
}

impl Ack {
  pub fn ok() -> Self { Self { success: true } }
}

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, E>(engine: Arc<Engine<S, E>>) -> Router<()>
where
  S: Backend,
  E: Encoder + 'static,
{
  let upload_limit = DefaultBodyLimit::max(engine.config().max_image_bytes + UPLOAD_OVERHEAD);

  Router::new()
    // Recommendations
    .route("/recommendations", post(recommendations::recommend::<S, E>))
    .route("/recommendations/trending", get(recommendations::trending::<S, E>))
    .route("/recommendations/related/{id}", get(recommendations::related::<S, E>))
    .route("/recommendations/track-click", post(recommendations::track_click::<S, E>))
    // Search
    .route("/search", post(search::search::<S, E>))
    .route("/search/suggestions", get(search::suggestions::<S, E>))
    .route("/search/click", post(search::click::<S, E>))
    .route("/visual-search", post(visual::search::<S, E>).layer(upload_limit))
    // Tracking
    .route("/track", post(track::track::<S, E>))
    // Admin
    .route("/admin/rebuild-graph", post(admin::rebuild_graph::<S, E>))
    .route("/admin/embeddings/{id}/text", post(admin::index_text::<S, E>))
    .route("/admin/embeddings/{id}/image", post(admin::index_image::<S, E>).layer(upload_limit))
    .with_state(engine)
}
