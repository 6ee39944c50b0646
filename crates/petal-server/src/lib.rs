//! HTTP server for petal.
//!
//! Wraps the [`petal_api`] router with request tracing, a request timeout
//! and a health probe, and runs the periodic maintenance jobs (graph
//! rebuild and interaction retention) next to it.

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Json, Router, extract::State, routing::get};
use petal_core::embedding::Encoder;
use petal_engine::{Backend, Engine, EngineConfig, Error};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{debug, warn};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `petal.toml` and
/// `PETAL__*` environment variables.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
  pub host:                        String,
  pub port:                        u16,
  pub store_path:                  PathBuf,
  pub request_timeout_secs:        u64,
  /// `0` disables the scheduled rebuild; `/admin/rebuild-graph` still works.
  pub graph_rebuild_interval_secs: u64,
  /// Interaction events older than this are pruned after each scheduled
  /// rebuild. Unset keeps everything.
  pub retention_days:              Option<u32>,
  /// Embedding service. Without one, search ranks lexically and visual
  /// search answers `503`.
  pub encoder:                     Option<EncoderConfig>,
  pub engine:                      EngineConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:                        "127.0.0.1".into(),
      port:                        8080,
      store_path:                  PathBuf::from("petal.db"),
      request_timeout_secs:        30,
      graph_rebuild_interval_secs: 24 * 60 * 60,
      retention_days:              None,
      encoder:                     None,
      engine:                      EngineConfig::default(),
    }
  }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
  pub base_url:   String,
  #[serde(default = "default_encoder_timeout_ms")]
  pub timeout_ms: u64,
}

fn default_encoder_timeout_ms() -> u64 { 5_000 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: `/health` plus the API under `/api`.
pub fn app<S, E>(engine: Arc<Engine<S, E>>, config: &ServerConfig) -> Router
where
  S: Backend,
  E: Encoder + 'static,
{
  Router::new()
    .route("/health", get(health::<S, E>))
    .with_state(engine.clone())
    .nest("/api", petal_api::api_router(engine))
    .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
    .layer(TraceLayer::new_for_http())
}

/// `GET /health`: tracker counters and the last graph build.
async fn health<S, E>(State(engine): State<Arc<Engine<S, E>>>) -> Json<Value>
where
  S: Backend,
  E: Encoder + 'static,
{
  let stats = engine.tracker_stats();
  let last_build = match engine.store().last_build().await {
    Ok(run) => json!(run),
    Err(e) => {
      warn!(error = %e, "could not read the last graph build");
      Value::Null
    }
  };
  Json(json!({
    "status": "ok",
    "tracker": { "written": stats.written(), "dropped": stats.dropped() },
    "last_build": last_build,
  }))
}

// ─── Maintenance ──────────────────────────────────────────────────────────────

/// One maintenance pass: rebuild the graph, then prune old interactions.
///
/// A build already in progress is not an error here; the pass just skips
/// the rebuild.
pub async fn run_maintenance<S, E>(engine: &Engine<S, E>, retention_days: Option<u32>)
where
  S: Backend,
  E: Encoder + 'static,
{
  // Other build failures are logged by the engine.
  if let Err(Error::BuildInProgress) = engine.rebuild_graph().await {
    debug!("graph build already running, skipping");
  }
  if let Some(days) = retention_days
    && let Err(e) = engine.prune(days).await
  {
    warn!(error = %e, "interaction pruning failed");
  }
}

/// Run [`run_maintenance`] every `every`, starting immediately.
pub fn spawn_maintenance<S, E>(
  engine: Arc<Engine<S, E>>,
  every: Duration,
  retention_days: Option<u32>,
) -> JoinHandle<()>
where
  S: Backend,
  E: Encoder + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
      ticker.tick().await;
      run_maintenance(&engine, retention_days).await;
    }
  })
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use petal_engine::NoEncoder;
  use petal_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  async fn engine() -> Arc<Engine<SqliteStore, NoEncoder>> {
    let config = EngineConfig {
      text_dim: 4,
      image_dim: 3,
      ..Default::default()
    };
    let store = SqliteStore::open_in_memory(config.dimensions()).await.unwrap();
    Arc::new(Engine::new(Arc::new(store), NoEncoder, config))
  }

  #[test]
  fn config_layers_over_defaults() {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(
        "port = 9000\n\n[engine]\nmax_limit = 20\n\n[encoder]\nbase_url = \"http://embed:8000\"\n",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap();
    let cfg: ServerConfig = settings.try_deserialize().unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.engine.max_limit, 20);
    assert_eq!(cfg.engine.min_order_cooccurrence, 3);
    let encoder = cfg.encoder.unwrap();
    assert_eq!(encoder.base_url, "http://embed:8000");
    assert_eq!(encoder.timeout_ms, 5_000);
  }

  #[tokio::test]
  async fn health_reports_tracker_and_build() {
    let engine = engine().await;
    let app = app(engine.clone(), &ServerConfig::default());

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["last_build"], Value::Null);

    run_maintenance(&engine, Some(30)).await;
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["last_build"]["status"], "succeeded");
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let app = app(engine().await, &ServerConfig::default());
    let req = Request::builder()
      .uri("/api/recommendations/trending")
      .body(Body::empty())
      .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }
}
