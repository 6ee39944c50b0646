//! petal server binary.
//!
//! Reads `petal.toml` (or the path given with `--config`), layers
//! `PETAL__*` environment variables on top, opens the SQLite store and
//! serves the recommendation and search API over HTTP.
//!
//! ```text
//! PETAL__PORT=9000 PETAL__ENCODER__BASE_URL=http://localhost:8001 petal
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use petal_core::embedding::Encoder;
use petal_engine::{Engine, HttpEncoder, NoEncoder};
use petal_server::ServerConfig;
use petal_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "petal recommendation and search server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "petal.toml")]
  config: PathBuf,

  /// Run one graph rebuild against the store and exit.
  #[arg(long)]
  rebuild_graph: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("PETAL").separator("__"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path, server_cfg.engine.dimensions())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  match &server_cfg.encoder {
    Some(enc) => {
      let encoder = HttpEncoder::new(enc.base_url.clone(), Duration::from_millis(enc.timeout_ms))
        .context("failed to build the embedding client")?;
      tracing::info!(base_url = %enc.base_url, "using embedding service");
      run(store, encoder, server_cfg, cli.rebuild_graph).await
    }
    None => {
      tracing::warn!("no embedding service configured; semantic and visual search are off");
      run(store, NoEncoder, server_cfg, cli.rebuild_graph).await
    }
  }
}

async fn run<E: Encoder + 'static>(
  store: Arc<SqliteStore>,
  encoder: E,
  server_cfg: ServerConfig,
  rebuild_only: bool,
) -> anyhow::Result<()> {
  let engine = Arc::new(Engine::new(store, encoder, server_cfg.engine.clone()));

  if rebuild_only {
    let run = engine.rebuild_graph().await.context("graph build failed")?;
    println!("{}", serde_json::to_string_pretty(&run)?);
    return Ok(());
  }

  let maintenance = (server_cfg.graph_rebuild_interval_secs > 0).then(|| {
    petal_server::spawn_maintenance(
      engine.clone(),
      Duration::from_secs(server_cfg.graph_rebuild_interval_secs),
      server_cfg.retention_days,
    )
  });

  let app = petal_server::app(engine.clone(), &server_cfg);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  if let Some(handle) = maintenance {
    handle.abort();
  }
  // Drain queued tracker writes before exiting.
  engine.flush().await;
  tracing::info!("shut down");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
