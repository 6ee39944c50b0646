//! Request-path services for the petal engine.
//!
//! [`Engine`] ties a storage backend and an embedding encoder together and
//! exposes every operation the API serves: recommendations, trending,
//! smart search and autocomplete, visual search, behavioural tracking,
//! product indexing and the relationship-graph build.
//!
//! Each concern lives in its own module as an `impl` block on [`Engine`].
//! Writes that must not hold up a response go through the [`Tracker`].

pub mod builder;
pub mod config;
pub mod encoder;
pub mod error;
pub mod recommend;
pub mod search;
pub mod tracker;
pub mod trending;
pub mod visual;


use std::{sync::Arc, time::Duration};

use chrono::Utc;
use petal_core::{
  catalog::Catalog,
  embedding::{Embedding, EmbeddingKind, Encoder},
  event::NewInteraction,
  store::EngineStore,
};
use tokio::sync::{Mutex, Semaphore};

pub use config::EngineConfig;
pub use encoder::{HttpEncoder, NoEncoder};
pub use error::{Error, Result};
pub use recommend::{RecommendRequest, RecommendationClickRequest, Recommendations};
pub use search::{SearchRequest, SearchResponse};
pub use tracker::{Record, Tracker, TrackerStats};
pub use trending::Trending;
pub use visual::{VisualMatch, VisualQuery, VisualResults};

use crate::{
  tracker::RetryPolicy,
  trending::TrendingCache,
};

/// Everything the engine needs from storage: its own tables plus read
/// access to the catalog.
pub trait Backend: EngineStore + Catalog + 'static {}

impl<T: EngineStore + Catalog + 'static> Backend for T {}

/// The recommendation and search engine.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Engine<S, E = NoEncoder> {
  store:          Arc<S>,
  encoder:        Arc<E>,
  config:         EngineConfig,
  trending:       TrendingCache,
  tracker:        Tracker,
  visual_permits: Arc<Semaphore>,
  build_lock:     Mutex<()>,
}

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// Build an engine and start its tracker task. Must be called from
  /// within a Tokio runtime.
  pub fn new(store: Arc<S>, encoder: E, config: EngineConfig) -> Self {
    let policy = RetryPolicy {
      retries: config.tracker_retries,
      backoff: Duration::from_millis(config.tracker_backoff_ms),
    };
    let (tracker, _writer) = Tracker::spawn(store.clone(), config.tracker_queue, policy);
    Self {
      trending: TrendingCache::new(config.trending_ttl()),
      visual_permits: Arc::new(Semaphore::new(config.visual_concurrency.max(1))),
      build_lock: Mutex::new(()),
      encoder: Arc::new(encoder),
      store,
      tracker,
      config,
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub fn tracker_stats(&self) -> &TrackerStats { self.tracker.stats() }

  /// Validate an interaction and queue it for the log. Returns as soon as
  /// the event is queued; a later write failure is logged, not reported.
  pub fn track(&self, interaction: NewInteraction) -> Result<()> {
    let event = interaction.into_event(Utc::now())?;
    self.tracker.record(Record::Interaction(event));
    Ok(())
  }

  /// Wait for every queued tracker write to be handled.
  pub async fn flush(&self) { self.tracker.flush().await }

  /// Reject an encoder result of the wrong kind or dimension before it
  /// reaches the index. Either one means the encoder is misbehaving.
  fn check_encoded(&self, embedding: &Embedding, expected: EmbeddingKind) -> Result<()> {
    if embedding.kind() != expected {
      return Err(Error::Unavailable(format!(
        "encoder returned a {} embedding, expected {expected}",
        embedding.kind()
      )));
    }
    self.config.dimensions().check(embedding)?;
    Ok(())
  }
}
