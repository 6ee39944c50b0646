//! Tunables for the engine. Every field has a default so a config file only
//! needs to name what it changes.

use std::time::Duration;

use petal_core::{embedding::Dimensions, graph::GraphThresholds};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  // graph
  pub min_order_cooccurrence:   u64,
  pub min_session_cooccurrence: u64,

  // trending
  pub trending_window_days:    i64,
  pub trending_cache_ttl_secs: u64,

  // recommendations
  pub history_events: usize,
  pub top_categories: usize,
  pub view_weight:    f64,
  pub cart_weight:    f64,
  /// Upper bound on any caller-supplied `limit`.
  pub max_limit:      usize,

  // search
  pub max_query_chars:        usize,
  pub lexical_weight:         f64,
  pub semantic_weight:        f64,
  pub in_stock_boost:         f64,
  pub featured_boost:         f64,
  pub attribute_boost:        f64,
  /// Fewer structured survivors than this triggers the full-catalog fallback.
  pub min_structured_results: usize,
  pub semantic_candidates:    usize,
  /// Without hard filters, a product with no lexical or attribute match
  /// needs at least this similarity to be returned.
  pub semantic_floor:         f64,
  pub suggest_half_life_days: f64,
  pub product_name_weight:    f64,

  // visual search
  pub max_image_bytes:         usize,
  pub visual_concurrency:      usize,
  pub visual_queue_timeout_ms: u64,
  pub encode_timeout_ms:       u64,
  /// Neighbours fetched before thresholding; independent of the threshold.
  pub visual_candidates:       usize,

  // tracker
  pub tracker_queue:      usize,
  pub tracker_retries:    u32,
  pub tracker_backoff_ms: u64,

  // embeddings
  pub text_dim:  usize,
  pub image_dim: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      min_order_cooccurrence:   3,
      min_session_cooccurrence: 5,

      trending_window_days:    7,
      trending_cache_ttl_secs: 300,

      history_events: 50,
      top_categories: 3,
      view_weight:    1.0,
      cart_weight:    3.0,
      max_limit:      50,

      max_query_chars:        500,
      lexical_weight:         0.6,
      semantic_weight:        0.4,
      in_stock_boost:         0.1,
      featured_boost:         0.15,
      attribute_boost:        0.1,
      min_structured_results: 1,
      semantic_candidates:    200,
      semantic_floor:         0.3,
      suggest_half_life_days: 14.0,
      product_name_weight:    1.0,

      max_image_bytes:         10 * 1024 * 1024,
      visual_concurrency:      4,
      visual_queue_timeout_ms: 2_000,
      encode_timeout_ms:       5_000,
      visual_candidates:       64,

      tracker_queue:      1024,
      tracker_retries:    3,
      tracker_backoff_ms: 50,

      text_dim:  384,
      image_dim: 512,
    }
  }
}

impl EngineConfig {
  pub fn dimensions(&self) -> Dimensions {
    Dimensions {
      text:  self.text_dim,
      image: self.image_dim,
    }
  }

  pub fn graph_thresholds(&self) -> GraphThresholds {
    GraphThresholds {
      min_order_cooccurrence:   self.min_order_cooccurrence,
      min_session_cooccurrence: self.min_session_cooccurrence,
    }
  }

  pub fn trending_window(&self) -> chrono::Duration { chrono::Duration::days(self.trending_window_days) }

  pub fn trending_ttl(&self) -> Duration { Duration::from_secs(self.trending_cache_ttl_secs) }

  pub fn visual_queue_timeout(&self) -> Duration { Duration::from_millis(self.visual_queue_timeout_ms) }

  pub fn encode_timeout(&self) -> Duration { Duration::from_millis(self.encode_timeout_ms) }

  /// Clamp a caller-supplied limit into `1..=max_limit`.
  pub fn clamp_limit(&self, limit: usize) -> usize { limit.clamp(1, self.max_limit.max(1)) }
}
