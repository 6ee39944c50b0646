//! Feedback-loop records: what was shown, what was clicked, what was
//! searched.
//!
//! Impressions and search rows capture results exactly as returned so that a
//! later click can be attributed by position.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::{Error, Result, intent::SearchIntent};

// ─── Surfaces ────────────────────────────────────────────────────────────────

/// The UI surface requesting recommendations.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Context {
  Homepage,
  /// Product-detail page; requires a seed product.
  Pdp,
  Cart,
}

impl Context {
  /// Parse a wire value, rejecting anything outside the fixed set.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownContext(s.to_owned()))
  }
}

/// Which candidate source produced a ranked list.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
  /// Most-viewed products in the trending window.
  Trending,
  /// Relationship-graph neighbours (co-purchase, co-view).
  Graph,
  /// Nearest neighbours in the embedding index.
  Content,
  /// Category affinity mined from the visitor's own history.
  CategoryAffinity,
  /// More than one source contributed.
  Hybrid,
}

impl Algorithm {
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s)
      .map_err(|_| Error::Validation(format!("unknown algorithm: {s:?}")))
  }
}

// ─── Recommendations ─────────────────────────────────────────────────────────

/// Exactly what a recommendation call returned, in display order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationImpression {
  pub impression_id:        Uuid,
  pub user_id:              Option<String>,
  pub session_id:           String,
  pub recommended_products: Vec<Uuid>,
  pub context:              Context,
  pub algorithm:            Algorithm,
  pub created_at:           DateTime<Utc>,
}

/// A visitor acting on one item of a recommendation list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationClick {
  pub click_id:             Uuid,
  /// The logged impression this click refers to, when the client kept it.
  pub impression_id:        Option<Uuid>,
  pub user_id:              Option<String>,
  pub session_id:           String,
  pub recommended_products: Vec<Uuid>,
  pub clicked_product_id:   Uuid,
  pub context:              Context,
  pub algorithm:            Algorithm,
  pub position:             usize,
  pub created_at:           DateTime<Utc>,
}

impl RecommendationClick {
  /// `position` must index `clicked_product_id` within the list shown.
  pub fn validate(&self) -> Result<()> {
    if self.session_id.trim().is_empty() {
      return Err(Error::Validation("session_id must not be empty".into()));
    }
    match self.recommended_products.get(self.position) {
      Some(id) if *id == self.clicked_product_id => Ok(()),
      Some(_) => Err(Error::Validation(format!(
        "product at position {} is not {}",
        self.position, self.clicked_product_id
      ))),
      None => Err(Error::Validation(format!(
        "position {} is outside the {} recommended products",
        self.position,
        self.recommended_products.len()
      ))),
    }
  }
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// One row per `search()` call. The click fields start empty and are filled
/// in by a separate click report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
  pub search_id:          Uuid,
  pub user_id:            Option<String>,
  pub session_id:         String,
  pub query_text:         String,
  pub parsed_intent:      SearchIntent,
  pub results_count:      usize,
  pub clicked_product_id: Option<Uuid>,
  pub clicked_position:   Option<usize>,
  pub created_at:         DateTime<Utc>,
}

/// A past query string with the time it was issued; input to autocomplete.
#[derive(Debug, Clone)]
pub struct QueryHistoryEntry {
  pub query_text:    String,
  pub results_count: usize,
  pub created_at:    DateTime<Utc>,
}
