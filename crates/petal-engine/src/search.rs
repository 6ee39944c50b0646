//! Smart search: intent-filtered, blended ranking plus autocomplete.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use petal_core::{
  catalog::{Product, ProductFilter},
  embedding::{EmbeddingKind, Encoder},
  event::{EventPayload, InteractionEvent, validate_session_id},
  feedback::SearchQuery,
  intent::{Quality, SearchIntent},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Backend, Engine, Error, Record, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
  #[serde(default)]
  pub query:      String,
  pub session_id: String,
  #[serde(default)]
  pub user_id:    Option<String>,
  #[serde(default = "default_limit")]
  pub limit:      usize,
}

fn default_limit() -> usize { 20 }

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
  /// Reference for a later click report.
  pub search_id: Uuid,
  pub intent:    SearchIntent,
  pub results:   Vec<Product>,
  pub count:     usize,
}

/// One candidate with its blended score.
struct Scored {
  product: Product,
  score:   f64,
}

/// Similarities from the text index, or nothing when the encoder is down
/// or there is no free text to embed.
type Semantic = Option<HashMap<Uuid, f32>>;

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// Parse, filter, rank and log one query. An empty query returns
  /// trending products. Exactly one search row is queued per call.
  pub async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
    validate_session_id(&request.session_id)?;
    let limit = self.config.clamp_limit(request.limit);
    let query: String = request.query.chars().take(self.config.max_query_chars).collect();
    let intent = petal_query::parse(&query);

    let results = if intent.is_empty() {
      self.trending_products(None, limit).await?
    } else {
      self.ranked(&intent, limit).await?
    };

    let now = Utc::now();
    let user_id = request.user_id.filter(|u| !u.trim().is_empty());
    let row = SearchQuery {
      search_id: Uuid::new_v4(),
      user_id: user_id.clone(),
      session_id: request.session_id.clone(),
      query_text: query.trim().to_owned(),
      parsed_intent: intent.clone(),
      results_count: results.len(),
      clicked_product_id: None,
      clicked_position: None,
      created_at: now,
    };
    let search_id = row.search_id;
    self.tracker.record(Record::Search(row));
    self.tracker.record(Record::Interaction(InteractionEvent {
      event_id: Uuid::new_v4(),
      user_id,
      session_id: request.session_id,
      product_id: None,
      category_id: None,
      payload: EventPayload::Search {
        query:         query.trim().to_owned(),
        results_count: Some(results.len()),
      },
      created_at: now,
    }));

    Ok(SearchResponse {
      search_id,
      intent,
      count: results.len(),
      results,
    })
  }

  /// Fill the click fields of a logged search. Returns `false` when the
  /// search is unknown or already carries a click.
  pub async fn report_search_click(&self, search_id: Uuid, product_id: Uuid, position: usize) -> Result<bool> {
    self
      .store
      .report_search_click(search_id, product_id, position)
      .await
      .map_err(Error::store)
  }

  async fn ranked(&self, intent: &SearchIntent, limit: usize) -> Result<Vec<Product>> {
    let filter = ProductFilter {
      price_min:     intent.price_min,
      price_max:     intent.price_max,
      category_slug: intent.occasion.map(|o| o.category_slug().to_owned()),
      district:      intent.location.clone(),
      limit:         None,
    };
    let hard = intent.has_hard_filters();
    let candidates = self.store.list_products(&filter).await.map_err(Error::store)?;
    let semantic = self.semantic_scores(&intent.residual_text()).await;

    let mut scored = self.score(candidates, intent, &semantic, !hard);
    if hard && scored.len() < self.config.min_structured_results {
      debug!(survivors = scored.len(), "structured filters too narrow, falling back");
      scored = self.fallback(intent, &semantic).await?;
    }

    sort_scored(&mut scored);
    Ok(scored.into_iter().take(limit).map(|s| s.product).collect())
  }

  /// Rank the whole catalog by similarity alone. Without similarities,
  /// fall back to lexical and attribute matches.
  async fn fallback(&self, intent: &SearchIntent, semantic: &Semantic) -> Result<Vec<Scored>> {
    match semantic {
      Some(similarities) => {
        let ids: Vec<Uuid> = similarities.keys().copied().collect();
        let products = self.store.get_products(ids).await.map_err(Error::store)?;
        Ok(
          products
            .into_iter()
            .filter(|p| p.is_published)
            .filter_map(|product| {
              let similarity = f64::from(*similarities.get(&product.product_id)?);
              (similarity >= self.config.semantic_floor).then_some(Scored { product, score: similarity })
            })
            .collect(),
        )
      }
      None => {
        let everything = self
          .store
          .list_products(&ProductFilter::default())
          .await
          .map_err(Error::store)?;
        Ok(
          everything
            .into_iter()
            .filter_map(|product| {
              let text = product.searchable_text();
              let score = self.config.lexical_weight * lexical_score(&text, &intent.terms)
                + self.config.attribute_boost * attribute_matches(&product, &text, intent) as f64;
              (score > 0.0).then_some(Scored { product, score })
            })
            .collect(),
        )
      }
    }
  }

  /// Blend lexical, semantic and attribute signals. With `require_match`,
  /// products showing no sign of relevance are dropped.
  fn score(
    &self,
    candidates: Vec<Product>,
    intent: &SearchIntent,
    semantic: &Semantic,
    require_match: bool,
  ) -> Vec<Scored> {
    let c = &self.config;
    let max_price = candidates.iter().map(Product::effective_price).max().unwrap_or(0);

    candidates
      .into_iter()
      .filter_map(|product| {
        let text = product.searchable_text();
        let lexical = lexical_score(&text, &intent.terms);
        let similarity = semantic
          .as_ref()
          .and_then(|s| s.get(&product.product_id).copied())
          .map_or(0.0, |s| f64::from(s).max(0.0));
        let attributes = attribute_matches(&product, &text, intent);

        if require_match && lexical == 0.0 && attributes == 0 && similarity < c.semantic_floor {
          return None;
        }

        let mut score = c.lexical_weight * lexical
          + c.semantic_weight * similarity
          + c.attribute_boost * attributes as f64;
        if product.is_in_stock() {
          score += c.in_stock_boost;
        }
        if product.is_featured {
          score += c.featured_boost;
        }
        match intent.quality {
          Some(Quality::Premium) if product.is_featured => score += c.featured_boost,
          Some(Quality::Budget) if max_price > 0 => {
            let cheapness = 1.0 - product.effective_price() as f64 / max_price as f64;
            score += c.attribute_boost * cheapness;
          }
          _ => {}
        }
        // Urgent orders favour stock that is known to be on hand.
        if intent.urgent && product.stock.is_some_and(|s| s > 0) {
          score += c.in_stock_boost;
        }
        Some(Scored { product, score })
      })
      .collect()
  }

  async fn semantic_scores(&self, text: &str) -> Semantic {
    if text.trim().is_empty() {
      return None;
    }
    let encoded = tokio::time::timeout(
      self.config.encode_timeout(),
      self.encoder.encode_text(text.to_owned()),
    )
    .await;
    let embedding = match encoded {
      Ok(Ok(e)) => match self.check_encoded(&e, EmbeddingKind::Text) {
        Ok(()) => e,
        Err(err) => {
          warn!(error = %err, "unusable text embedding, ranking lexically");
          return None;
        }
      },
      Ok(Err(e)) => {
        warn!(error = %e, "text encoder unavailable, ranking lexically");
        return None;
      }
      Err(_) => {
        warn!("text encoder timed out, ranking lexically");
        return None;
      }
    };
    match self.store.nearest(embedding, self.config.semantic_candidates).await {
      Ok(neighbours) => Some(
        neighbours
          .into_iter()
          .map(|n| (n.product_id, n.similarity))
          .collect(),
      ),
      Err(e) => {
        warn!(error = %e, "vector index unavailable, ranking lexically");
        None
      }
    }
  }

  // ── Autocomplete ──────────────────────────────────────────────────────

  /// Past queries and product names starting with `prefix`, ranked by
  /// recency-weighted frequency. Product names count as one fresh use.
  pub async fn suggest(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
    let prefix = petal_query::normalize(prefix);
    if prefix.is_empty() {
      return Ok(Vec::new());
    }
    let limit = self.config.clamp_limit(limit);
    let now = Utc::now();

    let history = self
      .store
      .query_history_with_prefix(prefix.clone(), limit * 20)
      .await
      .map_err(Error::store)?;
    let names = self
      .store
      .product_names_with_prefix(prefix, limit * 2)
      .await
      .map_err(Error::store)?;

    let mut weights: HashMap<String, (String, f64)> = HashMap::new();
    for entry in history.into_iter().filter(|e| e.results_count > 0) {
      let weight = self.recency_weight(entry.created_at, now);
      let key = petal_query::normalize(&entry.query_text);
      weights.entry(key.clone()).or_insert((key, 0.0)).1 += weight;
    }
    for name in names {
      let key = petal_query::normalize(&name);
      weights.entry(key).or_insert((name, 0.0)).1 += self.config.product_name_weight;
    }

    let mut ranked: Vec<(String, f64)> = weights.into_values().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(ranked.into_iter().take(limit).map(|(text, _)| text).collect())
  }

  /// Halves every `suggest_half_life_days`.
  fn recency_weight(&self, at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - at).num_seconds().max(0) as f64 / 86_400.0;
    0.5_f64.powf(age_days / self.config.suggest_half_life_days.max(f64::EPSILON))
  }
}

/// Fraction of residual terms found as whole words in the product's text.
/// A term like `q` must stand alone to count, not hide inside `quà`.
fn lexical_score(text: &str, terms: &[String]) -> f64 {
  if terms.is_empty() {
    return 0.0;
  }
  let words: HashSet<&str> = text
    .split(|c: char| !c.is_alphanumeric())
    .filter(|w| !w.is_empty())
    .collect();
  let hits = terms
    .iter()
    .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
    .filter(|t| words.contains(t))
    .count();
  hits as f64 / terms.len() as f64
}

/// How many of the requested colour and flower attributes the product
/// carries, as a tag or in its text.
fn attribute_matches(product: &Product, text: &str, intent: &SearchIntent) -> usize {
  let color = intent
    .color
    .is_some_and(|c| product.has_tag(c.as_ref()) || petal_query::mentions_color(text, c));
  let flower = intent
    .flower_type
    .is_some_and(|f| product.has_tag(f.as_ref()) || petal_query::mentions_flower(text, f));
  usize::from(color) + usize::from(flower)
}

/// Score descending; ties go to featured, then newer, then lower id.
fn sort_scored(scored: &mut [Scored]) {
  scored.sort_by(|x, y| {
    y.score
      .total_cmp(&x.score)
      .then(y.product.is_featured.cmp(&x.product.is_featured))
      .then(y.product.created_at.cmp(&x.product.created_at))
      .then(x.product.product_id.cmp(&y.product.product_id))
  });
}

#[cfg(test)]
mod lexical_tests {
  use super::lexical_score;

  fn terms(words: &[&str]) -> Vec<String> { words.iter().map(|w| (*w).to_owned()).collect() }

  #[test]
  fn terms_match_whole_words_only() {
    let text = "giỏ quà tặng sinh nhật, hoa quỳnh";
    assert_eq!(lexical_score(text, &terms(&["q"])), 0.0);
    assert_eq!(lexical_score(text, &terms(&["quà"])), 1.0);
    assert_eq!(lexical_score(text, &terms(&["nhật", "q"])), 0.5);
    assert_eq!(lexical_score(text, &terms(&["quỳnh."])), 1.0);
    assert_eq!(lexical_score(text, &[]), 0.0);
  }
}
