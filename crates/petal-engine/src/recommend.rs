//! Ranked recommendations per surface, and click attribution.
//!
//! Each [`Context`] has its own [`RankingStrategy`]. A strategy only decides
//! which candidate sources to consult and in what order; the shared
//! [`Picker`] enforces the post-processing every list obeys (recommendable
//! products only, no seed, no duplicates, at most `limit`).

use std::{
  collections::{HashMap, HashSet},
  future::Future,
};

use chrono::Utc;
use petal_core::{
  catalog::Product,
  embedding::{EmbeddingKind, Encoder},
  event::{EventPayload, EventType, InteractionEvent, Visitor, validate_session_id},
  feedback::{Algorithm, Context, RecommendationClick, RecommendationImpression},
  graph::RelationshipType,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::{Backend, Engine, Error, Record, Result};

// ─── Requests and responses ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
  pub context:    Context,
  pub session_id: String,
  #[serde(default)]
  pub user_id:    Option<String>,
  /// Seed product; required for [`Context::Pdp`].
  #[serde(default)]
  pub product_id: Option<Uuid>,
  #[serde(default = "default_limit")]
  pub limit:      usize,
}

fn default_limit() -> usize { 10 }

impl RecommendRequest {
  fn visitor(&self) -> Visitor {
    Visitor {
      session_id: self.session_id.clone(),
      user_id:    self.user_id.clone().filter(|u| !u.trim().is_empty()),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendations {
  pub recommendations: Vec<Product>,
  pub algorithm:       Algorithm,
  /// Id of the logged impression; absent when nothing was shown.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub impression_id:   Option<Uuid>,
}

/// A click on one item of a recommendation list.
///
/// When `impression_id` is given, the stored impression is authoritative
/// for the list, context and algorithm.
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationClickRequest {
  pub session_id:           String,
  #[serde(default)]
  pub user_id:              Option<String>,
  #[serde(default)]
  pub impression_id:        Option<Uuid>,
  #[serde(default)]
  pub recommended_products: Vec<Uuid>,
  pub clicked_product_id:   Uuid,
  pub context:              Context,
  pub algorithm:            Algorithm,
  pub position:             usize,
}

// ─── Picker ──────────────────────────────────────────────────────────────────

/// Accumulates the final list while remembering which sources contributed.
pub(crate) struct Picker {
  limit:   usize,
  exclude: HashSet<Uuid>,
  picked:  Vec<Product>,
  sources: Vec<Algorithm>,
}

impl Picker {
  fn new(limit: usize, exclude: impl IntoIterator<Item = Uuid>) -> Self {
    Self {
      limit,
      exclude: exclude.into_iter().collect(),
      picked: Vec::with_capacity(limit),
      sources: Vec::new(),
    }
  }

  fn remaining(&self) -> usize { self.limit - self.picked.len() }

  fn is_full(&self) -> bool { self.picked.len() >= self.limit }

  /// Products that must not be fetched again: exclusions plus picks.
  fn seen(&self) -> usize { self.exclude.len() }

  /// Take up to `max` acceptable products from `products`, in order.
  fn offer(&mut self, products: impl IntoIterator<Item = Product>, source: Algorithm, max: usize) -> usize {
    let mut taken = 0;
    for product in products {
      if self.is_full() || taken >= max {
        break;
      }
      if !product.is_recommendable() || !self.exclude.insert(product.product_id) {
        continue;
      }
      self.picked.push(product);
      taken += 1;
    }
    if taken > 0 && !self.sources.contains(&source) {
      self.sources.push(source);
    }
    taken
  }

  fn offer_all(&mut self, products: impl IntoIterator<Item = Product>, source: Algorithm) -> usize {
    self.offer(products, source, usize::MAX)
  }

  fn finish(self) -> (Vec<Product>, Algorithm) {
    let algorithm = match self.sources.as_slice() {
      [] => Algorithm::Trending,
      [only] => *only,
      _ => Algorithm::Hybrid,
    };
    (self.picked, algorithm)
  }
}

// ─── Strategies ──────────────────────────────────────────────────────────────

/// Fills a [`Picker`] for one surface.
pub(crate) trait RankingStrategy {
  fn fill<'a, S: Backend, E: Encoder + 'static>(
    &'a self,
    engine: &'a Engine<S, E>,
    request: &'a RecommendRequest,
    picker: &'a mut Picker,
  ) -> impl Future<Output = Result<()>> + Send + 'a;
}

/// Product-detail page: graph neighbours of the seed, then content
/// neighbours, then trending.
pub(crate) struct PdpStrategy;

/// Homepage: category affinity from the visitor's history, then trending.
/// A visitor without history gets trending only.
pub(crate) struct HomepageStrategy;

/// Cart: products bought together with the cart's contents, then category
/// affinity, then trending.
pub(crate) struct CartStrategy;

impl RankingStrategy for PdpStrategy {
  async fn fill<'a, S: Backend, E: Encoder + 'static>(
    &'a self,
    engine: &'a Engine<S, E>,
    request: &'a RecommendRequest,
    picker: &'a mut Picker,
  ) -> Result<()> {
    let seed = request
      .product_id
      .ok_or_else(|| Error::Validation("pdp recommendations require product_id".into()))?;

    let graph = engine.graph_candidates(&[seed], None, picker.limit + picker.seen()).await?;
    picker.offer_all(graph, Algorithm::Graph);
    if !picker.is_full() {
      let content = engine.content_candidates(seed, picker.remaining() + picker.seen()).await;
      picker.offer_all(content, Algorithm::Content);
    }
    engine.pad_with_trending(picker).await
  }
}

impl RankingStrategy for HomepageStrategy {
  async fn fill<'a, S: Backend, E: Encoder + 'static>(
    &'a self,
    engine: &'a Engine<S, E>,
    request: &'a RecommendRequest,
    picker: &'a mut Picker,
  ) -> Result<()> {
    engine.fill_by_affinity(&request.visitor(), picker).await?;
    engine.pad_with_trending(picker).await
  }
}

impl RankingStrategy for CartStrategy {
  async fn fill<'a, S: Backend, E: Encoder + 'static>(
    &'a self,
    engine: &'a Engine<S, E>,
    request: &'a RecommendRequest,
    picker: &'a mut Picker,
  ) -> Result<()> {
    let visitor = request.visitor();
    let cart = engine.cart_contents(&visitor).await?;
    picker.exclude.extend(cart.iter().copied());

    if !cart.is_empty() {
      let graph = engine
        .graph_candidates(
          &cart,
          Some(RelationshipType::FrequentlyBoughtTogether),
          picker.limit + picker.seen(),
        )
        .await?;
      picker.offer_all(graph, Algorithm::Graph);
    }
    if !picker.is_full() {
      engine.fill_by_affinity(&visitor, picker).await?;
    }
    engine.pad_with_trending(picker).await
  }
}

// ─── Engine operations ───────────────────────────────────────────────────────

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// Ranked recommendations for one surface. A non-empty list is logged as
  /// an impression whose id is returned for click attribution.
  pub async fn recommend(&self, request: RecommendRequest) -> Result<Recommendations> {
    validate_session_id(&request.session_id)?;
    let (products, algorithm) = self.rank(&request).await?;

    let impression_id = (!products.is_empty()).then(|| {
      let impression = RecommendationImpression {
        impression_id:        Uuid::new_v4(),
        user_id:              request.visitor().user_id,
        session_id:           request.session_id.clone(),
        recommended_products: products.iter().map(|p| p.product_id).collect(),
        context:              request.context,
        algorithm,
        created_at:           Utc::now(),
      };
      let id = impression.impression_id;
      self.tracker.record(Record::Impression(impression));
      id
    });

    Ok(Recommendations {
      recommendations: products,
      algorithm,
      impression_id,
    })
  }

  /// Products related to `product_id`: the product-detail ranking without
  /// an impression.
  pub async fn related(&self, product_id: Uuid, limit: usize) -> Result<Vec<Product>> {
    let request = RecommendRequest {
      context: Context::Pdp,
      session_id: String::new(),
      user_id: None,
      product_id: Some(product_id),
      limit,
    };
    Ok(self.rank(&request).await?.0)
  }

  async fn rank(&self, request: &RecommendRequest) -> Result<(Vec<Product>, Algorithm)> {
    let limit = self.config.clamp_limit(request.limit);
    let mut picker = Picker::new(limit, request.product_id);
    match request.context {
      Context::Pdp => PdpStrategy.fill(self, request, &mut picker).await?,
      Context::Homepage => HomepageStrategy.fill(self, request, &mut picker).await?,
      Context::Cart => CartStrategy.fill(self, request, &mut picker).await?,
    }
    Ok(picker.finish())
  }

  /// Record a click on a recommended product and append the matching
  /// `click_recommendation` event.
  pub async fn track_recommendation_click(&self, request: RecommendationClickRequest) -> Result<()> {
    let mut click = RecommendationClick {
      click_id:             Uuid::new_v4(),
      impression_id:        request.impression_id,
      user_id:              request.user_id.filter(|u| !u.trim().is_empty()),
      session_id:           request.session_id,
      recommended_products: request.recommended_products,
      clicked_product_id:   request.clicked_product_id,
      context:              request.context,
      algorithm:            request.algorithm,
      position:             request.position,
      created_at:           Utc::now(),
    };

    if let Some(impression_id) = click.impression_id {
      let impression = self
        .store
        .get_impression(impression_id)
        .await
        .map_err(Error::store)?
        .ok_or_else(|| Error::Validation(format!("unknown impression {impression_id}")))?;
      click.recommended_products = impression.recommended_products;
      click.context = impression.context;
      click.algorithm = impression.algorithm;
    }
    click.validate()?;

    let event = InteractionEvent {
      event_id:    Uuid::new_v4(),
      user_id:     click.user_id.clone(),
      session_id:  click.session_id.clone(),
      product_id:  Some(click.clicked_product_id),
      category_id: None,
      payload:     EventPayload::ClickRecommendation {
        impression_id: click.impression_id,
        context:       Some(click.context),
        algorithm:     Some(click.algorithm),
        position:      Some(click.position),
      },
      created_at:  click.created_at,
    };
    self.tracker.record(Record::Click(click));
    self.tracker.record(Record::Interaction(event));
    Ok(())
  }

  // ── Candidate sources ─────────────────────────────────────────────────

  /// Graph neighbours of `seeds`, strongest first. With several seeds a
  /// neighbour keeps its best edge. Ties fall to the newer product.
  async fn graph_candidates(
    &self,
    seeds: &[Uuid],
    only: Option<RelationshipType>,
    per_seed: usize,
  ) -> Result<Vec<Product>> {
    let mut best: HashMap<Uuid, (f64, u64)> = HashMap::new();
    for &seed in seeds {
      let edges = self.store.edges_for(seed, per_seed).await.map_err(Error::store)?;
      for edge in edges {
        if only.is_some_and(|t| t != edge.relationship_type) {
          continue;
        }
        let Some(other) = edge.other(seed) else { continue };
        if seeds.contains(&other) {
          continue;
        }
        let entry = best.entry(other).or_insert((0.0, 0));
        let candidate = (edge.confidence_score, edge.occurrence_count);
        if candidate.0 > entry.0 || (candidate.0 == entry.0 && candidate.1 > entry.1) {
          *entry = candidate;
        }
      }
    }
    if best.is_empty() {
      return Ok(Vec::new());
    }

    let mut products = self
      .store
      .get_products(best.keys().copied().collect())
      .await
      .map_err(Error::store)?;
    products.sort_by(|x, y| {
      let (cx, ox) = best[&x.product_id];
      let (cy, oy) = best[&y.product_id];
      cy.total_cmp(&cx)
        .then(oy.cmp(&ox))
        .then(y.created_at.cmp(&x.created_at))
        .then(x.product_id.cmp(&y.product_id))
    });
    Ok(products)
  }

  /// Embedding neighbours of `seed`, preferring its text embedding. The
  /// index being unavailable only costs this source.
  async fn content_candidates(&self, seed: Uuid, k: usize) -> Vec<Product> {
    match self.try_content_candidates(seed, k).await {
      Ok(products) => products,
      Err(e) => {
        warn!(%seed, error = %e, "content candidates unavailable");
        Vec::new()
      }
    }
  }

  async fn try_content_candidates(&self, seed: Uuid, k: usize) -> Result<Vec<Product>> {
    let mut embedding = None;
    for kind in [EmbeddingKind::Text, EmbeddingKind::Image] {
      embedding = self.store.get_embedding(seed, kind).await.map_err(Error::store)?;
      if embedding.is_some() {
        break;
      }
    }
    let Some(embedding) = embedding else {
      return Ok(Vec::new());
    };

    let neighbours = self
      .store
      .nearest(embedding, k + 1)
      .await
      .map_err(Error::store)?;
    let order: Vec<Uuid> = neighbours
      .iter()
      .map(|n| n.product_id)
      .filter(|id| *id != seed)
      .collect();
    let mut by_id: HashMap<Uuid, Product> = self
      .store
      .get_products(order.clone())
      .await
      .map_err(Error::store)?
      .into_iter()
      .map(|p| (p.product_id, p))
      .collect();
    Ok(order.iter().filter_map(|id| by_id.remove(id)).collect())
  }

  /// Spread the remaining slots over the visitor's strongest categories,
  /// trending within each category first.
  async fn fill_by_affinity(&self, visitor: &Visitor, picker: &mut Picker) -> Result<()> {
    let categories = self.category_affinity(visitor).await?;
    if categories.is_empty() {
      return Ok(());
    }
    let quota = picker.remaining().div_ceil(categories.len());
    for category in categories {
      if picker.is_full() {
        break;
      }
      let trending = self.trending_products(Some(category), quota + picker.seen()).await?;
      let taken = picker.offer(trending, Algorithm::CategoryAffinity, quota);
      if taken < quota {
        let newest = self
          .store
          .products_in_category(category, quota + picker.seen())
          .await
          .map_err(Error::store)?;
        picker.offer(newest, Algorithm::CategoryAffinity, quota - taken);
      }
    }
    Ok(())
  }

  /// The visitor's top categories by weighted view and add-to-cart counts.
  async fn category_affinity(&self, visitor: &Visitor) -> Result<Vec<Uuid>> {
    let history = self
      .store
      .recent_interactions(
        visitor,
        &[EventType::View, EventType::AddToCart],
        self.config.history_events,
      )
      .await
      .map_err(Error::store)?;
    if history.is_empty() {
      return Ok(Vec::new());
    }

    // Events without a category borrow their product's.
    let unknown: Vec<Uuid> = history
      .iter()
      .filter(|e| e.category_id.is_none())
      .filter_map(|e| e.product_id)
      .collect::<HashSet<_>>()
      .into_iter()
      .collect();
    let product_categories: HashMap<Uuid, Uuid> = if unknown.is_empty() {
      HashMap::new()
    } else {
      self
        .store
        .get_products(unknown)
        .await
        .map_err(Error::store)?
        .into_iter()
        .filter_map(|p| Some((p.product_id, p.category_id?)))
        .collect()
    };

    let mut scores: HashMap<Uuid, f64> = HashMap::new();
    for event in &history {
      let category = event
        .category_id
        .or_else(|| event.product_id.and_then(|p| product_categories.get(&p).copied()));
      let Some(category) = category else { continue };
      let weight = match event.event_type() {
        EventType::AddToCart => self.config.cart_weight,
        _ => self.config.view_weight,
      };
      *scores.entry(category).or_insert(0.0) += weight;
    }

    let mut ranked: Vec<(Uuid, f64)> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    Ok(
      ranked
        .into_iter()
        .take(self.config.top_categories)
        .map(|(c, _)| c)
        .collect(),
    )
  }

  /// Products added to the cart and not removed again, by net quantity.
  async fn cart_contents(&self, visitor: &Visitor) -> Result<Vec<Uuid>> {
    let events = self
      .store
      .recent_interactions(
        visitor,
        &[EventType::AddToCart, EventType::RemoveFromCart],
        self.config.history_events,
      )
      .await
      .map_err(Error::store)?;

    let mut net: HashMap<Uuid, i64> = HashMap::new();
    for event in &events {
      let Some(product) = event.product_id else { continue };
      let delta = match event.payload {
        EventPayload::AddToCart { quantity } => i64::from(quantity),
        EventPayload::RemoveFromCart { quantity } => -i64::from(quantity),
        _ => 0,
      };
      *net.entry(product).or_insert(0) += delta;
    }
    let mut cart: Vec<Uuid> = net.into_iter().filter(|(_, n)| *n > 0).map(|(p, _)| p).collect();
    cart.sort();
    Ok(cart)
  }

  async fn pad_with_trending(&self, picker: &mut Picker) -> Result<()> {
    if picker.is_full() {
      return Ok(());
    }
    let trending = self.trending_products(None, picker.limit + picker.seen()).await?;
    picker.offer_all(trending, Algorithm::Trending);
    Ok(())
  }
}
