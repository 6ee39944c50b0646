//! Most-viewed products over the trailing window, with an in-process cache.

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

use chrono::Utc;
use parking_lot::Mutex;
use petal_core::{catalog::Product, embedding::Encoder};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::{Backend, Engine, Error, Result};

/// Response of the standalone trending endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Trending {
  pub products: Vec<Product>,
  /// The window the counts cover, e.g. `7_days`.
  pub period:   String,
}

type Key = (Option<Uuid>, usize);

pub(crate) struct TrendingCache {
  ttl:     Duration,
  entries: Mutex<HashMap<Key, (Instant, Vec<Product>)>>,
}

impl TrendingCache {
  pub(crate) fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn get(&self, key: &Key) -> Option<Vec<Product>> {
    let entries = self.entries.lock();
    let (stored, products) = entries.get(key)?;
    (stored.elapsed() < self.ttl).then(|| products.clone())
  }

  fn put(&self, key: Key, products: Vec<Product>) {
    let mut entries = self.entries.lock();
    entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
    entries.insert(key, (Instant::now(), products));
  }
}

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// The most-viewed recommendable products of the trailing window.
  pub async fn trending(&self, limit: usize) -> Result<Trending> {
    let limit = self.config.clamp_limit(limit);
    Ok(Trending {
      products: self.trending_products(None, limit).await?,
      period:   format!("{}_days", self.config.trending_window_days),
    })
  }

  /// View-ranked products, optionally within one category. Cached per
  /// `(category, limit)` for the configured TTL.
  ///
  /// Store-wide, a window without any recommendable viewed product falls
  /// back to featured products, so every caller sees the same cold-start
  /// list.
  pub(crate) async fn trending_products(
    &self,
    category_id: Option<Uuid>,
    limit: usize,
  ) -> Result<Vec<Product>> {
    let key = (category_id, limit);
    if let Some(hit) = self.trending.get(&key) {
      debug!(?category_id, limit, "trending cache hit");
      return Ok(hit);
    }

    let since = Utc::now() - self.config.trending_window();
    // Over-fetch: some of the most viewed may be unpublished or sold out.
    let counts = self
      .store
      .view_counts(since, category_id, limit * 2)
      .await
      .map_err(Error::store)?;
    let ids: Vec<Uuid> = counts.iter().map(|c| c.product_id).collect();
    let mut by_id: HashMap<Uuid, Product> = self
      .store
      .get_products(ids.clone())
      .await
      .map_err(Error::store)?
      .into_iter()
      .map(|p| (p.product_id, p))
      .collect();

    let mut products: Vec<Product> = ids
      .iter()
      .filter_map(|id| by_id.remove(id))
      .filter(Product::is_recommendable)
      .take(limit)
      .collect();
    if products.is_empty() && category_id.is_none() {
      products = self.featured(limit).await?;
    }

    self.trending.put(key, products.clone());
    Ok(products)
  }

  async fn featured(&self, limit: usize) -> Result<Vec<Product>> {
    Ok(
      self
        .store
        .featured_products(limit * 2)
        .await
        .map_err(Error::store)?
        .into_iter()
        .filter(Product::is_recommendable)
        .take(limit)
        .collect(),
    )
  }
}
