//! The read-only storefront catalog and order history.
//!
//! Products, categories and orders belong to the CRUD side of the shop. The
//! engine only reads them through [`Catalog`].

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product as the engine sees it. Prices are whole đồng.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub product_id:    Uuid,
  pub name:          String,
  pub name_en:       Option<String>,
  pub description:   Option<String>,
  pub price:         i64,
  pub sale_price:    Option<i64>,
  /// `None` when stock is not tracked for the product.
  pub stock:         Option<i64>,
  pub is_published:  bool,
  pub is_featured:   bool,
  pub category_id:   Option<Uuid>,
  pub category_slug: Option<String>,
  /// Delivery areas the product is offered in, e.g. `district_1`.
  pub districts:     Vec<String>,
  /// Free-form attributes such as colours and flower types.
  pub tags:          Vec<String>,
  pub created_at:    DateTime<Utc>,
}

impl Product {
  /// The price a customer pays today.
  pub fn effective_price(&self) -> i64 { self.sale_price.unwrap_or(self.price) }

  /// Untracked stock counts as available; only an explicit zero is out.
  pub fn is_in_stock(&self) -> bool { self.stock.is_none_or(|s| s > 0) }

  /// Published and not explicitly out of stock.
  pub fn is_recommendable(&self) -> bool { self.is_published && self.is_in_stock() }

  pub fn has_tag(&self, tag: &str) -> bool { self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) }

  /// Name, English name and description joined and lower-cased, for
  /// lexical matching.
  pub fn searchable_text(&self) -> String {
    let mut text = self.name.to_lowercase();
    for extra in [&self.name_en, &self.description].into_iter().flatten() {
      text.push(' ');
      text.push_str(&extra.to_lowercase());
    }
    text
  }
}

/// Hard constraints for [`Catalog::list_products`]. Only published products
/// are ever returned.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
  /// Inclusive lower bound on the effective price.
  pub price_min:     Option<i64>,
  /// Inclusive upper bound on the effective price.
  pub price_max:     Option<i64>,
  pub category_slug: Option<String>,
  pub district:      Option<String>,
  pub limit:         Option<usize>,
}

/// Read-only access to the storefront's catalog and order history.
pub trait Catalog: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the given products in any order; unknown ids are skipped.
  fn get_products(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + '_;

  /// Published products satisfying every set field of `filter`, featured
  /// first then newest first.
  fn list_products<'a>(
    &'a self,
    filter: &'a ProductFilter,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + 'a;

  /// Published products in one category, featured first then newest first.
  fn products_in_category(
    &self,
    category_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + '_;

  /// Published featured products, newest first.
  fn featured_products(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Product>, Self::Error>> + Send + '_;

  /// Names of published products that start with `prefix` (case-insensitive).
  fn product_names_with_prefix(
    &self,
    prefix: String,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  /// `(order_id, product_id)` for every line of every completed order.
  fn completed_order_items(
    &self,
  ) -> impl Future<Output = Result<Vec<(Uuid, Uuid)>, Self::Error>> + Send + '_;
}
