//! Image-in, similar-products-out search, and product indexing.
//!
//! Image encoding is the one expensive call on the request path. It runs
//! under a semaphore with a queue timeout and an encode timeout, so a slow
//! encoder turns into errors rather than an unbounded backlog.

use std::collections::HashMap;

use bytes::Bytes;
use petal_core::{
  catalog::Product,
  embedding::{Embedding, EmbeddingKind, Encoder},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{Backend, Engine, Error, Result};

/// An uploaded image and how to filter matches.
#[derive(Debug, Clone)]
pub struct VisualQuery {
  pub image:          Bytes,
  /// The declared media type, when the client sent one.
  pub content_type:   Option<String>,
  pub limit:          usize,
  /// Matches must be strictly more similar than this.
  pub min_similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualMatch {
  #[serde(flatten)]
  pub product:    Product,
  pub similarity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VisualResults {
  pub results: Vec<VisualMatch>,
  pub count:   usize,
}

/// Formats recognised by their leading bytes.
fn sniff(image: &[u8]) -> Option<&'static str> {
  match image {
    [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
    [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some("image/png"),
    [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
    [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
    _ => None,
  }
}

impl<S: Backend, E: Encoder + 'static> Engine<S, E> {
  /// Reject anything that is not a reasonably sized image, before any
  /// expensive work.
  pub fn validate_image(&self, image: &[u8], content_type: Option<&str>) -> Result<()> {
    if image.is_empty() {
      return Err(Error::Validation("image is empty".into()));
    }
    if image.len() > self.config.max_image_bytes {
      return Err(Error::PayloadTooLarge {
        size: image.len(),
        max:  self.config.max_image_bytes,
      });
    }
    if let Some(declared) = content_type
      && !declared.trim().to_ascii_lowercase().starts_with("image/")
    {
      return Err(Error::UnsupportedMedia(declared.to_owned()));
    }
    if sniff(image).is_none() {
      return Err(Error::UnsupportedMedia("unrecognised image format".into()));
    }
    Ok(())
  }

  /// Products whose image embedding is more similar than
  /// `min_similarity` to the uploaded image, most similar first.
  ///
  /// The neighbour count fetched from the index does not depend on the
  /// threshold, so raising it can only remove matches.
  pub async fn visual_search(&self, query: VisualQuery) -> Result<VisualResults> {
    self.validate_image(&query.image, query.content_type.as_deref())?;
    if !query.min_similarity.is_finite() || !(0.0..=1.0).contains(&query.min_similarity) {
      return Err(Error::Validation(format!(
        "min_similarity must be within [0, 1], got {}",
        query.min_similarity
      )));
    }
    let limit = self.config.clamp_limit(query.limit);

    let embedding = self.encode_image_bounded(query.image).await?;
    let neighbours = self
      .store
      .nearest(embedding, self.config.visual_candidates.max(self.config.max_limit))
      .await
      .map_err(Error::store)?;
    let similarity: HashMap<Uuid, f32> = neighbours
      .into_iter()
      .filter(|n| n.similarity > query.min_similarity)
      .map(|n| (n.product_id, n.similarity))
      .collect();
    if similarity.is_empty() {
      return Ok(VisualResults { results: Vec::new(), count: 0 });
    }

    let mut results: Vec<VisualMatch> = self
      .store
      .get_products(similarity.keys().copied().collect())
      .await
      .map_err(Error::store)?
      .into_iter()
      .filter(|p| p.is_published)
      .filter_map(|product| {
        let similarity = *similarity.get(&product.product_id)?;
        Some(VisualMatch { product, similarity })
      })
      .collect();
    results.sort_by(|a, b| {
      b.similarity
        .total_cmp(&a.similarity)
        .then(a.product.product_id.cmp(&b.product.product_id))
    });
    results.truncate(limit);

    Ok(VisualResults {
      count: results.len(),
      results,
    })
  }

  /// Encode an image while holding a visual-search slot.
  async fn encode_image_bounded(&self, image: Bytes) -> Result<Embedding> {
    let _permit = tokio::time::timeout(
      self.config.visual_queue_timeout(),
      self.visual_permits.clone().acquire_owned(),
    )
    .await
    .map_err(|_| Error::Busy)?
    .map_err(|_| Error::Unavailable("visual search is shutting down".into()))?;

    let embedding = tokio::time::timeout(self.config.encode_timeout(), self.encoder.encode_image(image))
      .await
      .map_err(|_| Error::Timeout("image encoding".into()))??;
    self.check_encoded(&embedding, EmbeddingKind::Image)?;
    Ok(embedding)
  }

  // ── Indexing ──────────────────────────────────────────────────────────

  /// Encode the product's name and description and store the result as
  /// its text embedding.
  pub async fn index_product_text(&self, product_id: Uuid) -> Result<()> {
    let product = self.product(product_id).await?;
    let embedding = tokio::time::timeout(
      self.config.encode_timeout(),
      self.encoder.encode_text(product.searchable_text()),
    )
    .await
    .map_err(|_| Error::Timeout("text encoding".into()))??;
    self.check_encoded(&embedding, EmbeddingKind::Text)?;
    self
      .store
      .put_embedding(product_id, embedding)
      .await
      .map_err(Error::store)
  }

  /// Encode an uploaded product photo and store it as the product's image
  /// embedding.
  pub async fn index_product_image(
    &self,
    product_id: Uuid,
    image: Bytes,
    content_type: Option<&str>,
  ) -> Result<()> {
    self.validate_image(&image, content_type)?;
    self.product(product_id).await?;
    let embedding = self.encode_image_bounded(image).await?;
    self
      .store
      .put_embedding(product_id, embedding)
      .await
      .map_err(Error::store)
  }

  async fn product(&self, product_id: Uuid) -> Result<Product> {
    self
      .store
      .get_products(vec![product_id])
      .await
      .map_err(Error::store)?
      .into_iter()
      .next()
      .ok_or_else(|| Error::NotFound(format!("product {product_id}")))
  }
}
