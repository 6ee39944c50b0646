//! [`Encoder`] implementations: an HTTP client for the external embedding
//! service, and a placeholder used when no service is configured.
//!
//! The service contract is two JSON endpoints:
//!
//! ```text
//! POST {base_url}/embed/text   {"text": "..."}          -> {"embedding": [f32, ...]}
//! POST {base_url}/embed/image  {"image": "<base64>"}    -> {"embedding": [f32, ...]}
//! ```

use std::time::Duration;

use base64::Engine as _;
use bytes::Bytes;
use petal_core::{
  Error, Result,
  embedding::{Embedding, EmbeddingKind, Encoder},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct TextRequest<'a> {
  text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
  image: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  embedding: Vec<f32>,
}

/// Calls the embedding service over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEncoder {
  client:   reqwest::Client,
  base_url: String,
}

impl HttpEncoder {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| Error::DependencyUnavailable(format!("encoder client: {e}")))?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
    })
  }

  async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, kind: EmbeddingKind) -> Result<Embedding> {
    let url = format!("{}/{path}", self.base_url);
    let unavailable = |e: reqwest::Error| Error::DependencyUnavailable(format!("encoder {path}: {e}"));
    let response = self
      .client
      .post(&url)
      .json(body)
      .send()
      .await
      .map_err(unavailable)?
      .error_for_status()
      .map_err(unavailable)?;
    let parsed: EmbeddingResponse = response.json().await.map_err(unavailable)?;
    Ok(Embedding::new(kind, parsed.embedding))
  }
}

impl Encoder for HttpEncoder {
  async fn encode_text(&self, text: String) -> Result<Embedding> {
    self
      .post("embed/text", &TextRequest { text: &text }, EmbeddingKind::Text)
      .await
  }

  async fn encode_image(&self, image: Bytes) -> Result<Embedding> {
    let body = ImageRequest {
      image: base64::engine::general_purpose::STANDARD.encode(&image),
    };
    self.post("embed/image", &body, EmbeddingKind::Image).await
  }
}

/// Stands in when no encoder is configured. Every call reports the
/// dependency as unavailable, so search degrades to lexical ranking and
/// visual search fails cleanly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEncoder;

impl Encoder for NoEncoder {
  async fn encode_text(&self, _text: String) -> Result<Embedding> {
    Err(Error::DependencyUnavailable("no encoder configured".into()))
  }

  async fn encode_image(&self, _image: Bytes) -> Result<Embedding> {
    Err(Error::DependencyUnavailable("no encoder configured".into()))
  }
}
