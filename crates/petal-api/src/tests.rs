//! Router tests against an in-memory store, driven through `oneshot`.

use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use bytes::Bytes;
use chrono::Utc;
use petal_core::{
  catalog::Product,
  embedding::{Embedding, Encoder},
  event::{EventType, Visitor},
  store::EngineStore,
};
use petal_engine::{Engine, EngineConfig, NoEncoder};
use petal_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;

use crate::api_router;

// ─── Fixtures ────────────────────────────────────────────────────────────────

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n";
const BOUNDARY: &str = "petal-test-boundary";

/// Every image encodes to the same direction; text is unsupported.
#[derive(Debug, Clone, Copy)]
struct FlatImageEncoder;

impl Encoder for FlatImageEncoder {
  async fn encode_text(&self, _text: String) -> petal_core::Result<Embedding> {
    Err(petal_core::Error::DependencyUnavailable("no text model".into()))
  }

  async fn encode_image(&self, _image: Bytes) -> petal_core::Result<Embedding> {
    Ok(Embedding::Image(vec![1.0, 0.0, 0.0]))
  }
}

fn config() -> EngineConfig {
  EngineConfig {
    text_dim: 4,
    image_dim: 3,
    trending_cache_ttl_secs: 0,
    max_image_bytes: 1024,
    ..Default::default()
  }
}

async fn setup_with<E: Encoder + 'static>(encoder: E) -> (Arc<Engine<SqliteStore, E>>, Router) {
  let config = config();
  let store = Arc::new(SqliteStore::open_in_memory(config.dimensions()).await.unwrap());
  let engine = Arc::new(Engine::new(store, encoder, config));
  let app = api_router(engine.clone());
  (engine, app)
}

async fn setup() -> (Arc<Engine<SqliteStore, NoEncoder>>, Router) { setup_with(NoEncoder).await }

fn product(name: &str, price: i64) -> Product {
  Product {
    product_id:    Uuid::new_v4(),
    name:          name.into(),
    name_en:       None,
    description:   None,
    price,
    sale_price:    None,
    stock:         Some(5),
    is_published:  true,
    is_featured:   false,
    category_id:   None,
    category_slug: None,
    districts:     vec![],
    tags:          vec![],
    created_at:    Utc::now(),
  }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn get(uri: &str) -> Request<Body> { Request::builder().uri(uri).body(Body::empty()).unwrap() }

fn multipart(image: &[u8], image_type: &str, fields: &[(&str, &str)]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(
    format!(
      "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"upload\"\r\nContent-Type: {image_type}\r\n\r\n"
    )
    .as_bytes(),
  );
  body.extend_from_slice(image);
  body.extend_from_slice(b"\r\n");
  for (name, value) in fields {
    body.extend_from_slice(
      format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
    );
  }
  body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

  Request::builder()
    .method("POST")
    .uri("/visual-search")
    .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
    .body(Body::from(body))
    .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let body = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, body)
}

async fn view(app: &Router, session: &str, product_id: Uuid) {
  let (status, _) = send(
    app,
    post_json(
      "/track",
      json!({ "session_id": session, "event_type": "view", "product_id": product_id }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
}

// ─── Recommendations ─────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_context_is_bad_request() {
  let (_engine, app) = setup().await;
  let (status, body) = send(
    &app,
    post_json("/recommendations", json!({ "context": "checkout", "session_id": "s1" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn pdp_without_product_is_bad_request() {
  let (_engine, app) = setup().await;
  let (status, _) = send(
    &app,
    post_json("/recommendations", json!({ "context": "pdp", "session_id": "s1" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn homepage_cold_start_returns_trending_products() {
  let (engine, app) = setup().await;
  let rose = product("Bó hoa hồng", 450_000);
  engine.store().put_product(&rose).await.unwrap();
  view(&app, "someone-else", rose.product_id).await;
  engine.flush().await;

  let (status, body) = send(
    &app,
    post_json("/recommendations", json!({ "context": "homepage", "session_id": "s1", "limit": 4 })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["algorithm"], "trending");
  assert_eq!(body["recommendations"][0]["product_id"], rose.product_id.to_string());
  assert!(body["impression_id"].is_string());
}

#[tokio::test]
async fn trending_reports_its_window() {
  let (_engine, app) = setup().await;
  let (status, body) = send(&app, get("/recommendations/trending?limit=5")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["period"], "7_days");
  assert_eq!(body["products"], json!([]));
}

#[tokio::test]
async fn related_for_an_isolated_product_falls_back_to_trending() {
  let (engine, app) = setup().await;
  let seed = product("Giỏ hoa lan", 900_000);
  let other = product("Hoa cúc", 200_000);
  engine.store().put_product(&seed).await.unwrap();
  engine.store().put_product(&other).await.unwrap();
  view(&app, "a", seed.product_id).await;
  view(&app, "a", other.product_id).await;
  engine.flush().await;

  let (status, body) = send(&app, get(&format!("/recommendations/related/{}", seed.product_id))).await;
  assert_eq!(status, StatusCode::OK);
  let related: Vec<&str> = body["related_products"]
    .as_array()
    .unwrap()
    .iter()
    .filter_map(|p| p["product_id"].as_str())
    .collect();
  assert_eq!(related, vec![other.product_id.to_string()]);
}

#[tokio::test]
async fn click_outside_the_shown_list_is_rejected() {
  let (_engine, app) = setup().await;
  let shown = Uuid::new_v4();
  let (status, _) = send(
    &app,
    post_json(
      "/recommendations/track-click",
      json!({
        "session_id": "s1",
        "recommended_products": [shown],
        "clicked_product_id": Uuid::new_v4(),
        "context": "homepage",
        "algorithm": "trending",
        "position": 0,
      }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, body) = send(
    &app,
    post_json(
      "/recommendations/track-click",
      json!({
        "session_id": "s1",
        "recommended_products": [shown],
        "clicked_product_id": shown,
        "context": "homepage",
        "algorithm": "trending",
        "position": 0,
      }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);
}

// ─── Search ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn search_applies_the_parsed_price_ceiling() {
  let (engine, app) = setup().await;
  let cheap = product("Hoa hồng đỏ", 400_000);
  let dear = product("Hoa hồng đỏ cao cấp", 900_000);
  engine.store().put_product(&cheap).await.unwrap();
  engine.store().put_product(&dear).await.unwrap();

  let (status, body) = send(
    &app,
    post_json("/search", json!({ "query": "hoa hồng đỏ dưới 500k", "session_id": "s1" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["intent"]["price_max"], 500_000);
  assert_eq!(body["count"], 1);
  assert_eq!(body["results"][0]["product_id"], cheap.product_id.to_string());
}

#[tokio::test]
async fn search_without_session_is_bad_request() {
  let (_engine, app) = setup().await;
  let (status, _) = send(&app, post_json("/search", json!({ "query": "hoa", "session_id": " " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
  let (_engine, app) = setup().await;
  let req = Request::builder()
    .method("POST")
    .uri("/search")
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from("{not json"))
    .unwrap();
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn search_click_is_accepted_once() {
  let (engine, app) = setup().await;
  let rose = product("Hoa hồng", 300_000);
  engine.store().put_product(&rose).await.unwrap();

  let (_, body) = send(&app, post_json("/search", json!({ "query": "hồng", "session_id": "s1" }))).await;
  let search_id = body["search_id"].as_str().unwrap().to_owned();
  engine.flush().await;

  let click = json!({ "search_id": search_id, "product_id": rose.product_id, "position": 0 });
  let (first, _) = send(&app, post_json("/search/click", click.clone())).await;
  let (second, _) = send(&app, post_json("/search/click", click)).await;
  assert_eq!(first, StatusCode::OK);
  assert_eq!(second, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn suggestions_for_an_empty_prefix_are_empty() {
  let (_engine, app) = setup().await;
  let (status, body) = send(&app, get("/search/suggestions?q=")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["suggestions"], json!([]));
}

#[tokio::test]
async fn suggestions_include_matching_product_names() {
  let (engine, app) = setup().await;
  engine
    .store()
    .put_product(&product("Hoa hướng dương", 350_000))
    .await
    .unwrap();
  let (status, body) = send(&app, get("/search/suggestions?q=hoa%20h&limit=5")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["suggestions"], json!(["Hoa hướng dương"]));
}

// ─── Tracking ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn track_queues_a_known_event() {
  let (engine, app) = setup().await;
  let rose = product("Hoa hồng", 300_000);
  engine.store().put_product(&rose).await.unwrap();

  let (status, body) = send(
    &app,
    post_json(
      "/track",
      json!({ "session_id": "s1", "event_type": "view", "product_id": rose.product_id }),
    ),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["success"], true);

  engine.flush().await;
  let visitor = Visitor {
    session_id: "s1".into(),
    user_id:    None,
  };
  let events = engine
    .store()
    .recent_interactions(&visitor, &[EventType::View], 10)
    .await
    .unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].product_id, Some(rose.product_id));
}

#[tokio::test]
async fn track_rejects_unknown_event_types() {
  let (_engine, app) = setup().await;
  let (status, body) = send(
    &app,
    post_json("/track", json!({ "session_id": "s1", "event_type": "wishlist_add" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].as_str().unwrap().contains("wishlist_add"));
}

// ─── Visual search ───────────────────────────────────────────────────────────

#[tokio::test]
async fn visual_search_rejects_non_images() {
  let (_engine, app) = setup_with(FlatImageEncoder).await;
  let (status, _) = send(&app, multipart(b"%PDF-1.7", "application/pdf", &[])).await;
  assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn visual_search_rejects_oversized_images() {
  let (_engine, app) = setup_with(FlatImageEncoder).await;
  let image = [PNG, &[0u8; 2048]].concat();
  let (status, _) = send(&app, multipart(&image, "image/png", &[])).await;
  assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn visual_search_without_an_encoder_is_unavailable() {
  let (_engine, app) = setup().await;
  let (status, _) = send(&app, multipart(PNG, "image/png", &[])).await;
  assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn visual_search_finds_indexed_products() {
  let (engine, app) = setup_with(FlatImageEncoder).await;
  let vase = product("Bình hoa", 600_000);
  engine.store().put_product(&vase).await.unwrap();
  engine
    .store()
    .put_embedding(vase.product_id, Embedding::Image(vec![1.0, 0.0, 0.0]))
    .await
    .unwrap();

  let (status, body) = send(
    &app,
    multipart(PNG, "image/png", &[("limit", "3"), ("min_similarity", "0.5")]),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["count"], 1);
  assert_eq!(body["results"][0]["product_id"], vase.product_id.to_string());
  assert!(body["results"][0]["similarity"].as_f64().unwrap() > 0.99);
}

#[tokio::test]
async fn visual_search_rejects_a_bad_threshold() {
  let (_engine, app) = setup_with(FlatImageEncoder).await;
  let (status, _) = send(&app, multipart(PNG, "image/png", &[("min_similarity", "1.5")])).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ─── Admin ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn rebuild_graph_reports_the_run() {
  let (_engine, app) = setup().await;
  let req = Request::builder()
    .method("POST")
    .uri("/admin/rebuild-graph")
    .body(Body::empty())
    .unwrap();
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "succeeded");
  assert_eq!(body["edge_count"], 0);
}

#[tokio::test]
async fn indexing_an_unknown_product_is_not_found() {
  let (_engine, app) = setup_with(FlatImageEncoder).await;
  let req = Request::builder()
    .method("POST")
    .uri(format!("/admin/embeddings/{}/text", Uuid::new_v4()))
    .body(Body::empty())
    .unwrap();
  let (status, _) = send(&app, req).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn indexing_an_image_makes_it_searchable() {
  let (engine, app) = setup_with(FlatImageEncoder).await;
  let vase = product("Bình hoa", 600_000);
  engine.store().put_product(&vase).await.unwrap();

  let req = Request::builder()
    .method("POST")
    .uri(format!("/admin/embeddings/{}/image", vase.product_id))
    .header(header::CONTENT_TYPE, "image/png")
    .body(Body::from(PNG))
    .unwrap();
  let (status, _) = send(&app, req).await;
  assert_eq!(status, StatusCode::NO_CONTENT);

  let (_, body) = send(&app, multipart(PNG, "image/png", &[])).await;
  assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn oversized_image_index_is_a_json_error() {
  let (engine, app) = setup_with(FlatImageEncoder).await;
  let vase = product("Bình hoa", 600_000);
  engine.store().put_product(&vase).await.unwrap();

  let image = [PNG, &vec![0u8; 128 * 1024]].concat();
  let req = Request::builder()
    .method("POST")
    .uri(format!("/admin/embeddings/{}/image", vase.product_id))
    .header(header::CONTENT_TYPE, "image/png")
    .body(Body::from(image))
    .unwrap();
  let (status, body) = send(&app, req).await;
  assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
  assert!(body["error"].is_string());
}
