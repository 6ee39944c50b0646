//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use petal_core::{
  catalog::{Catalog, Product, ProductFilter},
  embedding::{Dimensions, Embedding, EmbeddingKind},
  event::{EventPayload, EventType, NewInteraction, Visitor},
  feedback::{Algorithm, Context, RecommendationImpression, SearchQuery},
  graph::{GraphBuild, RelationshipEdge, RelationshipType},
  intent::{Occasion, SearchIntent},
  store::{BuildStatus, EngineStore, GraphBuildRun},
};
use uuid::Uuid;

use crate::{CategoryRecord, OrderRecord, SqliteStore};

fn dims() -> Dimensions { Dimensions { text: 3, image: 3 } }

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory(dims())
    .await
    .expect("in-memory store")
}

fn product(name: &str, price: i64) -> Product {
  Product {
    product_id:    Uuid::new_v4(),
    name:          name.into(),
    name_en:       None,
    description:   None,
    price,
    sale_price:    None,
    stock:         None,
    is_published:  true,
    is_featured:   false,
    category_id:   None,
    category_slug: None,
    districts:     vec![],
    tags:          vec![],
    created_at:    Utc::now(),
  }
}

async fn view(s: &SqliteStore, session: &str, product_id: Uuid, ago: Duration) {
  let event = NewInteraction::new(session, EventType::View)
    .with_product(product_id)
    .into_event(Utc::now() - ago)
    .unwrap();
  s.append_interaction(event).await.unwrap();
}

// ─── Interaction log ─────────────────────────────────────────────────────────

#[tokio::test]
async fn recent_interactions_newest_first_and_filtered() {
  let s = store().await;
  let p1 = Uuid::new_v4();
  let p2 = Uuid::new_v4();
  view(&s, "sess-a", p1, Duration::minutes(10)).await;
  view(&s, "sess-a", p2, Duration::minutes(1)).await;
  view(&s, "sess-b", p1, Duration::minutes(1)).await;
  let cart = NewInteraction::new("sess-a", EventType::AddToCart)
    .with_product(p1)
    .into_event(Utc::now())
    .unwrap();
  s.append_interaction(cart).await.unwrap();

  let visitor = Visitor {
    session_id: "sess-a".into(),
    user_id:    None,
  };
  let views = s
    .recent_interactions(&visitor, &[EventType::View], 10)
    .await
    .unwrap();
  assert_eq!(views.len(), 2);
  assert_eq!(views[0].product_id, Some(p2));
  assert_eq!(views[1].product_id, Some(p1));

  let both = s
    .recent_interactions(&visitor, &[EventType::View, EventType::AddToCart], 10)
    .await
    .unwrap();
  assert_eq!(both.len(), 3);
  assert_eq!(both[0].payload, EventPayload::AddToCart { quantity: 1 });
}

#[tokio::test]
async fn signed_in_visitor_reads_by_user() {
  let s = store().await;
  let p = Uuid::new_v4();
  let event = NewInteraction::new("old-session", EventType::View)
    .with_product(p)
    .with_user("user-1")
    .into_event(Utc::now())
    .unwrap();
  s.append_interaction(event).await.unwrap();

  let visitor = Visitor {
    session_id: "new-session".into(),
    user_id:    Some("user-1".into()),
  };
  let events = s
    .recent_interactions(&visitor, &[EventType::View], 10)
    .await
    .unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].user_id.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn signed_in_visitor_keeps_anonymous_session_history() {
  let s = store().await;
  let before_login = Uuid::new_v4();
  let other_device = Uuid::new_v4();
  view(&s, "sess-1", before_login, Duration::minutes(5)).await;
  let event = NewInteraction::new("sess-2", EventType::View)
    .with_product(other_device)
    .with_user("user-1")
    .into_event(Utc::now() - Duration::minutes(1))
    .unwrap();
  s.append_interaction(event).await.unwrap();
  view(&s, "sess-3", Uuid::new_v4(), Duration::minutes(1)).await;

  let visitor = Visitor {
    session_id: "sess-1".into(),
    user_id:    Some("user-1".into()),
  };
  let events = s
    .recent_interactions(&visitor, &[EventType::View], 10)
    .await
    .unwrap();
  let seen: Vec<_> = events.iter().filter_map(|e| e.product_id).collect();
  assert_eq!(seen, vec![other_device, before_login]);
}

#[tokio::test]
async fn view_counts_respect_window_and_order() {
  let s = store().await;
  let hot = Uuid::new_v4();
  let warm = Uuid::new_v4();
  let stale = Uuid::new_v4();
  for i in 0..3 {
    view(&s, &format!("s{i}"), hot, Duration::hours(1)).await;
  }
  view(&s, "s9", warm, Duration::hours(2)).await;
  for i in 0..5 {
    view(&s, &format!("old{i}"), stale, Duration::days(30)).await;
  }

  let counts = s
    .view_counts(Utc::now() - Duration::days(7), None, 10)
    .await
    .unwrap();
  assert_eq!(counts.len(), 2);
  assert_eq!(counts[0].product_id, hot);
  assert_eq!(counts[0].view_count, 3);
  assert_eq!(counts[1].product_id, warm);

  let capped = s
    .view_counts(Utc::now() - Duration::days(7), None, 1)
    .await
    .unwrap();
  assert_eq!(capped.len(), 1);
}

#[tokio::test]
async fn view_counts_by_category() {
  let s = store().await;
  let category = CategoryRecord {
    category_id: Uuid::new_v4(),
    slug:        "sinh-nhat".into(),
    name:        "Sinh nhật".into(),
  };
  s.put_category(category.clone()).await.unwrap();
  let mut inside = product("Hoa sinh nhật", 300_000);
  inside.category_id = Some(category.category_id);
  let outside = product("Hoa khác", 300_000);
  s.put_product(&inside).await.unwrap();
  s.put_product(&outside).await.unwrap();
  view(&s, "a", inside.product_id, Duration::hours(1)).await;
  view(&s, "a", outside.product_id, Duration::hours(1)).await;
  view(&s, "b", outside.product_id, Duration::hours(1)).await;

  let counts = s
    .view_counts(Utc::now() - Duration::days(7), Some(category.category_id), 10)
    .await
    .unwrap();
  assert_eq!(counts.len(), 1);
  assert_eq!(counts[0].product_id, inside.product_id);
}

#[tokio::test]
async fn prune_removes_only_old_rows() {
  let s = store().await;
  let p = Uuid::new_v4();
  view(&s, "a", p, Duration::days(100)).await;
  view(&s, "a", p, Duration::days(1)).await;
  let removed = s
    .prune_interactions(Utc::now() - Duration::days(90))
    .await
    .unwrap();
  assert_eq!(removed, 1);
  assert_eq!(s.session_views().await.unwrap().len(), 1);
}

// ─── Graph ───────────────────────────────────────────────────────────────────

fn edge(a: Uuid, b: Uuid, confidence: f64, occurrences: u64) -> RelationshipEdge {
  let (a, b) = if a < b { (a, b) } else { (b, a) };
  RelationshipEdge {
    product_a_id:      a,
    product_b_id:      b,
    relationship_type: RelationshipType::FrequentlyBoughtTogether,
    confidence_score:  confidence,
    occurrence_count:  occurrences,
    updated_at:        Utc::now(),
  }
}

#[tokio::test]
async fn replace_graph_drops_stale_edges() {
  let s = store().await;
  let x = Uuid::new_v4();
  let y = Uuid::new_v4();
  let z = Uuid::new_v4();

  let first = GraphBuild {
    edges:          vec![edge(x, y, 0.5, 5), edge(x, z, 0.3, 3)],
    total_orders:   10,
    total_sessions: 0,
  };
  assert_eq!(s.replace_graph(first).await.unwrap(), 2);

  let second = GraphBuild {
    edges:          vec![edge(x, y, 0.6, 6)],
    total_orders:   10,
    total_sessions: 0,
  };
  assert_eq!(s.replace_graph(second).await.unwrap(), 1);

  let edges = s.all_edges().await.unwrap();
  assert_eq!(edges.len(), 1);
  assert_eq!(edges[0].occurrence_count, 6);
  assert!(edges[0].product_a_id < edges[0].product_b_id);
}

#[tokio::test]
async fn edges_for_orders_by_confidence_then_count() {
  let s = store().await;
  let seed = Uuid::new_v4();
  let weak = Uuid::new_v4();
  let strong = Uuid::new_v4();
  let tied = Uuid::new_v4();
  let build = GraphBuild {
    edges:          vec![
      edge(seed, weak, 0.1, 3),
      edge(seed, strong, 0.4, 4),
      edge(seed, tied, 0.4, 9),
      edge(weak, strong, 0.9, 9),
    ],
    total_orders:   20,
    total_sessions: 0,
  };
  s.replace_graph(build).await.unwrap();

  let edges = s.edges_for(seed, 10).await.unwrap();
  let others: Vec<Uuid> = edges.iter().filter_map(|e| e.other(seed)).collect();
  assert_eq!(others, vec![tied, strong, weak]);
}

#[tokio::test]
async fn build_runs_are_recorded() {
  let s = store().await;
  assert!(s.last_build().await.unwrap().is_none());
  let now = Utc::now();
  for (offset, status) in [(2, BuildStatus::Succeeded), (1, BuildStatus::Failed)] {
    s.record_build(GraphBuildRun {
      build_id:       Uuid::new_v4(),
      started_at:     now - Duration::minutes(offset),
      finished_at:    now - Duration::minutes(offset) + Duration::seconds(5),
      status,
      edge_count:     0,
      total_orders:   0,
      total_sessions: 0,
      error:          (status == BuildStatus::Failed).then(|| "boom".into()),
    })
    .await
    .unwrap();
  }
  let last = s.last_build().await.unwrap().unwrap();
  assert_eq!(last.status, BuildStatus::Failed);
  assert_eq!(last.error.as_deref(), Some("boom"));
}

// ─── Feedback ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn impression_round_trip_keeps_order() {
  let s = store().await;
  let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
  let impression = RecommendationImpression {
    impression_id:        Uuid::new_v4(),
    user_id:              None,
    session_id:           "sess".into(),
    recommended_products: ids.clone(),
    context:              Context::Pdp,
    algorithm:            Algorithm::Hybrid,
    created_at:           Utc::now(),
  };
  s.append_impression(impression.clone()).await.unwrap();

  let stored = s.get_impression(impression.impression_id).await.unwrap().unwrap();
  assert_eq!(stored.recommended_products, ids);
  assert_eq!(stored.context, Context::Pdp);
  assert_eq!(stored.algorithm, Algorithm::Hybrid);
  assert!(s.get_impression(Uuid::new_v4()).await.unwrap().is_none());
}

fn search_row(text: &str, results: usize, ago: Duration) -> SearchQuery {
  SearchQuery {
    search_id:          Uuid::new_v4(),
    user_id:            None,
    session_id:         "sess".into(),
    query_text:         text.into(),
    parsed_intent:      SearchIntent {
      occasion: Some(Occasion::Birthday),
      ..Default::default()
    },
    results_count:      results,
    clicked_product_id: None,
    clicked_position:   None,
    created_at:         Utc::now() - ago,
  }
}

#[tokio::test]
async fn search_click_is_reported_once() {
  let s = store().await;
  let row = search_row("hoa sinh nhật", 4, Duration::zero());
  s.append_search(row.clone()).await.unwrap();

  let clicked = Uuid::new_v4();
  assert!(s.report_search_click(row.search_id, clicked, 2).await.unwrap());
  assert!(!s.report_search_click(row.search_id, Uuid::new_v4(), 0).await.unwrap());
  assert!(!s.report_search_click(Uuid::new_v4(), clicked, 0).await.unwrap());

  let stored = s.get_search(row.search_id).await.unwrap().unwrap();
  assert_eq!(stored.clicked_product_id, Some(clicked));
  assert_eq!(stored.clicked_position, Some(2));
  assert_eq!(stored.results_count, 4);
  assert_eq!(stored.parsed_intent.occasion, Some(Occasion::Birthday));
}

#[tokio::test]
async fn query_history_prefix_is_case_insensitive() {
  let s = store().await;
  s.append_search(search_row("Hoa Hồng đỏ", 3, Duration::days(2)))
    .await
    .unwrap();
  s.append_search(search_row("hoa hồng trắng", 1, Duration::days(1)))
    .await
    .unwrap();
  s.append_search(search_row("tulip", 2, Duration::zero()))
    .await
    .unwrap();

  let history = s
    .query_history_with_prefix("HOA HỒNG".into(), 10)
    .await
    .unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[0].query_text, "hoa hồng trắng");
  assert_eq!(history[1].query_text, "Hoa Hồng đỏ");
}

// ─── Embeddings ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn embeddings_are_stored_and_searchable() {
  let s = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  s.put_embedding(a, Embedding::Image(vec![1.0, 0.0, 0.0]))
    .await
    .unwrap();
  s.put_embedding(b, Embedding::Image(vec![0.0, 1.0, 0.0]))
    .await
    .unwrap();
  s.put_embedding(a, Embedding::Text(vec![0.0, 0.0, 1.0]))
    .await
    .unwrap();

  let hits = s
    .nearest(Embedding::Image(vec![0.9, 0.1, 0.0]), 5)
    .await
    .unwrap();
  assert_eq!(hits.len(), 2);
  assert_eq!(hits[0].product_id, a);

  let stored = s.get_embedding(a, EmbeddingKind::Text).await.unwrap();
  assert_eq!(stored, Some(Embedding::Text(vec![0.0, 0.0, 1.0])));
  assert!(s.get_embedding(b, EmbeddingKind::Text).await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_dimension_is_rejected_before_write() {
  let s = store().await;
  let id = Uuid::new_v4();
  assert!(
    s.put_embedding(id, Embedding::Text(vec![1.0, 0.0]))
      .await
      .is_err()
  );
  assert!(s.get_embedding(id, EmbeddingKind::Text).await.unwrap().is_none());
}

#[tokio::test]
async fn index_is_reloaded_on_open() {
  let path = std::env::temp_dir().join(format!("petal-{}.db", Uuid::new_v4()));
  let id = Uuid::new_v4();
  {
    let s = SqliteStore::open(&path, dims()).await.unwrap();
    s.put_embedding(id, Embedding::Text(vec![0.0, 1.0, 0.0]))
      .await
      .unwrap();
  }
  let reopened = SqliteStore::open(&path, dims()).await.unwrap();
  let hits = reopened
    .nearest(Embedding::Text(vec![0.0, 1.0, 0.0]), 1)
    .await
    .unwrap();
  assert_eq!(hits.len(), 1);
  assert_eq!(hits[0].product_id, id);
  drop(reopened);
  let _ = std::fs::remove_file(&path);
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_products_applies_hard_filters() {
  let s = store().await;
  let birthday = CategoryRecord {
    category_id: Uuid::new_v4(),
    slug:        "sinh-nhat".into(),
    name:        "Sinh nhật".into(),
  };
  s.put_category(birthday.clone()).await.unwrap();

  let mut cheap = product("Giỏ hoa sinh nhật", 250_000);
  cheap.category_id = Some(birthday.category_id);
  cheap.districts = vec!["district_1".into()];
  let mut pricey = product("Lẵng hoa sinh nhật", 900_000);
  pricey.category_id = Some(birthday.category_id);
  pricey.districts = vec!["district_1".into()];
  let mut on_sale = product("Bó hoa sale", 800_000);
  on_sale.sale_price = Some(400_000);
  on_sale.category_id = Some(birthday.category_id);
  on_sale.districts = vec!["district_3".into()];
  let mut hidden = product("Bó hoa ẩn", 200_000);
  hidden.is_published = false;
  hidden.category_id = Some(birthday.category_id);
  for p in [&cheap, &pricey, &on_sale, &hidden] {
    s.put_product(p).await.unwrap();
  }

  let filter = ProductFilter {
    price_max: Some(500_000),
    category_slug: Some("sinh-nhat".into()),
    ..Default::default()
  };
  let mut found: Vec<Uuid> = s
    .list_products(&filter)
    .await
    .unwrap()
    .into_iter()
    .map(|p| p.product_id)
    .collect();
  found.sort();
  let mut expected = vec![cheap.product_id, on_sale.product_id];
  expected.sort();
  assert_eq!(found, expected);

  let filter = ProductFilter {
    district: Some("district_1".into()),
    ..Default::default()
  };
  let found = s.list_products(&filter).await.unwrap();
  assert_eq!(found.len(), 2);
  assert!(
    found
      .iter()
      .all(|p| p.category_slug.as_deref() == Some("sinh-nhat"))
  );
}

#[tokio::test]
async fn featured_and_prefix_lookups() {
  let s = store().await;
  let mut star = product("Hoa Hồng Ecuador", 1_500_000);
  star.is_featured = true;
  let plain = product("Hoa hồng Đà Lạt", 400_000);
  let mut hidden = product("Hoa hồng ẩn", 400_000);
  hidden.is_published = false;
  for p in [&star, &plain, &hidden] {
    s.put_product(p).await.unwrap();
  }

  let featured = s.featured_products(10).await.unwrap();
  assert_eq!(featured.len(), 1);
  assert_eq!(featured[0].product_id, star.product_id);

  let names = s
    .product_names_with_prefix("hoa hồng".into(), 10)
    .await
    .unwrap();
  assert_eq!(names, vec!["Hoa Hồng Ecuador", "Hoa hồng Đà Lạt"]);

  let fetched = s
    .get_products(vec![plain.product_id, Uuid::new_v4()])
    .await
    .unwrap();
  assert_eq!(fetched.len(), 1);
  assert_eq!(fetched[0].name, "Hoa hồng Đà Lạt");
}

#[tokio::test]
async fn only_completed_orders_feed_the_graph() {
  let s = store().await;
  let a = Uuid::new_v4();
  let b = Uuid::new_v4();
  s.put_order(OrderRecord {
    order_id:    Uuid::new_v4(),
    status:      "completed".into(),
    created_at:  Utc::now(),
    product_ids: vec![a, b],
  })
  .await
  .unwrap();
  s.put_order(OrderRecord {
    order_id:    Uuid::new_v4(),
    status:      "cancelled".into(),
    created_at:  Utc::now(),
    product_ids: vec![a, b],
  })
  .await
  .unwrap();

  let items = s.completed_order_items().await.unwrap();
  assert_eq!(items.len(), 2);
}
