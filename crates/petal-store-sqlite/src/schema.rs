//! SQL schema for the petal SQLite store.
//!
//! Executed once at connection startup. The catalog tables mirror data owned
//! by the storefront's CRUD side; everything else belongs to the engine.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- ── Catalog mirror (read-only to the engine) ──────────────────────────────

CREATE TABLE IF NOT EXISTS categories (
    category_id TEXT PRIMARY KEY,
    slug        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS products (
    product_id   TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    name_folded  TEXT NOT NULL,        -- lower-cased name for prefix lookups
    name_en      TEXT,
    description  TEXT,
    price        INTEGER NOT NULL,     -- whole dong
    sale_price   INTEGER,
    stock        INTEGER,              -- NULL = not tracked
    is_published INTEGER NOT NULL DEFAULT 1,
    is_featured  INTEGER NOT NULL DEFAULT 0,
    category_id  TEXT REFERENCES categories(category_id),
    districts    TEXT NOT NULL DEFAULT '[]',
    tags         TEXT NOT NULL DEFAULT '[]',
    created_at   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_id   TEXT PRIMARY KEY,
    status     TEXT NOT NULL,          -- only 'completed' feeds the graph
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS order_items (
    order_id   TEXT NOT NULL REFERENCES orders(order_id),
    product_id TEXT NOT NULL,
    quantity   INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS products_category_idx ON products(category_id);
CREATE INDEX IF NOT EXISTS order_items_order_idx ON order_items(order_id);

-- ── Interaction log ───────────────────────────────────────────────────────

-- Append-only. The only DELETE ever issued is the retention prune.
CREATE TABLE IF NOT EXISTS interactions (
    event_id    TEXT PRIMARY KEY,
    user_id     TEXT,
    session_id  TEXT NOT NULL,
    product_id  TEXT,
    category_id TEXT,
    event_type  TEXT NOT NULL,         -- discriminant of EventPayload
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS interactions_session_idx ON interactions(session_id, created_at);
CREATE INDEX IF NOT EXISTS interactions_user_idx    ON interactions(user_id, created_at);
CREATE INDEX IF NOT EXISTS interactions_type_idx    ON interactions(event_type, created_at);

-- ── Relationship graph ────────────────────────────────────────────────────

-- Written only by the graph builder, through the staging table.
CREATE TABLE IF NOT EXISTS product_relationships (
    product_a_id      TEXT NOT NULL,
    product_b_id      TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    confidence_score  REAL NOT NULL,
    occurrence_count  INTEGER NOT NULL,
    updated_at        TEXT NOT NULL,
    PRIMARY KEY (product_a_id, product_b_id, relationship_type),
    CHECK (product_a_id < product_b_id),
    CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0)
);

CREATE TABLE IF NOT EXISTS product_relationships_staging (
    product_a_id      TEXT NOT NULL,
    product_b_id      TEXT NOT NULL,
    relationship_type TEXT NOT NULL,
    confidence_score  REAL NOT NULL,
    occurrence_count  INTEGER NOT NULL,
    updated_at        TEXT NOT NULL,
    PRIMARY KEY (product_a_id, product_b_id, relationship_type),
    CHECK (product_a_id < product_b_id),
    CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0)
);

CREATE INDEX IF NOT EXISTS product_relationships_b_idx ON product_relationships(product_b_id);

CREATE TABLE IF NOT EXISTS graph_builds (
    build_id       TEXT PRIMARY KEY,
    started_at     TEXT NOT NULL,
    finished_at    TEXT NOT NULL,
    status         TEXT NOT NULL,      -- 'succeeded' | 'failed'
    edge_count     INTEGER NOT NULL,
    total_orders   INTEGER NOT NULL,
    total_sessions INTEGER NOT NULL,
    error          TEXT
);

-- ── Feedback ──────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS recommendation_impressions (
    impression_id        TEXT PRIMARY KEY,
    user_id              TEXT,
    session_id           TEXT NOT NULL,
    recommended_products TEXT NOT NULL, -- JSON array, display order
    context              TEXT NOT NULL,
    algorithm            TEXT NOT NULL,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS recommendation_clicks (
    click_id             TEXT PRIMARY KEY,
    impression_id        TEXT,
    user_id              TEXT,
    session_id           TEXT NOT NULL,
    recommended_products TEXT NOT NULL,
    clicked_product_id   TEXT NOT NULL,
    context              TEXT NOT NULL,
    algorithm            TEXT NOT NULL,
    position             INTEGER NOT NULL,
    created_at           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS search_queries (
    search_id          TEXT PRIMARY KEY,
    user_id            TEXT,
    session_id         TEXT NOT NULL,
    query_text         TEXT NOT NULL,
    query_folded       TEXT NOT NULL,   -- lower-cased, for suggestions
    parsed_intent      TEXT NOT NULL,   -- JSON
    results_count      INTEGER NOT NULL,
    clicked_product_id TEXT,
    clicked_position   INTEGER,
    created_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS search_queries_folded_idx ON search_queries(query_folded);

-- ── Embeddings ────────────────────────────────────────────────────────────

CREATE TABLE IF NOT EXISTS product_embeddings (
    product_id TEXT NOT NULL,
    kind       TEXT NOT NULL,           -- 'text' | 'image'
    dim        INTEGER NOT NULL,
    vector     BLOB NOT NULL,           -- little-endian f32
    updated_at TEXT NOT NULL,
    PRIMARY KEY (product_id, kind)
);

PRAGMA user_version = 1;
";
