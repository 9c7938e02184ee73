//! Database schema and migrations for InsightVault.
//!
//! Migrations are applied in order; `schema_version` records which have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: feed sources and ingested items
    r#"
CREATE TABLE feed_sources (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT NOT NULL,
    slug            TEXT NOT NULL UNIQUE,
    api_type        TEXT NOT NULL DEFAULT 'rss'
                    CHECK (api_type IN ('rss', 'rest', 'youtube', 'twitter')),
    endpoint        TEXT NOT NULL,
    enabled         INTEGER NOT NULL DEFAULT 1,
    last_fetched    TEXT,
    config          TEXT NOT NULL DEFAULT '{}',  -- JSON object: auth, parsing hints, rate limits
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX idx_feed_sources_enabled ON feed_sources(enabled);

CREATE TABLE feed_items (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id       INTEGER NOT NULL REFERENCES feed_sources(id) ON DELETE CASCADE,
    external_id     TEXT NOT NULL,
    title           TEXT NOT NULL DEFAULT '',
    summary         TEXT NOT NULL DEFAULT '',
    content         TEXT NOT NULL DEFAULT '',
    url             TEXT NOT NULL DEFAULT '',
    author          TEXT NOT NULL DEFAULT '',
    published_at    TEXT,
    fetched_at      TEXT NOT NULL,
    image_url       TEXT,
    video_url       TEXT,
    content_hash    TEXT NOT NULL,
    raw             TEXT,
    is_active       INTEGER NOT NULL DEFAULT 1,
    UNIQUE (source_id, external_id)
);

CREATE INDEX idx_feed_items_source ON feed_items(source_id);
CREATE INDEX idx_feed_items_published ON feed_items(published_at DESC, fetched_at DESC);
"#,
    // v2: fetch interval hint and conditional request validators
    r#"
ALTER TABLE feed_sources ADD COLUMN fetch_interval INTEGER;
ALTER TABLE feed_sources ADD COLUMN etag TEXT;
ALTER TABLE feed_sources ADD COLUMN last_modified TEXT;

CREATE INDEX idx_feed_items_content_hash ON feed_items(source_id, content_hash);
"#,
];
