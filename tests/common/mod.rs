//! Test helpers for ingestion E2E tests.
//!
//! Provides a local feed server and database helpers.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use insightvault::config::{FetchConfig, IngestConfig};
use insightvault::feeds::{FetcherFactory, ItemRepository, SourceRepository};
use insightvault::{Database, IngestionService};

/// ETag served by `/cached.xml`.
pub const CACHED_ETAG: &str = "\"v1\"";

pub const RSS_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Local News</title>
    <link>http://localhost/</link>
    <description>Test feed</description>
    <item>
      <title>Launch day</title>
      <link>https://news.example/launch</link>
      <guid>news-1</guid>
      <description>&lt;p&gt;We launched.&lt;/p&gt;&lt;img src="/img/launch.jpg"&gt;</description>
      <pubDate>Mon, 06 Jan 2025 09:00:00 GMT</pubDate>
      <dc:creator>Ada</dc:creator>
    </item>
    <item>
      <title>Watch the keynote</title>
      <link>https://youtu.be/abcDEF123</link>
      <guid>news-2</guid>
      <description>Recorded live.</description>
      <pubDate>Tue, 07 Jan 2025 09:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Podcast</title>
      <link>https://news.example/podcast</link>
      <guid>news-3</guid>
      <description>Episode one.</description>
      <enclosure url="https://cdn.example/ep1.mp4" length="1000" type="video/mp4"/>
    </item>
  </channel>
</rss>"#;

pub const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Engineering Blog</title>
  <id>urn:uuid:blog</id>
  <updated>2025-02-01T00:00:00Z</updated>
  <entry>
    <title>Release notes</title>
    <id>urn:uuid:post-1</id>
    <link rel="alternate" href="https://blog.example/release"/>
    <updated>2025-02-01T12:00:00Z</updated>
    <content type="html">&lt;p&gt;All the details.&lt;/p&gt;</content>
    <author><name>Grace</name></author>
  </entry>
  <entry>
    <title>Roadmap</title>
    <id>urn:uuid:post-2</id>
    <link rel="alternate" href="https://blog.example/roadmap"/>
    <updated>2025-02-02T12:00:00Z</updated>
    <summary>What comes next.</summary>
  </entry>
</feed>"#;

pub const CACHED_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Cached</title>
    <link>http://localhost/</link>
    <description>Conditional GET</description>
    <item>
      <title>Only item</title>
      <link>https://cached.example/1</link>
      <guid>cached-1</guid>
    </item>
  </channel>
</rss>"#;

/// One item keyed only by its link, one with no identifier at all.
pub const UNKEYED_FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Unkeyed</title>
    <link>http://localhost/</link>
    <description>No guids</description>
    <item>
      <title>Linked only</title>
      <link>https://unkeyed.example/linked</link>
    </item>
    <item>
      <title>Nothing to key on</title>
      <description>Anonymous body</description>
    </item>
  </channel>
</rss>"#;

#[derive(Default)]
struct ServerState {
    cached_hits: AtomicUsize,
    not_modified: AtomicUsize,
}

/// Local HTTP server serving fixed feeds.
pub struct FeedServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl FeedServer {
    /// Start the server on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/feed.xml", get(rss_feed))
            .route("/atom.xml", get(atom_feed))
            .route("/cached.xml", get(cached_feed))
            .route("/unkeyed.xml", get(unkeyed_feed))
            .route("/moved", get(moved))
            .route("/loop", get(redirect_loop))
            .route("/broken", get(broken))
            .route("/garbage", get(garbage))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    /// Absolute URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received by `/cached.xml`.
    pub fn cached_hits(&self) -> usize {
        self.state.cached_hits.load(Ordering::SeqCst)
    }

    /// `304` responses sent by `/cached.xml`.
    pub fn not_modified_responses(&self) -> usize {
        self.state.not_modified.load(Ordering::SeqCst)
    }
}

async fn rss_feed() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/rss+xml")], RSS_FEED)
}

async fn atom_feed() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/atom+xml")], ATOM_FEED)
}

async fn cached_feed(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    state.cached_hits.fetch_add(1, Ordering::SeqCst);

    let matches = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == CACHED_ETAG);
    if matches {
        state.not_modified.fetch_add(1, Ordering::SeqCst);
        return StatusCode::NOT_MODIFIED.into_response();
    }

    (
        [
            (header::CONTENT_TYPE, "application/rss+xml"),
            (header::ETAG, CACHED_ETAG),
        ],
        CACHED_FEED,
    )
        .into_response()
}

async fn unkeyed_feed() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/rss+xml")], UNKEYED_FEED)
}

async fn moved() -> Redirect {
    Redirect::permanent("/feed.xml")
}

async fn redirect_loop() -> Redirect {
    Redirect::temporary("/loop")
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn garbage() -> impl IntoResponse {
    "this is not a feed"
}

/// In-memory database with migrations applied.
pub async fn setup_test_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().await.unwrap())
}

/// Fetch settings that allow the loopback test server.
pub fn local_fetch_config() -> FetchConfig {
    FetchConfig {
        allow_private_hosts: true,
        ..Default::default()
    }
}

pub type TestService<'a> =
    IngestionService<SourceRepository<'a>, ItemRepository<'a>, FetcherFactory>;

/// Ingestion service over `db` using real HTTP fetchers.
pub fn service<'a>(db: &'a Database, fetch: &FetchConfig) -> TestService<'a> {
    IngestionService::new(
        SourceRepository::new(db.pool()),
        ItemRepository::new(db.pool()),
        FetcherFactory::new(fetch).unwrap(),
        IngestConfig::default(),
    )
}
