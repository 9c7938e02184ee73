//! End-to-end ingestion tests against a local feed server.

mod common;

use chrono::{TimeZone, Utc};

use common::{local_fetch_config, service, setup_test_db, FeedServer, CACHED_ETAG};
use insightvault::config::FetchConfig;
use insightvault::feeds::{ApiType, ItemRepository, NewSource, SourceRepository};
use insightvault::VaultError;

#[tokio::test]
async fn test_rss_ingestion_end_to_end() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    let source = sources
        .create(&NewSource::new("Local News", "local", server.url("/feed.xml")))
        .await
        .unwrap();

    let svc = service(&db, &local_fetch_config());
    assert_eq!(svc.refresh_source("local").await.unwrap(), 3);

    let items = ItemRepository::new(db.pool());
    let launch = items
        .get_by_external_id(source.id, "news-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(launch.title, "Launch day");
    assert_eq!(launch.url, "https://news.example/launch");
    assert_eq!(
        launch.image_url.as_deref(),
        Some(server.url("/img/launch.jpg").as_str())
    );
    assert_eq!(
        launch.published_at,
        Some(Utc.with_ymd_and_hms(2025, 1, 6, 9, 0, 0).unwrap())
    );
    assert!(launch.raw.is_some());
    assert_eq!(launch.content_hash.len(), 64);

    let keynote = items
        .get_by_external_id(source.id, "news-2")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        keynote.video_url.as_deref(),
        Some("https://www.youtube.com/embed/abcDEF123")
    );

    let podcast = items
        .get_by_external_id(source.id, "news-3")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        podcast.video_url.as_deref(),
        Some("https://cdn.example/ep1.mp4")
    );
    assert!(podcast.published_at.is_none());

    let reloaded = sources.get_by_id(source.id).await.unwrap().unwrap();
    assert!(reloaded.last_fetched.is_some());
}

#[tokio::test]
async fn test_second_refresh_creates_nothing() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    let source = sources
        .create(&NewSource::new("Local News", "local", server.url("/feed.xml")))
        .await
        .unwrap();
    let svc = service(&db, &local_fetch_config());

    assert_eq!(svc.refresh_source("local").await.unwrap(), 3);
    let first = sources.get_by_id(source.id).await.unwrap().unwrap();

    assert_eq!(svc.refresh_source("local").await.unwrap(), 0);
    let second = sources.get_by_id(source.id).await.unwrap().unwrap();

    assert_eq!(
        ItemRepository::new(db.pool())
            .count_by_source(source.id)
            .await
            .unwrap(),
        3
    );
    assert!(second.last_fetched >= first.last_fetched);
}

#[tokio::test]
async fn test_atom_entries_fall_back_to_updated() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let source = SourceRepository::new(db.pool())
        .create(&NewSource::new("Blog", "blog", server.url("/atom.xml")))
        .await
        .unwrap();

    let svc = service(&db, &local_fetch_config());
    assert_eq!(svc.refresh_source("blog").await.unwrap(), 2);

    let items = ItemRepository::new(db.pool());
    let release = items
        .get_by_external_id(source.id, "urn:uuid:post-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(release.author, "Grace");
    assert_eq!(release.url, "https://blog.example/release");
    assert!(release.content.contains("All the details."));
    assert_eq!(
        release.published_at,
        Some(Utc.with_ymd_and_hms(2025, 2, 1, 12, 0, 0).unwrap())
    );

    let listed = items.list_active(Some(source.id), 10).await.unwrap();
    let titles: Vec<_> = listed.iter().map(|i| i.title.as_str()).collect();
    assert_eq!(titles, vec!["Roadmap", "Release notes"]);
}

#[tokio::test]
async fn test_refresh_all_isolates_failing_sources() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    sources
        .create(&NewSource::new("News", "news", server.url("/feed.xml")))
        .await
        .unwrap();
    let broken = sources
        .create(&NewSource::new("Broken", "broken", server.url("/broken")))
        .await
        .unwrap();
    sources
        .create(&NewSource::new("Blog", "blog", server.url("/atom.xml")))
        .await
        .unwrap();
    let garbage = sources
        .create(&NewSource::new("Garbage", "garbage", server.url("/garbage")))
        .await
        .unwrap();
    sources
        .create(
            &NewSource::new("Timeline", "timeline", "https://social.example/api")
                .with_api_type(ApiType::Twitter),
        )
        .await
        .unwrap();

    let svc = service(&db, &local_fetch_config());
    let report = svc.refresh_all().await.unwrap();

    assert_eq!(report.new_items, 5);
    assert_eq!(report.succeeded, 2);

    let failed: Vec<_> = report.failures.iter().map(|f| f.slug.as_str()).collect();
    assert_eq!(failed, vec!["broken", "garbage", "timeline"]);
    assert!(matches!(report.failures[0].error, VaultError::Transport(_)));
    assert!(matches!(report.failures[1].error, VaultError::Parse(_)));
    assert!(matches!(
        report.failures[2].error,
        VaultError::UnsupportedProtocol(ApiType::Twitter)
    ));
    assert!(report.failures.iter().all(|f| f.error.is_source_fatal()));

    for id in [broken.id, garbage.id] {
        let source = sources.get_by_id(id).await.unwrap().unwrap();
        assert!(source.last_fetched.is_none());
    }

    // Bulk ingestion sums only the successful sources.
    assert_eq!(svc.ingest_all().await.unwrap(), 0);
}

#[tokio::test]
async fn test_conditional_request_uses_etag() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    let source = sources
        .create(&NewSource::new("Cached", "cached", server.url("/cached.xml")))
        .await
        .unwrap();
    let svc = service(&db, &local_fetch_config());

    assert_eq!(svc.refresh_source("cached").await.unwrap(), 1);
    let after_first = sources.get_by_id(source.id).await.unwrap().unwrap();
    assert_eq!(after_first.validators.etag.as_deref(), Some(CACHED_ETAG));

    assert_eq!(svc.refresh_source("cached").await.unwrap(), 0);
    assert_eq!(server.cached_hits(), 2);
    assert_eq!(server.not_modified_responses(), 1);

    let after_second = sources.get_by_id(source.id).await.unwrap().unwrap();
    assert!(after_second.last_fetched >= after_first.last_fetched);
    assert_eq!(after_second.validators.etag.as_deref(), Some(CACHED_ETAG));
}

#[tokio::test]
async fn test_conditional_requests_can_be_disabled() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    SourceRepository::new(db.pool())
        .create(&NewSource::new("Cached", "cached", server.url("/cached.xml")))
        .await
        .unwrap();
    let fetch = FetchConfig {
        conditional_requests: false,
        ..local_fetch_config()
    };
    let svc = service(&db, &fetch);

    svc.refresh_source("cached").await.unwrap();
    svc.refresh_source("cached").await.unwrap();
    assert_eq!(server.not_modified_responses(), 0);
}

#[tokio::test]
async fn test_oversized_feed_is_a_transport_failure() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    let source = sources
        .create(&NewSource::new("News", "news", server.url("/feed.xml")))
        .await
        .unwrap();
    let fetch = FetchConfig {
        max_feed_size_bytes: 256,
        ..local_fetch_config()
    };

    let result = service(&db, &fetch).refresh_source("news").await;
    assert!(matches!(result, Err(VaultError::Transport(_))));
    let reloaded = sources.get_by_id(source.id).await.unwrap().unwrap();
    assert!(reloaded.last_fetched.is_none());
}

#[tokio::test]
async fn test_loopback_refused_by_default() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    SourceRepository::new(db.pool())
        .create(&NewSource::new("News", "news", server.url("/feed.xml")))
        .await
        .unwrap();

    let result = service(&db, &FetchConfig::default())
        .refresh_source("news")
        .await;
    match &result {
        Err(VaultError::Transport(msg)) => assert!(msg.contains("not public")),
        other => panic!("expected refusal, got {other:?}"),
    }
    assert!(result.as_ref().unwrap_err().is_source_fatal());
}

#[tokio::test]
async fn test_items_without_guid_are_keyed_by_link() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let source = SourceRepository::new(db.pool())
        .create(&NewSource::new("Unkeyed", "unkeyed", server.url("/unkeyed.xml")))
        .await
        .unwrap();
    let svc = service(&db, &local_fetch_config());

    assert_eq!(svc.refresh_source("unkeyed").await.unwrap(), 1);
    assert_eq!(svc.refresh_source("unkeyed").await.unwrap(), 0);

    let items = ItemRepository::new(db.pool());
    assert_eq!(items.count_by_source(source.id).await.unwrap(), 1);
    let linked = items
        .get_by_external_id(source.id, "https://unkeyed.example/linked")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(linked.title, "Linked only");
}

#[tokio::test]
async fn test_redirects_are_followed_within_limit() {
    let server = FeedServer::start().await;
    let db = setup_test_db().await;
    let sources = SourceRepository::new(db.pool());
    sources
        .create(&NewSource::new("Moved", "moved", server.url("/moved")))
        .await
        .unwrap();
    let looping = sources
        .create(&NewSource::new("Loop", "loop", server.url("/loop")))
        .await
        .unwrap();
    let svc = service(&db, &local_fetch_config());

    assert_eq!(svc.refresh_source("moved").await.unwrap(), 3);

    let result = svc.refresh_source("loop").await;
    assert!(matches!(result, Err(VaultError::Transport(_))));
    let reloaded = sources.get_by_id(looping.id).await.unwrap().unwrap();
    assert!(reloaded.last_fetched.is_none());
}
