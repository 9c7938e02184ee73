//! Feed ingestion for InsightVault.
//!
//! Fetches external sources, normalizes their entries into items and
//! stores them idempotently.

pub mod date;
pub mod fetcher;
pub mod media;
pub mod repository;
pub mod service;
pub mod store;
pub mod types;
pub mod updater;

pub use date::normalize_published;
pub use fetcher::{Fetcher, FetcherFactory, FetcherResolver, RssFetcher};
pub use media::{extract_media, MediaUrls};
pub use repository::{ItemRepository, SourceRepository};
pub use service::{IngestionService, RefreshReport, SourceFailure};
pub use store::{ItemStore, SourceStore};
pub use types::{
    compute_hash, ApiType, CacheValidators, FetchOutcome, Item, NewItem, NewSource,
    NormalizedItem, Source,
};
pub use updater::FeedUpdater;
