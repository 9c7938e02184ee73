//! InsightVault - feed ingestion engine
//!
//! Fetches RSS/Atom sources, normalizes entries (media, dates, identifiers)
//! and stores them in SQLite with per-source deduplication.

pub mod config;
pub mod db;
pub mod error;
pub mod feeds;
pub mod logging;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{Result, VaultError};
pub use feeds::{
    ApiType, FeedUpdater, FetcherFactory, IngestionService, Item, ItemRepository, NewSource,
    RefreshReport, Source, SourceRepository,
};
