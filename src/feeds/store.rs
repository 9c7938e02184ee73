//! Storage contracts the ingestion service depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::feeds::types::{CacheValidators, NewItem, Source};
use crate::Result;

/// Read access to sources plus the checkpoint writes made by ingestion.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// All sources with `enabled = true`.
    async fn list_enabled(&self) -> Result<Vec<Source>>;

    /// Look up a source by slug.
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Source>>;

    /// Look up a source by ID.
    async fn get_by_id(&self, id: i64) -> Result<Option<Source>>;

    /// Set `last_fetched` without touching other columns.
    async fn update_last_fetched(&self, id: i64, at: DateTime<Utc>) -> Result<bool>;

    /// Replace the stored conditional request validators.
    async fn update_cache_validators(&self, id: i64, validators: &CacheValidators)
        -> Result<bool>;
}

/// Insert-only access to items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert unless `(source_id, external_id)` already exists.
    ///
    /// Returns the new row ID, or `None` for a duplicate. The uniqueness
    /// check is the store's own constraint, not a prior lookup.
    async fn insert_if_absent(&self, item: &NewItem) -> Result<Option<i64>>;

    /// Whether the source already has an item with this content hash.
    async fn exists_with_hash(&self, source_id: i64, content_hash: &str) -> Result<bool>;
}
