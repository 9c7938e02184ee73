//! SQL repositories for sources and items.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};

use super::store::{ItemStore, SourceStore};
use super::types::{CacheValidators, Item, NewItem, NewSource, Source};
use crate::db::{DbPool, SQL_TRUE};
use crate::{Result, VaultError};

const SOURCE_COLUMNS: &str = "id, name, slug, api_type, endpoint, enabled, last_fetched, config,
     fetch_interval, etag, last_modified, created_at";

const ITEM_COLUMNS: &str = "id, source_id, external_id, title, summary, content, url, author,
     published_at, fetched_at, image_url, video_url, content_hash, raw, is_active";

/// Row type for a source from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct SourceRow {
    id: i64,
    name: String,
    slug: String,
    api_type: String,
    endpoint: String,
    enabled: bool,
    last_fetched: Option<String>,
    config: String,
    fetch_interval: Option<i64>,
    etag: Option<String>,
    last_modified: Option<String>,
    created_at: String,
}

impl TryFrom<SourceRow> for Source {
    type Error = VaultError;

    fn try_from(row: SourceRow) -> Result<Self> {
        Ok(Source {
            id: row.id,
            name: row.name,
            slug: row.slug,
            api_type: row.api_type.parse()?,
            endpoint: row.endpoint,
            enabled: row.enabled,
            last_fetched: row.last_fetched.and_then(|s| parse_datetime(&s)),
            // config is opaque; an unreadable blob is treated as empty
            config: serde_json::from_str(&row.config)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            fetch_interval: row.fetch_interval,
            validators: CacheValidators {
                etag: row.etag,
                last_modified: row.last_modified,
            },
            created_at: parse_datetime(&row.created_at).unwrap_or_else(Utc::now),
        })
    }
}

/// Row type for an item from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    source_id: i64,
    external_id: String,
    title: String,
    summary: String,
    content: String,
    url: String,
    author: String,
    published_at: Option<String>,
    fetched_at: String,
    image_url: Option<String>,
    video_url: Option<String>,
    content_hash: String,
    raw: Option<String>,
    is_active: bool,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            source_id: row.source_id,
            external_id: row.external_id,
            title: row.title,
            summary: row.summary,
            content: row.content,
            url: row.url,
            author: row.author,
            published_at: row.published_at.and_then(|s| parse_datetime(&s)),
            fetched_at: parse_datetime(&row.fetched_at).unwrap_or_else(Utc::now),
            image_url: row.image_url,
            video_url: row.video_url,
            content_hash: row.content_hash,
            raw: row.raw.and_then(|s| serde_json::from_str(&s).ok()),
            is_active: row.is_active,
        }
    }
}

/// Repository for feed source operations.
pub struct SourceRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> SourceRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Create a new source. Fails with a validation error if the slug is taken.
    pub async fn create(&self, source: &NewSource) -> Result<Source> {
        source.validate()?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO feed_sources (name, slug, api_type, endpoint, enabled, config, fetch_interval)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&source.name)
        .bind(&source.slug)
        .bind(source.api_type.as_str())
        .bind(&source.endpoint)
        .bind(source.enabled)
        .bind(source.config.to_string())
        .bind(source.fetch_interval)
        .fetch_one(self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                VaultError::Validation(format!("slug already exists: {}", source.slug))
            }
            other => VaultError::from(other),
        })?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| VaultError::NotFound("source".into()))
    }

    /// Get a source by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Source>> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM feed_sources WHERE id = $1");
        let row = sqlx::query_as::<_, SourceRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        row.map(Source::try_from).transpose()
    }

    /// Get a source by slug.
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM feed_sources WHERE slug = $1");
        let row = sqlx::query_as::<_, SourceRow>(&query)
            .bind(slug)
            .fetch_optional(self.pool)
            .await?;

        row.map(Source::try_from).transpose()
    }

    /// List enabled sources (ordered by registration order).
    pub async fn list_enabled(&self) -> Result<Vec<Source>> {
        let query = format!(
            "SELECT {SOURCE_COLUMNS} FROM feed_sources WHERE enabled = {SQL_TRUE} ORDER BY id ASC"
        );
        let rows = sqlx::query_as::<_, SourceRow>(&query)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(Source::try_from).collect()
    }

    /// List all sources, including disabled ones.
    pub async fn list_all(&self) -> Result<Vec<Source>> {
        let query = format!("SELECT {SOURCE_COLUMNS} FROM feed_sources ORDER BY id ASC");
        let rows = sqlx::query_as::<_, SourceRow>(&query)
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(Source::try_from).collect()
    }

    /// Set `last_fetched`.
    pub async fn update_last_fetched(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_sources SET last_fetched = $1 WHERE id = $2")
            .bind(to_db_time(at))
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the conditional request validators.
    pub async fn update_cache_validators(
        &self,
        id: i64,
        validators: &CacheValidators,
    ) -> Result<bool> {
        let result =
            sqlx::query("UPDATE feed_sources SET etag = $1, last_modified = $2 WHERE id = $3")
                .bind(&validators.etag)
                .bind(&validators.last_modified)
                .bind(id)
                .execute(self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Enable or disable a source.
    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_sources SET enabled = $1 WHERE id = $2")
            .bind(enabled)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a source and, through the foreign key, its items.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM feed_sources WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SourceStore for SourceRepository<'_> {
    async fn list_enabled(&self) -> Result<Vec<Source>> {
        SourceRepository::list_enabled(self).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Source>> {
        SourceRepository::get_by_slug(self, slug).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Source>> {
        SourceRepository::get_by_id(self, id).await
    }

    async fn update_last_fetched(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        SourceRepository::update_last_fetched(self, id, at).await
    }

    async fn update_cache_validators(
        &self,
        id: i64,
        validators: &CacheValidators,
    ) -> Result<bool> {
        SourceRepository::update_cache_validators(self, id, validators).await
    }
}

/// Repository for item operations.
pub struct ItemRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> ItemRepository<'a> {
    /// Create a new repository instance.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert an item unless `(source_id, external_id)` exists.
    ///
    /// Only the uniqueness conflict is swallowed; any other constraint
    /// failure is returned as an error.
    pub async fn insert_if_absent(&self, item: &NewItem) -> Result<Option<i64>> {
        let raw = item.raw.as_ref().map(|v| v.to_string());

        let result = sqlx::query(
            r#"
            INSERT INTO feed_items (source_id, external_id, title, summary, content, url, author,
                                    published_at, fetched_at, image_url, video_url, content_hash, raw)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_id, external_id) DO NOTHING
            "#,
        )
        .bind(item.source_id)
        .bind(&item.external_id)
        .bind(&item.title)
        .bind(&item.summary)
        .bind(&item.content)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.published_at.map(to_db_time))
        .bind(to_db_time(item.fetched_at))
        .bind(&item.image_url)
        .bind(&item.video_url)
        .bind(&item.content_hash)
        .bind(raw)
        .execute(self.pool)
        .await?;

        if result.rows_affected() > 0 {
            Ok(Some(result.last_insert_rowid()))
        } else {
            Ok(None) // Already exists
        }
    }

    /// Whether the source has an item with this content hash.
    pub async fn exists_with_hash(&self, source_id: i64, content_hash: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM feed_items WHERE source_id = $1 AND content_hash = $2)",
        )
        .bind(source_id)
        .bind(content_hash)
        .fetch_one(self.pool)
        .await?;

        Ok(exists)
    }

    /// Get an item by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Item>> {
        let query = format!("SELECT {ITEM_COLUMNS} FROM feed_items WHERE id = $1");
        let row = sqlx::query_as::<_, ItemRow>(&query)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Item::from))
    }

    /// Get an item by its dedup key.
    pub async fn get_by_external_id(
        &self,
        source_id: i64,
        external_id: &str,
    ) -> Result<Option<Item>> {
        let query = format!(
            "SELECT {ITEM_COLUMNS} FROM feed_items WHERE source_id = $1 AND external_id = $2"
        );
        let row = sqlx::query_as::<_, ItemRow>(&query)
            .bind(source_id)
            .bind(external_id)
            .fetch_optional(self.pool)
            .await?;

        Ok(row.map(Item::from))
    }

    /// List active items, newest first, optionally for one source.
    pub async fn list_active(&self, source_id: Option<i64>, limit: i64) -> Result<Vec<Item>> {
        let query = format!(
            r#"
            SELECT {ITEM_COLUMNS}
            FROM feed_items
            WHERE is_active = {SQL_TRUE} AND ($1 IS NULL OR source_id = $1)
            ORDER BY published_at DESC, fetched_at DESC, id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .bind(source_id)
            .bind(limit)
            .fetch_all(self.pool)
            .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }

    /// Count items stored for a source, active or not.
    pub async fn count_by_source(&self, source_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feed_items WHERE source_id = $1")
            .bind(source_id)
            .fetch_one(self.pool)
            .await?;

        Ok(count)
    }

    /// Soft-delete an item.
    pub async fn deactivate(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("UPDATE feed_items SET is_active = 0 WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ItemStore for ItemRepository<'_> {
    async fn insert_if_absent(&self, item: &NewItem) -> Result<Option<i64>> {
        ItemRepository::insert_if_absent(self, item).await
    }

    async fn exists_with_hash(&self, source_id: i64, content_hash: &str) -> Result<bool> {
        ItemRepository::exists_with_hash(self, source_id, content_hash).await
    }
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn to_db_time(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a datetime string to DateTime<Utc>.
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // SQLite datetime('now') format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
