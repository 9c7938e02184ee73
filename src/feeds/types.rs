//! Feed ingestion types for InsightVault.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::VaultError;

/// Protocol a source is fetched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// RSS or Atom syndication feed.
    Rss,
    /// Polled REST endpoint.
    Rest,
    /// YouTube channel listing.
    Youtube,
    /// Social timeline polling.
    Twitter,
}

impl ApiType {
    /// All protocol types, in declaration order.
    pub const ALL: [ApiType; 4] = [ApiType::Rss, ApiType::Rest, ApiType::Youtube, ApiType::Twitter];

    /// Database / config representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Rss => "rss",
            ApiType::Rest => "rest",
            ApiType::Youtube => "youtube",
            ApiType::Twitter => "twitter",
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rss" => Ok(ApiType::Rss),
            "rest" => Ok(ApiType::Rest),
            "youtube" => Ok(ApiType::Youtube),
            "twitter" => Ok(ApiType::Twitter),
            other => Err(VaultError::Validation(format!("unknown api_type: {other}"))),
        }
    }
}

/// Conditional request validators returned by the last successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheValidators {
    /// `ETag` response header.
    pub etag: Option<String>,
    /// `Last-Modified` response header.
    pub last_modified: Option<String>,
}

impl CacheValidators {
    /// True when neither validator is known.
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }
}

/// A configured external feed origin.
#[derive(Debug, Clone)]
pub struct Source {
    /// Source ID.
    pub id: i64,
    /// Human readable name.
    pub name: String,
    /// URL-safe unique slug.
    pub slug: String,
    /// Protocol used to fetch the source.
    pub api_type: ApiType,
    /// Endpoint URL.
    pub endpoint: String,
    /// Whether the source takes part in bulk refreshes.
    pub enabled: bool,
    /// Last fetch attempt that got past retrieval.
    pub last_fetched: Option<DateTime<Utc>>,
    /// Opaque per-source configuration (auth tokens, parsing hints, rate limits).
    pub config: serde_json::Value,
    /// Per-source fetch interval in seconds.
    pub fetch_interval: Option<i64>,
    /// Conditional request validators.
    pub validators: CacheValidators,
    /// When the source was created.
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// Check whether the source should be fetched now.
    pub fn is_due_for_fetch(&self, now: DateTime<Utc>, default_interval: i64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_fetched {
            None => true,
            Some(last) => {
                let interval = self.fetch_interval.unwrap_or(default_interval);
                now.signed_duration_since(last).num_seconds() >= interval
            }
        }
    }
}

/// New source for creation.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub name: String,
    pub slug: String,
    pub api_type: ApiType,
    pub endpoint: String,
    pub enabled: bool,
    pub config: serde_json::Value,
    pub fetch_interval: Option<i64>,
}

impl NewSource {
    /// Create a new enabled RSS source.
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            slug: slug.into(),
            api_type: ApiType::Rss,
            endpoint: endpoint.into(),
            enabled: true,
            config: serde_json::Value::Object(Default::default()),
            fetch_interval: None,
        }
    }

    /// Set the protocol type.
    pub fn with_api_type(mut self, api_type: ApiType) -> Self {
        self.api_type = api_type;
        self
    }

    /// Set the per-source configuration.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Set the fetch interval hint.
    pub fn with_fetch_interval(mut self, secs: i64) -> Self {
        self.fetch_interval = Some(secs);
        self
    }

    /// Create the source disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Check the slug is URL-safe: lowercase ASCII letters, digits, `-` and `_`.
    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(VaultError::Validation("source name is empty".into()));
        }
        if !is_valid_slug(&self.slug) {
            return Err(VaultError::Validation(format!(
                "invalid slug: {:?}",
                self.slug
            )));
        }
        if self.endpoint.trim().is_empty() {
            return Err(VaultError::Validation("source endpoint is empty".into()));
        }
        Ok(())
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// One entry as produced by a fetcher, before persistence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedItem {
    /// Source-assigned identifier; `None` when the entry carried none.
    pub external_id: Option<String>,
    pub title: String,
    pub summary: String,
    /// Full body, preferred over the summary when the feed provides it.
    pub content: String,
    pub url: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    /// The original entry, kept for debugging.
    pub raw: Option<serde_json::Value>,
}

/// Result of one retrieval of a source.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    /// Normalized entries in feed order.
    pub items: Vec<NormalizedItem>,
    /// Validators to store for the next conditional request.
    pub validators: CacheValidators,
    /// The server answered `304 Not Modified`.
    pub not_modified: bool,
}

/// New item for insertion.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub source_id: i64,
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub url: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub content_hash: String,
    pub raw: Option<serde_json::Value>,
}

impl NewItem {
    /// Build an insertable item; `None` if the entry has no external identifier.
    pub fn from_normalized(
        source_id: i64,
        item: NormalizedItem,
        fetched_at: DateTime<Utc>,
    ) -> Option<Self> {
        let external_id = item.external_id.filter(|id| !id.trim().is_empty())?;
        let content_hash = compute_hash(&item.url, &item.content, &item.title);

        Some(Self {
            source_id,
            external_id,
            title: item.title,
            summary: item.summary,
            content: item.content,
            url: item.url,
            author: item.author,
            published_at: item.published_at,
            fetched_at,
            image_url: item.image_url,
            video_url: item.video_url,
            content_hash,
            raw: item.raw,
        })
    }
}

/// A stored item.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: i64,
    pub source_id: i64,
    pub external_id: String,
    pub title: String,
    pub summary: String,
    pub content: String,
    pub url: String,
    pub author: String,
    pub published_at: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub content_hash: String,
    pub raw: Option<serde_json::Value>,
    pub is_active: bool,
}

/// SHA-256 over `url || content || title`, lowercase hex.
pub fn compute_hash(url: &str, content: &str, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hasher.update(content.as_bytes());
    hasher.update(title.as_bytes());
    format!("{:x}", hasher.finalize())
}
