//! RSS/Atom fetcher.

use async_trait::async_trait;
use feed_rs::model::{Entry, Link};
use feed_rs::parser;
use reqwest::header::{HeaderMap, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use super::{validate_endpoint, Fetcher};
use crate::config::FetchConfig;
use crate::feeds::date::normalize_published;
use crate::feeds::media::extract_media;
use crate::feeds::types::{ApiType, CacheValidators, FetchOutcome, NormalizedItem, Source};
use crate::{Result, VaultError};

/// Fetches RSS 0.9x/1.0/2.0, Atom and JSON Feed documents.
pub struct RssFetcher {
    client: Client,
    config: FetchConfig,
}

impl RssFetcher {
    /// Create a fetcher over a shared client.
    pub fn new(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// Download the endpoint body, enforcing the size limit while streaming.
    async fn download(&self, source: &Source) -> Result<Option<(Vec<u8>, CacheValidators)>> {
        validate_endpoint(&source.endpoint, self.config.allow_private_hosts).map_err(|e| {
            VaultError::Transport(format!("refused endpoint {}: {}", source.endpoint, e))
        })?;

        let mut request = self.client.get(&source.endpoint);
        if self.config.conditional_requests {
            if let Some(etag) = &source.validators.etag {
                request = request.header(IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &source.validators.last_modified {
                request = request.header(IF_MODIFIED_SINCE, last_modified);
            }
        }

        let mut response = request.send().await.map_err(|e| {
            VaultError::Transport(format!("failed to fetch {}: {}", source.endpoint, e))
        })?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VaultError::Transport(format!(
                "HTTP error from {}: {}",
                source.endpoint, status
            )));
        }

        let max = self.config.max_feed_size_bytes;
        if let Some(length) = response.content_length() {
            if length > max {
                return Err(VaultError::Transport(format!(
                    "feed too large: {} bytes (max {} bytes)",
                    length, max
                )));
            }
        }

        let validators = validators_from(response.headers());

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| VaultError::Transport(format!("failed to read response: {e}")))?
        {
            if (body.len() + chunk.len()) as u64 > max {
                return Err(VaultError::Transport(format!(
                    "feed too large: more than {} bytes",
                    max
                )));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Some((body, validators)))
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    fn api_type(&self) -> ApiType {
        ApiType::Rss
    }

    async fn fetch(&self, source: &Source) -> Result<FetchOutcome> {
        let Some((body, validators)) = self.download(source).await? else {
            debug!("Source {} not modified", source.slug);
            return Ok(FetchOutcome {
                items: Vec::new(),
                validators: source.validators.clone(),
                not_modified: true,
            });
        };

        let items = parse_entries(&body, &source.endpoint)?;
        debug!(
            "Source {} returned {} entr(ies), {} bytes",
            source.slug,
            items.len(),
            body.len()
        );

        Ok(FetchOutcome {
            items,
            validators,
            not_modified: false,
        })
    }
}

fn validators_from(headers: &HeaderMap) -> CacheValidators {
    let header = |name: reqwest::header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    CacheValidators {
        etag: header(ETAG),
        last_modified: header(LAST_MODIFIED),
    }
}

/// Parse a feed document and normalize every entry.
///
/// Only an unreadable document is an error; entries never are.
pub fn parse_entries(bytes: &[u8], base_url: &str) -> Result<Vec<NormalizedItem>> {
    // No generated ids: an entry without a guid/id must fall through to its
    // link, and one with neither must stay unidentified.
    let feed = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build()
        .parse(bytes)
        .map_err(|e| VaultError::Parse(format!("failed to parse feed: {}", e)))?;

    Ok(feed
        .entries
        .iter()
        .map(|entry| normalize_entry(entry_to_raw(entry), base_url))
        .collect())
}

/// The link a reader would open: `alternate` (or unlabelled) first.
fn canonical_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| links.first())
}

/// Flatten a parsed entry into the raw payload the normalizer reads and stores.
///
/// feed-rs has already folded `<guid>` into `id`, `<enclosure>` and `media:*`
/// into `media`, and Dublin Core creators into `authors`, so those arrive
/// under `id`, `media_content` and `author` here.
fn entry_to_raw(entry: &Entry) -> Value {
    let links: Vec<Value> = entry
        .links
        .iter()
        .map(|l| json!({"href": l.href, "rel": l.rel, "type": l.media_type}))
        .collect();

    let media_content: Vec<Value> = entry
        .media
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| {
            let url = c.url.as_ref()?;
            Some(json!({
                "url": url.as_str(),
                "type": c.content_type.as_ref().map(|t| t.to_string()),
                "size": c.size,
            }))
        })
        .collect();

    let media_thumbnail: Vec<Value> = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| json!({"url": t.image.uri}))
        .collect();

    json!({
        "id": entry.id,
        "link": canonical_link(&entry.links).map(|l| l.href.clone()),
        "title": entry.title.as_ref().map(|t| t.content.clone()),
        "summary": entry.summary.as_ref().map(|t| t.content.clone()),
        "content": entry.content.as_ref().and_then(|c| c.body.clone()),
        "author": entry.authors.first().map(|p| p.name.clone()),
        "contributors": entry.contributors.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
        "categories": entry.categories.iter().map(|c| c.term.clone()).collect::<Vec<_>>(),
        "published": entry.published.map(|d| d.to_rfc3339()),
        "updated": entry.updated.map(|d| d.to_rfc3339()),
        "links": links,
        "media_content": media_content,
        "media_thumbnail": media_thumbnail,
    })
}

/// Normalize one raw entry into an item record.
///
/// Each field is looked up independently; anything missing or malformed
/// becomes empty/`None` without affecting the others.
pub fn normalize_entry(raw: Value, base_url: &str) -> NormalizedItem {
    let external_id = first_text(&raw, &["id", "guid", "link"]).map(str::to_string);
    let title = first_text(&raw, &["title"]).unwrap_or_default().to_string();
    let summary = first_text(&raw, &["summary"]).unwrap_or_default().to_string();
    let content = raw
        .get("content")
        .and_then(content_text)
        .map(str::to_string)
        .unwrap_or_else(|| summary.clone());
    let url = first_text(&raw, &["link"]).unwrap_or_default().to_string();
    let author = ["author", "creator"]
        .iter()
        .filter_map(|key| raw.get(*key))
        .find_map(person_name)
        .unwrap_or_default()
        .to_string();

    let published_at = normalize_published(&raw);
    let media = extract_media(&raw, base_url, &content);

    NormalizedItem {
        external_id,
        title,
        summary,
        content,
        url,
        author,
        published_at,
        image_url: media.image_url,
        video_url: media.video_url,
        raw: Some(raw),
    }
}

fn first_text<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| raw.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Body text from a string, a `{value|body}` object, or a list of those.
fn content_text(value: &Value) -> Option<&str> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Array(parts) => parts.first().and_then(content_text),
        Value::Object(obj) => obj
            .get("value")
            .or_else(|| obj.get("body"))
            .and_then(Value::as_str),
        _ => None,
    };
    text.filter(|s| !s.trim().is_empty())
}

/// Author as a bare string or a `{name}` object.
fn person_name(value: &Value) -> Option<&str> {
    let name = match value {
        Value::String(s) => Some(s.trim()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::trim),
        _ => None,
    };
    name.filter(|s| !s.is_empty())
}
