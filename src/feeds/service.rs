//! Ingestion service.
//!
//! Runs fetch, normalize, persist and checkpoint for one source, and for
//! every enabled source with per-source failure isolation.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use super::fetcher::FetcherResolver;
use super::store::{ItemStore, SourceStore};
use super::types::{NewItem, Source};
use crate::config::IngestConfig;
use crate::{Result, VaultError};

/// A source whose cycle failed during a bulk refresh.
#[derive(Debug)]
pub struct SourceFailure {
    pub source_id: i64,
    pub slug: String,
    pub error: VaultError,
}

/// Outcome of a bulk refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Items created across all successful sources.
    pub new_items: usize,
    /// Sources whose cycle reached the checkpoint.
    pub succeeded: usize,
    /// Sources whose cycle failed, ordered by source ID.
    pub failures: Vec<SourceFailure>,
}

impl RefreshReport {
    /// Number of sources attempted.
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}

/// Orchestrates ingestion over a source store, an item store and a
/// fetcher resolver.
pub struct IngestionService<S, I, R> {
    sources: S,
    items: I,
    resolver: R,
    config: IngestConfig,
}

impl<S, I, R> IngestionService<S, I, R>
where
    S: SourceStore,
    I: ItemStore,
    R: FetcherResolver,
{
    /// Create a new service.
    pub fn new(sources: S, items: I, resolver: R, config: IngestConfig) -> Self {
        Self {
            sources,
            items,
            resolver,
            config,
        }
    }

    /// The source store.
    pub fn sources(&self) -> &S {
        &self.sources
    }

    /// The item store.
    pub fn items(&self) -> &I {
        &self.items
    }

    /// Run one ingestion cycle for `source` and return the number of new items.
    ///
    /// Resolution and transport errors propagate and leave the source
    /// untouched. Per-item failures are logged and skipped; the checkpoint
    /// advances once every item has been attempted.
    pub async fn ingest_one(&self, source: &Source) -> Result<usize> {
        let fetcher = self.resolver.resolve(source)?;
        let outcome = fetcher.fetch(source).await?;
        let fetched_at = Utc::now();

        let mut created = 0;
        for item in outcome.items.into_iter().take(self.config.max_items_per_fetch) {
            let Some(new_item) = NewItem::from_normalized(source.id, item, fetched_at) else {
                warn!("Skipping entry without identifier from source {}", source.slug);
                continue;
            };

            if self.config.dedup_by_content_hash {
                match self
                    .items
                    .exists_with_hash(source.id, &new_item.content_hash)
                    .await
                {
                    Ok(true) => continue,
                    Ok(false) => {}
                    Err(e) => {
                        error!(
                            "Failed to check content hash for item {} of source {}: {}",
                            new_item.external_id, source.slug, e
                        );
                        continue;
                    }
                }
            }

            match self.items.insert_if_absent(&new_item).await {
                Ok(Some(_)) => created += 1,
                Ok(None) => {} // Already exists
                Err(e) => {
                    error!(
                        "Failed to store item {} for source {}: {}",
                        new_item.external_id, source.slug, e
                    );
                }
            }
        }

        self.sources.update_last_fetched(source.id, Utc::now()).await?;
        if !outcome.not_modified && outcome.validators != source.validators {
            self.sources
                .update_cache_validators(source.id, &outcome.validators)
                .await?;
        }

        if created > 0 {
            info!("Source {} updated: {} new item(s)", source.slug, created);
        } else {
            debug!("Source {} updated: no new items", source.slug);
        }

        Ok(created)
    }

    /// Ingest every enabled source and return the total of new items.
    ///
    /// Failing sources are logged and excluded from the total.
    pub async fn ingest_all(&self) -> Result<usize> {
        Ok(self.refresh_all().await?.new_items)
    }

    /// Ingest one enabled source by slug.
    pub async fn refresh_source(&self, slug: &str) -> Result<usize> {
        let source = self
            .sources
            .get_by_slug(slug)
            .await?
            .filter(|s| s.enabled)
            .ok_or_else(|| VaultError::NotFound(format!("source {slug}")))?;

        self.ingest_one(&source).await
    }

    /// Ingest every enabled source and report per-source failures.
    pub async fn refresh_all(&self) -> Result<RefreshReport> {
        let sources = self.sources.list_enabled().await?;
        Ok(self.run_batch(sources).await)
    }

    /// Ingest the enabled sources whose fetch interval has elapsed.
    pub async fn refresh_due(&self) -> Result<RefreshReport> {
        let now = Utc::now();
        let default_interval = self.config.default_fetch_interval_secs;
        let due: Vec<Source> = self
            .sources
            .list_enabled()
            .await?
            .into_iter()
            .filter(|s| s.is_due_for_fetch(now, default_interval))
            .collect();

        if due.is_empty() {
            debug!("No sources due for refresh");
            return Ok(RefreshReport::default());
        }

        Ok(self.run_batch(due).await)
    }

    async fn run_batch(&self, sources: Vec<Source>) -> RefreshReport {
        info!("Refreshing {} source(s)", sources.len());

        let concurrency = self.config.max_concurrent_sources.max(1);
        let results: Vec<(Source, Result<usize>)> = stream::iter(sources)
            .map(move |source| async move {
                let result = self.ingest_one(&source).await;
                (source, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for (source, result) in results {
            match result {
                Ok(count) => {
                    report.new_items += count;
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!("Failed to refresh source {}: {}", source.slug, e);
                    report.failures.push(SourceFailure {
                        source_id: source.id,
                        slug: source.slug,
                        error: e,
                    });
                }
            }
        }
        report.failures.sort_by_key(|f| f.source_id);
        report
    }
}
