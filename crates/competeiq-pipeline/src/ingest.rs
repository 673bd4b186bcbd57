//! Ingestion coordinator: fetch, deduplicate, enrich, commit, index,
//! aggregate and evaluate alert rules for one source cycle at a time.

use std::hash::Hash;
use std::sync::Arc;

use competeiq_core::{Document, EnrichmentStatus, Source, SourceStatus};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::alerts::AlertEngine;
use crate::clock::Clock;
use crate::content::content_hash;
use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::registry::SourceRegistry;
use crate::retry::{retry_with_backoff, BackoffPolicy};
use crate::sources::{RawArticle, SourceFetcher};
use crate::store::{DocumentStore, InsertOutcome};
use crate::trends::TrendAggregator;

/// Counts for one ingestion cycle (a poll or a pushed batch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub processed_count: usize,
    pub duplicate_count: usize,
    pub failed_count: usize,
    pub alerts_generated: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestSettings {
    pub fetch_retry: BackoffPolicy,
    pub index_retry: BackoffPolicy,
    /// Documents enriched concurrently for one source, across every cycle
    /// running for it.
    pub per_source_concurrency: usize,
    /// Documents enriched concurrently across all sources.
    pub global_concurrency: usize,
    /// A cycle committing more documents than this raises an activity alert.
    pub activity_alert_threshold: usize,
}

/// Shared handles the coordinator writes through.
#[derive(Clone)]
pub struct IngestComponents {
    pub registry: Arc<SourceRegistry>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub enricher: Arc<Enricher>,
    pub store: Arc<dyn DocumentStore>,
    pub index: Arc<dyn VectorIndex>,
    pub aggregator: Arc<TrendAggregator>,
    pub alerts: Arc<AlertEngine>,
    pub clock: Arc<dyn Clock>,
}

type HashKey = (String, String);

enum ArticleOutcome {
    Committed(Document),
    Duplicate,
    Rejected,
}

/// Holds a key in a claim map and releases it on drop, including when the
/// owning future is cancelled.
struct Claim<K: Hash + Eq> {
    map: Arc<DashMap<K, ()>>,
    key: Option<K>,
}

impl<K: Hash + Eq + Clone> Claim<K> {
    fn acquire(map: &Arc<DashMap<K, ()>>, key: K) -> Option<Self> {
        match map.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self {
                    map: Arc::clone(map),
                    key: Some(key),
                })
            }
        }
    }
}

impl<K: Hash + Eq> Drop for Claim<K> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.map.remove(&key);
        }
    }
}

pub struct IngestionCoordinator {
    parts: IngestComponents,
    settings: IngestSettings,
    in_flight: Arc<DashMap<HashKey, ()>>,
    polling: Arc<DashMap<String, ()>>,
    source_permits: DashMap<String, Arc<Semaphore>>,
    permits: Semaphore,
}

impl std::fmt::Debug for IngestionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionCoordinator")
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl IngestionCoordinator {
    #[must_use]
    pub fn new(parts: IngestComponents, settings: IngestSettings) -> Self {
        let settings = IngestSettings {
            per_source_concurrency: settings.per_source_concurrency.max(1),
            global_concurrency: settings.global_concurrency.max(1),
            ..settings
        };
        Self {
            permits: Semaphore::new(settings.global_concurrency),
            parts,
            settings,
            in_flight: Arc::default(),
            polling: Arc::default(),
            source_permits: DashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.parts.registry
    }

    /// Run pushed articles through the same path as a poll.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownSource`] or [`PipelineError::SourceDisabled`].
    /// Per-document failures are counted in the report, never returned.
    pub async fn ingest_batch(
        self: &Arc<Self>,
        source_id: &str,
        articles: Vec<RawArticle>,
    ) -> Result<IngestReport, PipelineError> {
        let source = self.active_source(source_id)?;
        self.spawn_cycle(source, articles, None).await
    }

    /// Fetch one source (with retries) and ingest what it returned.
    ///
    /// A fetch that still fails after retries counts as a failed poll cycle
    /// for the source's health. A poll already running for the same source
    /// makes this call a no-op.
    ///
    /// # Errors
    ///
    /// [`PipelineError::UnknownSource`], [`PipelineError::SourceDisabled`],
    /// or the last fetch error.
    pub async fn poll_source(
        self: &Arc<Self>,
        source_id: &str,
    ) -> Result<IngestReport, PipelineError> {
        let source = self.active_source(source_id)?;
        let Some(claim) = Claim::acquire(&self.polling, source.id.clone()) else {
            tracing::debug!(source = %source.id, "poll already in progress, skipping");
            return Ok(IngestReport::default());
        };

        let fetched = retry_with_backoff(self.settings.fetch_retry, "source.fetch", || {
            self.parts.fetcher.fetch(&source)
        })
        .await;
        let now = self.parts.clock.now();

        match fetched {
            Ok(articles) => {
                self.parts.registry.record_success(&source.id, now);
                self.spawn_cycle(source, articles, Some(claim)).await
            }
            Err(e) => {
                let updated = self.parts.registry.record_failure(&source.id, now);
                tracing::warn!(
                    source = %source.id,
                    failures = updated.map_or(0, |s| s.consecutive_failure_count),
                    error = %e,
                    "source poll failed"
                );
                Err(e)
            }
        }
    }

    /// Poll every source whose interval has elapsed, concurrently.
    pub async fn run_due_polls(self: &Arc<Self>) -> Vec<(String, Result<IngestReport, PipelineError>)> {
        let due = self.parts.registry.due(self.parts.clock.now());
        if due.is_empty() {
            return Vec::new();
        }
        tracing::info!(count = due.len(), "polling due sources");
        futures::future::join_all(due.into_iter().map(|source| async move {
            let result = self.poll_source(&source.id).await;
            (source.id, result)
        }))
        .await
    }

    fn active_source(&self, source_id: &str) -> Result<Source, PipelineError> {
        let source = self
            .parts
            .registry
            .get(source_id)
            .ok_or_else(|| PipelineError::UnknownSource(source_id.to_string()))?;
        if source.status == SourceStatus::Disabled {
            return Err(PipelineError::SourceDisabled(source.id));
        }
        Ok(source)
    }

    /// Run one cycle on its own task. Dropping the caller never stops a
    /// committed document short of indexing, aggregation and rule
    /// evaluation; the poll claim, if any, is held until the cycle ends.
    async fn spawn_cycle(
        self: &Arc<Self>,
        source: Source,
        articles: Vec<RawArticle>,
        poll_claim: Option<Claim<String>>,
    ) -> Result<IngestReport, PipelineError> {
        let this = Arc::clone(self);
        let source_id = source.id.clone();
        tokio::spawn(async move {
            let _poll_claim = poll_claim;
            this.run_cycle(&source, articles).await
        })
        .await
        .map_err(|e| {
            tracing::error!(source = %source_id, error = %e, "ingestion cycle task failed");
            PipelineError::CycleAborted {
                source_id,
                reason: e.to_string(),
            }
        })
    }

    fn source_gate(&self, source_id: &str) -> Arc<Semaphore> {
        let gate = self
            .source_permits
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.settings.per_source_concurrency)));
        Arc::clone(gate.value())
    }

    async fn run_cycle(&self, source: &Source, articles: Vec<RawArticle>) -> IngestReport {
        let received = articles.len();
        let outcomes: Vec<ArticleOutcome> = stream::iter(articles)
            .map(|article| self.process_article(&source.id, article))
            .buffer_unordered(self.settings.per_source_concurrency)
            .collect()
            .await;

        let mut report = IngestReport::default();
        let mut committed = Vec::new();
        for outcome in outcomes {
            match outcome {
                ArticleOutcome::Committed(doc) => {
                    if doc.enrichment_status == EnrichmentStatus::Failed {
                        report.failed_count += 1;
                    } else {
                        report.processed_count += 1;
                    }
                    committed.push(doc);
                }
                ArticleOutcome::Duplicate => report.duplicate_count += 1,
                ArticleOutcome::Rejected => report.failed_count += 1,
            }
        }

        let now = self.parts.clock.now();
        report.alerts_generated = self.parts.alerts.evaluate_documents(&committed, now).len();
        if committed.len() > self.settings.activity_alert_threshold {
            self.parts.alerts.raise_activity_alert(source, &committed, now);
            report.alerts_generated += 1;
        }

        tracing::info!(
            source = %source.id,
            received,
            processed = report.processed_count,
            duplicates = report.duplicate_count,
            failed = report.failed_count,
            alerts = report.alerts_generated,
            "ingestion cycle complete"
        );
        report
    }

    async fn process_article(&self, source_id: &str, article: RawArticle) -> ArticleOutcome {
        let title = article.title.trim().to_string();
        if title.is_empty() {
            tracing::debug!(source = %source_id, url = %article.url, "rejecting article without title");
            return ArticleOutcome::Rejected;
        }
        let body = article.content.trim().to_string();
        let hash = content_hash(&title, &body);

        let Some(_claim) = Claim::acquire(&self.in_flight, (source_id.to_string(), hash.clone()))
        else {
            tracing::debug!(source = %source_id, hash = %hash, "duplicate already in flight");
            return ArticleOutcome::Duplicate;
        };
        match self.parts.store.contains_hash(source_id, &hash).await {
            Ok(true) => {
                tracing::debug!(source = %source_id, hash = %hash, "duplicate document skipped");
                return ArticleOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "dedup lookup failed");
                return ArticleOutcome::Rejected;
            }
        }

        let gate = self.source_gate(source_id);
        let Ok(_source_permit) = gate.acquire().await else {
            return ArticleOutcome::Rejected;
        };
        let Ok(_permit) = self.permits.acquire().await else {
            return ArticleOutcome::Rejected;
        };
        let enrichment = self.parts.enricher.enrich(&format!("{title}\n{body}")).await;
        let now = self.parts.clock.now();
        let doc = Document {
            id: Uuid::new_v4(),
            source_id: source_id.to_string(),
            url: article.url.trim().to_string(),
            title,
            body,
            content_hash: hash,
            published_at: article.published_at.unwrap_or(now),
            ingested_at: now,
            sentiment: enrichment.sentiment,
            entities: enrichment.entities,
            embedding: enrichment.embedding,
            enrichment_status: enrichment.status,
        };

        match self.parts.store.insert(doc.clone()).await {
            Ok(InsertOutcome::Inserted) => {}
            Ok(InsertOutcome::Duplicate { existing_id }) => {
                tracing::debug!(source = %source_id, existing = %existing_id, "duplicate at commit");
                return ArticleOutcome::Duplicate;
            }
            Err(e) => {
                tracing::warn!(source = %source_id, error = %e, "document commit failed");
                return ArticleOutcome::Rejected;
            }
        }

        self.index_document(&doc).await;
        self.parts.aggregator.record(&doc);
        ArticleOutcome::Committed(doc)
    }

    async fn index_document(&self, doc: &Document) {
        if !doc.is_searchable() {
            return;
        }
        let Some(embedding) = doc.embedding.as_deref() else {
            return;
        };
        let result = retry_with_backoff(self.settings.index_retry, "index.upsert", || {
            self.parts.index.upsert(doc.id, embedding, doc.published_at)
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(
                document_id = %doc.id,
                error = %e,
                "index write failed, document stored but not searchable"
            );
        }
    }
}

#[cfg(test)]
#[path = "ingest_test.rs"]
mod tests;
