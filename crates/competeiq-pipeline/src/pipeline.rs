//! Wiring for the whole pipeline: capabilities, stores, coordinator,
//! aggregator, rule engine and query service behind one handle.

use std::sync::Arc;
use std::time::Duration;

use competeiq_core::{
    Alert, AppConfig, Competitor, SourceStatus, TrendSnapshot, Watchlist,
};
use serde::Serialize;

use crate::alerts::{AlertEngine, AlertLog, RuleStatus};
use crate::clock::{Clock, SystemClock};
use crate::enrich::{
    AliasExtractor, Embedder, Enricher, EnrichmentSettings, EntityExtractor, HashingEmbedder,
    LexiconClassifier, SentimentClassifier, TeiClassifier, TeiEmbedder,
};
use crate::error::PipelineError;
use crate::index::{LinearIndex, QdrantIndex, VectorIndex};
use crate::ingest::{IngestComponents, IngestReport, IngestSettings, IngestionCoordinator};
use crate::registry::SourceRegistry;
use crate::retry::BackoffPolicy;
use crate::search::{QueryService, SearchRequest, SearchResponse};
use crate::sources::{RawArticle, RssFetcher, SourceFetcher};
use crate::store::{DocumentStore, InMemoryDocumentStore};
use crate::trends::TrendAggregator;

/// Tunables derived from [`AppConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub window_secs: u64,
    pub alert_cooldown_secs: u64,
    pub source_failure_threshold: u32,
    pub degraded_poll_multiplier: u32,
    pub retention_days: u32,
    pub enrichment: EnrichmentSettings,
    pub ingest: IngestSettings,
}

impl PipelineSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            window_secs: config.window_secs,
            alert_cooldown_secs: config.alert_cooldown_secs,
            source_failure_threshold: config.source_failure_threshold,
            degraded_poll_multiplier: config.degraded_poll_multiplier,
            retention_days: config.retention_days,
            enrichment: EnrichmentSettings {
                timeout: Duration::from_millis(config.enrich_timeout_ms),
                retry: BackoffPolicy::new(config.enrich_max_retries, config.retry_backoff_base_ms),
                embedding_dim: config.embedding_dim,
            },
            ingest: IngestSettings {
                fetch_retry: BackoffPolicy::new(
                    config.fetch_max_retries,
                    config.retry_backoff_base_ms,
                )
                .with_jitter(),
                index_retry: BackoffPolicy::new(
                    config.index_max_retries,
                    config.retry_backoff_base_ms,
                ),
                per_source_concurrency: config.per_source_concurrency,
                global_concurrency: config.global_concurrency,
                activity_alert_threshold: config.activity_alert_threshold,
            },
        }
    }
}

/// Injected collaborators. [`Pipeline::from_config`] picks remote or local
/// implementations; tests pass their own.
#[derive(Clone)]
pub struct PipelineParts {
    pub classifier: Arc<dyn SentimentClassifier>,
    pub extractor: Arc<dyn EntityExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub index: Arc<dyn VectorIndex>,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionReport {
    pub documents_deleted: usize,
    pub windows_pruned: usize,
    pub alerts_pruned: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub documents: usize,
    pub alerts: usize,
    pub sources_active: usize,
    pub sources_degraded: usize,
    pub sources_disabled: usize,
}

pub struct Pipeline {
    competitors: Arc<[Competitor]>,
    registry: Arc<SourceRegistry>,
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    aggregator: Arc<TrendAggregator>,
    engine: Arc<AlertEngine>,
    log: Arc<AlertLog>,
    coordinator: Arc<IngestionCoordinator>,
    query: QueryService,
    clock: Arc<dyn Clock>,
    settings: PipelineSettings,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("competitors", &self.competitors.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    #[must_use]
    pub fn new(watchlist: Watchlist, parts: PipelineParts, settings: PipelineSettings) -> Self {
        let competitors: Arc<[Competitor]> = watchlist.competitors.into();
        let registry = Arc::new(SourceRegistry::new(
            watchlist.sources,
            settings.source_failure_threshold,
            settings.degraded_poll_multiplier,
        ));
        let enricher = Arc::new(Enricher::new(
            parts.classifier,
            parts.extractor,
            parts.embedder,
            competitors.clone(),
            settings.enrichment,
        ));
        let aggregator = Arc::new(TrendAggregator::new(settings.window_secs, competitors.clone()));
        let log = Arc::new(AlertLog::new());
        let engine = Arc::new(AlertEngine::new(
            watchlist.rules,
            competitors.clone(),
            log.clone(),
            settings.alert_cooldown_secs,
        ));
        let coordinator = Arc::new(IngestionCoordinator::new(
            IngestComponents {
                registry: registry.clone(),
                fetcher: parts.fetcher,
                enricher: enricher.clone(),
                store: parts.store.clone(),
                index: parts.index.clone(),
                aggregator: aggregator.clone(),
                alerts: engine.clone(),
                clock: parts.clock.clone(),
            },
            settings.ingest,
        ));
        let query = QueryService::new(
            enricher,
            parts.index.clone(),
            parts.store.clone(),
            registry.clone(),
        );
        Self {
            competitors,
            registry,
            store: parts.store,
            index: parts.index,
            aggregator,
            engine,
            log,
            coordinator,
            query,
            clock: parts.clock,
            settings,
        }
    }

    /// Build a pipeline from environment config. TEI and Qdrant are used when
    /// their URLs are set; otherwise the lexicon classifier, the hashing
    /// embedder and the in-process linear index stand in.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or alias patterns cannot be built.
    pub fn from_config(config: &AppConfig, watchlist: Watchlist) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let classifier: Arc<dyn SentimentClassifier> = match &config.sentiment_url {
            Some(url) => Arc::new(TeiClassifier::new(client.clone(), url)),
            None => Arc::new(LexiconClassifier),
        };
        let embedder: Arc<dyn Embedder> = match &config.tei_url {
            Some(url) => Arc::new(TeiEmbedder::new(client.clone(), url)),
            None => Arc::new(HashingEmbedder::new(config.embedding_dim)),
        };
        let index: Arc<dyn VectorIndex> = match &config.qdrant_url {
            Some(url) => Arc::new(QdrantIndex::new(
                client.clone(),
                url,
                &config.qdrant_collection,
                config.embedding_dim,
            )),
            None => Arc::new(LinearIndex::new(config.embedding_dim)),
        };
        tracing::info!(
            sentiment = if config.sentiment_url.is_some() { "tei" } else { "lexicon" },
            embeddings = if config.tei_url.is_some() { "tei" } else { "hashing" },
            index = if config.qdrant_url.is_some() { "qdrant" } else { "linear" },
            dimension = config.embedding_dim,
            "pipeline backends selected"
        );

        let parts = PipelineParts {
            classifier,
            extractor: Arc::new(AliasExtractor::new(&watchlist.competitors)?),
            embedder,
            fetcher: Arc::new(RssFetcher::with_client(client)),
            index,
            store: Arc::new(InMemoryDocumentStore::new()),
            clock: Arc::new(SystemClock),
        };
        Ok(Self::new(watchlist, parts, PipelineSettings::from_config(config)))
    }

    /// # Errors
    ///
    /// See [`IngestionCoordinator::ingest_batch`].
    pub async fn ingest_batch(
        &self,
        source_id: &str,
        articles: Vec<RawArticle>,
    ) -> Result<IngestReport, PipelineError> {
        self.coordinator.ingest_batch(source_id, articles).await
    }

    /// # Errors
    ///
    /// See [`IngestionCoordinator::poll_source`].
    pub async fn poll_source(&self, source_id: &str) -> Result<IngestReport, PipelineError> {
        self.coordinator.poll_source(source_id).await
    }

    pub async fn run_due_polls(&self) -> Vec<(String, Result<IngestReport, PipelineError>)> {
        self.coordinator.run_due_polls().await
    }

    /// # Errors
    ///
    /// See [`QueryService::search`].
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, PipelineError> {
        self.query.search(request).await
    }

    /// Close every elapsed window and run sentiment and volume rules over
    /// them. Returns the alerts raised.
    pub fn finalize_windows(&self) -> Vec<Alert> {
        let now = self.clock.now();
        let closed = self.aggregator.finalize_due(now);
        if closed.is_empty() {
            return Vec::new();
        }
        self.engine.evaluate_windows(&closed, now)
    }

    /// Delete documents published before the retention horizon from the
    /// store and index, and prune finalized windows and alerts older than it.
    /// A horizon reaching past the earliest representable instant deletes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns the store error if the bulk delete fails. Index deletes that
    /// fail are logged and skipped.
    pub async fn run_retention(&self) -> Result<RetentionReport, PipelineError> {
        let now = self.clock.now();
        let Some(cutoff) = chrono::Duration::try_days(i64::from(self.settings.retention_days))
            .and_then(|horizon| now.checked_sub_signed(horizon))
        else {
            tracing::warn!(
                days = self.settings.retention_days,
                "retention horizon out of range, skipping pass"
            );
            return Ok(RetentionReport::default());
        };
        let deleted = self.store.delete_published_before(cutoff).await?;
        for id in &deleted {
            if let Err(e) = self.index.delete(*id).await {
                tracing::warn!(document_id = %id, error = %e, "index delete failed during retention");
            }
        }
        let report = RetentionReport {
            documents_deleted: deleted.len(),
            windows_pruned: self.aggregator.prune_before(cutoff),
            alerts_pruned: self.log.prune_before(cutoff),
        };
        tracing::info!(
            documents = report.documents_deleted,
            windows = report.windows_pruned,
            alerts = report.alerts_pruned,
            cutoff = %cutoff,
            "retention pass complete"
        );
        Ok(report)
    }

    #[must_use]
    pub fn trend_summary(&self) -> Vec<TrendSnapshot> {
        self.aggregator.trend_summary(self.clock.now())
    }

    #[must_use]
    pub fn rule_statuses(&self) -> Vec<RuleStatus> {
        self.engine.rule_statuses(self.clock.now())
    }

    /// # Errors
    ///
    /// Returns the store error if the document count fails.
    pub async fn stats(&self) -> Result<PipelineStats, PipelineError> {
        let mut stats = PipelineStats {
            documents: self.store.count().await?,
            alerts: self.log.len(),
            ..PipelineStats::default()
        };
        for source in self.registry.list() {
            match source.status {
                SourceStatus::Active => stats.sources_active += 1,
                SourceStatus::Degraded => stats.sources_degraded += 1,
                SourceStatus::Disabled => stats.sources_disabled += 1,
            }
        }
        Ok(stats)
    }

    #[must_use]
    pub fn competitors(&self) -> &[Competitor] {
        &self.competitors
    }

    #[must_use]
    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn aggregator(&self) -> &TrendAggregator {
        &self.aggregator
    }

    #[must_use]
    pub fn alert_log(&self) -> &AlertLog {
        &self.log
    }

    #[must_use]
    pub fn engine(&self) -> &AlertEngine {
        &self.engine
    }

    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }
}
