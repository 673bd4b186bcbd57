//! Pipeline fixtures for router and scheduler tests.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{TimeZone, Utc};
use competeiq_core::parse_watchlist;
use competeiq_pipeline::enrich::{
    AliasExtractor, EnrichmentSettings, HashingEmbedder, LexiconClassifier,
};
use competeiq_pipeline::index::LinearIndex;
use competeiq_pipeline::{
    BackoffPolicy, InMemoryDocumentStore, IngestSettings, ManualClock, Pipeline, PipelineParts,
    PipelineSettings, RssFetcher,
};

const DIM: usize = 64;

pub struct TestPipeline {
    pub pipeline: Arc<Pipeline>,
    pub clock: Arc<ManualClock>,
}

/// A pipeline with local capabilities, a manual clock fixed at
/// 2025-03-01 10:05 UTC, and two sources served from `feed_base`.
pub fn test_pipeline(feed_base: &str) -> TestPipeline {
    let yaml = format!(
        r"
competitors:
  - name: OnePlus
    aliases: [One Plus]
    sector: smartphones
  - name: Xiaomi
    sector: smartphones
sources:
  - id: tech
    name: Tech News
    kind: news
    endpoint: {feed_base}/tech.xml
    polling_interval_secs: 600
  - id: forum
    name: Phone Forum
    kind: social
    endpoint: {feed_base}/forum.xml
rules:
  - id: oneplus-volume
    name: OnePlus volume spike
    kind: volume
    conditions:
      volume_threshold: 2
      competitors: [OnePlus]
"
    );
    let watchlist = parse_watchlist(&yaml).expect("test watchlist parses");
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 5, 0).unwrap(),
    ));
    let parts = PipelineParts {
        classifier: Arc::new(LexiconClassifier),
        extractor: Arc::new(AliasExtractor::new(&watchlist.competitors).expect("aliases compile")),
        embedder: Arc::new(HashingEmbedder::new(DIM)),
        fetcher: Arc::new(
            RssFetcher::new("competeiq-test/0.1", StdDuration::from_secs(5))
                .expect("http client builds"),
        ),
        index: Arc::new(LinearIndex::new(DIM)),
        store: Arc::new(InMemoryDocumentStore::new()),
        clock: clock.clone(),
    };
    let settings = PipelineSettings {
        window_secs: 3600,
        alert_cooldown_secs: 1800,
        source_failure_threshold: 3,
        degraded_poll_multiplier: 4,
        retention_days: 30,
        enrichment: EnrichmentSettings {
            timeout: StdDuration::from_secs(2),
            retry: BackoffPolicy::none(),
            embedding_dim: DIM,
        },
        ingest: IngestSettings {
            fetch_retry: BackoffPolicy::none(),
            index_retry: BackoffPolicy::none(),
            per_source_concurrency: 2,
            global_concurrency: 4,
            activity_alert_threshold: 10,
        },
    };
    TestPipeline {
        pipeline: Arc::new(Pipeline::new(watchlist, parts, settings)),
        clock,
    }
}
