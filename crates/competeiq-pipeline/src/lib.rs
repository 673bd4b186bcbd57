//! The CompeteIQ ingestion → enrichment → indexing → aggregation → alerting
//! pipeline.
//!
//! [`Pipeline`] wires every component together; the individual modules are
//! public so binaries and tests can assemble their own variants.

pub mod alerts;
pub mod clock;
pub mod content;
pub mod enrich;
pub mod error;
pub mod index;
pub mod ingest;
pub mod pipeline;
pub mod registry;
pub mod retry;
pub mod search;
pub mod sources;
pub mod store;
pub mod trends;

pub use alerts::{AlertEngine, AlertFilter, AlertLog, RulePhase, RuleStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use content::content_hash;
pub use error::{EnrichmentStage, PipelineError};
pub use ingest::{IngestReport, IngestSettings, IngestionCoordinator};
pub use pipeline::{Pipeline, PipelineParts, PipelineSettings, PipelineStats, RetentionReport};
pub use registry::SourceRegistry;
pub use retry::{retry_with_backoff, BackoffPolicy};
pub use search::{QueryService, SearchHit, SearchRequest, SearchResponse};
pub use sources::{RawArticle, RssFetcher, SourceFetcher};
pub use store::{DocumentFilter, DocumentStore, InMemoryDocumentStore, InsertOutcome};
pub use trends::{TrendAggregator, WindowClosed, WindowFilter};
