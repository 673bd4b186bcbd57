//! Enrichment capabilities and the per-document enricher.
//!
//! Each capability is an injected trait object. [`Enricher`] runs all three
//! concurrently for a document, each under its own timeout and retry budget,
//! and folds failures into fallbacks instead of errors.

mod aliases;
mod hashing;
mod lexicon;
mod tei;

pub use aliases::AliasExtractor;
pub use hashing::HashingEmbedder;
pub use lexicon::{lexicon_score, LexiconClassifier};
pub use tei::{TeiClassifier, TeiEmbedder};

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use competeiq_core::{Competitor, EnrichmentStatus, Sentiment};

use crate::error::{EnrichmentStage, PipelineError};
use crate::retry::{retry_with_backoff, BackoffPolicy};

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify_sentiment(&self, text: &str) -> Result<Sentiment, PipelineError>;
}

#[async_trait]
pub trait EntityExtractor: Send + Sync {
    /// Competitor names mentioned in `text`, in any spelling the extractor
    /// recognises. The enricher canonicalises them.
    async fn extract_entities(&self, text: &str) -> Result<Vec<String>, PipelineError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError>;
}

/// Per-call budget shared by all three stages.
#[derive(Debug, Clone, Copy)]
pub struct EnrichmentSettings {
    pub timeout: Duration,
    pub retry: BackoffPolicy,
    pub embedding_dim: usize,
}

/// Result of enriching one document. Always produced; failures show up as
/// fallbacks plus a degraded status.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub sentiment: Sentiment,
    pub entities: BTreeSet<String>,
    pub embedding: Option<Vec<f32>>,
    pub status: EnrichmentStatus,
}

pub struct Enricher {
    classifier: Arc<dyn SentimentClassifier>,
    extractor: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn Embedder>,
    competitors: Arc<[Competitor]>,
    settings: EnrichmentSettings,
}

impl std::fmt::Debug for Enricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enricher")
            .field("competitors", &self.competitors.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Enricher {
    #[must_use]
    pub fn new(
        classifier: Arc<dyn SentimentClassifier>,
        extractor: Arc<dyn EntityExtractor>,
        embedder: Arc<dyn Embedder>,
        competitors: Arc<[Competitor]>,
        settings: EnrichmentSettings,
    ) -> Self {
        Self {
            classifier,
            extractor,
            embedder,
            competitors,
            settings,
        }
    }

    #[must_use]
    pub fn embedding_dim(&self) -> usize {
        self.settings.embedding_dim
    }

    /// Run sentiment, entity and embedding enrichment concurrently.
    ///
    /// Fallbacks: sentiment → neutral, entities → empty, embedding → absent.
    /// Status is `complete` with no failures, `failed` when all three
    /// failed, and `partial` otherwise.
    pub async fn enrich(&self, text: &str) -> Enrichment {
        let (sentiment, entities, embedding) = tokio::join!(
            self.call(EnrichmentStage::Sentiment, || {
                self.classifier.classify_sentiment(text)
            }),
            self.call(EnrichmentStage::Entities, || {
                self.extractor.extract_entities(text)
            }),
            self.embed(text),
        );

        let failures = [sentiment.is_err(), entities.is_err(), embedding.is_err()]
            .into_iter()
            .filter(|failed| *failed)
            .count();
        let status = match failures {
            0 => EnrichmentStatus::Complete,
            3 => EnrichmentStatus::Failed,
            _ => EnrichmentStatus::Partial,
        };

        Enrichment {
            sentiment: sentiment.unwrap_or(Sentiment::Neutral),
            entities: entities
                .map(|names| self.canonicalize(&names))
                .unwrap_or_default(),
            embedding: embedding.ok(),
            status,
        }
    }

    /// Embed `text` under the embedding budget, rejecting vectors of the
    /// wrong dimension. Used for documents and for search queries.
    ///
    /// # Errors
    ///
    /// Returns the last embedding error once retries are exhausted, or
    /// [`PipelineError::DimensionMismatch`].
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let expected = self.settings.embedding_dim;
        self.call(EnrichmentStage::Embedding, || async move {
            let vector = self.embedder.embed(text).await?;
            if vector.len() == expected {
                Ok(vector)
            } else {
                Err(PipelineError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                })
            }
        })
        .await
    }

    /// Map extracted names onto catalog competitor names; unknown names are
    /// dropped.
    fn canonicalize(&self, names: &[String]) -> BTreeSet<String> {
        names
            .iter()
            .filter_map(|name| {
                self.competitors
                    .iter()
                    .find(|c| c.is_named(name))
                    .map(|c| c.name.clone())
            })
            .collect()
    }

    async fn call<T, F, Fut>(&self, stage: EnrichmentStage, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let timeout = self.settings.timeout;
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        let name = match stage {
            EnrichmentStage::Sentiment => "enrich.sentiment",
            EnrichmentStage::Entities => "enrich.entities",
            EnrichmentStage::Embedding => "enrich.embedding",
        };
        let result = retry_with_backoff(self.settings.retry, name, || {
            let attempt = op();
            async move {
                tokio::time::timeout(timeout, attempt)
                    .await
                    .map_err(|_| PipelineError::EnrichmentTimeout { stage, timeout_ms })?
            }
        })
        .await;

        if let Err(e) = &result {
            tracing::warn!(stage = %stage, error = %e, "enrichment stage exhausted, using fallback");
        }
        result
    }
}

#[cfg(test)]
#[path = "enrich_test.rs"]
mod tests;
