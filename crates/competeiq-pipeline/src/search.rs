//! Semantic search over committed documents.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use competeiq_core::{Document, Sentiment, SourceKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::registry::SourceRegistry;
use crate::store::DocumentStore;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_threshold: Option<f32>,
}

impl SearchRequest {
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            similarity_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitSource {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<SourceKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub sentiment: Sentiment,
    pub similarity_score: f32,
    pub source: HitSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total: usize,
}

impl SearchResponse {
    fn empty(query: String) -> Self {
        Self {
            query,
            results: Vec::new(),
            total: 0,
        }
    }
}

#[derive(Clone)]
pub struct QueryService {
    enricher: Arc<Enricher>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn DocumentStore>,
    registry: Arc<SourceRegistry>,
}

impl std::fmt::Debug for QueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryService")
            .field("enricher", &self.enricher)
            .field("dimension", &self.index.dimension())
            .finish_non_exhaustive()
    }
}

impl QueryService {
    #[must_use]
    pub fn new(
        enricher: Arc<Enricher>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn DocumentStore>,
        registry: Arc<SourceRegistry>,
    ) -> Self {
        Self {
            enricher,
            index,
            store,
            registry,
        }
    }

    /// Embed the query, rank indexed documents by cosine similarity and join
    /// them with their stored metadata.
    ///
    /// An empty or whitespace-only query returns no results without calling
    /// the embedder. `limit` is clamped to `1..=100`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] for a threshold outside `[-1, 1]`;
    /// embedding, index or store errors otherwise.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, PipelineError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(SearchResponse::empty(request.query.clone()));
        }
        let threshold = request
            .similarity_threshold
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(PipelineError::InvalidRequest(format!(
                "similarity_threshold must be within [-1, 1], got {threshold}"
            )));
        }
        let limit = request.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let embedding = self.enricher.embed(query).await?;
        let scored = self.index.query(&embedding, limit * 2, threshold).await?;
        if scored.is_empty() {
            return Ok(SearchResponse::empty(request.query.clone()));
        }

        let ids: Vec<Uuid> = scored.iter().map(|s| s.document_id).collect();
        let docs: HashMap<Uuid, Document> = self
            .store
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|d| (d.id, d))
            .collect();

        let results: Vec<SearchHit> = scored
            .iter()
            .filter(|s| s.score >= threshold)
            .filter_map(|s| {
                let doc = docs.get(&s.document_id)?;
                doc.is_searchable().then(|| self.hit(doc, s.score))
            })
            .take(limit)
            .collect();

        tracing::debug!(query = %query, hits = results.len(), "search complete");
        Ok(SearchResponse {
            query: request.query.clone(),
            total: results.len(),
            results,
        })
    }

    fn hit(&self, doc: &Document, score: f32) -> SearchHit {
        let source = self.registry.get(&doc.source_id).map_or_else(
            || HitSource {
                name: doc.source_id.clone(),
                kind: None,
            },
            |s| HitSource {
                name: s.name,
                kind: Some(s.kind),
            },
        );
        SearchHit {
            id: doc.id,
            title: doc.title.clone(),
            content: doc.body.clone(),
            url: doc.url.clone(),
            date: doc.published_at,
            sentiment: doc.sentiment,
            similarity_score: score,
            source,
        }
    }
}
