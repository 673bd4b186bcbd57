//! Document storage behind a trait, with an in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use competeiq_core::{Document, EnrichmentStatus, Sentiment};
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::error::PipelineError;

/// Result of a store insert. Duplicates are an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate { existing_id: Uuid },
}

/// Filters for [`DocumentStore::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub source_id: Option<String>,
    /// Canonical competitor name, compared case-insensitively.
    pub competitor: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub status: Option<EnrichmentStatus>,
    pub published_since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl DocumentFilter {
    fn matches(&self, doc: &Document) -> bool {
        self.source_id.as_ref().is_none_or(|s| *s == doc.source_id)
            && self.competitor.as_ref().is_none_or(|c| {
                doc.entities.iter().any(|e| e.eq_ignore_ascii_case(c))
            })
            && self.sentiment.is_none_or(|s| s == doc.sentiment)
            && self.status.is_none_or(|s| s == doc.enrichment_status)
            && self.published_since.is_none_or(|t| doc.published_at >= t)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document. `(source_id, content_hash)` is unique: a second
    /// insert with the same pair reports [`InsertOutcome::Duplicate`] and
    /// leaves the store unchanged.
    async fn insert(&self, doc: Document) -> Result<InsertOutcome, PipelineError>;

    async fn contains_hash(&self, source_id: &str, content_hash: &str)
        -> Result<bool, PipelineError>;

    async fn get(&self, id: Uuid) -> Result<Option<Document>, PipelineError>;

    /// Fetch several documents, preserving the order of `ids` and skipping
    /// any that do not exist.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Document>, PipelineError>;

    /// Matching documents, newest `published_at` first.
    async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, PipelineError>;

    async fn delete(&self, id: Uuid) -> Result<bool, PipelineError>;

    /// Delete every document published strictly before `cutoff`. Returns
    /// the ids removed.
    async fn delete_published_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, PipelineError>;

    async fn count(&self) -> Result<usize, PipelineError>;
}

type HashKey = (String, String);

/// Process-local store. The hash index is the single commit point: a
/// document becomes visible only after it wins the `(source_id, hash)` slot.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    by_id: DashMap<Uuid, Arc<Document>>,
    by_hash: DashMap<HashKey, Uuid>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, doc: Document) -> Result<InsertOutcome, PipelineError> {
        match self
            .by_hash
            .entry((doc.source_id.clone(), doc.content_hash.clone()))
        {
            Entry::Occupied(slot) => {
                return Ok(InsertOutcome::Duplicate {
                    existing_id: *slot.get(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(doc.id);
            }
        }
        self.by_id.insert(doc.id, Arc::new(doc));
        Ok(InsertOutcome::Inserted)
    }

    async fn contains_hash(
        &self,
        source_id: &str,
        content_hash: &str,
    ) -> Result<bool, PipelineError> {
        Ok(self
            .by_hash
            .contains_key(&(source_id.to_string(), content_hash.to_string())))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Document>, PipelineError> {
        Ok(self.by_id.get(&id).map(|entry| Document::clone(entry.value())))
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Document>, PipelineError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.by_id.get(id).map(|entry| Arc::clone(entry.value())))
            .map(|d| (*d).clone())
            .collect())
    }

    async fn list(&self, filter: &DocumentFilter) -> Result<Vec<Document>, PipelineError> {
        let mut docs: Vec<Arc<Document>> = self
            .by_id
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        docs.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.ingested_at.cmp(&a.ingested_at))
        });
        if let Some(limit) = filter.limit {
            docs.truncate(limit);
        }
        Ok(docs.into_iter().map(|d| (*d).clone()).collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, PipelineError> {
        let Some((_, doc)) = self.by_id.remove(&id) else {
            return Ok(false);
        };
        self.by_hash
            .remove(&(doc.source_id.clone(), doc.content_hash.clone()));
        Ok(true)
    }

    async fn delete_published_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, PipelineError> {
        let expired: Vec<Uuid> = self
            .by_id
            .iter()
            .filter(|entry| entry.value().published_at < cutoff)
            .map(|entry| *entry.key())
            .collect();
        let mut removed = Vec::with_capacity(expired.len());
        for id in expired {
            if self.delete(id).await? {
                removed.push(id);
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize, PipelineError> {
        Ok(self.by_id.len())
    }
}
