use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{check_dimension, cosine_similarity, rank, Candidate, ScoredId, VectorIndex};
use crate::error::PipelineError;

#[derive(Debug)]
struct Entry {
    vector: Vec<f32>,
    published_at: DateTime<Utc>,
}

/// Exact in-process index: every query scans every vector.
#[derive(Debug)]
pub struct LinearIndex {
    dimension: usize,
    entries: RwLock<HashMap<Uuid, Entry>>,
}

impl LinearIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for LinearIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        published_at: DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        check_dimension(self.dimension, embedding)?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                document_id,
                Entry {
                    vector: embedding.to_vec(),
                    published_at,
                },
            );
        Ok(())
    }

    async fn delete(&self, document_id: Uuid) -> Result<(), PipelineError> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&document_id);
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredId>, PipelineError> {
        check_dimension(self.dimension, embedding)?;
        let candidates: Vec<Candidate> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, e)| Candidate {
                document_id: *id,
                score: cosine_similarity(embedding, &e.vector),
                published_at: e.published_at,
            })
            .collect();
        Ok(rank(candidates, k, threshold))
    }

    async fn contains(&self, document_id: Uuid) -> Result<bool, PipelineError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&document_id))
    }
}
