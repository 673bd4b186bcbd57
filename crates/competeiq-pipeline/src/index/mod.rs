//! Similarity search over document embeddings.

mod linear;
mod qdrant;

pub use linear::LinearIndex;
pub use qdrant::QdrantIndex;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoredId {
    pub document_id: Uuid,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The fixed embedding dimension this index accepts.
    fn dimension(&self) -> usize;

    /// Insert or replace the vector for `document_id`. `published_at` is
    /// kept alongside it to break score ties.
    async fn upsert(
        &self,
        document_id: Uuid,
        embedding: &[f32],
        published_at: DateTime<Utc>,
    ) -> Result<(), PipelineError>;

    async fn delete(&self, document_id: Uuid) -> Result<(), PipelineError>;

    /// Up to `k` hits with cosine similarity `>= threshold`, ordered by
    /// score descending and then by newer `published_at`.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredId>, PipelineError>;

    async fn contains(&self, document_id: Uuid) -> Result<bool, PipelineError>;
}

pub(crate) fn check_dimension(expected: usize, embedding: &[f32]) -> Result<(), PipelineError> {
    if embedding.len() == expected {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch {
            expected,
            actual: embedding.len(),
        })
    }
}

/// Cosine similarity; `0.0` when either vector has zero norm.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let score = (dot / (na.sqrt() * nb.sqrt())) as f32;
    score
}

/// A candidate hit before ranking.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Candidate {
    pub document_id: Uuid,
    pub score: f32,
    pub published_at: DateTime<Utc>,
}

/// Threshold, order and truncate candidates.
pub(crate) fn rank(mut candidates: Vec<Candidate>, k: usize, threshold: f32) -> Vec<ScoredId> {
    candidates.retain(|c| c.score >= threshold);
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.published_at.cmp(&a.published_at))
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
    candidates.truncate(k);
    candidates
        .into_iter()
        .map(|c| ScoredId {
            document_id: c.document_id,
            score: c.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn rank_breaks_ties_by_recency() {
        let now = Utc::now();
        let older = Candidate {
            document_id: Uuid::new_v4(),
            score: 0.9,
            published_at: now - Duration::days(1),
        };
        let newer = Candidate {
            document_id: Uuid::new_v4(),
            score: 0.9,
            published_at: now,
        };
        let best = Candidate {
            document_id: Uuid::new_v4(),
            score: 0.95,
            published_at: now - Duration::days(3),
        };
        let weak = Candidate {
            document_id: Uuid::new_v4(),
            score: 0.2,
            published_at: now,
        };
        let ranked = rank(vec![older, weak, newer, best], 10, 0.7);
        let ids: Vec<Uuid> = ranked.iter().map(|s| s.document_id).collect();
        assert_eq!(ids, vec![best.document_id, newer.document_id, older.document_id]);
        assert_eq!(rank(vec![older, newer, best], 1, 0.0).len(), 1);
    }
}
