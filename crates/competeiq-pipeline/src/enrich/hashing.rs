//! Offline feature-hashing embedder.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::Embedder;
use crate::error::PipelineError;

/// Deterministic bag-of-words embedding: each lowercase token is hashed
/// into one of `dimension` buckets with a signed weight, and the result is
/// L2-normalised. Texts sharing vocabulary land close together, which is
/// enough for local runs without a TEI server.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            #[allow(clippy::cast_possible_truncation)]
            let bucket = (u64::from_be_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        Ok(self.embed_text(text))
    }
}
