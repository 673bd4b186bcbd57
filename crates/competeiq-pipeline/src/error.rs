use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// The three enrichment capabilities a document passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichmentStage {
    Sentiment,
    Entities,
    Embedding,
}

impl fmt::Display for EnrichmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStage::Sentiment => write!(f, "sentiment"),
            EnrichmentStage::Entities => write!(f, "entities"),
            EnrichmentStage::Embedding => write!(f, "embedding"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("fetch failed for source {source_id}: {reason}")]
    SourceFetch { source_id: String, reason: String },

    #[error("{stage} enrichment timed out after {timeout_ms} ms")]
    EnrichmentTimeout {
        stage: EnrichmentStage,
        timeout_ms: u64,
    },

    #[error("{stage} enrichment failed: {reason}")]
    Enrichment {
        stage: EnrichmentStage,
        reason: String,
    },

    #[error("embedding has dimension {actual}, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index write failed for document {document_id}: {reason}")]
    IndexWrite { document_id: Uuid, reason: String },

    #[error("rule {rule_id} evaluation failed: {reason}")]
    RuleEvaluation { rule_id: String, reason: String },

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("source {0} is disabled")]
    SourceDisabled(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("TEI error: {0}")]
    Tei(String),

    #[error("ingestion cycle for source {source_id} aborted: {reason}")]
    CycleAborted { source_id: String, reason: String },
}

impl PipelineError {
    /// Whether a retry after back-off may succeed.
    ///
    /// Transport failures, timeouts and remote 5xx-style errors are
    /// retryable. Malformed input, dimension mismatches and lookups of
    /// unknown entities are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            PipelineError::SourceFetch { .. }
            | PipelineError::EnrichmentTimeout { .. }
            | PipelineError::Enrichment { .. }
            | PipelineError::IndexWrite { .. }
            | PipelineError::Qdrant(_)
            | PipelineError::Tei(_) => true,
            PipelineError::Xml(_)
            | PipelineError::DimensionMismatch { .. }
            | PipelineError::RuleEvaluation { .. }
            | PipelineError::UnknownSource(_)
            | PipelineError::SourceDisabled(_)
            | PipelineError::InvalidRequest(_)
            | PipelineError::CycleAborted { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(PipelineError::SourceFetch {
            source_id: "feed".to_string(),
            reason: "status 503".to_string(),
        }
        .is_retryable());
        assert!(PipelineError::EnrichmentTimeout {
            stage: EnrichmentStage::Embedding,
            timeout_ms: 10,
        }
        .is_retryable());
        assert!(PipelineError::Qdrant("down".to_string()).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!PipelineError::DimensionMismatch {
            expected: 4,
            actual: 3
        }
        .is_retryable());
        assert!(!PipelineError::UnknownSource("x".to_string()).is_retryable());
        assert!(!PipelineError::InvalidRequest("bad".to_string()).is_retryable());
    }

    #[test]
    fn messages_name_the_stage() {
        let err = PipelineError::Enrichment {
            stage: EnrichmentStage::Entities,
            reason: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "entities enrichment failed: boom");
    }
}
