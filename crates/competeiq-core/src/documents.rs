use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentiment label attached to a document or alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Weight used by trend aggregation: positive = 1, neutral = 0.5, negative = 0.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Sentiment::Positive => 1.0,
            Sentiment::Neutral => 0.5,
            Sentiment::Negative => 0.0,
        }
    }

    /// Map an averaged weight in `[0, 1]` back onto a label.
    #[must_use]
    pub fn from_average(avg: f64) -> Self {
        if avg >= 0.6 {
            Sentiment::Positive
        } else if avg <= 0.4 {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "pos" => Ok(Sentiment::Positive),
            "negative" | "neg" => Ok(Sentiment::Negative),
            "neutral" | "neu" => Ok(Sentiment::Neutral),
            other => Err(format!("unknown sentiment label '{other}'")),
        }
    }
}

/// Lifecycle of a document's enrichment.
///
/// `Pending` only exists while enrichment is in flight; every committed
/// document carries one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    Pending,
    Complete,
    Partial,
    Failed,
}

impl EnrichmentStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, EnrichmentStatus::Pending)
    }

    /// Whether documents in this state feed trend windows.
    #[must_use]
    pub fn counts_toward_trends(self) -> bool {
        matches!(self, EnrichmentStatus::Complete | EnrichmentStatus::Partial)
    }
}

impl fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnrichmentStatus::Pending => write!(f, "pending"),
            EnrichmentStatus::Complete => write!(f, "complete"),
            EnrichmentStatus::Partial => write!(f, "partial"),
            EnrichmentStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One ingested article or post plus its enrichment results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub source_id: String,
    pub url: String,
    pub title: String,
    pub body: String,
    /// Hex SHA-256 over the normalized title and body.
    pub content_hash: String,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub sentiment: Sentiment,
    /// Canonical competitor names mentioned in the document.
    pub entities: BTreeSet<String>,
    /// Never serialized over the API; `None` when embedding generation failed.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub enrichment_status: EnrichmentStatus,
}

impl Document {
    /// Documents that may appear in semantic search results.
    #[must_use]
    pub fn is_searchable(&self) -> bool {
        self.enrichment_status != EnrichmentStatus::Failed && self.embedding.is_some()
    }

    /// Documents that feed trend aggregation.
    #[must_use]
    pub fn counts_toward_trends(&self) -> bool {
        self.enrichment_status.counts_toward_trends() && !self.entities.is_empty()
    }

    /// Title and body joined the way enrichers and keyword rules see them.
    #[must_use]
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(status: EnrichmentStatus, entities: &[&str], embedding: Option<Vec<f32>>) -> Document {
        Document {
            id: Uuid::new_v4(),
            source_id: "gadgets360".to_string(),
            url: "https://example.com/a".to_string(),
            title: "Title".to_string(),
            body: "Body".to_string(),
            content_hash: "abc".to_string(),
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            sentiment: Sentiment::Neutral,
            entities: entities.iter().map(ToString::to_string).collect(),
            embedding,
            enrichment_status: status,
        }
    }

    #[test]
    fn sentiment_weights_match_aggregation_mapping() {
        assert!((Sentiment::Positive.weight() - 1.0).abs() < f64::EPSILON);
        assert!((Sentiment::Neutral.weight() - 0.5).abs() < f64::EPSILON);
        assert!(Sentiment::Negative.weight().abs() < f64::EPSILON);
    }

    #[test]
    fn sentiment_from_average_buckets() {
        assert_eq!(Sentiment::from_average(1.0), Sentiment::Positive);
        assert_eq!(Sentiment::from_average(0.5), Sentiment::Neutral);
        assert_eq!(Sentiment::from_average(0.1), Sentiment::Negative);
    }

    #[test]
    fn sentiment_parses_case_insensitively() {
        assert_eq!("POSITIVE".parse::<Sentiment>(), Ok(Sentiment::Positive));
        assert_eq!(" neg ".parse::<Sentiment>(), Ok(Sentiment::Negative));
        assert!("meh".parse::<Sentiment>().is_err());
    }

    #[test]
    fn failed_documents_are_not_searchable_even_with_embedding() {
        let d = doc(EnrichmentStatus::Failed, &[], Some(vec![1.0]));
        assert!(!d.is_searchable());
    }

    #[test]
    fn partial_without_embedding_is_not_searchable() {
        let d = doc(EnrichmentStatus::Partial, &["OnePlus"], None);
        assert!(!d.is_searchable());
        assert!(d.counts_toward_trends());
    }

    #[test]
    fn documents_without_entities_do_not_count_toward_trends() {
        let d = doc(EnrichmentStatus::Complete, &[], Some(vec![1.0]));
        assert!(!d.counts_toward_trends());
    }

    #[test]
    fn embedding_is_not_serialized() {
        let d = doc(EnrichmentStatus::Complete, &["OnePlus"], Some(vec![0.5, 0.5]));
        let json = serde_json::to_value(&d).expect("serialize");
        assert!(json.get("embedding").is_none());
        assert_eq!(json["enrichment_status"], "complete");
    }
}
