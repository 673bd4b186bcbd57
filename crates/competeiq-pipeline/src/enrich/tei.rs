//! TEI (Text Embeddings Inference) adapters for embeddings and
//! sequence-classification sentiment models.

use async_trait::async_trait;
use competeiq_core::Sentiment;
use serde::{Deserialize, Serialize};

use super::{Embedder, SentimentClassifier};
use crate::error::PipelineError;

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [&'a str],
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    score: f32,
    label: String,
}

/// `/predict` answers a single input with a flat list, but some TEI
/// versions wrap it in an outer list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PredictResponse {
    Flat(Vec<Prediction>),
    Nested(Vec<Vec<Prediction>>),
}

impl PredictResponse {
    fn into_predictions(self) -> Vec<Prediction> {
        match self {
            PredictResponse::Flat(p) => p,
            PredictResponse::Nested(mut p) => {
                if p.is_empty() {
                    Vec::new()
                } else {
                    p.swap_remove(0)
                }
            }
        }
    }
}

/// Calls `POST {tei_url}/embed`.
#[derive(Debug, Clone)]
pub struct TeiEmbedder {
    client: reqwest::Client,
    url: String,
}

impl TeiEmbedder {
    #[must_use]
    pub fn new(client: reqwest::Client, tei_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/embed", tei_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl Embedder for TeiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PipelineError> {
        let inputs = [text];
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequest { inputs: &inputs })
            .send()
            .await
            .map_err(|e| PipelineError::Tei(format!("TEI request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::Tei(format!(
                "TEI returned status {}",
                response.status()
            )));
        }

        let mut embeddings: Vec<Vec<f32>> = response
            .json()
            .await
            .map_err(|e| PipelineError::Tei(format!("TEI response parse error: {e}")))?;

        if embeddings.len() != 1 {
            return Err(PipelineError::Tei(format!(
                "TEI returned {} embeddings for 1 input",
                embeddings.len()
            )));
        }
        Ok(embeddings.swap_remove(0))
    }
}

/// Calls `POST {url}/predict` on a sentiment classification model and maps
/// the top label onto [`Sentiment`].
#[derive(Debug, Clone)]
pub struct TeiClassifier {
    client: reqwest::Client,
    url: String,
}

impl TeiClassifier {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            url: format!("{}/predict", base_url.trim_end_matches('/')),
        }
    }
}

/// Map a model label onto a sentiment. Recognises word labels
/// (`positive`, `NEG`, ...), star ratings (`1 star` .. `5 stars`) and the
/// three-class `LABEL_0..2` convention (negative, neutral, positive).
fn label_to_sentiment(label: &str) -> Option<Sentiment> {
    let l = label.trim().to_ascii_lowercase();
    if l.starts_with("pos") {
        return Some(Sentiment::Positive);
    }
    if l.starts_with("neg") {
        return Some(Sentiment::Negative);
    }
    if l.starts_with("neu") {
        return Some(Sentiment::Neutral);
    }
    match l.as_str() {
        "label_0" | "1 star" | "2 stars" => Some(Sentiment::Negative),
        "label_1" | "3 stars" => Some(Sentiment::Neutral),
        "label_2" | "4 stars" | "5 stars" => Some(Sentiment::Positive),
        _ => None,
    }
}

#[async_trait]
impl SentimentClassifier for TeiClassifier {
    async fn classify_sentiment(&self, text: &str) -> Result<Sentiment, PipelineError> {
        let response = self
            .client
            .post(&self.url)
            .json(&PredictRequest { inputs: text })
            .send()
            .await
            .map_err(|e| PipelineError::Tei(format!("TEI predict request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::Tei(format!(
                "TEI predict returned status {}",
                response.status()
            )));
        }

        let parsed: PredictResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Tei(format!("TEI predict parse error: {e}")))?;

        let top = parsed
            .into_predictions()
            .into_iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .ok_or_else(|| PipelineError::Tei("TEI predict returned no labels".to_string()))?;

        label_to_sentiment(&top.label).ok_or_else(|| PipelineError::Enrichment {
            stage: crate::error::EnrichmentStage::Sentiment,
            reason: format!("unrecognised sentiment label '{}'", top.label),
        })
    }
}
