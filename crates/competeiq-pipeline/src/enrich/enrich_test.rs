use std::sync::atomic::{AtomicU32, Ordering};

use super::*;

struct FixedClassifier(Sentiment);

#[async_trait]
impl SentimentClassifier for FixedClassifier {
    async fn classify_sentiment(&self, _text: &str) -> Result<Sentiment, PipelineError> {
        Ok(self.0)
    }
}

struct FixedExtractor(Vec<&'static str>);

#[async_trait]
impl EntityExtractor for FixedExtractor {
    async fn extract_entities(&self, _text: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self.0.iter().map(ToString::to_string).collect())
    }
}

struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        Ok(self.0.clone())
    }
}

/// Fails every call with a retryable error and counts attempts.
#[derive(Default)]
struct Unavailable {
    calls: AtomicU32,
}

impl Unavailable {
    fn fail<T>(&self) -> Result<T, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::Tei("status 503".to_string()))
    }
}

#[async_trait]
impl SentimentClassifier for Unavailable {
    async fn classify_sentiment(&self, _text: &str) -> Result<Sentiment, PipelineError> {
        self.fail()
    }
}

#[async_trait]
impl EntityExtractor for Unavailable {
    async fn extract_entities(&self, _text: &str) -> Result<Vec<String>, PipelineError> {
        self.fail()
    }
}

#[async_trait]
impl Embedder for Unavailable {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        self.fail()
    }
}

#[derive(Default)]
struct Stalled {
    calls: AtomicU32,
}

#[async_trait]
impl Embedder for Stalled {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(vec![1.0, 0.0, 0.0])
    }
}

fn competitors() -> Arc<[Competitor]> {
    Arc::from(vec![
        Competitor {
            id: "oneplus".to_string(),
            name: "OnePlus".to_string(),
            aliases: BTreeSet::from(["One Plus".to_string()]),
            sector: "smartphones".to_string(),
            website: None,
        },
        Competitor {
            id: "xiaomi".to_string(),
            name: "Xiaomi".to_string(),
            aliases: BTreeSet::new(),
            sector: "smartphones".to_string(),
            website: None,
        },
    ])
}

fn settings(max_retries: u32) -> EnrichmentSettings {
    EnrichmentSettings {
        timeout: Duration::from_millis(50),
        retry: BackoffPolicy::new(max_retries, 0),
        embedding_dim: 3,
    }
}

fn enricher(
    classifier: Arc<dyn SentimentClassifier>,
    extractor: Arc<dyn EntityExtractor>,
    embedder: Arc<dyn Embedder>,
    max_retries: u32,
) -> Enricher {
    Enricher::new(
        classifier,
        extractor,
        embedder,
        competitors(),
        settings(max_retries),
    )
}

#[tokio::test]
async fn all_stages_succeed_with_canonical_entities() {
    let e = enricher(
        Arc::new(FixedClassifier(Sentiment::Positive)),
        Arc::new(FixedExtractor(vec!["one plus", "XIAOMI", "Samsung"])),
        Arc::new(FixedEmbedder(vec![0.1, 0.2, 0.3])),
        2,
    );
    let out = e.enrich("OnePlus launches").await;
    assert_eq!(out.status, EnrichmentStatus::Complete);
    assert_eq!(out.sentiment, Sentiment::Positive);
    assert_eq!(
        out.entities,
        BTreeSet::from(["OnePlus".to_string(), "Xiaomi".to_string()])
    );
    assert_eq!(out.embedding, Some(vec![0.1, 0.2, 0.3]));
}

#[tokio::test]
async fn embedding_failure_yields_partial_without_vector() {
    let embedder = Arc::new(Unavailable::default());
    let e = enricher(
        Arc::new(FixedClassifier(Sentiment::Negative)),
        Arc::new(FixedExtractor(vec!["OnePlus"])),
        embedder.clone(),
        2,
    );
    let out = e.enrich("text").await;
    assert_eq!(out.status, EnrichmentStatus::Partial);
    assert!(out.embedding.is_none());
    assert_eq!(out.sentiment, Sentiment::Negative);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3, "1 try + 2 retries");
}

#[tokio::test]
async fn all_stages_failing_yields_failed_with_fallbacks() {
    let down = Arc::new(Unavailable::default());
    let e = enricher(down.clone(), down.clone(), down.clone(), 0);
    let out = e.enrich("text").await;
    assert_eq!(out.status, EnrichmentStatus::Failed);
    assert_eq!(out.sentiment, Sentiment::Neutral);
    assert!(out.entities.is_empty());
    assert!(out.embedding.is_none());
    assert_eq!(down.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn wrong_dimension_is_an_embedding_failure_and_not_retried() {
    let e = enricher(
        Arc::new(FixedClassifier(Sentiment::Neutral)),
        Arc::new(FixedExtractor(vec![])),
        Arc::new(FixedEmbedder(vec![1.0, 0.0])),
        3,
    );
    let out = e.enrich("text").await;
    assert_eq!(out.status, EnrichmentStatus::Partial);
    assert!(out.embedding.is_none());
    assert!(matches!(
        e.embed("query").await,
        Err(PipelineError::DimensionMismatch {
            expected: 3,
            actual: 2
        })
    ));
}

#[tokio::test]
async fn stalled_embedder_times_out_per_attempt() {
    let stalled = Arc::new(Stalled::default());
    let e = enricher(
        Arc::new(FixedClassifier(Sentiment::Positive)),
        Arc::new(FixedExtractor(vec!["OnePlus"])),
        stalled.clone(),
        1,
    );
    let err = e.embed("text").await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EnrichmentTimeout {
            stage: EnrichmentStage::Embedding,
            ..
        }
    ));
    assert_eq!(stalled.calls.load(Ordering::SeqCst), 2);
}
