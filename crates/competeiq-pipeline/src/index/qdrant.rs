//! Qdrant-backed [`VectorIndex`] over the REST API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use uuid::Uuid;

use super::{check_dimension, rank, Candidate, ScoredId, VectorIndex};
use crate::error::PipelineError;

/// Extra hits requested beyond `k` so that ties at the cut-off can be
/// re-ranked by recency locally.
const TIE_HEADROOM: usize = 8;

pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimension: usize,
    ready: OnceCell<()>,
}

impl std::fmt::Debug for QdrantIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantIndex")
            .field("base_url", &self.base_url)
            .field("collection", &self.collection)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorsConfig,
}

#[derive(Serialize)]
struct VectorsConfig {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize, Deserialize)]
struct PointPayload {
    document_id: Uuid,
    published_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct Point<'a> {
    id: Uuid,
    vector: &'a [f32],
    payload: PointPayload,
}

#[derive(Serialize)]
struct UpsertPointsRequest<'a> {
    points: Vec<Point<'a>>,
}

#[derive(Serialize)]
struct DeletePointsRequest {
    points: Vec<Uuid>,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    score_threshold: f32,
    with_payload: bool,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    score: f32,
    payload: Option<PointPayload>,
}

impl QdrantIndex {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        qdrant_url: &str,
        collection: &str,
        dimension: usize,
    ) -> Self {
        Self {
            client,
            base_url: qdrant_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            dimension,
            ready: OnceCell::new(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }

    /// Ensure the collection exists, creating it with cosine distance if
    /// absent. Runs at most once successfully per index.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Qdrant`] on network or API failure.
    pub async fn ensure_collection(&self) -> Result<(), PipelineError> {
        self.ready
            .get_or_try_init(|| async {
                let url = self.collection_url();
                if let Ok(resp) = self.client.get(&url).send().await {
                    if resp.status().is_success() {
                        return Ok(());
                    }
                }

                let body = CreateCollectionRequest {
                    vectors: VectorsConfig {
                        size: self.dimension,
                        distance: "Cosine",
                    },
                };
                let resp = self
                    .client
                    .put(&url)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| {
                        PipelineError::Qdrant(format!("collection create request failed: {e}"))
                    })?;
                if !resp.status().is_success() {
                    return Err(PipelineError::Qdrant(format!(
                        "collection create returned status {}",
                        resp.status()
                    )));
                }
                tracing::info!(
                    collection = %self.collection,
                    dimension = self.dimension,
                    "created Qdrant collection"
                );
                Ok(())
            })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
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
        self.ensure_collection().await?;

        let body = UpsertPointsRequest {
            points: vec![Point {
                id: document_id,
                vector: embedding,
                payload: PointPayload {
                    document_id,
                    published_at,
                },
            }],
        };
        let resp = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::IndexWrite {
                document_id,
                reason: format!("upsert request failed: {e}"),
            })?;
        if !resp.status().is_success() {
            return Err(PipelineError::IndexWrite {
                document_id,
                reason: format!("upsert returned status {}", resp.status()),
            });
        }
        Ok(())
    }

    async fn delete(&self, document_id: Uuid) -> Result<(), PipelineError> {
        self.ensure_collection().await?;
        let resp = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&DeletePointsRequest {
                points: vec![document_id],
            })
            .send()
            .await
            .map_err(|e| PipelineError::Qdrant(format!("delete request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Qdrant(format!(
                "delete returned status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredId>, PipelineError> {
        check_dimension(self.dimension, embedding)?;
        if k == 0 {
            return Ok(Vec::new());
        }
        self.ensure_collection().await?;

        let body = SearchRequest {
            vector: embedding,
            limit: k.saturating_add(TIE_HEADROOM),
            score_threshold: threshold,
            with_payload: true,
        };
        let resp = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Qdrant(format!("search request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(PipelineError::Qdrant(format!(
                "search returned status {}",
                resp.status()
            )));
        }
        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Qdrant(format!("search response parse error: {e}")))?;

        let candidates = parsed
            .result
            .into_iter()
            .filter_map(|hit| {
                hit.payload.map(|p| Candidate {
                    document_id: p.document_id,
                    score: hit.score,
                    published_at: p.published_at,
                })
            })
            .collect();
        Ok(rank(candidates, k, threshold))
    }

    async fn contains(&self, document_id: Uuid) -> Result<bool, PipelineError> {
        self.ensure_collection().await?;
        let resp = self
            .client
            .get(format!("{}/points/{document_id}", self.collection_url()))
            .send()
            .await
            .map_err(|e| PipelineError::Qdrant(format!("point lookup failed: {e}")))?;
        Ok(resp.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn server_with_collection() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn creates_missing_collection_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/docs"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs"))
            .and(body_partial_json(
                json!({"vectors": {"size": 3, "distance": "Cosine"}}),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": true})))
            .expect(1)
            .mount(&server)
            .await;

        let index = QdrantIndex::new(reqwest::Client::new(), &server.uri(), "docs", 3);
        index.ensure_collection().await.unwrap();
        index.ensure_collection().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_sends_point_with_payload() {
        let server = server_with_collection().await;
        let id = Uuid::new_v4();
        Mock::given(method("PUT"))
            .and(path("/collections/docs/points"))
            .and(body_partial_json(json!({
                "points": [{"id": id.to_string(), "vector": [1.0, 0.0, 0.0]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let index = QdrantIndex::new(reqwest::Client::new(), &server.uri(), "docs", 3);
        index.upsert(id, &[1.0, 0.0, 0.0], Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn upsert_failure_is_an_index_write_error() {
        let server = server_with_collection().await;
        Mock::given(method("PUT"))
            .and(path("/collections/docs/points"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let index = QdrantIndex::new(reqwest::Client::new(), &server.uri(), "docs", 2);
        let err = index
            .upsert(Uuid::new_v4(), &[1.0, 0.0], Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::IndexWrite { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn query_reranks_ties_and_applies_threshold() {
        let server = server_with_collection().await;
        let now = Utc::now();
        let older = Uuid::new_v4();
        let newer = Uuid::new_v4();
        let weak = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path("/collections/docs/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": older.to_string(), "score": 0.9,
                     "payload": {"document_id": older, "published_at": now - Duration::days(1)}},
                    {"id": newer.to_string(), "score": 0.9,
                     "payload": {"document_id": newer, "published_at": now}},
                    {"id": weak.to_string(), "score": 0.5,
                     "payload": {"document_id": weak, "published_at": now}}
                ],
                "status": "ok"
            })))
            .mount(&server)
            .await;

        let index = QdrantIndex::new(reqwest::Client::new(), &server.uri(), "docs", 2);
        let hits = index.query(&[1.0, 0.0], 10, 0.7).await.unwrap();
        let ids: Vec<Uuid> = hits.iter().map(|h| h.document_id).collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[tokio::test]
    async fn query_rejects_wrong_dimension_without_network() {
        let index = QdrantIndex::new(reqwest::Client::new(), "http://127.0.0.1:1", "docs", 4);
        let err = index.query(&[1.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }
}
