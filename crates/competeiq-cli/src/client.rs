//! Thin HTTP client for the competeiq-server API envelope.

use std::time::Duration;

use anyhow::Context;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Clone)]
pub(crate) struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub(crate) fn new(base_url: &str, api_key: Option<&str>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("competeiq-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToOwned::to_owned),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// GET `path` with `query` parameters and unwrap the `data` field.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success response,
    /// carrying the server's error code and message when present.
    pub(crate) async fn get<T, Q>(&self, path: &str, query: &Q) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.authorize(self.http.get(self.url(path)).query(query));
        Self::send(request, path).await
    }

    /// POST a JSON body to `path` and unwrap the `data` field.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::get`].
    pub(crate) async fn post<T, B>(&self, path: &str, body: &B) -> anyhow::Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let request = self.authorize(self.http.post(self.url(path)).json(body));
        Self::send(request, path).await
    }

    async fn send<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> anyhow::Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("request to {path} failed"))?;
        let status = response.status();
        tracing::debug!(path, %status, "api response");
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response from {path}"))?;

        if !status.is_success() {
            return Err(match serde_json::from_slice::<ErrorEnvelope>(&body) {
                Ok(envelope) => anyhow::anyhow!(
                    "{path}: {} ({status}): {}",
                    envelope.error.code,
                    envelope.error.message
                ),
                Err(_) => anyhow::anyhow!("{path}: unexpected status {status}"),
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .with_context(|| format!("unexpected response body from {path}"))?;
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn get_unwraps_data_and_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/alerts"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [1, 2, 3],
                "meta": {"request_id": "r", "timestamp": "2025-03-01T00:00:00Z"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&format!("{}/", server.uri()), Some("k1")).unwrap();
        let data: Vec<u32> = client.get("alerts", &[("limit", "5")]).await.unwrap();
        assert_eq!(data, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/search"))
            .and(body_json(json!({"query": "oneplus"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"ok": true},
                "meta": {"request_id": "r", "timestamp": "2025-03-01T00:00:00Z"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap();
        let data: serde_json::Value = client
            .post("search", &json!({"query": "oneplus"}))
            .await
            .unwrap();
        assert_eq!(data["ok"], true);
    }

    #[tokio::test]
    async fn error_envelope_becomes_readable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/sources/nope/poll"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {"code": "unknown_source", "message": "unknown source: nope"},
                "meta": {"request_id": "r", "timestamp": "2025-03-01T00:00:00Z"}
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap();
        let err = client
            .post::<serde_json::Value, _>("sources/nope/poll", &json!({}))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown_source"), "{message}");
        assert!(message.contains("unknown source: nope"), "{message}");
    }

    #[tokio::test]
    async fn non_envelope_errors_report_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/sources"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None).unwrap();
        let no_query: [(&str, &str); 0] = [];
        let err = client
            .get::<serde_json::Value, _>("sources", &no_query)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("502"));
    }
}
