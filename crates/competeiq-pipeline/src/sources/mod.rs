//! Source fetchers turn a registered [`Source`] into raw articles.

mod rss;

pub use rss::{parse_rss_feed, strip_html};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use competeiq_core::Source;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Maximum items taken from one feed per poll.
const MAX_ITEMS_PER_FETCH: usize = 200;

/// An article as fetched or pushed, before hashing and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArticle {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, rename = "date", skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawArticle>, PipelineError>;
}

/// Fetches RSS 2.0 feeds from `source.endpoint`.
#[derive(Debug, Clone)]
pub struct RssFetcher {
    client: reqwest::Client,
    max_items: usize,
}

impl RssFetcher {
    /// # Errors
    ///
    /// Returns [`PipelineError::Http`] if the HTTP client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self::with_client(client))
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_items: MAX_ITEMS_PER_FETCH,
        }
    }
}

#[async_trait]
impl SourceFetcher for RssFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawArticle>, PipelineError> {
        let response = self
            .client
            .get(&source.endpoint)
            .send()
            .await
            .map_err(|e| PipelineError::SourceFetch {
                source_id: source.id.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::SourceFetch {
                source_id: source.id.clone(),
                reason: format!("feed returned status {status}"),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::SourceFetch {
                source_id: source.id.clone(),
                reason: format!("failed to read feed body: {e}"),
            })?;

        let articles = parse_rss_feed(&body, self.max_items)?;
        tracing::debug!(source = %source.id, count = articles.len(), "fetched feed items");
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use competeiq_core::{SourceKind, SourceStatus};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn source(endpoint: String) -> Source {
        Source {
            id: "gadgets".to_string(),
            name: "Gadgets".to_string(),
            kind: SourceKind::News,
            endpoint,
            polling_interval_secs: 600,
            last_polled_at: None,
            consecutive_failure_count: 0,
            status: SourceStatus::Active,
        }
    }

    #[tokio::test]
    async fn fetches_and_parses_feed() {
        let server = MockServer::start().await;
        let xml = r#"<?xml version="1.0"?>
<rss><channel>
  <item>
    <title>OnePlus 13 launches</title>
    <link>https://example.com/oneplus-13</link>
    <description>&lt;p&gt;Big launch&lt;/p&gt;</description>
    <pubDate>Thu, 02 Jan 2025 10:00:00 GMT</pubDate>
  </item>
</channel></rss>"#;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(xml))
            .mount(&server)
            .await;

        let fetcher = RssFetcher::new("competeiq-test", Duration::from_secs(5)).unwrap();
        let articles = fetcher
            .fetch(&source(format!("{}/feed.xml", server.uri())))
            .await
            .unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "OnePlus 13 launches");
        assert_eq!(articles[0].content, "Big launch");
        assert!(articles[0].published_at.is_some());
    }

    #[tokio::test]
    async fn server_error_is_a_retryable_source_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let fetcher = RssFetcher::with_client(reqwest::Client::new());
        let err = fetcher
            .fetch(&source(format!("{}/feed.xml", server.uri())))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceFetch { ref source_id, .. } if source_id == "gadgets"));
        assert!(err.is_retryable());
    }

    #[test]
    fn raw_article_uses_date_on_the_wire() {
        let a: RawArticle = serde_json::from_value(serde_json::json!({
            "title": "t",
            "content": "c",
            "url": "https://example.com",
            "date": "2025-01-02T10:00:00Z"
        }))
        .unwrap();
        assert!(a.published_at.is_some());
        let minimal: RawArticle = serde_json::from_value(serde_json::json!({"title": "t"})).unwrap();
        assert!(minimal.content.is_empty());
    }
}
