use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    /// Development skips API-key enforcement.
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Environment::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub watchlist_path: PathBuf,
    pub embedding_dim: usize,
    pub tei_url: Option<String>,
    pub sentiment_url: Option<String>,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub window_secs: u64,
    pub alert_cooldown_secs: u64,
    pub source_failure_threshold: u32,
    pub degraded_poll_multiplier: u32,
    pub fetch_max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub enrich_timeout_ms: u64,
    pub enrich_max_retries: u32,
    pub index_max_retries: u32,
    pub per_source_concurrency: usize,
    pub global_concurrency: usize,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub activity_alert_threshold: usize,
    pub retention_days: u32,
    pub api_keys: Vec<String>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("watchlist_path", &self.watchlist_path)
            .field("embedding_dim", &self.embedding_dim)
            .field("tei_url", &self.tei_url)
            .field("sentiment_url", &self.sentiment_url)
            .field("qdrant_url", &self.qdrant_url)
            .field("qdrant_collection", &self.qdrant_collection)
            .field("window_secs", &self.window_secs)
            .field("alert_cooldown_secs", &self.alert_cooldown_secs)
            .field("source_failure_threshold", &self.source_failure_threshold)
            .field("degraded_poll_multiplier", &self.degraded_poll_multiplier)
            .field("fetch_max_retries", &self.fetch_max_retries)
            .field("retry_backoff_base_ms", &self.retry_backoff_base_ms)
            .field("enrich_timeout_ms", &self.enrich_timeout_ms)
            .field("enrich_max_retries", &self.enrich_max_retries)
            .field("index_max_retries", &self.index_max_retries)
            .field("per_source_concurrency", &self.per_source_concurrency)
            .field("global_concurrency", &self.global_concurrency)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("activity_alert_threshold", &self.activity_alert_threshold)
            .field("retention_days", &self.retention_days)
            .field(
                "api_keys",
                &format_args!("[{} redacted]", self.api_keys.len()),
            )
            .finish()
    }
}
