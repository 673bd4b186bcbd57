//! Shared domain model and configuration for CompeteIQ.
//!
//! Everything the pipeline, server and CLI agree on lives here: documents,
//! sources, competitors, trend windows, alert rules, and the environment /
//! watchlist configuration that wires them together.

pub mod alerts;
pub mod app_config;
pub mod competitors;
pub mod config;
pub mod documents;
pub mod sources;
pub mod trends;
pub mod watchlist;

use thiserror::Error;

pub use alerts::{Alert, AlertRule, RuleConditions, RuleKind, SentimentBound};
pub use app_config::{AppConfig, Environment};
pub use competitors::Competitor;
pub use config::{load_app_config, load_app_config_from_env};
pub use documents::{Document, EnrichmentStatus, Sentiment};
pub use sources::{Source, SourceKind, SourceStatus};
pub use trends::{change_percentage, TrendDirection, TrendSnapshot, TrendWindow, WindowKey};
pub use watchlist::{load_watchlist, parse_watchlist, slugify, Watchlist};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read watchlist file {path}: {source}")]
    WatchlistIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse watchlist: {0}")]
    WatchlistParse(#[from] serde_yaml::Error),

    #[error("watchlist validation failed: {0}")]
    Validation(String),
}
