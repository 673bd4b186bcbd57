use crate::app_config::{AppConfig, Environment};
use crate::trends::MAX_WINDOW_SECS;
use crate::ConfigError;

/// Longest accepted retention horizon: 10 years.
const MAX_RETENTION_DAYS: u32 = 3_650;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Does not read `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

fn invalid(var: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: reason.to_string(),
    }
}

fn at_most<T>(var: &str, value: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value > max {
        return Err(invalid(var, format!("must be at most {max}")));
    }
    Ok(value)
}

fn parse_num<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| invalid(var, e))
}

/// Parse and validate configuration through an injected env-var lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let positive_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let value: u64 = parse_num(var, &or_default(var, default))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero"));
        }
        Ok(value)
    };

    let positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value: usize = parse_num(var, &or_default(var, default))?;
        if value == 0 {
            return Err(invalid(var, "must be greater than zero"));
        }
        Ok(value)
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        parse_num(var, &or_default(var, default))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        parse_num(var, &or_default(var, default))
    };

    let env = parse_environment(&or_default("COMPETEIQ_ENV", "development"))?;

    let bind_addr_raw = or_default("COMPETEIQ_BIND_ADDR", "0.0.0.0:3000");
    let bind_addr = bind_addr_raw
        .parse::<SocketAddr>()
        .map_err(|e| invalid("COMPETEIQ_BIND_ADDR", e))?;
    let log_level = or_default("COMPETEIQ_LOG_LEVEL", "info");
    let watchlist_path = PathBuf::from(or_default(
        "COMPETEIQ_WATCHLIST_PATH",
        "./config/watchlist.yaml",
    ));

    let embedding_dim = positive_usize("COMPETEIQ_EMBEDDING_DIM", "1024")?;
    let tei_url = optional("COMPETEIQ_TEI_URL");
    let sentiment_url = optional("COMPETEIQ_SENTIMENT_URL");
    let qdrant_url = optional("COMPETEIQ_QDRANT_URL");
    let qdrant_collection = or_default("COMPETEIQ_QDRANT_COLLECTION", "competeiq_documents");

    let window_secs = at_most(
        "COMPETEIQ_WINDOW_SECS",
        positive_u64("COMPETEIQ_WINDOW_SECS", "3600")?,
        MAX_WINDOW_SECS.unsigned_abs(),
    )?;
    let alert_cooldown_secs = parse_u64("COMPETEIQ_ALERT_COOLDOWN_SECS", "1800")?;
    let source_failure_threshold = parse_u32("COMPETEIQ_SOURCE_FAILURE_THRESHOLD", "3")?.max(1);
    let degraded_poll_multiplier = parse_u32("COMPETEIQ_DEGRADED_POLL_MULTIPLIER", "4")?.max(1);
    let fetch_max_retries = parse_u32("COMPETEIQ_FETCH_MAX_RETRIES", "3")?;
    let retry_backoff_base_ms = parse_u64("COMPETEIQ_RETRY_BACKOFF_BASE_MS", "500")?;
    let enrich_timeout_ms = positive_u64("COMPETEIQ_ENRICH_TIMEOUT_MS", "10000")?;
    let enrich_max_retries = parse_u32("COMPETEIQ_ENRICH_MAX_RETRIES", "2")?;
    let index_max_retries = parse_u32("COMPETEIQ_INDEX_MAX_RETRIES", "3")?;
    let per_source_concurrency = positive_usize("COMPETEIQ_PER_SOURCE_CONCURRENCY", "4")?;
    let global_concurrency = positive_usize("COMPETEIQ_GLOBAL_CONCURRENCY", "16")?;
    let request_timeout_secs = positive_u64("COMPETEIQ_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default(
        "COMPETEIQ_USER_AGENT",
        "competeiq/0.1 (competitive-intelligence)",
    );
    let activity_alert_threshold = parse_num::<usize>(
        "COMPETEIQ_ACTIVITY_ALERT_THRESHOLD",
        &or_default("COMPETEIQ_ACTIVITY_ALERT_THRESHOLD", "5"),
    )?;
    let retention_days = at_most(
        "COMPETEIQ_RETENTION_DAYS",
        parse_u32("COMPETEIQ_RETENTION_DAYS", "90")?,
        MAX_RETENTION_DAYS,
    )?;

    let api_keys: Vec<String> = optional("COMPETEIQ_API_KEYS")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default();
    if api_keys.is_empty() && !env.is_development() {
        return Err(ConfigError::MissingEnvVar("COMPETEIQ_API_KEYS".to_string()));
    }

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        watchlist_path,
        embedding_dim,
        tei_url,
        sentiment_url,
        qdrant_url,
        qdrant_collection,
        window_secs,
        alert_cooldown_secs,
        source_failure_threshold,
        degraded_poll_multiplier,
        fetch_max_retries,
        retry_backoff_base_ms,
        enrich_timeout_ms,
        enrich_max_retries,
        index_max_retries,
        per_source_concurrency,
        global_concurrency,
        request_timeout_secs,
        user_agent,
        activity_alert_threshold,
        retention_days,
        api_keys,
    })
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for anything other than
/// `development`, `test` or `production`.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(invalid(
            "COMPETEIQ_ENV",
            format!("unknown environment '{other}'"),
        )),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
