//! `check-config`: validate the environment and watchlist without a server.

use std::path::Path;

use competeiq_core::{AppConfig, Watchlist};

fn backend(url: Option<&str>, remote: &'static str, local: &'static str) -> String {
    url.map_or_else(|| local.to_string(), |u| format!("{remote} ({u})"))
}

fn summarize_config(config: &AppConfig) -> Vec<String> {
    vec![
        format!("environment:  {}", config.env),
        format!("bind address: {}", config.bind_addr),
        format!(
            "embeddings:   {} dim={}",
            backend(config.tei_url.as_deref(), "tei", "hashing"),
            config.embedding_dim
        ),
        format!(
            "sentiment:    {}",
            backend(config.sentiment_url.as_deref(), "tei", "lexicon")
        ),
        format!(
            "index:        {}",
            backend(config.qdrant_url.as_deref(), "qdrant", "in-process")
        ),
        format!(
            "auth:         {}",
            if config.api_keys.is_empty() {
                "disabled".to_string()
            } else {
                format!("{} key(s)", config.api_keys.len())
            }
        ),
    ]
}

fn summarize_watchlist(watchlist_path: &Path, watchlist: &Watchlist) -> Vec<String> {
    let mut lines = vec![
        format!("watchlist:    {}", watchlist_path.display()),
        format!(
            "  {} competitor(s), {} source(s), {} rule(s)",
            watchlist.competitors.len(),
            watchlist.sources.len(),
            watchlist.rules.len()
        ),
    ];
    lines.extend(watchlist.sources.iter().map(|s| {
        format!(
            "  source {:<16} {:<8} every {}s  {}",
            s.id,
            s.kind.to_string(),
            s.polling_interval_secs,
            s.status
        )
    }));
    lines.extend(watchlist.rules.iter().map(|r| {
        format!(
            "  rule   {:<16} {:<10} {}",
            r.id,
            r.kind.to_string(),
            if r.active { "active" } else { "inactive" }
        )
    }));
    lines
}

/// Load config from the environment and validate the watchlist.
///
/// # Errors
///
/// Returns the first configuration or watchlist validation error.
pub(crate) fn run_check_config(watchlist_override: Option<&Path>) -> anyhow::Result<()> {
    let config = competeiq_core::load_app_config()?;
    let path = watchlist_override.unwrap_or(&config.watchlist_path);
    let watchlist = competeiq_core::load_watchlist(path)?;
    for line in summarize_config(&config)
        .into_iter()
        .chain(summarize_watchlist(path, &watchlist))
    {
        println!("{line}");
    }
    println!("configuration ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use competeiq_core::parse_watchlist;

    use super::*;

    #[test]
    fn summary_lists_watchlist_contents() {
        let watchlist = parse_watchlist(
            r"
competitors:
  - name: OnePlus
    sector: smartphones
sources:
  - id: tech
    name: Tech News
    kind: news
    endpoint: https://example.com/rss
rules:
  - id: recalls
    name: Recall watch
    kind: keyword
    conditions:
      keywords: [recall]
",
        )
        .expect("watchlist parses");

        let lines = summarize_watchlist(Path::new("watchlist.yaml"), &watchlist);
        assert!(lines
            .iter()
            .any(|l| l.contains("1 competitor(s), 1 source(s), 1 rule(s)")));
        assert!(lines.iter().any(|l| l.contains("source tech")));
        assert!(lines.iter().any(|l| l.contains("rule   recalls")));
    }

    #[test]
    fn backend_label_prefers_remote_when_configured() {
        assert_eq!(backend(None, "qdrant", "in-process"), "in-process");
        assert_eq!(
            backend(Some("http://q:6333"), "qdrant", "in-process"),
            "qdrant (http://q:6333)"
        );
    }
}
