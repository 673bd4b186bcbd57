//! Handlers for the API-backed subcommands.

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use competeiq_core::{Alert, Source, TrendSnapshot};
use competeiq_pipeline::{IngestReport, RawArticle, SearchRequest, SearchResponse};
use serde_json::json;

use crate::client::ApiClient;

const TITLE_WIDTH: usize = 50;

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() > width {
        format!("{}...", text.chars().take(width).collect::<String>())
    } else {
        text.to_string()
    }
}

fn fmt_time(at: Option<DateTime<Utc>>) -> String {
    at.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

/// Read a JSON array of articles from disk.
fn read_articles(file: &Path) -> anyhow::Result<Vec<RawArticle>> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of articles", file.display()))
}

fn format_report(source: &str, report: &IngestReport) -> String {
    format!(
        "{source}: processed={} duplicates={} failed={} alerts={}",
        report.processed_count,
        report.duplicate_count,
        report.failed_count,
        report.alerts_generated
    )
}

pub(crate) async fn run_ingest(client: &ApiClient, source: &str, file: &Path) -> anyhow::Result<()> {
    let articles = read_articles(file)?;
    if articles.is_empty() {
        println!("{} contains no articles; nothing to ingest", file.display());
        return Ok(());
    }
    let report: IngestReport = client
        .post("ingest", &json!({ "source_id": source, "articles": articles }))
        .await?;
    println!("{}", format_report(source, &report));
    Ok(())
}

fn format_search(response: &SearchResponse) -> Vec<String> {
    let mut lines = vec![format!("{:<7}{:<10}{:<20}TITLE", "SCORE", "SENTIMENT", "SOURCE")];
    lines.extend(response.results.iter().map(|hit| {
        format!(
            "{:<7.3}{:<10}{:<20}{}",
            hit.similarity_score,
            hit.sentiment.to_string(),
            truncate(&hit.source.name, 18),
            truncate(&hit.title, TITLE_WIDTH)
        )
    }));
    lines
}

pub(crate) async fn run_search(
    client: &ApiClient,
    query: &str,
    limit: Option<usize>,
    threshold: Option<f32>,
) -> anyhow::Result<()> {
    let request = SearchRequest {
        limit,
        similarity_threshold: threshold,
        ..SearchRequest::new(query)
    };
    let response: SearchResponse = client.post("search", &request).await?;
    if response.total == 0 {
        println!("no documents matched \"{query}\"");
        return Ok(());
    }
    for line in format_search(&response) {
        println!("{line}");
    }
    Ok(())
}

fn format_alert(alert: &Alert) -> String {
    format!(
        "{:<17}{:<22}{:<12}{:<6.1}{}",
        alert.created_at.format("%Y-%m-%d %H:%M").to_string(),
        truncate(alert.rule_id.as_deref().unwrap_or("(activity)"), 20),
        alert.competitor_id.as_deref().unwrap_or("-"),
        alert.trend_score,
        alert.insight
    )
}

pub(crate) async fn run_alerts(
    client: &ApiClient,
    rule: Option<&str>,
    competitor: Option<&str>,
    limit: usize,
) -> anyhow::Result<()> {
    let limit = limit.to_string();
    let mut query = vec![("limit", limit.as_str())];
    if let Some(rule) = rule {
        query.push(("rule_id", rule));
    }
    if let Some(competitor) = competitor {
        query.push(("competitor_id", competitor));
    }
    let alerts: Vec<Alert> = client.get("alerts", &query).await?;
    if alerts.is_empty() {
        println!("no alerts");
        return Ok(());
    }
    println!(
        "{:<17}{:<22}{:<12}{:<6}INSIGHT",
        "CREATED", "RULE", "COMPETITOR", "SCORE"
    );
    for alert in alerts.iter().rev() {
        println!("{}", format_alert(alert));
    }
    Ok(())
}

fn format_trend(snapshot: &TrendSnapshot) -> String {
    format!(
        "{:<20}{:<10}{:<11.2}{:<10}{:+.1}%",
        truncate(&snapshot.competitor, 18),
        snapshot.mentions,
        snapshot.sentiment_score,
        snapshot.trend_direction.to_string(),
        snapshot.change_percentage
    )
}

pub(crate) async fn run_trends(client: &ApiClient, competitor: Option<&str>) -> anyhow::Result<()> {
    let no_query: [(&str, &str); 0] = [];
    let snapshots: Vec<TrendSnapshot> = client.get("trends/summary", &no_query).await?;
    let selected: Vec<&TrendSnapshot> = snapshots
        .iter()
        .filter(|s| competitor.is_none_or(|c| s.competitor_id == c))
        .collect();
    if selected.is_empty() {
        println!(
            "no trend data{}",
            competitor
                .map(|c| format!(" for competitor {c}"))
                .unwrap_or_default()
        );
        return Ok(());
    }
    println!(
        "{:<20}{:<10}{:<11}{:<10}CHANGE",
        "COMPETITOR", "MENTIONS", "SENTIMENT", "TREND"
    );
    for snapshot in selected {
        println!("{}", format_trend(snapshot));
    }
    Ok(())
}

fn format_source(source: &Source) -> String {
    format!(
        "{:<16}{:<9}{:<10}{:<10}{:<18}{}",
        truncate(&source.id, 14),
        source.kind.to_string(),
        source.status.to_string(),
        source.consecutive_failure_count,
        fmt_time(source.last_polled_at),
        source.endpoint
    )
}

pub(crate) async fn run_sources_list(client: &ApiClient) -> anyhow::Result<()> {
    let no_query: [(&str, &str); 0] = [];
    let sources: Vec<Source> = client.get("sources", &no_query).await?;
    println!(
        "{:<16}{:<9}{:<10}{:<10}{:<18}ENDPOINT",
        "ID", "KIND", "STATUS", "FAILURES", "LAST POLLED"
    );
    for source in &sources {
        println!("{}", format_source(source));
    }
    Ok(())
}

pub(crate) async fn run_source_poll(client: &ApiClient, id: &str) -> anyhow::Result<()> {
    let report: IngestReport = client
        .post(&format!("sources/{id}/poll"), &json!({}))
        .await?;
    println!("{}", format_report(id, &report));
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use competeiq_core::{Sentiment, SourceKind, SourceStatus, TrendDirection};
    use competeiq_pipeline::search::{HitSource, SearchHit};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Xiaomi发布新平板电脑", 8), "Xiaomi发布...");
    }

    #[test]
    fn report_line_lists_every_count() {
        let report = IngestReport {
            processed_count: 4,
            duplicate_count: 1,
            failed_count: 0,
            alerts_generated: 2,
        };
        assert_eq!(
            format_report("tech", &report),
            "tech: processed=4 duplicates=1 failed=0 alerts=2"
        );
    }

    #[test]
    fn search_table_has_header_and_one_row_per_hit() {
        let response = SearchResponse {
            query: "oneplus".to_string(),
            total: 1,
            results: vec![SearchHit {
                id: Uuid::nil(),
                title: "OnePlus 13 review".to_string(),
                content: String::new(),
                url: "https://example.com".to_string(),
                date: Utc::now(),
                sentiment: Sentiment::Positive,
                similarity_score: 0.912,
                source: HitSource {
                    name: "Tech News".to_string(),
                    kind: Some(SourceKind::News),
                },
            }],
        };
        let lines = format_search(&response);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0.912  positive  Tech News"));
        assert!(lines[1].ends_with("OnePlus 13 review"));
    }

    #[test]
    fn activity_alerts_render_without_rule() {
        let alert = Alert {
            id: Uuid::nil(),
            rule_id: None,
            competitor_id: None,
            insight: "High activity detected: 12 new articles from Tech News".to_string(),
            trend_score: 3.7,
            sentiment: Sentiment::Neutral,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
            supporting_document_ids: Vec::new(),
        };
        let line = format_alert(&alert);
        assert!(line.starts_with("2025-03-01 10:00 (activity)"));
        assert!(line.contains("3.7"));
        assert!(line.ends_with("from Tech News"));
    }

    #[test]
    fn trend_line_signs_the_change() {
        let snapshot = TrendSnapshot {
            competitor_id: "xiaomi".to_string(),
            competitor: "Xiaomi".to_string(),
            mentions: 96,
            sentiment_score: 0.4,
            trend_direction: TrendDirection::Stable,
            change_percentage: -4.0,
            window_start: Utc::now(),
            finalized: false,
        };
        let line = format_trend(&snapshot);
        assert!(line.contains("stable"));
        assert!(line.ends_with("-4.0%"));
    }

    #[test]
    fn source_line_shows_health() {
        let source = Source {
            id: "forum".to_string(),
            name: "Phone Forum".to_string(),
            kind: SourceKind::Social,
            endpoint: "https://forum.example.com/rss".to_string(),
            polling_interval_secs: 900,
            last_polled_at: None,
            consecutive_failure_count: 3,
            status: SourceStatus::Degraded,
        };
        let line = format_source(&source);
        assert!(line.contains("social"));
        assert!(line.contains("degraded"));
        assert!(line.ends_with("https://forum.example.com/rss"));
    }

    #[test]
    fn read_articles_reports_the_bad_file() {
        let path = std::env::temp_dir().join(format!("competeiq-cli-{}.json", Uuid::new_v4()));
        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        let err = read_articles(&path).unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));

        std::fs::write(&path, r#"[{"title": "OnePlus 13", "date": "2025-03-01T08:00:00Z"}]"#)
            .unwrap();
        let articles = read_articles(&path).unwrap();
        assert_eq!(articles.len(), 1);
        assert!(articles[0].published_at.is_some());
        std::fs::remove_file(&path).ok();
    }
}
