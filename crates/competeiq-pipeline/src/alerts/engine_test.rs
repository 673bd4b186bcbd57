use std::collections::BTreeSet;

use chrono::TimeZone;
use competeiq_core::{
    EnrichmentStatus, RuleConditions, SourceKind, SourceStatus, TrendDirection, TrendWindow,
    WindowKey,
};

use super::*;
use crate::trends::TrendAggregator;

fn competitors() -> Arc<[Competitor]> {
    vec![
        Competitor {
            id: "oneplus".to_string(),
            name: "OnePlus".to_string(),
            aliases: ["One Plus".to_string()].into(),
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
    ]
    .into()
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
}

fn rule(id: &str, kind: RuleKind, conditions: RuleConditions) -> AlertRule {
    AlertRule {
        id: id.to_string(),
        name: id.to_uppercase(),
        kind,
        conditions,
        channels: BTreeSet::new(),
        active: true,
        cooldown_secs: None,
    }
}

fn engine(rules: Vec<AlertRule>) -> AlertEngine {
    AlertEngine::new(rules, competitors(), Arc::new(AlertLog::new()), 1800)
}

fn doc(title: &str, entities: &[&str], sentiment: Sentiment) -> Document {
    Document {
        id: Uuid::new_v4(),
        source_id: "news".to_string(),
        url: String::new(),
        title: title.to_string(),
        body: String::new(),
        content_hash: Uuid::new_v4().to_string(),
        published_at: t0(),
        ingested_at: t0(),
        sentiment,
        entities: entities.iter().map(ToString::to_string).collect(),
        embedding: None,
        enrichment_status: EnrichmentStatus::Partial,
    }
}

fn volume_rule(threshold: u64, competitors: &[&str]) -> AlertRule {
    rule(
        "volume",
        RuleKind::Volume,
        RuleConditions {
            volume_threshold: Some(threshold),
            competitors: competitors.iter().map(ToString::to_string).collect(),
            ..RuleConditions::default()
        },
    )
}

fn closed(competitor: &str, mentions: u64, sentiment_sum: f64) -> WindowClosed {
    let mut window = TrendWindow::new(WindowKey::containing(competitor, t0(), 3600));
    window.mention_count = mentions;
    window.sentiment_sum = sentiment_sum;
    window.sentiment_count = mentions;
    window.finalized = true;
    WindowClosed {
        sentiment_avg: window.sentiment_avg(),
        window,
        competitor_name: competitor.to_string(),
        prior_mention_count: 0,
        change_percentage: 0.0,
        direction: TrendDirection::Stable,
    }
}

#[test]
fn volume_rule_fires_once_per_window() {
    let engine = engine(vec![volume_rule(100, &[])]);
    let event = closed("oneplus", 150, 75.0);

    assert_eq!(engine.evaluate_windows(&[event.clone()], t0()).len(), 1);
    assert!(engine.evaluate_windows(&[event.clone()], t0()).is_empty());
    // Still suppressed long after the cooldown: the window was already considered.
    let later = t0() + Duration::days(1);
    assert!(engine.evaluate_windows(&[event], later).is_empty());
    assert_eq!(engine.log().len(), 1);
}

#[test]
fn volume_threshold_is_strictly_exceeded() {
    let engine = engine(vec![volume_rule(100, &[])]);
    assert!(engine
        .evaluate_windows(&[closed("oneplus", 100, 50.0)], t0())
        .is_empty());
}

#[test]
fn aggregated_window_feeds_volume_rule() {
    let aggregator = TrendAggregator::new(3600, competitors());
    let oneplus: Vec<Document> = (0..3)
        .map(|i| doc(&format!("OnePlus story {i}"), &["OnePlus"], Sentiment::Positive))
        .collect();
    for d in &oneplus {
        aggregator.record(d);
    }
    aggregator.record(&doc("Xiaomi story", &["Xiaomi"], Sentiment::Neutral));

    let events = aggregator.finalize_due(t0() + Duration::hours(1));
    let oneplus_event = events
        .iter()
        .find(|e| e.window.key.competitor_id == "oneplus")
        .unwrap();
    assert_eq!(oneplus_event.window.mention_count, 3);
    assert!((oneplus_event.sentiment_avg - 1.0).abs() < f64::EPSILON);

    let engine = engine(vec![volume_rule(2, &["OnePlus"])]);
    let alerts = engine.evaluate_windows(&events, t0() + Duration::hours(1));
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].competitor_id.as_deref(), Some("oneplus"));
    assert_eq!(alerts[0].sentiment, Sentiment::Positive);
    assert_eq!(
        alerts[0].supporting_document_ids,
        oneplus.iter().map(|d| d.id).collect::<Vec<_>>()
    );
}

#[test]
fn sentiment_rule_respects_bound_and_ignores_empty_windows() {
    let engine = engine(vec![rule(
        "sour",
        RuleKind::Sentiment,
        RuleConditions {
            sentiment_threshold: Some(0.3),
            ..RuleConditions::default()
        },
    )]);

    assert!(engine
        .evaluate_windows(&[closed("xiaomi", 0, 0.0)], t0())
        .is_empty());
    assert!(engine
        .evaluate_windows(&[closed("oneplus", 4, 2.0)], t0())
        .is_empty());

    let alerts = engine.evaluate_windows(&[closed("oneplus_2", 4, 0.5)], t0());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].sentiment, Sentiment::Negative);
    assert!(alerts[0].insight.contains("below 0.30"));
}

#[test]
fn keyword_rule_needs_all_keywords_and_honours_cooldown() {
    let engine = engine(vec![rule(
        "launch",
        RuleKind::Keyword,
        RuleConditions {
            keywords: vec!["Launch".to_string(), "india".to_string()],
            ..RuleConditions::default()
        },
    )]);

    let partial = doc("OnePlus launch event", &["OnePlus"], Sentiment::Neutral);
    assert!(engine.evaluate_documents(&[partial], t0()).is_empty());

    let hit = doc("OnePlus LAUNCH in India", &["OnePlus"], Sentiment::Neutral);
    let alerts = engine.evaluate_documents(&[hit.clone()], t0());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].supporting_document_ids, vec![hit.id]);

    let again = doc("Xiaomi launch in India", &["Xiaomi"], Sentiment::Neutral);
    assert!(engine
        .evaluate_documents(&[again], t0() + Duration::minutes(10))
        .is_empty());

    let after = doc("Realme launch in India", &[], Sentiment::Neutral);
    assert_eq!(
        engine
            .evaluate_documents(&[after], t0() + Duration::minutes(31))
            .len(),
        1
    );
}

#[test]
fn competitor_rule_requires_matching_sentiment() {
    let engine = engine(vec![rule(
        "neg",
        RuleKind::Competitor,
        RuleConditions {
            competitors: vec!["oneplus".to_string(), "Xiaomi".to_string()],
            sentiment: Some(Sentiment::Negative),
            ..RuleConditions::default()
        },
    )]);

    let docs = vec![
        doc("One Plus recall", &["OnePlus"], Sentiment::Negative),
        doc("OnePlus sale", &["OnePlus"], Sentiment::Positive),
        doc("Xiaomi record", &["Xiaomi"], Sentiment::Positive),
    ];
    let alerts = engine.evaluate_documents(&docs, t0());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].competitor_id.as_deref(), Some("oneplus"));
    assert_eq!(alerts[0].supporting_document_ids, vec![docs[0].id]);

    // Same documents again: already considered.
    assert!(engine
        .evaluate_documents(&docs, t0() + Duration::hours(2))
        .is_empty());
}

#[test]
fn unknown_competitor_skips_only_that_rule() {
    let engine = engine(vec![
        volume_rule(1, &["Nokia"]),
        rule(
            "busy",
            RuleKind::Volume,
            RuleConditions {
                volume_threshold: Some(1),
                ..RuleConditions::default()
            },
        ),
    ]);
    let alerts = engine.evaluate_windows(&[closed("oneplus", 5, 2.5)], t0());
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].rule_id.as_deref(), Some("busy"));
}

#[test]
fn status_reports_cooldown_then_idle() {
    let engine = engine(vec![volume_rule(1, &[])]);
    engine.evaluate_windows(&[closed("oneplus", 5, 2.5)], t0());

    let status = engine.rule_statuses(t0() + Duration::minutes(5));
    assert_eq!(status[0].fired_count, 1);
    assert_eq!(
        status[0].phase,
        RulePhase::Cooldown {
            until: t0() + Duration::minutes(30)
        }
    );
    let status = engine.rule_statuses(t0() + Duration::minutes(31));
    assert_eq!(status[0].phase, RulePhase::Idle);
}

#[test]
fn activity_alert_has_no_rule() {
    let engine = engine(Vec::new());
    let source = Source {
        id: "gadgets".to_string(),
        name: "Gadgets 360".to_string(),
        kind: SourceKind::News,
        endpoint: "https://example.com/rss".to_string(),
        polling_interval_secs: 600,
        last_polled_at: None,
        consecutive_failure_count: 0,
        status: SourceStatus::Active,
    };
    let docs: Vec<Document> = (0..6)
        .map(|i| doc(&format!("story {i}"), &[], Sentiment::Positive))
        .collect();
    let alert = engine.raise_activity_alert(&source, &docs, t0());
    assert!(alert.rule_id.is_none());
    assert_eq!(
        alert.insight,
        "High activity detected: 6 new articles from Gadgets 360"
    );
    assert_eq!(alert.supporting_document_ids.len(), 6);
    assert_eq!(engine.log().len(), 1);
}

#[test]
fn trend_score_is_bounded() {
    assert!(trend_score(0, 0.0).abs() < f64::EPSILON);
    assert!((trend_score(3, 0.0) - 2.0).abs() < 1e-9);
    assert!((trend_score(10_000, 900.0) - 10.0).abs() < f64::EPSILON);
}
