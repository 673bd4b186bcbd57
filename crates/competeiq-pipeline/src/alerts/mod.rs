//! Alert rule engine.
//!
//! Each rule owns a small state machine (`idle -> evaluating -> fired ->
//! cooldown -> idle`) behind its own mutex. The considered-set check, the
//! condition check and the cooldown update all happen under that lock, so
//! concurrent triggers for the same document or window fire at most once.

mod log;

pub use log::{AlertFilter, AlertLog};

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use competeiq_core::{
    Alert, AlertRule, Competitor, Document, RuleKind, Sentiment, SentimentBound, Source,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::trends::WindowClosed;

/// Per-rule memory of documents and windows already evaluated.
const CONSIDERED_CAPACITY: usize = 8192;

/// Ten years; longer cooldowns are clamped.
const MAX_COOLDOWN_SECS: i64 = 10 * 365 * 24 * 3600;

/// Cooldown key for rules that are not scoped to a competitor.
const RULE_SCOPE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RulePhase {
    Idle,
    Evaluating,
    Fired,
    Cooldown { until: DateTime<Utc> },
}

/// Read-only view of one rule for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleStatus {
    pub rule_id: String,
    pub name: String,
    pub kind: RuleKind,
    pub active: bool,
    pub phase: RulePhase,
    pub fired_count: u64,
    pub considered_count: usize,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct ConsideredSet {
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl ConsideredSet {
    /// Returns `true` the first time `key` is seen.
    fn insert(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() >= CONSIDERED_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

#[derive(Debug)]
struct RuleState {
    phase: RulePhase,
    cooldowns: HashMap<String, DateTime<Utc>>,
    considered: ConsideredSet,
    last_evaluated_at: Option<DateTime<Utc>>,
    last_fired_at: Option<DateTime<Utc>>,
    fired_count: u64,
}

impl RuleState {
    fn new() -> Self {
        Self {
            phase: RulePhase::Idle,
            cooldowns: HashMap::new(),
            considered: ConsideredSet::default(),
            last_evaluated_at: None,
            last_fired_at: None,
            fired_count: 0,
        }
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        self.cooldowns.retain(|_, until| *until > now);
        self.phase = RulePhase::Evaluating;
        self.last_evaluated_at = Some(now);
    }

    /// Fire for `scope` unless it is cooling down.
    fn try_fire(&mut self, scope: &str, now: DateTime<Utc>, cooldown: Duration) -> bool {
        if self.cooldowns.get(scope).is_some_and(|until| *until > now) {
            return false;
        }
        self.cooldowns.insert(scope.to_string(), now + cooldown);
        self.phase = RulePhase::Fired;
        self.last_fired_at = Some(now);
        self.fired_count += 1;
        true
    }

    fn settle(&mut self, now: DateTime<Utc>) {
        self.phase = self.phase_at(now);
    }

    fn phase_at(&self, now: DateTime<Utc>) -> RulePhase {
        self.cooldowns
            .values()
            .filter(|until| **until > now)
            .max()
            .map_or(RulePhase::Idle, |until| RulePhase::Cooldown { until: *until })
    }
}

#[derive(Debug)]
struct RuleSlot {
    rule: AlertRule,
    cooldown: Duration,
    state: Mutex<RuleState>,
}

impl RuleSlot {
    fn lock(&self) -> MutexGuard<'_, RuleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct AlertEngine {
    rules: Vec<RuleSlot>,
    competitors: Arc<[Competitor]>,
    log: Arc<AlertLog>,
}

impl AlertEngine {
    #[must_use]
    pub fn new(
        rules: Vec<AlertRule>,
        competitors: Arc<[Competitor]>,
        log: Arc<AlertLog>,
        default_cooldown_secs: u64,
    ) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let secs = rule.cooldown_secs.unwrap_or(default_cooldown_secs);
                RuleSlot {
                    cooldown: Duration::seconds(
                        i64::try_from(secs).unwrap_or(i64::MAX).min(MAX_COOLDOWN_SECS),
                    ),
                    rule,
                    state: Mutex::new(RuleState::new()),
                }
            })
            .collect();
        Self {
            rules,
            competitors,
            log,
        }
    }

    #[must_use]
    pub fn log(&self) -> &Arc<AlertLog> {
        &self.log
    }

    /// Evaluate keyword and competitor rules against the documents committed
    /// in one ingestion cycle. Returns the alerts raised.
    pub fn evaluate_documents(&self, docs: &[Document], now: DateTime<Utc>) -> Vec<Alert> {
        if docs.is_empty() {
            return Vec::new();
        }
        let mut raised = Vec::new();
        for slot in self.rules.iter().filter(|s| s.rule.active) {
            let result = match slot.rule.kind {
                RuleKind::Keyword => Self::keyword_cycle(slot, docs, now),
                RuleKind::Competitor => self.competitor_cycle(slot, docs, now),
                RuleKind::Sentiment | RuleKind::Volume => continue,
            };
            Self::collect(slot, result, &mut raised);
        }
        self.publish(raised)
    }

    /// Evaluate sentiment and volume rules against finalized windows.
    pub fn evaluate_windows(&self, closed: &[WindowClosed], now: DateTime<Utc>) -> Vec<Alert> {
        let mut raised = Vec::new();
        for event in closed {
            for slot in self.rules.iter().filter(|s| s.rule.active) {
                if !matches!(slot.rule.kind, RuleKind::Sentiment | RuleKind::Volume) {
                    continue;
                }
                let result = self.window_cycle(slot, event, now);
                Self::collect(slot, result, &mut raised);
            }
        }
        self.publish(raised)
    }

    /// Ad-hoc alert for a burst of new documents from one source.
    pub fn raise_activity_alert(
        &self,
        source: &Source,
        docs: &[Document],
        now: DateTime<Utc>,
    ) -> Alert {
        let count = docs.len() as u64;
        let alert = Alert {
            id: Uuid::new_v4(),
            rule_id: None,
            competitor_id: None,
            insight: format!(
                "High activity detected: {count} new articles from {}",
                source.name
            ),
            trend_score: trend_score(count, 0.0),
            sentiment: average_sentiment(docs.iter()),
            created_at: now,
            supporting_document_ids: docs.iter().map(|d| d.id).collect(),
        };
        tracing::info!(source = %source.id, count, "activity alert raised");
        self.log.append(alert.clone());
        alert
    }

    #[must_use]
    pub fn rule_statuses(&self, now: DateTime<Utc>) -> Vec<RuleStatus> {
        self.rules
            .iter()
            .map(|slot| {
                let state = slot.lock();
                RuleStatus {
                    rule_id: slot.rule.id.clone(),
                    name: slot.rule.name.clone(),
                    kind: slot.rule.kind,
                    active: slot.rule.active,
                    phase: state.phase_at(now),
                    fired_count: state.fired_count,
                    considered_count: state.considered.len(),
                    last_evaluated_at: state.last_evaluated_at,
                    last_fired_at: state.last_fired_at,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules.iter().map(|s| s.rule.clone()).collect()
    }

    fn collect(slot: &RuleSlot, result: Result<Vec<Alert>, PipelineError>, out: &mut Vec<Alert>) {
        match result {
            Ok(alerts) => out.extend(alerts),
            Err(e) => {
                tracing::warn!(rule = %slot.rule.id, error = %e, "rule evaluation failed, skipping");
            }
        }
    }

    fn publish(&self, alerts: Vec<Alert>) -> Vec<Alert> {
        for alert in &alerts {
            tracing::info!(
                alert_id = %alert.id,
                rule = alert.rule_id.as_deref().unwrap_or("-"),
                competitor = alert.competitor_id.as_deref().unwrap_or("-"),
                "alert fired"
            );
            self.log.append(alert.clone());
        }
        alerts
    }

    fn resolve<'a>(&'a self, rule: &AlertRule) -> Result<Vec<&'a Competitor>, PipelineError> {
        rule.conditions
            .competitors
            .iter()
            .map(|name| {
                self.competitors
                    .iter()
                    .find(|c| c.is_named(name))
                    .ok_or_else(|| PipelineError::RuleEvaluation {
                        rule_id: rule.id.clone(),
                        reason: format!("unknown competitor '{name}'"),
                    })
            })
            .collect()
    }

    fn keyword_cycle(
        slot: &RuleSlot,
        docs: &[Document],
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, PipelineError> {
        let keywords: Vec<String> = slot
            .rule
            .conditions
            .keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(rule_error(&slot.rule, "no usable keywords"));
        }

        let mut state = slot.lock();
        state.begin(now);
        let matched: Vec<&Document> = docs
            .iter()
            .filter(|d| state.considered.insert(format!("doc:{}", d.id)))
            .filter(|d| {
                let text = d.full_text().to_lowercase();
                keywords.iter().all(|k| text.contains(k.as_str()))
            })
            .collect();

        let mut alerts = Vec::new();
        if !matched.is_empty() {
            if state.try_fire(RULE_SCOPE, now, slot.cooldown) {
                let quoted: Vec<String> = keywords.iter().map(|k| format!("'{k}'")).collect();
                alerts.push(document_alert(
                    &slot.rule,
                    None,
                    format!(
                        "{}: {} matched in {} new document(s)",
                        slot.rule.name,
                        quoted.join(" + "),
                        matched.len()
                    ),
                    &matched,
                    now,
                ));
            } else {
                tracing::debug!(rule = %slot.rule.id, "keyword match suppressed by cooldown");
            }
        }
        state.settle(now);
        Ok(alerts)
    }

    fn competitor_cycle(
        &self,
        slot: &RuleSlot,
        docs: &[Document],
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, PipelineError> {
        let targets = self.resolve(&slot.rule)?;
        let conditions = &slot.rule.conditions;
        let bound = conditions
            .sentiment_threshold
            .map(SentimentBound::from_threshold);

        let mut state = slot.lock();
        state.begin(now);
        let fresh: Vec<&Document> = docs
            .iter()
            .filter(|d| state.considered.insert(format!("doc:{}", d.id)))
            .collect();

        let mut alerts = Vec::new();
        for competitor in targets {
            let mentions: Vec<&Document> = fresh
                .iter()
                .copied()
                .filter(|d| d.entities.iter().any(|e| competitor.is_named(e)))
                .collect();
            if mentions.is_empty() {
                continue;
            }
            let supporting: Vec<&Document> = match conditions.sentiment {
                Some(required) => mentions
                    .iter()
                    .copied()
                    .filter(|d| d.sentiment == required)
                    .collect(),
                None => mentions.clone(),
            };
            if supporting.is_empty() {
                continue;
            }

            let mention_count = mentions.len() as u64;
            let avg = average_weight(mentions.iter().copied());
            let volume_ok = conditions
                .volume_threshold
                .is_none_or(|t| mention_count >= t);
            let sentiment_ok = bound.is_none_or(|b| b.is_crossed_by(avg));
            if !(volume_ok && sentiment_ok) {
                continue;
            }
            if !state.try_fire(&competitor.id, now, slot.cooldown) {
                tracing::debug!(
                    rule = %slot.rule.id,
                    competitor = %competitor.id,
                    "competitor match suppressed by cooldown"
                );
                continue;
            }

            let mut detail = Vec::new();
            if let Some(required) = conditions.sentiment {
                detail.push(format!("{} {required}", supporting.len()));
            }
            if let Some(b) = bound {
                detail.push(format!("average sentiment {avg:.2} {b}"));
            }
            if let Some(t) = conditions.volume_threshold {
                detail.push(format!("volume {mention_count} >= {t}"));
            }
            alerts.push(document_alert(
                &slot.rule,
                Some(competitor.id.clone()),
                format!(
                    "{} mentioned in {mention_count} new document(s): {}",
                    competitor.name,
                    detail.join(", ")
                ),
                &supporting,
                now,
            ));
        }
        state.settle(now);
        Ok(alerts)
    }

    fn window_cycle(
        &self,
        slot: &RuleSlot,
        event: &WindowClosed,
        now: DateTime<Utc>,
    ) -> Result<Vec<Alert>, PipelineError> {
        let window = &event.window;
        let competitor_id = &window.key.competitor_id;
        if !slot.rule.conditions.competitors.is_empty() {
            let scope = self.resolve(&slot.rule)?;
            if !scope.iter().any(|c| c.id == *competitor_id) {
                return Ok(Vec::new());
            }
        }

        let condition = match slot.rule.kind {
            RuleKind::Volume => {
                let threshold = slot
                    .rule
                    .conditions
                    .volume_threshold
                    .ok_or_else(|| rule_error(&slot.rule, "missing volume_threshold"))?;
                (window.mention_count > threshold).then(|| {
                    format!(
                        "{} mentions reached {} in the last window (threshold {threshold}, {:+.1}% vs prior)",
                        event.competitor_name, window.mention_count, event.change_percentage
                    )
                })
            }
            RuleKind::Sentiment => {
                let bound = slot
                    .rule
                    .conditions
                    .sentiment_threshold
                    .map(SentimentBound::from_threshold)
                    .ok_or_else(|| rule_error(&slot.rule, "missing sentiment_threshold"))?;
                (window.sentiment_count > 0 && bound.is_crossed_by(event.sentiment_avg)).then(
                    || {
                        format!(
                            "{} sentiment averaged {:.2} over {} mention(s), {bound}",
                            event.competitor_name, event.sentiment_avg, window.mention_count
                        )
                    },
                )
            }
            RuleKind::Keyword | RuleKind::Competitor => None,
        };

        let mut state = slot.lock();
        state.begin(now);
        let key = format!(
            "window:{competitor_id}:{}",
            window.key.window_start.timestamp()
        );
        let mut alerts = Vec::new();
        if state.considered.insert(key) {
            if let Some(insight) = condition {
                if state.try_fire(competitor_id, now, slot.cooldown) {
                    alerts.push(Alert {
                        id: Uuid::new_v4(),
                        rule_id: Some(slot.rule.id.clone()),
                        competitor_id: Some(competitor_id.clone()),
                        insight,
                        trend_score: trend_score(window.mention_count, event.change_percentage),
                        sentiment: Sentiment::from_average(event.sentiment_avg),
                        created_at: now,
                        supporting_document_ids: window.document_ids.clone(),
                    });
                } else {
                    tracing::debug!(
                        rule = %slot.rule.id,
                        competitor = %competitor_id,
                        "window alert suppressed by cooldown"
                    );
                }
            }
        }
        state.settle(now);
        Ok(alerts)
    }
}

fn rule_error(rule: &AlertRule, reason: &str) -> PipelineError {
    PipelineError::RuleEvaluation {
        rule_id: rule.id.clone(),
        reason: reason.to_string(),
    }
}

fn document_alert(
    rule: &AlertRule,
    competitor_id: Option<String>,
    insight: String,
    docs: &[&Document],
    now: DateTime<Utc>,
) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        rule_id: Some(rule.id.clone()),
        competitor_id,
        insight,
        trend_score: trend_score(docs.len() as u64, 0.0),
        sentiment: average_sentiment(docs.iter().copied()),
        created_at: now,
        supporting_document_ids: docs.iter().map(|d| d.id).collect(),
    }
}

#[allow(clippy::cast_precision_loss)]
fn average_weight<'a>(docs: impl Iterator<Item = &'a Document>) -> f64 {
    let (sum, count) = docs.fold((0.0, 0u64), |(sum, count), d| {
        (sum + d.sentiment.weight(), count + 1)
    });
    if count == 0 {
        0.5
    } else {
        sum / count as f64
    }
}

fn average_sentiment<'a>(docs: impl Iterator<Item = &'a Document>) -> Sentiment {
    Sentiment::from_average(average_weight(docs))
}

/// Scores an alert on a 0-10 scale from volume and relative change.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn trend_score(mentions: u64, change_pct: f64) -> f64 {
    ((1.0 + mentions as f64).log2() + change_pct.abs() / 25.0).clamp(0.0, 10.0)
}

#[cfg(test)]
#[path = "engine_test.rs"]
mod tests;
