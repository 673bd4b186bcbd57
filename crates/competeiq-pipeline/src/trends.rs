//! Rolling per-competitor trend windows.
//!
//! Windows are keyed by `(competitor_id, window_start)` and live in a
//! `DashMap`, so each key has a single writer at a time. A mention is
//! attributed to the window containing the document's commit time; if that
//! window has already been finalized the mention rolls into the next one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use competeiq_core::{
    change_percentage, Competitor, Document, TrendDirection, TrendSnapshot, TrendWindow, WindowKey,
};
use dashmap::DashMap;
use serde::Serialize;

/// Emitted once per window when it is finalized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowClosed {
    pub window: TrendWindow,
    pub competitor_name: String,
    pub prior_mention_count: u64,
    pub sentiment_avg: f64,
    pub change_percentage: f64,
    pub direction: TrendDirection,
}

/// Filters for [`TrendAggregator::windows`].
#[derive(Debug, Clone, Default)]
pub struct WindowFilter {
    pub competitor_id: Option<String>,
    pub finalized_only: bool,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct TrendAggregator {
    windows: DashMap<WindowKey, TrendWindow>,
    window_secs: i64,
    competitors: Arc<[Competitor]>,
}

impl TrendAggregator {
    #[must_use]
    pub fn new(window_secs: u64, competitors: Arc<[Competitor]>) -> Self {
        Self {
            windows: DashMap::new(),
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX).max(1),
            competitors,
        }
    }

    #[must_use]
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// Count one committed document. Documents that are `failed` or carry
    /// no entities are ignored. Returns the keys of the windows touched.
    pub fn record(&self, doc: &Document) -> Vec<WindowKey> {
        if !doc.counts_toward_trends() {
            return Vec::new();
        }
        let weight = doc.sentiment.weight();
        let mut touched = Vec::new();
        for competitor in self
            .competitors
            .iter()
            .filter(|c| doc.entities.iter().any(|e| c.is_named(e)))
        {
            let mut key = WindowKey::containing(&competitor.id, doc.ingested_at, self.window_secs);
            loop {
                let mut window = self
                    .windows
                    .entry(key.clone())
                    .or_insert_with(|| TrendWindow::new(key.clone()));
                if !window.finalized {
                    window.mention_count += 1;
                    window.sentiment_sum += weight;
                    window.sentiment_count += 1;
                    window.document_ids.push(doc.id);
                    break;
                }
                drop(window);
                key = key.following();
            }
            touched.push(key);
        }
        touched
    }

    /// Finalize every open window whose end is at or before `now`, oldest
    /// first, and return one event per window closed by this call.
    pub fn finalize_due(&self, now: DateTime<Utc>) -> Vec<WindowClosed> {
        let mut due: Vec<WindowKey> = self
            .windows
            .iter()
            .filter(|entry| !entry.finalized && entry.key().window_end() <= now)
            .map(|entry| entry.key().clone())
            .collect();
        due.sort_by(|a, b| a.window_start.cmp(&b.window_start));

        let mut closed = Vec::with_capacity(due.len());
        for key in due {
            let window = match self.windows.get_mut(&key) {
                Some(mut entry) if !entry.finalized => {
                    entry.finalized = true;
                    entry.value().clone()
                }
                _ => continue,
            };
            let prior = self
                .windows
                .get(&key.preceding())
                .map_or(0, |w| w.mention_count);
            let change = change_percentage(window.mention_count, prior);
            closed.push(WindowClosed {
                competitor_name: self.competitor_name(&key.competitor_id),
                prior_mention_count: prior,
                sentiment_avg: window.sentiment_avg(),
                change_percentage: change,
                direction: TrendDirection::from_change(change),
                window,
            });
        }
        if !closed.is_empty() {
            tracing::debug!(count = closed.len(), "finalized trend windows");
        }
        closed
    }

    #[must_use]
    pub fn window(&self, key: &WindowKey) -> Option<TrendWindow> {
        self.windows.get(key).map(|w| w.value().clone())
    }

    /// Matching windows ordered by competitor, then start time.
    #[must_use]
    pub fn windows(&self, filter: &WindowFilter) -> Vec<TrendWindow> {
        let mut out: Vec<TrendWindow> = self
            .windows
            .iter()
            .filter(|entry| {
                let key = entry.key();
                filter
                    .competitor_id
                    .as_ref()
                    .is_none_or(|c| *c == key.competitor_id)
                    && (!filter.finalized_only || entry.finalized)
                    && filter.since.is_none_or(|t| key.window_start >= t)
            })
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    /// Per-competitor view at `now`: the window containing `now` compared
    /// against the one before it. When the current window has no mentions
    /// yet, the sentiment score comes from the prior window.
    #[must_use]
    pub fn trend_summary(&self, now: DateTime<Utc>) -> Vec<TrendSnapshot> {
        self.competitors
            .iter()
            .map(|c| {
                let key = WindowKey::containing(&c.id, now, self.window_secs);
                let current = self.window(&key);
                let prior = self.window(&key.preceding());
                let mentions = current.as_ref().map_or(0, |w| w.mention_count);
                let prior_mentions = prior.as_ref().map_or(0, |w| w.mention_count);
                let sentiment_score = current
                    .as_ref()
                    .filter(|w| w.sentiment_count > 0)
                    .or(prior.as_ref())
                    .map_or(0.5, TrendWindow::sentiment_avg);
                let change = change_percentage(mentions, prior_mentions);
                TrendSnapshot {
                    competitor_id: c.id.clone(),
                    competitor: c.name.clone(),
                    mentions,
                    sentiment_score,
                    trend_direction: TrendDirection::from_change(change),
                    change_percentage: change,
                    window_start: key.window_start,
                    finalized: current.is_some_and(|w| w.finalized),
                }
            })
            .collect()
    }

    /// Drop finalized windows that ended before `cutoff`.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let expired: Vec<WindowKey> = self
            .windows
            .iter()
            .filter(|entry| entry.finalized && entry.key().window_end() < cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        expired
            .iter()
            .filter(|key| self.windows.remove_if(*key, |_, w| w.finalized).is_some())
            .count()
    }

    fn competitor_name(&self, competitor_id: &str) -> String {
        self.competitors
            .iter()
            .find(|c| c.id == competitor_id)
            .map_or_else(|| competitor_id.to_string(), |c| c.name.clone())
    }
}

#[cfg(test)]
#[path = "trends_test.rs"]
mod tests;
