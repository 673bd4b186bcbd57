//! Ordered alert log with broadcast fan-out for notifiers. Entries are only
//! ever appended; retention drops them from the front.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use competeiq_core::Alert;
use tokio::sync::broadcast;
use uuid::Uuid;

const BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub rule_id: Option<String>,
    pub competitor_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    /// Keep only the most recent `limit` matches.
    pub limit: Option<usize>,
}

impl AlertFilter {
    fn matches(&self, alert: &Alert) -> bool {
        self.rule_id
            .as_ref()
            .is_none_or(|r| alert.rule_id.as_ref() == Some(r))
            && self
                .competitor_id
                .as_ref()
                .is_none_or(|c| alert.competitor_id.as_ref() == Some(c))
            && self.since.is_none_or(|t| alert.created_at >= t)
    }
}

#[derive(Debug)]
pub struct AlertLog {
    entries: RwLock<Vec<Alert>>,
    sender: broadcast::Sender<Alert>,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertLog {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            entries: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// Append an alert and notify subscribers.
    pub fn append(&self, alert: Alert) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(alert.clone());
        // No subscribers is not an error.
        let _ = self.sender.send(alert);
    }

    /// Alerts in the order they were raised.
    #[must_use]
    pub fn list(&self, filter: &AlertFilter) -> Vec<Alert> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let matched: Vec<&Alert> = entries.iter().filter(|a| filter.matches(a)).collect();
        let skip = filter
            .limit
            .map_or(0, |limit| matched.len().saturating_sub(limit));
        matched.into_iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<Alert> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    /// Drop alerts created before `cutoff`. Returns the number removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|a| a.created_at >= cutoff);
        before - entries.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive every alert appended after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.sender.subscribe()
    }
}
