//! Source registry: polling schedule and health tracking.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use competeiq_core::{Source, SourceStatus};

#[derive(Debug)]
pub struct SourceRegistry {
    sources: RwLock<BTreeMap<String, Source>>,
    failure_threshold: u32,
    degraded_multiplier: u32,
}

impl SourceRegistry {
    #[must_use]
    pub fn new(sources: Vec<Source>, failure_threshold: u32, degraded_multiplier: u32) -> Self {
        Self {
            sources: RwLock::new(sources.into_iter().map(|s| (s.id.clone(), s)).collect()),
            failure_threshold: failure_threshold.max(1),
            degraded_multiplier: degraded_multiplier.max(1),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Sources whose (possibly degraded) interval has elapsed at `now`.
    #[must_use]
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Source> {
        self.sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.is_due(now, self.degraded_multiplier))
            .cloned()
            .collect()
    }

    /// A poll succeeded: reset the failure counter and mark the source active.
    pub fn record_success(&self, id: &str, now: DateTime<Utc>) -> Option<Source> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let source = sources.get_mut(id)?;
        source.last_polled_at = Some(now);
        source.consecutive_failure_count = 0;
        if source.status == SourceStatus::Degraded {
            tracing::info!(source = %id, "source recovered");
            source.status = SourceStatus::Active;
        }
        Some(source.clone())
    }

    /// A poll cycle failed after retries. Degrades the source once the
    /// consecutive failure count reaches the threshold.
    pub fn record_failure(&self, id: &str, now: DateTime<Utc>) -> Option<Source> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let source = sources.get_mut(id)?;
        source.last_polled_at = Some(now);
        source.consecutive_failure_count = source.consecutive_failure_count.saturating_add(1);
        if source.status == SourceStatus::Active
            && source.consecutive_failure_count >= self.failure_threshold
        {
            source.status = SourceStatus::Degraded;
            tracing::warn!(
                source = %id,
                failures = source.consecutive_failure_count,
                multiplier = self.degraded_multiplier,
                "source degraded, polling interval extended"
            );
        }
        Some(source.clone())
    }

    /// Administrative enable/disable. Re-enabling clears failure history.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Option<Source> {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        let source = sources.get_mut(id)?;
        if enabled {
            if source.status == SourceStatus::Disabled {
                source.status = SourceStatus::Active;
                source.consecutive_failure_count = 0;
            }
        } else {
            source.status = SourceStatus::Disabled;
        }
        Some(source.clone())
    }

    #[must_use]
    pub fn degraded_multiplier(&self) -> u32 {
        self.degraded_multiplier
    }
}
