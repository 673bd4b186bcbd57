use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Longest accepted polling interval: 7 days.
pub const MAX_POLLING_INTERVAL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    News,
    Social,
    Website,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::News => write!(f, "news"),
            SourceKind::Social => write!(f, "social"),
            SourceKind::Website => write!(f, "website"),
        }
    }
}

/// Health of a polled source.
///
/// `Degraded` sources keep being polled, just less often. `Disabled` is an
/// administrative state and is never entered by the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Active,
    Degraded,
    Disabled,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Active => write!(f, "active"),
            SourceStatus::Degraded => write!(f, "degraded"),
            SourceStatus::Disabled => write!(f, "disabled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub name: String,
    pub kind: SourceKind,
    pub endpoint: String,
    pub polling_interval_secs: u64,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub consecutive_failure_count: u32,
    pub status: SourceStatus,
}

impl Source {
    /// Polling interval after applying the degraded back-off multiplier.
    #[must_use]
    pub fn effective_interval(&self, degraded_multiplier: u32) -> Duration {
        let base = i64::try_from(self.polling_interval_secs).unwrap_or(i64::MAX);
        let secs = match self.status {
            SourceStatus::Degraded => base.saturating_mul(i64::from(degraded_multiplier.max(1))),
            SourceStatus::Active | SourceStatus::Disabled => base,
        };
        Duration::try_seconds(secs).unwrap_or(Duration::MAX)
    }

    /// Whether the source should be polled at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>, degraded_multiplier: u32) -> bool {
        if self.status == SourceStatus::Disabled {
            return false;
        }
        match self.last_polled_at {
            None => true,
            Some(last) => {
                now.signed_duration_since(last) >= self.effective_interval(degraded_multiplier)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(status: SourceStatus, last_polled_at: Option<DateTime<Utc>>) -> Source {
        Source {
            id: "gadgets360".to_string(),
            name: "Gadgets360".to_string(),
            kind: SourceKind::News,
            endpoint: "https://example.com/rss".to_string(),
            polling_interval_secs: 600,
            last_polled_at,
            consecutive_failure_count: 0,
            status,
        }
    }

    #[test]
    fn never_polled_source_is_due() {
        assert!(source(SourceStatus::Active, None).is_due(Utc::now(), 4));
    }

    #[test]
    fn disabled_source_is_never_due() {
        assert!(!source(SourceStatus::Disabled, None).is_due(Utc::now(), 4));
    }

    #[test]
    fn degraded_source_polls_less_often() {
        let now = Utc::now();
        let last = now - Duration::seconds(1_200);
        assert!(source(SourceStatus::Active, Some(last)).is_due(now, 4));
        assert!(!source(SourceStatus::Degraded, Some(last)).is_due(now, 4));
        assert_eq!(
            source(SourceStatus::Degraded, Some(last)).effective_interval(4),
            Duration::seconds(2_400)
        );
    }

    #[test]
    fn huge_intervals_saturate_instead_of_panicking() {
        let now = Utc::now();
        let mut s = source(SourceStatus::Degraded, Some(now - Duration::days(1)));
        s.polling_interval_secs = 10_u64.pow(16);
        assert_eq!(s.effective_interval(u32::MAX), Duration::MAX);
        assert!(!s.is_due(now, u32::MAX));
    }
}
