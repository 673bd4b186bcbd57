//! Trend window types and the pure arithmetic behind them.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Change (in percent) beyond which a trend counts as moving.
const DIRECTION_BAND_PCT: f64 = 5.0;

/// Longest supported window: 31 days.
pub const MAX_WINDOW_SECS: i64 = 31 * 24 * 60 * 60;

/// Identity of one fixed-length window for one competitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowKey {
    pub competitor_id: String,
    pub window_start: DateTime<Utc>,
    pub window_length_secs: i64,
}

impl WindowKey {
    /// The window of `length_secs` that contains `at`, aligned to the Unix
    /// epoch. The length is clamped to `1..=MAX_WINDOW_SECS`.
    #[must_use]
    pub fn containing(competitor_id: &str, at: DateTime<Utc>, length_secs: i64) -> Self {
        let length_secs = length_secs.clamp(1, MAX_WINDOW_SECS);
        let ts = at.timestamp();
        let start = ts - ts.rem_euclid(length_secs);
        Self {
            competitor_id: competitor_id.to_string(),
            window_start: DateTime::<Utc>::from_timestamp(start, 0).unwrap_or(at),
            window_length_secs: length_secs,
        }
    }

    fn length(&self) -> Duration {
        Duration::try_seconds(self.window_length_secs).unwrap_or(Duration::MAX)
    }

    /// Exclusive end of the window, saturating at the latest representable
    /// instant.
    #[must_use]
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start
            .checked_add_signed(self.length())
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// The immediately preceding window of equal length.
    #[must_use]
    pub fn preceding(&self) -> Self {
        Self {
            competitor_id: self.competitor_id.clone(),
            window_start: self
                .window_start
                .checked_sub_signed(self.length())
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            window_length_secs: self.window_length_secs,
        }
    }

    #[must_use]
    pub fn following(&self) -> Self {
        Self {
            competitor_id: self.competitor_id.clone(),
            window_start: self.window_end(),
            window_length_secs: self.window_length_secs,
        }
    }
}

/// Aggregated mention and sentiment statistics for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendWindow {
    #[serde(flatten)]
    pub key: WindowKey,
    pub mention_count: u64,
    pub sentiment_sum: f64,
    pub sentiment_count: u64,
    pub finalized: bool,
    /// Documents counted in this window, in commit order.
    pub document_ids: Vec<Uuid>,
}

impl TrendWindow {
    #[must_use]
    pub fn new(key: WindowKey) -> Self {
        Self {
            key,
            mention_count: 0,
            sentiment_sum: 0.0,
            sentiment_count: 0,
            finalized: false,
            document_ids: Vec::new(),
        }
    }

    /// Mean sentiment weight; 0.5 (neutral) for an empty window.
    #[must_use]
    pub fn sentiment_avg(&self) -> f64 {
        if self.sentiment_count == 0 {
            0.5
        } else {
            #[allow(clippy::cast_precision_loss)]
            let count = self.sentiment_count as f64;
            self.sentiment_sum / count
        }
    }
}

/// `(current − prior) / max(prior, 1) × 100`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn change_percentage(current: u64, prior: u64) -> f64 {
    (current as f64 - prior as f64) / (prior.max(1) as f64) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

impl TrendDirection {
    #[must_use]
    pub fn from_change(change_pct: f64) -> Self {
        if change_pct > DIRECTION_BAND_PCT {
            TrendDirection::Up
        } else if change_pct < -DIRECTION_BAND_PCT {
            TrendDirection::Down
        } else {
            TrendDirection::Stable
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Up => write!(f, "up"),
            TrendDirection::Down => write!(f, "down"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Per-competitor trend view for dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub competitor_id: String,
    pub competitor: String,
    pub mentions: u64,
    pub sentiment_score: f64,
    pub trend_direction: TrendDirection,
    pub change_percentage: f64,
    pub window_start: DateTime<Utc>,
    pub finalized: bool,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn rising_volume_is_up() {
        let pct = change_percentage(115, 100);
        assert!((pct - 15.0).abs() < 1e-9);
        assert_eq!(TrendDirection::from_change(pct), TrendDirection::Up);
    }

    #[test]
    fn small_dip_is_stable() {
        let pct = change_percentage(96, 100);
        assert!((pct + 4.0).abs() < 1e-9);
        assert_eq!(TrendDirection::from_change(pct), TrendDirection::Stable);
    }

    #[test]
    fn large_drop_is_down() {
        assert_eq!(
            TrendDirection::from_change(change_percentage(50, 100)),
            TrendDirection::Down
        );
    }

    #[test]
    fn zero_prior_divides_by_one() {
        assert!((change_percentage(3, 0) - 300.0).abs() < 1e-9);
    }

    #[test]
    fn empty_window_average_is_neutral() {
        let key = WindowKey::containing("oneplus", Utc::now(), 3_600);
        assert!((TrendWindow::new(key).sentiment_avg() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn window_key_aligns_to_length() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 10, 42, 17).unwrap();
        let key = WindowKey::containing("oneplus", at, 3_600);
        assert_eq!(
            key.window_start,
            Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap()
        );
        assert_eq!(
            key.window_end(),
            Utc.with_ymd_and_hms(2025, 1, 2, 11, 0, 0).unwrap()
        );
        assert_eq!(key.preceding().following(), key);
    }

    #[test]
    fn oversized_lengths_never_overflow() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 10, 42, 17).unwrap();
        let key = WindowKey::containing("oneplus", at, 10_i64.pow(16));
        assert_eq!(key.window_length_secs, MAX_WINDOW_SECS);
        assert!(key.window_end() > at);

        let raw = WindowKey {
            competitor_id: "oneplus".to_string(),
            window_start: at,
            window_length_secs: i64::MAX,
        };
        assert_eq!(raw.window_end(), DateTime::<Utc>::MAX_UTC);
        assert_eq!(raw.preceding().window_start, DateTime::<Utc>::MIN_UTC);
    }
}
